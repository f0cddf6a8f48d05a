use rsmp::point_to_point::send_receive_replace_into;
use rsmp::topology::{Communicator, Rank};
use rsmp::traits::*;
use rsmp::Config;

const N: usize = 4;

fn exchange(world: &Communicator) -> rsmp::Result<[i32; 4]> {
    let size = world.size();
    let rank = world.rank();
    let side = (size as f64).sqrt() as Rank;
    let wrap = |r: Rank| (r + size) % size;

    let right = world.process_at_rank(wrap(rank + 1))?;
    let left = world.process_at_rank(wrap(rank - 1))?;
    let up = world.process_at_rank(wrap(rank - side))?;
    let down = world.process_at_rank(wrap(rank + side))?;

    let mut seen = [0; 4];
    for (i, (to, from)) in [(right, left), (left, right), (down, up), (up, down)]
        .into_iter()
        .enumerate()
    {
        let mut data = [rank; N * N];
        send_receive_replace_into(&mut data[..], &to, &from)?;
        seen[i] = data[0];
    }
    Ok(seen)
}

fn main() -> rsmp::Result<()> {
    env_logger::init();

    let results = rsmp::Universe::run(4, Config::from_env()?, |world| exchange(&world))?;
    for (rank, seen) in results.into_iter().enumerate() {
        let [left, right, up, down] = seen?;
        println!(
            "rank {}: left {} right {} up {} down {}",
            rank, left, right, up, down
        );
    }
    Ok(())
}
