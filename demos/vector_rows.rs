use rsmp::datatype::{Layout, View};
use rsmp::traits::*;
use rsmp::Config;

const N: usize = 4;

fn main() -> rsmp::Result<()> {
    env_logger::init();

    let results = rsmp::Universe::run(2, Config::from_env()?, |world| -> rsmp::Result<()> {
        // 2 rows of 4 elements, one row apart from the next
        let rows = Layout::vector(2, N as rsmp::Count, 2 * N as rsmp::Count, &i32::equivalent_layout())?;
        rows.commit()?;

        if world.rank() == 0 {
            let matrix: Vec<i32> = (1..=(N * N) as i32).collect();
            let view = View::with_count_and_layout(&matrix[..], 1, &rows)?;
            world.process_at_rank(1)?.send(&view)?;
        } else {
            let mut received = [0i32; 2 * N];
            let status = world.process_at_rank(0)?.receive_into(&mut received[..])?;
            println!(
                "Rank {} received {:?}, status: {:?}.",
                world.rank(),
                received,
                status
            );
        }
        rows.release()
    })?;
    results.into_iter().collect()
}
