use rsmp::traits::*;
use rsmp::Config;

const LEN: usize = 1 << 16;

fn main() -> rsmp::Result<()> {
    env_logger::init();

    // Synchronous sends only complete once the peer receives. If both ranks sent first, neither
    // would ever reach its receive, so rank 1 receives first.
    let results = rsmp::Universe::run(2, Config::from_env()?, |world| -> rsmp::Result<f64> {
        let rank = world.rank();
        let other = world.process_at_rank(1 - rank)?;
        let outgoing = vec![f64::from(rank); LEN];
        let mut incoming = vec![0f64; LEN];
        if rank == 0 {
            other.synchronous_send(&outgoing[..])?;
            other.receive_into(&mut incoming[..])?;
        } else {
            other.receive_into(&mut incoming[..])?;
            other.synchronous_send(&outgoing[..])?;
        }
        Ok(incoming[0])
    })?;
    for (rank, first) in results.into_iter().enumerate() {
        println!("rank {} received {}", rank, first?);
    }
    Ok(())
}
