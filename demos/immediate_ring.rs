use rsmp::request::WaitGuard;
use rsmp::traits::*;
use rsmp::Config;

fn main() -> rsmp::Result<()> {
    env_logger::init();

    let results = rsmp::Universe::run(4, Config::from_env()?, |world| -> rsmp::Result<i32> {
        let size = world.size();
        let rank = world.rank();
        let next = world.process_at_rank((rank + 1) % size)?;
        let previous = world.process_at_rank((rank + size - 1) % size)?;

        let receive = previous.immediate_receive_into(vec![0i32; 1])?;
        let _send = WaitGuard::from(next.immediate_send(vec![rank])?);

        let mut polls = 0;
        let mut receive = receive;
        let (token, status) = loop {
            match receive.test()? {
                Ok(done) => break done,
                Err(request) => receive = request,
            }
            polls += 1;
        };
        println!(
            "rank {} got {:?} from rank {} after {} polls",
            rank,
            token,
            status.source_rank(),
            polls
        );

        // confirm with a blocking round the other way
        next.send(&token[0])?;
        let (back, _) = previous.receive_vec::<i32>()?;
        Ok(back[0])
    })?;
    for (rank, back) in results.into_iter().enumerate() {
        println!("rank {} ends with {}", rank, back?);
    }
    Ok(())
}
