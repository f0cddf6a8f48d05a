use rsmp::pack::PackBuffer;
use rsmp::traits::*;
use rsmp::Config;

const NUM_ROWS: usize = 3;
const NUM_COLS: usize = 3;
const BUFFER_SIZE: usize = 50;

fn print_matrix(rank: rsmp::topology::Rank, matrix: &[i32]) {
    for row in matrix.chunks(NUM_COLS) {
        println!("rank {}: {:?}", rank, row);
    }
}

fn main() -> rsmp::Result<()> {
    env_logger::init();

    let results = rsmp::Universe::run(2, Config::from_env()?, |world| -> rsmp::Result<()> {
        let mut packed = PackBuffer::with_capacity(BUFFER_SIZE * std::mem::size_of::<i32>());
        if world.rank() == 0 {
            let matrix: Vec<i32> = (0..NUM_ROWS * NUM_COLS).map(|i| i as i32).collect();
            print_matrix(world.rank(), &matrix);
            for row in matrix.chunks(NUM_COLS) {
                packed.pack(row)?;
            }
            world.process_at_rank(1)?.send(packed.as_packed())?;
        } else {
            let (bytes, _) = world.process_at_rank(0)?.receive_vec::<u8>()?;
            packed = PackBuffer::from_vec(bytes);
            let mut matrix = vec![0i32; NUM_ROWS * NUM_COLS];
            for row in matrix.chunks_mut(NUM_COLS) {
                packed.unpack(row)?;
            }
            print_matrix(world.rank(), &matrix);
        }
        Ok(())
    })?;
    results.into_iter().collect()
}
