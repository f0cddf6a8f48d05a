use num_complex::Complex64;
use rsmp::traits::*;
use rsmp::Config;

fn main() -> rsmp::Result<()> {
    env_logger::init();

    let results = rsmp::Universe::run(2, Config::from_env()?, |world| -> rsmp::Result<()> {
        if world.rank() == 0 {
            let roots: Vec<Complex64> = (0..4)
                .map(|k| Complex64::from_polar(1.0, f64::from(k) * std::f64::consts::FRAC_PI_2))
                .collect();
            world.process_at_rank(1)?.send(&roots[..])?;
        } else {
            let (roots, status) = world.any_process().receive_vec::<Complex64>()?;
            println!("{} bytes: {:?}", status.len(), roots);
        }
        Ok(())
    })?;
    results.into_iter().collect()
}
