use rsmp::traits::*;
use rsmp::Config;

#[derive(Equivalence, Copy, Clone, Debug, Default)]
struct Particle {
    id: i32,
    position: [f64; 3],
    charge: (i8, f32),
}

fn main() -> rsmp::Result<()> {
    env_logger::init();

    let layout = Particle::equivalent_layout();
    println!(
        "Particle: {} bytes of data in an extent of {} bytes",
        layout.size(),
        layout.extent()
    );

    let results = rsmp::Universe::run(2, Config::from_env()?, |world| -> rsmp::Result<()> {
        if world.rank() == 0 {
            let particles: Vec<Particle> = (0..3)
                .map(|i| Particle {
                    id: i,
                    position: [f64::from(i); 3],
                    charge: (-1, 0.5),
                })
                .collect();
            world.process_at_rank(1)?.send(&particles[..])?;
        } else {
            let (particles, _) = world.any_process().receive_vec::<Particle>()?;
            for p in particles {
                println!("{:?}", p);
            }
        }
        Ok(())
    })?;
    results.into_iter().collect()
}
