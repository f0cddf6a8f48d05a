use std::mem;

use memoffset::offset_of;
use rsmp::datatype::Layout;
use rsmp::traits::*;
use rsmp::{Address, Config};

#[repr(C)]
#[derive(Copy, Clone, Debug)]
struct Measurement {
    id: i32,
    value: f64,
}

unsafe impl Equivalence for Measurement {
    fn equivalent_layout() -> Layout {
        let layout = Layout::struct_of([
            (offset_of!(Measurement, id) as Address, i32::equivalent_layout()),
            (offset_of!(Measurement, value) as Address, f64::equivalent_layout()),
        ])
        .and_then(|fields| Layout::resized(mem::size_of::<Measurement>(), &fields))
        .expect("Measurement layout is invalid");
        layout
            .commit()
            .expect("Measurement layout cannot be committed");
        layout
    }
}

fn main() -> rsmp::Result<()> {
    env_logger::init();

    let results = rsmp::Universe::run(2, Config::from_env()?, |world| -> rsmp::Result<()> {
        if world.rank() == 0 {
            let m = Measurement {
                id: 0,
                value: 3.1459,
            };
            world.process_at_rank(1)?.send(&m)?;
        } else {
            let (m, status) = world.any_process().receive::<Measurement>()?;
            println!(
                "Rank {} received {} {}, {} bytes on the wire.",
                world.rank(),
                m.id,
                m.value,
                status.len()
            );
        }
        Ok(())
    })?;
    results.into_iter().collect()
}
