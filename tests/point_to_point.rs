use std::collections::HashSet;
use std::mem;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use memoffset::offset_of;

use rsmp::datatype::{Layout, View};
use rsmp::point_to_point::send_receive_replace_into;
use rsmp::request::RequestCollection;
use rsmp::traits::*;
use rsmp::{Address, Config, Error, Universe};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn matrix() -> Vec<i32> {
    (1..=16).collect()
}

#[test]
fn vector_rows_with_stride_eight() {
    init();
    let results = Universe::run(2, Config::default(), |world| -> rsmp::Result<Vec<i32>> {
        let rows = Layout::vector(2, 4, 8, &i32::equivalent_layout())?;
        rows.commit()?;
        if world.rank() == 0 {
            let matrix = matrix();
            let view = View::with_count_and_layout(&matrix[..], 1, &rows)?;
            world.process_at_rank(1)?.send(&view)?;
            Ok(Vec::new())
        } else {
            let mut buffer = [0i32; 8];
            let status = world.process_at_rank(0)?.receive_into(&mut buffer[..])?;
            assert_eq!(status.count(&i32::equivalent_layout()), Some(8));
            Ok(buffer.to_vec())
        }
    })
    .unwrap();
    assert_eq!(results[1], Ok(vec![1, 2, 3, 4, 9, 10, 11, 12]));
}

#[test]
fn vector_first_two_rows() {
    init();
    let results = Universe::run(2, Config::default(), |world| -> rsmp::Result<Vec<i32>> {
        let rows = Layout::vector(2, 4, 4, &i32::equivalent_layout())?;
        rows.commit()?;
        if world.rank() == 0 {
            let matrix = matrix();
            let view = View::with_count_and_layout(&matrix[..], 1, &rows)?;
            world.process_at_rank(1)?.send(&view)?;
            Ok(Vec::new())
        } else {
            Ok(world.process_at_rank(0)?.receive_vec::<i32>()?.0)
        }
    })
    .unwrap();
    assert_eq!(results[1], Ok((1..=8).collect::<Vec<_>>()));
}

#[test]
fn column_into_strided_receive() {
    init();
    let world = Universe::local(2, Config::default()).unwrap();
    let column = Layout::vector(4, 1, 4, &i32::equivalent_layout()).unwrap();
    column.commit().unwrap();

    let source = matrix();
    let view = View::with_count_and_layout(&source[..], 1, &column).unwrap();
    world[0].process_at_rank(1).unwrap().send(&view).unwrap();

    let mut target = vec![0i32; 16];
    {
        let mut view =
            rsmp::datatype::MutView::with_count_and_layout(&mut target[..], 1, &column).unwrap();
        world[1].any_process().receive_into(&mut view).unwrap();
    }
    assert_eq!(&target[..5], &[1, 0, 0, 0, 5]);
    assert_eq!(target[12], 13);
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq)]
struct Pair {
    id: i32,
    value: f64,
}

unsafe impl Equivalence for Pair {
    fn equivalent_layout() -> Layout {
        let fields = Layout::struct_of([
            (offset_of!(Pair, id) as Address, i32::equivalent_layout()),
            (offset_of!(Pair, value) as Address, f64::equivalent_layout()),
        ])
        .unwrap();
        let layout = Layout::resized(mem::size_of::<Pair>(), &fields).unwrap();
        layout.commit().unwrap();
        layout
    }
}

#[test]
fn struct_with_alignment_gap() {
    init();
    assert_eq!(offset_of!(Pair, value), 8);
    let results = Universe::run(2, Config::default(), |world| -> rsmp::Result<Option<Pair>> {
        if world.rank() == 0 {
            let pair = Pair {
                id: 0,
                value: 3.1459,
            };
            world.process_at_rank(1)?.send(&pair)?;
            Ok(None)
        } else {
            let (pair, status) = world.any_process().receive::<Pair>()?;
            assert_eq!(status.len(), 12);
            Ok(Some(pair))
        }
    })
    .unwrap();
    assert_eq!(
        results[1],
        Ok(Some(Pair {
            id: 0,
            value: 3.1459
        }))
    );
}

#[test]
fn array_of_structs() {
    init();
    let world = Universe::local(2, Config::default()).unwrap();
    let pairs: Vec<Pair> = (0..5)
        .map(|i| Pair {
            id: i,
            value: f64::from(i) / 2.0,
        })
        .collect();
    world[0].process_at_rank(1).unwrap().send(&pairs[..]).unwrap();
    let (received, status) = world[1].any_process().receive_vec::<Pair>().unwrap();
    assert_eq!(status.count(&Pair::equivalent_layout()), Some(5));
    assert_eq!(received, pairs);
}

#[test]
fn mirrored_synchronous_exchange_completes() {
    init();
    for len in [0usize, 1, 1 << 10, 1 << 18] {
        let results = Universe::run(2, Config::default(), |world| -> rsmp::Result<usize> {
            let other = world.process_at_rank(1 - world.rank())?;
            let mut received = vec![0u8; len];
            let outgoing = vec![world.rank() as u8 + 1; len];
            if world.rank() == 0 {
                other.synchronous_send(&outgoing[..])?;
                other.receive_into(&mut received[..])?;
            } else {
                other.receive_into(&mut received[..])?;
                other.synchronous_send(&outgoing[..])?;
            }
            Ok(received.iter().map(|&b| b as usize).sum())
        })
        .unwrap();
        assert_eq!(results, vec![Ok(2 * len), Ok(len)]);
    }
}

#[test]
fn mutual_synchronous_sends_block() {
    init();
    let world = Universe::local(2, Config::default()).unwrap();
    let (tx, rx) = mpsc::channel();
    for comm in world {
        let tx = tx.clone();
        thread::spawn(move || {
            let other = comm.process_at_rank(1 - comm.rank()).unwrap();
            let sent = other.synchronous_send(&[comm.rank(); 4][..]);
            let _ = tx.send(sent);
        });
    }
    assert_eq!(
        rx.recv_timeout(Duration::from_millis(300)),
        Err(RecvTimeoutError::Timeout)
    );
}

#[test]
fn mutual_standard_sends_above_eager_limit_block() {
    init();
    let world = Universe::local(2, Config::default().with_eager_limit(16)).unwrap();
    let (tx, rx) = mpsc::channel();
    for comm in world {
        let tx = tx.clone();
        thread::spawn(move || {
            let other = comm.process_at_rank(1 - comm.rank()).unwrap();
            let sent = other.send(&[0u8; 17][..]);
            let _ = tx.send(sent);
        });
    }
    assert_eq!(
        rx.recv_timeout(Duration::from_millis(300)),
        Err(RecvTimeoutError::Timeout)
    );
}

#[test]
fn mutual_small_standard_sends_complete() {
    init();
    let results = Universe::run(2, Config::default(), |world| -> rsmp::Result<i32> {
        let other = world.process_at_rank(1 - world.rank())?;
        other.send(&world.rank())?;
        Ok(other.receive::<i32>()?.0)
    })
    .unwrap();
    assert_eq!(results, vec![Ok(1), Ok(0)]);
}

#[test]
fn immediate_receive_test_polling() {
    init();
    let world = Universe::local(2, Config::default()).unwrap();
    let request = world[1]
        .process_at_rank(0)
        .unwrap()
        .immediate_receive_into(vec![0i32; 4])
        .unwrap();
    assert_eq!(request.is_complete(), Ok(false));
    let mut request = match request.test().unwrap() {
        Ok(_) => panic!("receive completed before anything was sent"),
        Err(request) => request,
    };

    world[0]
        .process_at_rank(1)
        .unwrap()
        .immediate_send(vec![1i32, 2, 3, 4])
        .unwrap()
        .wait()
        .unwrap();

    let mut polls = 0;
    let (buffer, status) = loop {
        match request.test().unwrap() {
            Ok(done) => break done,
            Err(pending) => request = pending,
        }
        polls += 1;
        assert!(polls < 100, "receive did not complete");
    };
    assert_eq!(buffer, vec![1, 2, 3, 4]);
    assert_eq!(status.source_rank(), 0);
}

#[test]
fn immediate_synchronous_send_waits_for_match() {
    init();
    let world = Universe::local(2, Config::default()).unwrap();
    let request = world[0]
        .process_at_rank(1)
        .unwrap()
        .immediate_synchronous_send(vec![7u64; 3])
        .unwrap();
    let request = match request.test().unwrap() {
        Ok(_) => panic!("synchronous send completed without a receiver"),
        Err(request) => request,
    };
    assert_eq!(request.is_complete(), Ok(false));

    let (v, _) = world[1].any_process().receive_vec::<u64>().unwrap();
    assert_eq!(v, vec![7, 7, 7]);

    let (buffer, status) = request.wait().unwrap();
    assert_eq!(buffer, vec![7, 7, 7]);
    assert_eq!(status.len(), 24);
}

#[test]
fn wildcard_source_receives_from_everyone() {
    init();
    let results = Universe::run(3, Config::default(), |world| -> rsmp::Result<HashSet<i32>> {
        let mut sources = HashSet::new();
        if world.rank() == 0 {
            for _ in 1..world.size() {
                let (value, status) = world.any_process().receive::<i32>()?;
                assert_eq!(value, status.source_rank() * 100);
                sources.insert(status.source_rank());
            }
        } else {
            world.process_at_rank(0)?.send(&(world.rank() * 100))?;
        }
        Ok(sources)
    })
    .unwrap();
    assert_eq!(results[0], Ok([1, 2].into_iter().collect()));
}

#[test]
fn fifo_per_tag() {
    init();
    let world = Universe::local(2, Config::default()).unwrap();
    let dest = world[0].process_at_rank(1).unwrap();
    for i in 0..10u32 {
        dest.send_with_tag(&i, 3).unwrap();
        dest.send_with_tag(&(i + 100), 4).unwrap();
    }
    let source = world[1].process_at_rank(0).unwrap();
    let tagged: Vec<u32> = (0..10)
        .map(|_| source.receive_with_tag::<u32>(4).unwrap().0)
        .collect();
    assert_eq!(tagged, (100..110).collect::<Vec<_>>());
    let rest: Vec<u32> = (0..10).map(|_| source.receive::<u32>().unwrap().0).collect();
    assert_eq!(rest, (0..10).collect::<Vec<_>>());
}

#[test]
fn buffered_send_fails_when_staging_is_full() {
    init();
    let config = Config::default()
        .with_buffer_size(16)
        .with_mailbox_capacity(Some(0));
    let world = Universe::local(2, config).unwrap();
    let dest = world[0].process_at_rank(1).unwrap();

    dest.buffered_send(&[1i32; 4][..]).unwrap();
    dest.buffered_send(&[2i32; 4][..]).unwrap();
    assert_eq!(world[0].staged_bytes(), 16);
    assert_eq!(
        dest.buffered_send(&3i32).unwrap_err(),
        Error::ResourceExhausted {
            requested: 4,
            available: 0
        }
    );

    let source = world[1].process_at_rank(0).unwrap();
    assert_eq!(source.receive_vec::<i32>().unwrap().0, vec![1; 4]);
    dest.buffered_send(&3i32).unwrap();
    assert_eq!(world[0].staged_bytes(), 4);
    assert_eq!(source.receive_vec::<i32>().unwrap().0, vec![2; 4]);
}

#[test]
fn staging_capacity_at_runtime() {
    init();
    let world = Universe::local(2, Config::default().with_buffer_size(0)).unwrap();
    let dest = world[0].process_at_rank(1).unwrap();
    assert!(matches!(
        dest.buffered_send(&1u8),
        Err(Error::ResourceExhausted { .. })
    ));
    world[0].set_buffer_size(64);
    dest.buffered_send(&1u8).unwrap();
    assert_eq!(world[1].any_process().receive::<u8>().unwrap().0, 1);
}

#[test]
fn ring_with_send_receive_replace() {
    init();
    let results = Universe::run(4, Config::default().with_eager_limit(0), |world| {
        let size = world.size();
        let rank = world.rank();
        let right = world.process_at_rank((rank + 1) % size)?;
        let left = world.process_at_rank((rank - 1 + size) % size)?;
        let mut data = [rank; 16];
        send_receive_replace_into(&mut data[..], &right, &left)?;
        let from_left = data[0];
        send_receive_replace_into(&mut data[..], &left, &right)?;
        Ok::<_, Error>((from_left, data[0]))
    })
    .unwrap();
    assert_eq!(
        results,
        vec![Ok((3, 0)), Ok((0, 1)), Ok((1, 2)), Ok((2, 3))]
    );
}

#[test]
fn probe_reports_pending_message() {
    init();
    let world = Universe::local(2, Config::default()).unwrap();
    let source = world[1].process_at_rank(0).unwrap();
    assert_eq!(source.immediate_probe(), Ok(None));

    world[0]
        .process_at_rank(1)
        .unwrap()
        .send_with_tag(&[0.5f64, 1.5, 2.5][..], 7)
        .unwrap();
    assert_eq!(source.immediate_probe_with_tag(8), Ok(None));
    let status = source.probe_with_tag(7).unwrap();
    assert_eq!(status.tag(), 7);
    assert_eq!(status.count(&f64::equivalent_layout()), Some(3));

    let (v, _) = source.receive_vec::<f64>().unwrap();
    assert_eq!(v, vec![0.5, 1.5, 2.5]);
    assert_eq!(source.immediate_probe(), Ok(None));
}

#[test]
fn request_collection() {
    init();
    let world = Universe::local(3, Config::default().with_eager_limit(0)).unwrap();
    let mut sends: RequestCollection<'_, Vec<u8>> = (1..3)
        .map(|r| {
            world[0]
                .process_at_rank(r)
                .unwrap()
                .immediate_send(vec![r as u8; 2])
                .unwrap()
        })
        .collect();
    assert_eq!(sends.test_any().unwrap().map(|(i, _, _)| i), None);

    let (v, _) = world[2].any_process().receive_vec::<u8>().unwrap();
    assert_eq!(v, vec![2, 2]);
    let (index, buffer, _) = sends.wait_any().unwrap().unwrap();
    assert_eq!(index, 1);
    assert_eq!(buffer, vec![2, 2]);
    assert_eq!(sends.outstanding(), 1);

    world[1].any_process().receive_vec::<u8>().unwrap();
    let rest = sends.wait_all().unwrap();
    assert_eq!(rest.len(), 1);
}

#[test]
fn synchronous_send_to_departed_rank() {
    init();
    let mut world = Universe::local(2, Config::default()).unwrap();
    drop(world.pop());
    let dest = world[0].process_at_rank(1).unwrap();
    assert_eq!(
        dest.synchronous_send(&1i32).unwrap_err(),
        Error::ChannelClosed(1)
    );
    assert_eq!(
        world[0].process_at_rank(1).unwrap().receive::<i32>().unwrap_err(),
        Error::ChannelClosed(1)
    );
}

#[test]
fn eager_sends_to_departed_rank() {
    init();
    let mut world = Universe::local(2, Config::default()).unwrap();
    drop(world.pop());
    let dest = world[0].process_at_rank(1).unwrap();
    assert_eq!(
        dest.buffered_send(&1i32).unwrap_err(),
        Error::ChannelClosed(1)
    );
    assert_eq!(dest.send(&1i32).unwrap_err(), Error::ChannelClosed(1));
    assert_eq!(
        dest.immediate_send(vec![1i32])
            .and_then(|request| request.wait())
            .unwrap_err(),
        Error::ChannelClosed(1)
    );
    assert_eq!(world[0].staged_bytes(), 0);
}

#[test]
fn staged_message_lost_on_departure_is_reported() {
    init();
    let config = Config::default().with_mailbox_capacity(Some(0));
    let mut world = Universe::local(2, config).unwrap();
    let dest = world[0].process_at_rank(1).unwrap();
    dest.buffered_send(&1i32).unwrap();
    dest.buffered_send(&2i32).unwrap();
    assert_eq!(world[0].staged_bytes(), 4);

    let departed = world.pop();
    drop(departed);
    let dest = world[0].process_at_rank(1).unwrap();
    assert_eq!(
        dest.buffered_send(&3i32).unwrap_err(),
        Error::ChannelClosed(1)
    );
    assert_eq!(world[0].staged_bytes(), 0);
}

#[test]
fn truncated_immediate_receive_is_reported() {
    init();
    let world = Universe::local(2, Config::default()).unwrap();
    world[0]
        .process_at_rank(1)
        .unwrap()
        .send(&[1u16, 2, 3][..])
        .unwrap();
    let request = world[1]
        .any_process()
        .immediate_receive_into(vec![0u16; 2])
        .unwrap();
    assert_eq!(
        request.wait().unwrap_err(),
        Error::Truncated {
            received: 6,
            capacity: 4
        }
    );
    assert_eq!(world[1].any_process().immediate_probe(), Ok(None));
}

#[test]
#[should_panic(expected = "request was dropped without being completed")]
fn dropping_a_pending_request_panics() {
    let world = Universe::local(2, Config::default()).unwrap();
    let _request = world[1]
        .any_process()
        .immediate_receive_into(vec![0u8; 1])
        .unwrap();
}

#[test]
fn uncommitted_layouts_are_rejected() {
    init();
    let world = Universe::local(2, Config::default()).unwrap();
    let rows = Layout::vector(2, 4, 8, &i32::equivalent_layout()).unwrap();
    let matrix = matrix();
    let view = View::with_count_and_layout(&matrix[..], 1, &rows).unwrap();
    let dest = world[0].process_at_rank(1).unwrap();
    assert_eq!(dest.send(&view).unwrap_err(), Error::NotCommitted);

    rows.commit().unwrap();
    rows.release().unwrap();
    assert_eq!(dest.send(&view).unwrap_err(), Error::UseAfterRelease);
    assert_eq!(world[1].any_process().immediate_probe(), Ok(None));
}
