use rsmp::datatype::{Layout, MutView, View};
use rsmp::pack::{packed_size, PackBuffer};
use rsmp::traits::*;
use rsmp::{Config, Error, Universe};

const ROWS: usize = 3;
const COLS: usize = 3;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn packed_rows_cross_ranks() {
    init();
    let results = Universe::run(2, Config::default(), |world| -> rsmp::Result<Vec<i32>> {
        if world.rank() == 0 {
            let matrix: Vec<i32> = (0..ROWS * COLS).map(|i| i as i32).collect();
            let mut packed = PackBuffer::with_capacity(50 * 4);
            for row in matrix.chunks(COLS) {
                packed.pack(row)?;
            }
            assert_eq!(packed.position(), ROWS * COLS * 4);
            world.process_at_rank(1)?.send(packed.as_packed())?;
            Ok(Vec::new())
        } else {
            let (bytes, _) = world.process_at_rank(0)?.receive_vec::<u8>()?;
            let mut packed = PackBuffer::from_vec(bytes);
            let mut matrix = vec![0i32; ROWS * COLS];
            for row in matrix.chunks_mut(COLS) {
                packed.unpack(row)?;
            }
            assert_eq!(packed.remaining(), 0);
            Ok(matrix)
        }
    })
    .unwrap();
    assert_eq!(results[1], Ok((0..9).collect::<Vec<_>>()));
}

#[test]
fn pack_through_vector_unpack_contiguous() {
    init();
    let rows = Layout::vector(2, 4, 8, &i32::equivalent_layout()).unwrap();
    rows.commit().unwrap();
    let matrix: Vec<i32> = (1..=16).collect();
    let view = View::with_count_and_layout(&matrix[..], 1, &rows).unwrap();

    let size = packed_size(&rows, 1).unwrap();
    assert_eq!(size, 8 * 4);
    let mut packed = PackBuffer::with_capacity(size);
    packed.pack(&view).unwrap();

    packed.rewind();
    let mut flat = [0i32; 8];
    packed.unpack(&mut flat[..]).unwrap();
    assert_eq!(flat, [1, 2, 3, 4, 9, 10, 11, 12]);
}

#[test]
fn unpack_into_strided_destination() {
    init();
    let column = Layout::vector(3, 1, 3, &i32::equivalent_layout()).unwrap();
    column.commit().unwrap();

    let mut packed = PackBuffer::with_capacity(packed_size(&column, 1).unwrap());
    packed.pack(&[7i32, 8, 9][..]).unwrap();
    packed.rewind();

    let mut matrix = [0i32; 9];
    {
        let mut view = MutView::with_count_and_layout(&mut matrix[..], 1, &column).unwrap();
        packed.unpack(&mut view).unwrap();
    }
    assert_eq!(matrix, [7, 0, 0, 8, 0, 0, 9, 0, 0]);
}

#[test]
fn overrun_leaves_buffer_untouched() {
    init();
    let mut packed = PackBuffer::with_capacity(10);
    packed.pack(&[1u32, 2][..]).unwrap();
    assert_eq!(
        packed.pack(&3u32).unwrap_err(),
        Error::BufferOverrun {
            needed: 4,
            position: 8,
            available: 2
        }
    );
    assert_eq!(packed.position(), 8);
    assert_eq!(&packed.as_bytes()[8..], &[0, 0]);
}

#[test]
fn mixed_values_share_one_buffer() {
    init();
    let mut packed = PackBuffer::with_capacity(64);
    packed.pack(&42u16).unwrap();
    packed.pack(&[1.5f64, -2.5][..]).unwrap();
    packed.pack(&-7i8).unwrap();
    assert_eq!(packed.position(), 2 + 16 + 1);

    let world = Universe::local(2, Config::default()).unwrap();
    world[0]
        .process_at_rank(1)
        .unwrap()
        .send(packed.as_packed())
        .unwrap();
    let (bytes, status) = world[1].any_process().receive_vec::<u8>().unwrap();
    assert_eq!(status.len(), 19);

    let mut packed = PackBuffer::from_vec(bytes);
    let mut small = 0u16;
    let mut reals = [0f64; 2];
    let mut tiny = 0i8;
    packed.unpack(&mut small).unwrap();
    packed.unpack(&mut reals[..]).unwrap();
    packed.unpack(&mut tiny).unwrap();
    assert_eq!((small, reals, tiny), (42, [1.5, -2.5], -7));
}

#[test]
fn vector_source_into_struct_destination() {
    init();
    let rows = Layout::vector(2, 4, 8, &i32::equivalent_layout()).unwrap();
    rows.commit().unwrap();
    let row = Layout::contiguous(4, &i32::equivalent_layout()).unwrap();
    let gapped = Layout::struct_of([(24, row.clone()), (0, row)]).unwrap();
    gapped.commit().unwrap();
    assert_eq!(rows.signature(), gapped.signature());

    let matrix: Vec<i32> = (1..=16).collect();
    let source = View::with_count_and_layout(&matrix[..], 1, &rows).unwrap();

    let mut packed = PackBuffer::with_capacity(packed_size(&rows, 1).unwrap());
    packed.pack(&source).unwrap();
    packed.rewind();
    let mut unpacked = [0i32; 12];
    {
        let mut view = MutView::with_count_and_layout(&mut unpacked[..], 1, &gapped).unwrap();
        packed.unpack(&mut view).unwrap();
    }
    assert_eq!(unpacked, [9, 10, 11, 12, 0, 0, 1, 2, 3, 4, 0, 0]);

    let world = Universe::local(2, Config::default()).unwrap();
    world[0].process_at_rank(1).unwrap().send(&source).unwrap();
    let mut received = [0i32; 12];
    {
        let mut view = MutView::with_count_and_layout(&mut received[..], 1, &gapped).unwrap();
        world[1].any_process().receive_into(&mut view).unwrap();
    }
    assert_eq!(received, unpacked);
}
