//! Describing data
//!
//! The core function of a message-passing library is getting data from point A to point B. It
//! offers facilities to describe that data (its layout in memory) that go beyond a start address
//! and a number of bytes.
//!
//! A `Layout` describes a memory layout as a tree of primitives, contiguous runs, strided vectors
//! and structs with explicit byte offsets. All offsets and strides are relative to the start of
//! the described object, so the same layout can be applied to any base address at transfer time.
//! Layouts directly corresponding to Rust primitive types, such as `Primitive::Float64` and
//! `f64`, are predefined. A direct relationship between a Rust type and a layout is covered by
//! the `Equivalence` trait. Starting from those, the user can build derived layouts, e.g. to
//! describe the layout of a struct (which should then implement `Equivalence`) or to describe a
//! part of an object in memory like two rows of a dense matrix stored in row-major order.
//!
//! Derived layouts follow a lifecycle: they are constructed uncommitted, have to be committed
//! before they can describe a transfer, and may be released, after which they are unusable.
//!
//! A `Buffer` describes a specific piece of data in memory. In addition to the layout of the
//! data, it knows the address in memory where the data begins and how many instances of the
//! layout are contained in it. The `Buffer` trait is implemented for values, slices and vectors
//! of types implementing `Equivalence`.
//!
//! In order to use arbitrary layouts to describe the contents of a slice, the `View` and
//! `MutView` types are provided.

use std::fmt;
use std::mem;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use conv::ConvUtil;
use once_cell::sync::Lazy;
use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::{Address, Count};

/// Datatype traits
pub mod traits {
    pub use super::{AsLayout, Buffer, BufferMut, Collection, Equivalence, Pointer, PointerMut};

    #[cfg(feature = "derive")]
    pub use rsmp_derive::Equivalence;
}

/// A fixed-width scalar
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// 8 bit signed integer
    Int8,
    /// 16 bit signed integer
    Int16,
    /// 32 bit signed integer
    Int32,
    /// 64 bit signed integer
    Int64,
    /// 8 bit unsigned integer
    UInt8,
    /// 16 bit unsigned integer
    UInt16,
    /// 32 bit unsigned integer
    UInt32,
    /// 64 bit unsigned integer
    UInt64,
    /// IEEE 754 single precision
    Float32,
    /// IEEE 754 double precision
    Float64,
    /// An uninterpreted byte
    Byte,
}

impl Primitive {
    /// Width of the scalar in bytes
    pub fn width(self) -> usize {
        match self {
            Primitive::Int8 | Primitive::UInt8 | Primitive::Byte => 1,
            Primitive::Int16 | Primitive::UInt16 => 2,
            Primitive::Int32 | Primitive::UInt32 | Primitive::Float32 => 4,
            Primitive::Int64 | Primitive::UInt64 | Primitive::Float64 => 8,
        }
    }
}

/// Ordered sequence of primitives, run-length encoded
///
/// Two layouts are compatible for a transfer if their signatures are equal, regardless of their
/// strides and offsets.
pub type Signature = SmallVec<[(Primitive, usize); 4]>;

/// The shape of a layout
#[derive(Debug)]
pub enum LayoutKind {
    /// A single scalar
    Primitive(Primitive),
    /// `count` consecutive instances of `element`
    Contiguous {
        /// Number of instances
        count: Count,
        /// Layout of each instance
        element: Layout,
    },
    /// `block_count` blocks of `block_length` instances of `element`, the starts of consecutive
    /// blocks placed `stride` instances apart
    Vector {
        /// Number of blocks
        block_count: Count,
        /// Instances per block
        block_length: Count,
        /// Distance between block starts, in instances of `element`
        stride: Count,
        /// Layout of each instance
        element: Layout,
    },
    /// Heterogeneous fields at explicit byte offsets, in descriptor order
    Struct {
        /// Byte offset and layout of each field
        fields: Vec<(Address, Layout)>,
    },
    /// The type map of `inner` with an explicitly declared extent
    Resized {
        /// Extent in bytes
        extent: usize,
        /// The resized layout
        inner: Layout,
    },
}

enum State {
    Uncommitted,
    Committed(Arc<TypeMap>),
    Released,
}

struct LayoutInner {
    kind: LayoutKind,
    extent: usize,
    size: usize,
    element_count: usize,
    dense: bool,
    predefined: bool,
    state: RwLock<State>,
}

/// A description of how a value maps onto a flat byte sequence
///
/// `Layout` is a cheap handle; clones refer to the same layout and share its lifecycle state.
/// Layouts that were used to construct another layout are captured by it, releasing them later
/// does not affect the derived layout.
///
/// # Examples
/// See `demos/vector_rows.rs`
#[derive(Clone)]
pub struct Layout(Arc<LayoutInner>);

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layout")
            .field("kind", &self.0.kind)
            .field("extent", &self.0.extent)
            .field("size", &self.0.size)
            .finish()
    }
}

impl Layout {
    /// A committed layout describing a single scalar
    pub fn primitive(primitive: Primitive) -> Layout {
        Layout::from_primitive(primitive, false)
    }

    fn predefined(primitive: Primitive) -> Layout {
        Layout::from_primitive(primitive, true)
    }

    fn from_primitive(primitive: Primitive, predefined: bool) -> Layout {
        let width = primitive.width();
        let state = State::Committed(Arc::new(TypeMap {
            segments: vec![Segment {
                offset: 0,
                len: width,
            }],
            signature: smallvec::smallvec![(primitive, 1)],
            extent: width,
            size: width,
            upper_bound: width,
        }));
        Layout(Arc::new(LayoutInner {
            kind: LayoutKind::Primitive(primitive),
            extent: width,
            size: width,
            element_count: 1,
            dense: true,
            predefined,
            state: RwLock::new(state),
        }))
    }

    fn derived(
        kind: LayoutKind,
        extent: usize,
        size: usize,
        element_count: usize,
        dense: bool,
    ) -> Layout {
        Layout(Arc::new(LayoutInner {
            kind,
            extent,
            size,
            element_count,
            dense,
            predefined: false,
            state: RwLock::new(State::Uncommitted),
        }))
    }

    /// Constructs a new layout by concatenating `count` repetitions of `element`
    ///
    /// # Errors
    /// `InvalidLayout` if `count` is negative, `UseAfterRelease` if `element` was released.
    pub fn contiguous(count: Count, element: &Layout) -> Result<Layout> {
        element.check_alive()?;
        let n = non_negative(count, "count")?;
        let extent = mul(n, element.extent())?;
        Ok(Layout::derived(
            LayoutKind::Contiguous {
                count,
                element: element.clone(),
            },
            extent,
            mul(n, element.size())?,
            mul(n, element.element_count())?,
            element.is_dense(),
        ))
    }

    /// Constructs a new layout out of `block_count` blocks of `block_length` instances of
    /// `element`, with the starts of consecutive blocks placed `stride` instances apart.
    ///
    /// A stride larger than the block length leaves gaps that are skipped during transfers. A
    /// stride smaller than the block length makes consecutive blocks overlap; this is allowed.
    ///
    /// # Errors
    /// `InvalidLayout` if any of the counts is negative, `UseAfterRelease` if `element` was
    /// released.
    pub fn vector(
        block_count: Count,
        block_length: Count,
        stride: Count,
        element: &Layout,
    ) -> Result<Layout> {
        element.check_alive()?;
        let blocks = non_negative(block_count, "block count")?;
        let length = non_negative(block_length, "block length")?;
        let step = non_negative(stride, "stride")?;

        if blocks > 1 && length > step {
            log::warn!(
                "vector layout with block length {} and stride {} has overlapping blocks",
                length,
                step
            );
        }

        let extent = if blocks == 0 || length == 0 {
            0
        } else {
            let span = mul(blocks - 1, step)?
                .checked_add(length)
                .ok_or_else(|| Error::invalid_layout("extent overflows"))?;
            mul(span, element.extent())?
        };
        let instances = mul(blocks, length)?;
        let dense = element.is_dense() && (blocks <= 1 || length == step);

        Ok(Layout::derived(
            LayoutKind::Vector {
                block_count,
                block_length,
                stride,
                element: element.clone(),
            },
            extent,
            mul(instances, element.size())?,
            mul(instances, element.element_count())?,
            dense,
        ))
    }

    /// Constructs a new layout out of fields given as byte offset and layout.
    ///
    /// Offsets need not be sorted; the fields are transferred in the order given here.
    ///
    /// # Examples
    /// See `demos/struct_send.rs`
    ///
    /// # Errors
    /// `InvalidLayout` if an offset is negative or two fields overlap, `UseAfterRelease` if a
    /// field layout was released.
    pub fn struct_of<I>(fields: I) -> Result<Layout>
    where
        I: IntoIterator<Item = (Address, Layout)>,
    {
        let fields: Vec<(Address, Layout)> = fields.into_iter().collect();

        let mut spans = Vec::with_capacity(fields.len());
        let mut size = 0usize;
        let mut element_count = 0usize;
        let mut dense = true;
        for (offset, layout) in &fields {
            layout.check_alive()?;
            let start: usize = (*offset).value_as().map_err(|_| {
                Error::invalid_layout(format!("field offset {} is negative", offset))
            })?;
            let end = start
                .checked_add(layout.extent())
                .ok_or_else(|| Error::invalid_layout("extent overflows"))?;
            if layout.extent() > 0 {
                spans.push((start, end));
            }
            size = size
                .checked_add(layout.size())
                .ok_or_else(|| Error::invalid_layout("size overflows"))?;
            element_count += layout.element_count();
            dense &= layout.is_dense();
        }

        spans.sort_unstable();
        for pair in spans.windows(2) {
            if pair[1].0 < pair[0].1 {
                return Err(Error::invalid_layout(format!(
                    "fields at bytes {}..{} and {}..{} overlap",
                    pair[0].0, pair[0].1, pair[1].0, pair[1].1
                )));
            }
        }
        let extent = spans.iter().map(|&(_, end)| end).max().unwrap_or(0);
        dense &= size == extent;

        Ok(Layout::derived(
            LayoutKind::Struct { fields },
            extent,
            size,
            element_count,
            dense,
        ))
    }

    /// Constructs a layout with the type map of `inner` and an extent of `extent` bytes.
    ///
    /// This is used to account for trailing padding, e.g. so that the extent of a struct layout
    /// equals `size_of` of the Rust struct it describes.
    ///
    /// # Errors
    /// `InvalidLayout` if `extent` is smaller than the extent of `inner`, `UseAfterRelease` if
    /// `inner` was released.
    pub fn resized(extent: usize, inner: &Layout) -> Result<Layout> {
        inner.check_alive()?;
        if extent < inner.extent() {
            return Err(Error::invalid_layout(format!(
                "extent {} is smaller than the extent {} of the resized layout",
                extent,
                inner.extent()
            )));
        }
        Ok(Layout::derived(
            LayoutKind::Resized {
                extent,
                inner: inner.clone(),
            },
            extent,
            inner.size(),
            inner.element_count(),
            inner.is_dense() && extent == inner.extent(),
        ))
    }

    /// Commits the layout so that it can be used for transfers and marshalling.
    ///
    /// Committing an already committed layout does nothing.
    ///
    /// # Errors
    /// `UseAfterRelease` if the layout was released.
    pub fn commit(&self) -> Result<()> {
        let mut state = self.state_mut();
        match *state {
            State::Committed(_) => Ok(()),
            State::Released => Err(Error::UseAfterRelease),
            State::Uncommitted => {
                let map = TypeMap::build(self);
                log::debug!(
                    "committed layout: extent {} bytes, {} bytes in {} segment(s)",
                    map.extent,
                    map.size,
                    map.segments.len()
                );
                *state = State::Committed(Arc::new(map));
                Ok(())
            }
        }
    }

    /// Releases the layout. Every further use of this handle (or its clones) fails with
    /// `UseAfterRelease`.
    ///
    /// # Errors
    /// `InvalidLayout` for the predefined layouts of primitive types, `UseAfterRelease` if the
    /// layout was already released.
    pub fn release(&self) -> Result<()> {
        if self.0.predefined {
            return Err(Error::invalid_layout("predefined layouts cannot be released"));
        }
        let mut state = self.state_mut();
        if let State::Released = *state {
            return Err(Error::UseAfterRelease);
        }
        *state = State::Released;
        Ok(())
    }

    /// Whether the layout is committed
    pub fn is_committed(&self) -> bool {
        matches!(*self.state(), State::Committed(_))
    }

    /// Whether the layout was released
    pub fn is_released(&self) -> bool {
        matches!(*self.state(), State::Released)
    }

    /// The shape of the layout
    pub fn kind(&self) -> &LayoutKind {
        &self.0.kind
    }

    /// Distance in bytes from the start of one instance to the start of the next
    pub fn extent(&self) -> usize {
        self.0.extent
    }

    /// Number of bytes one instance occupies once packed
    pub fn size(&self) -> usize {
        self.0.size
    }

    /// Number of primitives in one instance
    pub fn element_count(&self) -> usize {
        self.0.element_count
    }

    /// Whether one instance covers its whole extent without gaps
    pub fn is_dense(&self) -> bool {
        self.0.dense
    }

    /// The flattened sequence of primitives of one instance
    ///
    /// # Errors
    /// `NotCommitted` or `UseAfterRelease`.
    pub fn signature(&self) -> Result<Signature> {
        Ok(self.type_map()?.signature.clone())
    }

    /// Whether `self` and `other` flatten to the same sequence of primitives
    pub fn matches_signature(&self, other: &Layout) -> Result<bool> {
        Ok(self.type_map()?.signature == other.type_map()?.signature)
    }

    pub(crate) fn type_map(&self) -> Result<Arc<TypeMap>> {
        match *self.state() {
            State::Committed(ref map) => Ok(Arc::clone(map)),
            State::Uncommitted => Err(Error::NotCommitted),
            State::Released => Err(Error::UseAfterRelease),
        }
    }

    fn check_alive(&self) -> Result<()> {
        if self.is_released() {
            Err(Error::UseAfterRelease)
        } else {
            Ok(())
        }
    }

    fn state(&self) -> RwLockReadGuard<'_, State> {
        self.0.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, State> {
        self.0.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn non_negative(value: Count, what: &str) -> Result<usize> {
    value
        .value_as()
        .map_err(|_| Error::invalid_layout(format!("{} {} is negative", what, value)))
}

fn mul(a: usize, b: usize) -> Result<usize> {
    a.checked_mul(b)
        .ok_or_else(|| Error::invalid_layout("extent overflows"))
}

/// A contiguous run of bytes within one instance of a layout
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Segment {
    pub(crate) offset: usize,
    pub(crate) len: usize,
}

/// The flattened form of a committed layout
#[derive(Debug)]
pub(crate) struct TypeMap {
    /// Byte runs in transfer order, adjacent runs merged
    pub(crate) segments: Vec<Segment>,
    pub(crate) signature: Signature,
    pub(crate) extent: usize,
    pub(crate) size: usize,
    /// One past the last byte touched by an instance
    pub(crate) upper_bound: usize,
}

impl TypeMap {
    fn build(layout: &Layout) -> TypeMap {
        let mut map = TypeMap {
            segments: Vec::new(),
            signature: Signature::new(),
            extent: layout.extent(),
            size: layout.size(),
            upper_bound: 0,
        };
        map.flatten(layout, 0);
        map
    }

    fn flatten(&mut self, layout: &Layout, base: usize) {
        match layout.kind() {
            LayoutKind::Primitive(primitive) => self.push(*primitive, base),
            LayoutKind::Contiguous { count, element } => {
                for i in 0..*count as usize {
                    self.flatten(element, base + i * element.extent());
                }
            }
            LayoutKind::Vector {
                block_count,
                block_length,
                stride,
                element,
            } => {
                for block in 0..*block_count as usize {
                    let start = block * *stride as usize;
                    for i in 0..*block_length as usize {
                        self.flatten(element, base + (start + i) * element.extent());
                    }
                }
            }
            LayoutKind::Struct { fields } => {
                for (offset, field) in fields {
                    self.flatten(field, base + *offset as usize);
                }
            }
            LayoutKind::Resized { inner, .. } => self.flatten(inner, base),
        }
    }

    fn push(&mut self, primitive: Primitive, offset: usize) {
        let len = primitive.width();
        match self.segments.last_mut() {
            Some(last) if last.offset + last.len == offset => last.len += len,
            _ => self.segments.push(Segment { offset, len }),
        }
        match self.signature.last_mut() {
            Some((last, n)) if *last == primitive => *n += 1,
            _ => self.signature.push((primitive, 1)),
        }
        self.upper_bound = self.upper_bound.max(offset + len);
    }

    /// Number of bytes of memory that `count` instances touch
    pub(crate) fn span(&self, count: usize) -> Option<usize> {
        if count == 0 {
            Some(0)
        } else {
            (count - 1)
                .checked_mul(self.extent)?
                .checked_add(self.upper_bound)
        }
    }
}

/// A direct equivalence exists between the implementing type and a layout
///
/// # Safety
///
/// The equivalent layout must describe the memory of `Self` exactly: its extent equals
/// `size_of::<Self>()`, every primitive of its type map lies within the value and holds a scalar
/// of the described kind, and every bit pattern at those positions (all zeros included) is a
/// valid value of `Self`. Bytes not covered by the type map are never read or written.
pub unsafe trait Equivalence {
    /// The layout that is equivalent to this Rust type
    fn equivalent_layout() -> Layout;
}

macro_rules! equivalent_primitive {
    ($rstype:ty, $primitive:expr) => {
        unsafe impl Equivalence for $rstype {
            fn equivalent_layout() -> Layout {
                static LAYOUT: Lazy<Layout> = Lazy::new(|| Layout::predefined($primitive));
                LAYOUT.clone()
            }
        }
    };
}

equivalent_primitive!(f32, Primitive::Float32);
equivalent_primitive!(f64, Primitive::Float64);

equivalent_primitive!(i8, Primitive::Int8);
equivalent_primitive!(i16, Primitive::Int16);
equivalent_primitive!(i32, Primitive::Int32);
equivalent_primitive!(i64, Primitive::Int64);

equivalent_primitive!(u8, Primitive::UInt8);
equivalent_primitive!(u16, Primitive::UInt16);
equivalent_primitive!(u32, Primitive::UInt32);
equivalent_primitive!(u64, Primitive::UInt64);

#[cfg(target_pointer_width = "32")]
equivalent_primitive!(usize, Primitive::UInt32);
#[cfg(target_pointer_width = "32")]
equivalent_primitive!(isize, Primitive::Int32);

#[cfg(target_pointer_width = "64")]
equivalent_primitive!(usize, Primitive::UInt64);
#[cfg(target_pointer_width = "64")]
equivalent_primitive!(isize, Primitive::Int64);

#[cfg(feature = "complex")]
macro_rules! equivalent_complex {
    ($scalar:ty) => {
        unsafe impl Equivalence for num_complex::Complex<$scalar> {
            fn equivalent_layout() -> Layout {
                static LAYOUT: Lazy<Layout> = Lazy::new(|| {
                    let layout = Layout::contiguous(2, &<$scalar>::equivalent_layout())
                        .expect("two consecutive scalars form a valid layout");
                    layout
                        .commit()
                        .expect("a freshly constructed layout can be committed");
                    layout
                });
                LAYOUT.clone()
            }
        }
    };
}

#[cfg(feature = "complex")]
equivalent_complex!(f32);
#[cfg(feature = "complex")]
equivalent_complex!(f64);

/// Something that has an associated layout
pub unsafe trait AsLayout {
    /// The associated layout
    fn as_layout(&self) -> Layout;
}

unsafe impl<T> AsLayout for T
where
    T: Equivalence,
{
    fn as_layout(&self) -> Layout {
        <T as Equivalence>::equivalent_layout()
    }
}

unsafe impl<T> AsLayout for [T]
where
    T: Equivalence,
{
    fn as_layout(&self) -> Layout {
        <T as Equivalence>::equivalent_layout()
    }
}

unsafe impl<T> AsLayout for Vec<T>
where
    T: Equivalence,
{
    fn as_layout(&self) -> Layout {
        <T as Equivalence>::equivalent_layout()
    }
}

/// A countable collection of things.
pub unsafe trait Collection {
    /// How many things are in this collection.
    fn count(&self) -> Count;
}

fn check_length(len: usize) -> Count {
    len.value_as()
        .expect("Length of buffer cannot be expressed as a Count.")
}

unsafe impl<T> Collection for T
where
    T: Equivalence,
{
    fn count(&self) -> Count {
        1
    }
}

unsafe impl<T> Collection for [T]
where
    T: Equivalence,
{
    fn count(&self) -> Count {
        check_length(self.len())
    }
}

unsafe impl<T> Collection for Vec<T>
where
    T: Equivalence,
{
    fn count(&self) -> Count {
        check_length(self.len())
    }
}

/// Provides a pointer to the starting address in memory and the size of the addressable region.
pub unsafe trait Pointer {
    /// A pointer to the starting address in memory
    fn pointer(&self) -> *const u8;
    /// Number of bytes that may be accessed starting at `pointer()`
    fn memory_len(&self) -> usize;
}

unsafe impl<T> Pointer for T
where
    T: Equivalence,
{
    fn pointer(&self) -> *const u8 {
        let p: *const T = self;
        p.cast()
    }

    fn memory_len(&self) -> usize {
        mem::size_of::<T>()
    }
}

unsafe impl<T> Pointer for [T]
where
    T: Equivalence,
{
    fn pointer(&self) -> *const u8 {
        self.as_ptr().cast()
    }

    fn memory_len(&self) -> usize {
        mem::size_of_val(self)
    }
}

unsafe impl<T> Pointer for Vec<T>
where
    T: Equivalence,
{
    fn pointer(&self) -> *const u8 {
        self.as_ptr().cast()
    }

    fn memory_len(&self) -> usize {
        mem::size_of_val(&self[..])
    }
}

/// Provides a mutable pointer to the starting address in memory.
pub unsafe trait PointerMut: Pointer {
    /// A mutable pointer to the starting address in memory
    fn pointer_mut(&mut self) -> *mut u8;
}

unsafe impl<T> PointerMut for T
where
    T: Equivalence,
{
    fn pointer_mut(&mut self) -> *mut u8 {
        let p: *mut T = self;
        p.cast()
    }
}

unsafe impl<T> PointerMut for [T]
where
    T: Equivalence,
{
    fn pointer_mut(&mut self) -> *mut u8 {
        self.as_mut_ptr().cast()
    }
}

unsafe impl<T> PointerMut for Vec<T>
where
    T: Equivalence,
{
    fn pointer_mut(&mut self) -> *mut u8 {
        self.as_mut_ptr().cast()
    }
}

/// A buffer is a region in memory that starts at `pointer()` and contains `count()` copies of
/// `as_layout()`.
///
/// Marked as `unsafe` because an incorrect implementation can cause memory errors.
pub unsafe trait Buffer: Pointer + Collection + AsLayout {}
unsafe impl<T> Buffer for T where T: Equivalence {}
unsafe impl<T> Buffer for [T] where T: Equivalence {}
unsafe impl<T> Buffer for Vec<T> where T: Equivalence {}

/// A mutable buffer is a region in memory that starts at `pointer_mut()` and contains `count()`
/// copies of `as_layout()`.
///
/// Marked as `unsafe` because an incorrect implementation can cause memory errors.
pub unsafe trait BufferMut: PointerMut + Collection + AsLayout {}
unsafe impl<T> BufferMut for T where T: Equivalence {}
unsafe impl<T> BufferMut for [T] where T: Equivalence {}
unsafe impl<T> BufferMut for Vec<T> where T: Equivalence {}

fn check_viewable<B: Buffer + ?Sized>(buffer: &B) -> Result<()> {
    if buffer.as_layout().is_dense() {
        Ok(())
    } else {
        Err(Error::invalid_layout(
            "a view requires a buffer whose layout has no gaps",
        ))
    }
}

/// A buffer with a user specified count and layout
///
/// Transfers through a view still check that `count` instances of the layout fit into the
/// memory of the underlying buffer.
pub struct View<'b, B: ?Sized> {
    layout: Layout,
    count: Count,
    buffer: &'b B,
}

impl<'b, B: ?Sized> View<'b, B>
where
    B: Buffer,
{
    /// Return a view of `buffer` containing `count` instances of `layout`.
    ///
    /// # Examples
    /// See `demos/vector_rows.rs`
    ///
    /// # Errors
    /// `InvalidLayout` if the layout of `buffer` has gaps (e.g. padding inside a struct), since
    /// an arbitrary layout could then read bytes that are not initialized.
    pub fn with_count_and_layout(buffer: &'b B, count: Count, layout: &Layout) -> Result<Self> {
        check_viewable(buffer)?;
        Ok(View {
            layout: layout.clone(),
            count,
            buffer,
        })
    }

    /// Return a view of `buffer` containing `count` instances of `layout` without checking the
    /// layout of `buffer`.
    ///
    /// # Safety
    /// Every byte that `layout` touches must be initialized memory of `buffer`.
    pub unsafe fn with_count_and_layout_unchecked(
        buffer: &'b B,
        count: Count,
        layout: &Layout,
    ) -> Self {
        View {
            layout: layout.clone(),
            count,
            buffer,
        }
    }
}

unsafe impl<'b, B: ?Sized> AsLayout for View<'b, B> {
    fn as_layout(&self) -> Layout {
        self.layout.clone()
    }
}

unsafe impl<'b, B: ?Sized> Collection for View<'b, B> {
    fn count(&self) -> Count {
        self.count
    }
}

unsafe impl<'b, B: ?Sized> Pointer for View<'b, B>
where
    B: Pointer,
{
    fn pointer(&self) -> *const u8 {
        self.buffer.pointer()
    }

    fn memory_len(&self) -> usize {
        self.buffer.memory_len()
    }
}

unsafe impl<'b, B: ?Sized> Buffer for View<'b, B> where B: Pointer {}

/// A mutable buffer with a user specified count and layout
pub struct MutView<'b, B: ?Sized> {
    layout: Layout,
    count: Count,
    buffer: &'b mut B,
}

impl<'b, B: ?Sized> MutView<'b, B>
where
    B: BufferMut + Buffer,
{
    /// Return a mutable view of `buffer` containing `count` instances of `layout`.
    ///
    /// # Errors
    /// `InvalidLayout` if the layout of `buffer` has gaps.
    pub fn with_count_and_layout(
        buffer: &'b mut B,
        count: Count,
        layout: &Layout,
    ) -> Result<Self> {
        check_viewable(&*buffer)?;
        Ok(MutView {
            layout: layout.clone(),
            count,
            buffer,
        })
    }

    /// Return a mutable view of `buffer` containing `count` instances of `layout` without
    /// checking the layout of `buffer`.
    ///
    /// # Safety
    /// Every byte that `layout` touches must be memory of `buffer` that may hold any bit
    /// pattern.
    pub unsafe fn with_count_and_layout_unchecked(
        buffer: &'b mut B,
        count: Count,
        layout: &Layout,
    ) -> Self {
        MutView {
            layout: layout.clone(),
            count,
            buffer,
        }
    }
}

unsafe impl<'b, B: ?Sized> AsLayout for MutView<'b, B> {
    fn as_layout(&self) -> Layout {
        self.layout.clone()
    }
}

unsafe impl<'b, B: ?Sized> Collection for MutView<'b, B> {
    fn count(&self) -> Count {
        self.count
    }
}

unsafe impl<'b, B: ?Sized> Pointer for MutView<'b, B>
where
    B: Pointer,
{
    fn pointer(&self) -> *const u8 {
        self.buffer.pointer()
    }

    fn memory_len(&self) -> usize {
        self.buffer.memory_len()
    }
}

unsafe impl<'b, B: ?Sized> PointerMut for MutView<'b, B>
where
    B: PointerMut,
{
    fn pointer_mut(&mut self) -> *mut u8 {
        self.buffer.pointer_mut()
    }
}

unsafe impl<'b, B: ?Sized> BufferMut for MutView<'b, B> where B: PointerMut {}
