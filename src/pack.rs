//! Explicit packing into flat byte buffers
//!
//! `PackBuffer::pack` serializes the contents of a buffer according to its layout into a
//! caller-sized byte region, gaps in the layout are skipped and struct fields are written in the
//! order they were described in. `PackBuffer::unpack` scatters packed bytes back into memory
//! according to the layout of the destination. Source and destination layouts only have to
//! agree in their flattened sequence of primitives.
//!
//! Both calls check everything before touching memory: on error the cursor does not move and no
//! byte is written.
//!
//! # Examples
//! See `demos/pack_rows.rs`

use std::ptr;
use std::sync::Arc;

use conv::ConvUtil;

use crate::datatype::traits::*;
use crate::datatype::{Layout, TypeMap};
use crate::error::{Error, Result};
use crate::Count;

/// A fixed-capacity byte region with a cursor
///
/// The region never grows; a `pack` or `unpack` that would run past the end fails with
/// `BufferOverrun`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackBuffer {
    bytes: Vec<u8>,
    position: usize,
}

impl PackBuffer {
    /// A zeroed region of `capacity` bytes with the cursor at the start
    pub fn with_capacity(capacity: usize) -> Self {
        PackBuffer {
            bytes: vec![0; capacity],
            position: 0,
        }
    }

    /// Wrap previously packed bytes, e.g. a received message, for unpacking
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        PackBuffer { bytes, position: 0 }
    }

    /// Size of the region in bytes
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Offset of the cursor from the start of the region
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes between the cursor and the end of the region
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    /// Move the cursor.
    ///
    /// # Errors
    /// `BufferOverrun` if `position` lies beyond the end of the region.
    pub fn set_position(&mut self, position: usize) -> Result<()> {
        if position > self.bytes.len() {
            return Err(Error::BufferOverrun {
                needed: position,
                position: 0,
                available: self.bytes.len(),
            });
        }
        self.position = position;
        Ok(())
    }

    /// Move the cursor back to the start
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// The bytes in front of the cursor, i.e. everything packed so far
    pub fn as_packed(&self) -> &[u8] {
        &self.bytes[..self.position]
    }

    /// The whole region
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Give up the region
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    /// Serialize the contents of `buffer` at the cursor and advance the cursor.
    ///
    /// # Errors
    /// - `NotCommitted`, `UseAfterRelease` for an unusable layout
    /// - `ExtentMismatch` if the instances do not fit into the memory of `buffer`
    /// - `BufferOverrun` if the packed bytes do not fit in front of the cursor
    pub fn pack<B>(&mut self, buffer: &B) -> Result<()>
    where
        B: Buffer + ?Sized,
    {
        let plan = Plan::new(buffer)?;
        let available = self.remaining();
        if plan.packed > available {
            return Err(Error::BufferOverrun {
                needed: plan.packed,
                position: self.position,
                available,
            });
        }
        let out = &mut self.bytes[self.position..self.position + plan.packed];
        // the plan checked that every instance lies within the buffer's memory
        unsafe { plan.gather(buffer.pointer(), out) };
        log::trace!(
            "packed {} bytes at position {}",
            plan.packed,
            self.position
        );
        self.position += plan.packed;
        Ok(())
    }

    /// Scatter bytes starting at the cursor into `buffer` and advance the cursor.
    ///
    /// # Errors
    /// - `NotCommitted`, `UseAfterRelease` for an unusable layout
    /// - `ExtentMismatch` if the instances do not fit into the memory of `buffer`
    /// - `BufferOverrun` if fewer bytes than needed lie behind the cursor
    pub fn unpack<B>(&mut self, buffer: &mut B) -> Result<()>
    where
        B: BufferMut + ?Sized,
    {
        let plan = Plan::new(&*buffer)?;
        let available = self.remaining();
        if plan.packed > available {
            return Err(Error::BufferOverrun {
                needed: plan.packed,
                position: self.position,
                available,
            });
        }
        let input = &self.bytes[self.position..self.position + plan.packed];
        // the plan checked that every instance lies within the buffer's memory
        unsafe { plan.scatter(input, buffer.pointer_mut()) };
        log::trace!(
            "unpacked {} bytes at position {}",
            plan.packed,
            self.position
        );
        self.position += plan.packed;
        Ok(())
    }
}

/// Number of bytes that packing `count` instances of `layout` occupies
///
/// # Errors
/// `NotCommitted`, `UseAfterRelease` for an unusable layout, `ExtentMismatch` for a negative or
/// overflowing count.
pub fn packed_size(layout: &Layout, count: Count) -> Result<usize> {
    let map = layout.type_map()?;
    let mismatch = || Error::ExtentMismatch {
        count,
        extent: map.extent,
        len: 0,
    };
    let n: usize = count.value_as().map_err(|_| mismatch())?;
    n.checked_mul(map.size).ok_or_else(mismatch)
}

/// Serialize the contents of `buffer` into a new byte vector
pub(crate) fn gather<B>(buffer: &B) -> Result<Vec<u8>>
where
    B: Buffer + ?Sized,
{
    let plan = Plan::new(buffer)?;
    let mut out = vec![0; plan.packed];
    unsafe { plan.gather(buffer.pointer(), &mut out) };
    Ok(out)
}

/// Scatter `bytes` into the start of `buffer`, returns the number of bytes written
///
/// A message shorter than the buffer fills a prefix of it. A longer message fails with
/// `Truncated` before anything is written.
pub(crate) fn scatter<B>(buffer: &mut B, bytes: &[u8]) -> Result<usize>
where
    B: BufferMut + ?Sized,
{
    let plan = Plan::new(&*buffer)?;
    if bytes.len() > plan.packed {
        return Err(Error::Truncated {
            received: bytes.len(),
            capacity: plan.packed,
        });
    }
    unsafe { plan.scatter(bytes, buffer.pointer_mut()) };
    Ok(bytes.len())
}

/// A validated transfer of `count` instances of a committed type map
struct Plan {
    map: Arc<TypeMap>,
    count: usize,
    packed: usize,
}

impl Plan {
    fn new<B>(buffer: &B) -> Result<Plan>
    where
        B: Pointer + Collection + AsLayout + ?Sized,
    {
        let map = buffer.as_layout().type_map()?;
        let count = buffer.count();
        let len = buffer.memory_len();
        let mismatch = || Error::ExtentMismatch {
            count,
            extent: map.extent,
            len,
        };
        let n: usize = count.value_as().map_err(|_| mismatch())?;
        let span = map.span(n).ok_or_else(mismatch)?;
        if span > len {
            return Err(mismatch());
        }
        let packed = n.checked_mul(map.size).ok_or_else(mismatch)?;
        Ok(Plan {
            map,
            count: n,
            packed,
        })
    }

    /// # Safety
    /// `src` must be valid for reads of `map.span(count)` bytes.
    unsafe fn gather(&self, src: *const u8, out: &mut [u8]) {
        let mut at = 0;
        for instance in 0..self.count {
            let base = instance * self.map.extent;
            for segment in &self.map.segments {
                ptr::copy_nonoverlapping(
                    src.add(base + segment.offset),
                    out.as_mut_ptr().add(at),
                    segment.len,
                );
                at += segment.len;
            }
        }
    }

    /// Writes at most `input.len()` bytes.
    ///
    /// # Safety
    /// `dst` must be valid for writes of `map.span(count)` bytes.
    unsafe fn scatter(&self, input: &[u8], dst: *mut u8) {
        let mut at = 0;
        for instance in 0..self.count {
            let base = instance * self.map.extent;
            for segment in &self.map.segments {
                let len = segment.len.min(input.len() - at);
                if len == 0 {
                    return;
                }
                ptr::copy_nonoverlapping(
                    input.as_ptr().add(at),
                    dst.add(base + segment.offset),
                    len,
                );
                at += len;
            }
        }
    }
}
