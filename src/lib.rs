#![deny(missing_docs)]
#![warn(missing_copy_implementations)]
#![warn(trivial_casts)]
#![warn(trivial_numeric_casts)]
#![warn(unused_extern_crates)]
#![warn(unused_import_braces)]
#![warn(unused_qualifications)]

//! Point-to-point message passing for Rust
//!
//! This crate provides the message-passing substrate that programs written in the style of the
//! [Message Passing Interface][MPI] are built on: a fixed-size group of *ranks* that exchange
//! typed data through blocking and non-blocking point-to-point operations, together with a layer
//! for describing non-contiguous memory (strided rows of a matrix, structs with padding) and for
//! explicitly packing such memory into a flat byte buffer.
//!
//! [MPI]: http://www.mpi-forum.org
//!
//! # Usage
//!
//! Add the `rsmp` crate as a dependency in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! rsmp = "0.1.0"
//! ```
//!
//! Then use it in your program like this:
//!
//! ```no_run
//! use rsmp::traits::*;
//!
//! let results = rsmp::Universe::run(2, rsmp::Config::default(), |world| -> rsmp::Result<_> {
//!     let rank = world.rank();
//!     match rank {
//!         0 => {
//!             let msg = vec![4.0f64, 8.0, 15.0];
//!             world.process_at_rank(1)?.send(&msg[..])?;
//!             Ok(None)
//!         }
//!         1 => {
//!             let (msg, status) = world.any_process().receive_vec::<f64>()?;
//!             println!("Process {} got message {:?}.\nStatus is: {:?}", rank, msg, status);
//!             Ok(Some(msg))
//!         }
//!         _ => unreachable!(),
//!     }
//! })
//! .unwrap();
//! assert_eq!(results[1], Ok(Some(vec![4.0, 8.0, 15.0])));
//! # Ok::<(), rsmp::Error>(())
//! ```
//!
//! # Features
//!
//! - **Groups and communicators**: a fixed-size group per communicator, ranks addressed through
//!   `Process` and `AnyProcess` handles.
//! - **Point to point communication**:
//!   - standard, buffered and synchronous mode send in blocking variants
//!   - standard and synchronous mode send in non-blocking variants
//!   - receive in blocking and non-blocking variants, with wildcard source and tag
//!   - send-receive-replace
//!   - probe
//! - **Datatypes**: primitive, contiguous, vector, struct and resized layouts with an explicit
//!   commit/release lifecycle, views of slices through user layouts, `#[derive(Equivalence)]`
//!   behind the `derive` feature.
//! - **Pack and unpack** into caller-sized byte buffers.
//!
//! Not supported:
//!
//! - Collective operations
//! - Cancellation of pending requests
//! - Process management and physical transports; the crate talks to the outside world through
//!   the `Transport` trait and ships an in-process transport for simulated ranks

pub mod config;
pub mod datatype;
pub mod environment;
pub mod error;
pub mod pack;
pub mod point_to_point;
mod progress;
pub mod request;
pub mod topology;
pub mod transport;

#[cfg(feature = "derive")]
pub use rsmp_derive::Equivalence;

pub use crate::config::Config;
pub use crate::environment::Universe;
pub use crate::error::{Error, Result};

/// Re-exports used by code generated by `#[derive(Equivalence)]`
#[doc(hidden)]
pub mod export {
    #[cfg(feature = "derive")]
    pub use memoffset;
    pub use once_cell::sync::Lazy;
}

/// Re-exports all traits.
pub mod traits {
    pub use crate::datatype::traits::*;
    pub use crate::point_to_point::traits::*;
    pub use crate::topology::traits::*;
    pub use crate::transport::Transport;
}

/// Encodes number of values in multi-value messages.
pub type Count = i32;
/// Can be used to tag messages on the sender side and match on the receiver side.
///
/// User tags are non-negative; negative values are reserved for protocol traffic.
pub type Tag = i32;
/// A byte displacement relative to the start of a described object
pub type Address = isize;
