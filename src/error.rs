//! Error handling
//!
//! Every fallible operation in this crate returns [`Result`]. All errors are local and
//! synchronous: an operation either completes or fails immediately with one of the kinds below
//! and leaves no partial effect behind. A deadlocked communication topology (e.g. two ranks
//! issuing synchronous sends to each other before either posts a receive) is *not* an error that
//! is detected; the affected calls simply never return.

use thiserror::Error;

use crate::topology::Rank;
use crate::{Count, Tag};

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Set of errors that can be returned by layout, marshalling and communication operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A layout constructor was given arguments that do not describe a valid memory layout
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
    /// The layout has to be committed before it can describe a transfer
    #[error("layout has not been committed")]
    NotCommitted,
    /// The layout was released and must not be used anymore
    #[error("layout was used after it was released")]
    UseAfterRelease,
    /// Packing or unpacking would run past the end of the pack buffer
    #[error("buffer overrun: {needed} bytes needed at position {position}, {available} available")]
    BufferOverrun {
        /// Bytes that the operation needs
        needed: usize,
        /// Cursor position at the time of the call
        position: usize,
        /// Bytes available from the cursor
        available: usize,
    },
    /// The element count is not addressable in the memory described by the buffer
    #[error("extent mismatch: {count} element(s) of extent {extent} do not fit into {len} bytes")]
    ExtentMismatch {
        /// Requested number of layout instances
        count: Count,
        /// Extent of one layout instance in bytes
        extent: usize,
        /// Size of the addressed memory in bytes
        len: usize,
    },
    /// The staging area used for buffered sends has no room for the message
    #[error("staging area exhausted: {requested} bytes requested, {available} free")]
    ResourceExhausted {
        /// Size of the staged message in bytes
        requested: usize,
        /// Free bytes in the staging area
        available: usize,
    },
    /// The request was already observed as complete
    #[error("request {0} was already consumed")]
    StaleRequest(u64),
    /// The peer can no longer be reached through the transport
    #[error("channel to rank {0} is closed")]
    ChannelClosed(Rank),
    /// The rank lies outside of the group
    #[error("rank {rank} is not a member of a group of size {size}")]
    InvalidRank {
        /// The offending rank
        rank: Rank,
        /// Size of the group
        size: Rank,
    },
    /// Negative tags are reserved for protocol traffic
    #[error("tag {0} is reserved")]
    InvalidTag(Tag),
    /// An incoming message was larger than the receive buffer
    #[error("message of {received} bytes truncated to a receive buffer of {capacity} bytes")]
    Truncated {
        /// Length of the incoming message in bytes
        received: usize,
        /// Size of the receive buffer in bytes
        capacity: usize,
    },
    /// A configuration value could not be parsed or is out of range
    #[error("invalid configuration for {key}: {reason}")]
    InvalidConfig {
        /// Name of the configuration key
        key: &'static str,
        /// What is wrong with the value
        reason: String,
    },
}

impl Error {
    pub(crate) fn invalid_layout(reason: impl Into<String>) -> Self {
        Error::InvalidLayout(reason.into())
    }
}
