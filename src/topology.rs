//! Organizing ranks as groups and communicators
//!
//! All ranks partaking in a computation are organized in a fixed-size group. Each rank talks to
//! the others through its own `Communicator`, created together with the others by `Universe`.
//! Ranks can be addressed via their `Rank` within the communicator. This information is
//! encapsulated in a `Process`; `AnyProcess` stands for whichever rank a message arrives from.

use std::cell::RefCell;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::progress::Engine;
use crate::transport::Transport;

/// Topology traits
pub mod traits {
    pub use super::AsCommunicator;
}

/// Identifies a certain rank within a communicator.
pub type Rank = i32;

/// Something that has a communicator associated with it for the lifetime `'a`
pub trait AsCommunicator<'a> {
    /// Returns the associated communicator.
    fn as_communicator(&self) -> &'a Communicator;
}

/// A fixed-size ordered set of ranks `0..size`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Group {
    size: Rank,
}

impl Group {
    pub(crate) fn new(size: Rank) -> Self {
        Group { size }
    }

    /// Number of ranks in the group
    pub fn size(&self) -> Rank {
        self.size
    }

    /// Whether `rank` is a member of the group
    pub fn contains(&self, rank: Rank) -> bool {
        0 <= rank && rank < self.size
    }

    /// The members in rank order
    pub fn ranks(&self) -> Range<Rank> {
        0..self.size
    }

    pub(crate) fn check(&self, rank: Rank) -> Result<Rank> {
        if self.contains(rank) {
            Ok(rank)
        } else {
            Err(Error::InvalidRank {
                rank,
                size: self.size,
            })
        }
    }
}

/// The view of one rank onto its group
///
/// A communicator can be moved to another thread but not shared between threads: it is the
/// single thread of control of its rank. Non-blocking operations borrow it until they complete.
///
/// Dropping a communicator hands all staged messages to the transport and then leaves the
/// group. Peers that communicate with a rank after it left observe `ChannelClosed`.
pub struct Communicator {
    rank: Rank,
    group: Group,
    transport: Arc<dyn Transport>,
    pub(crate) engine: RefCell<Engine>,
}

impl Communicator {
    pub(crate) fn new(
        rank: Rank,
        size: Rank,
        transport: Arc<dyn Transport>,
        config: Config,
    ) -> Self {
        Communicator {
            rank,
            group: Group::new(size),
            engine: RefCell::new(Engine::new(rank, Arc::clone(&transport), config)),
            transport,
        }
    }

    /// Number of ranks in this communicator
    ///
    /// # Examples
    /// See `demos/immediate_ring.rs`
    pub fn size(&self) -> Rank {
        self.group.size()
    }

    /// The `Rank` that identifies the calling rank within this communicator
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// The group of this communicator
    pub fn group(&self) -> Group {
        self.group
    }

    /// The configuration this communicator was created with
    pub fn config(&self) -> Config {
        self.engine.borrow().config().clone()
    }

    /// Bundles a reference to this communicator with a specific `Rank` into a `Process`.
    ///
    /// # Errors
    /// `InvalidRank` if `r` is not a member of the group.
    ///
    /// # Examples
    /// See `demos/vector_rows.rs` `demos/struct_send.rs`
    pub fn process_at_rank(&self, r: Rank) -> Result<Process<'_>> {
        let rank = self.group.check(r)?;
        Ok(Process { comm: self, rank })
    }

    /// Returns an `AnyProcess` identifier that can be used, e.g. as a `Source` in point to point
    /// communication.
    pub fn any_process(&self) -> AnyProcess<'_> {
        AnyProcess(self)
    }

    /// A `Process` for the calling rank
    pub fn this_process(&self) -> Process<'_> {
        Process {
            comm: self,
            rank: self.rank,
        }
    }

    /// Capacity in bytes of the staging area that holds buffered sends
    pub fn buffer_size(&self) -> usize {
        self.engine.borrow().buffer_size()
    }

    /// Change the capacity of the staging area.
    ///
    /// Messages that are already staged stay staged; until enough of them are handed to the
    /// transport, buffered sends fail with `ResourceExhausted`.
    pub fn set_buffer_size(&self, bytes: usize) {
        self.engine.borrow_mut().set_buffer_size(bytes);
    }

    /// Bytes currently held by the staging area
    pub fn staged_bytes(&self) -> usize {
        self.engine.borrow().staged_bytes()
    }
}

impl fmt::Debug for Communicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Communicator")
            .field("rank", &self.rank)
            .field("size", &self.group.size())
            .finish()
    }
}

impl Drop for Communicator {
    fn drop(&mut self) {
        self.engine.get_mut().flush_all();
        self.transport.close(self.rank);
    }
}

/// Identifies a rank by its `Rank` within a certain communicator.
#[derive(Copy, Clone)]
pub struct Process<'a> {
    comm: &'a Communicator,
    rank: Rank,
}

impl<'a> Process<'a> {
    /// The rank
    pub fn rank(&self) -> Rank {
        self.rank
    }
}

impl<'a> fmt::Debug for Process<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Process").field(&self.rank).finish()
    }
}

impl<'a> AsCommunicator<'a> for Process<'a> {
    fn as_communicator(&self) -> &'a Communicator {
        self.comm
    }
}

/// Identifies an arbitrary rank that is a member of a certain communicator, e.g. for use as a
/// `Source` in point to point communication.
#[derive(Copy, Clone)]
pub struct AnyProcess<'a>(&'a Communicator);

impl<'a> fmt::Debug for AnyProcess<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AnyProcess")
    }
}

impl<'a> AsCommunicator<'a> for AnyProcess<'a> {
    fn as_communicator(&self) -> &'a Communicator {
        self.0
    }
}
