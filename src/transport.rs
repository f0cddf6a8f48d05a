//! Moving envelopes between ranks
//!
//! The operation engine only relies on the `Transport` trait: a reliable channel that delivers
//! the envelopes of every (sender, receiver, tag) triple in the order they were sent. The
//! in-process `LocalTransport` implements it with one mailbox per rank and is what `Universe`
//! builds.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use conv::ConvUtil;

use crate::error::{Error, Result};
use crate::topology::Rank;
use crate::Tag;

/// Tag of protocol control traffic. Never matched by a wildcard receive.
pub const CONTROL_TAG: Tag = -1;

/// How the receiver has to treat an envelope
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Protocol {
    /// Complete on delivery
    Eager,
    /// The sender waits for an `Acknowledge` carrying the same sequence number
    Synchronous {
        /// Sender-local sequence number
        sequence: u64,
    },
    /// The receiver matched the synchronous send `sequence`
    Acknowledge {
        /// Sequence number of the acknowledged send
        sequence: u64,
    },
}

/// A message in flight
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Rank of the sender
    pub source: Rank,
    /// Tag the message was sent with
    pub tag: Tag,
    /// Delivery protocol
    pub protocol: Protocol,
    /// Packed message contents
    pub payload: Vec<u8>,
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("source", &self.source)
            .field("tag", &self.tag)
            .field("protocol", &self.protocol)
            .field("len", &self.payload.len())
            .finish()
    }
}

impl Envelope {
    fn matches(&self, source: Option<Rank>, tag: Option<Tag>) -> bool {
        source.map_or(true, |s| s == self.source)
            && match tag {
                Some(t) => t == self.tag,
                None => self.tag >= 0,
            }
    }
}

/// What a probe reveals about a pending message
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Peeked {
    /// Rank of the sender
    pub source: Rank,
    /// Tag the message was sent with
    pub tag: Tag,
    /// Length of the payload in bytes
    pub len: usize,
}

/// A reliable, per-channel ordered link between the ranks of a group
///
/// `source` and `tag` arguments of `None` are wildcards. A wildcard tag only matches
/// non-negative tags.
pub trait Transport: Send + Sync {
    /// Deliver `envelope` to the mailbox of `destination`
    fn send(&self, destination: Rank, envelope: Envelope) -> Result<()>;

    /// Whether `destination` currently accepts `len` more bytes
    fn has_capacity(&self, _destination: Rank, _len: usize) -> bool {
        true
    }

    /// Remove the earliest arrived envelope addressed to `receiver` that matches
    fn try_receive(
        &self,
        receiver: Rank,
        source: Option<Rank>,
        tag: Option<Tag>,
    ) -> Result<Option<Envelope>>;

    /// Inspect the earliest arrived envelope addressed to `receiver` that matches
    fn peek(&self, receiver: Rank, source: Option<Rank>, tag: Option<Tag>)
        -> Result<Option<Peeked>>;

    /// Suspend `receiver` until something arrives for it or `timeout` passes
    fn park(&self, receiver: Rank, timeout: Duration);

    /// Whether `rank` still takes part in communication
    fn is_open(&self, _rank: Rank) -> bool {
        true
    }

    /// `rank` leaves; further sends to it fail with `ChannelClosed`
    fn close(&self, _rank: Rank) {}
}

#[derive(Default)]
struct MailboxState {
    messages: VecDeque<Envelope>,
    bytes: usize,
    closed: bool,
}

#[derive(Default)]
struct Mailbox {
    state: Mutex<MailboxState>,
    arrived: Condvar,
}

impl Mailbox {
    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// In-process transport: one mailbox per rank, guarded by a mutex
pub struct LocalTransport {
    mailboxes: Vec<Mailbox>,
    capacity: Option<usize>,
}

impl LocalTransport {
    /// A transport connecting `size` ranks. With `capacity`, a mailbox accepts new user messages
    /// only while it holds fewer than `capacity` undelivered bytes.
    pub fn new(size: Rank, capacity: Option<usize>) -> Result<Self> {
        let n: usize = size
            .value_as()
            .map_err(|_| Error::InvalidRank { rank: size, size })?;
        Ok(LocalTransport {
            mailboxes: (0..n).map(|_| Mailbox::default()).collect(),
            capacity,
        })
    }

    /// Number of connected ranks
    pub fn size(&self) -> Rank {
        self.mailboxes.len() as Rank
    }

    fn mailbox(&self, rank: Rank) -> Result<&Mailbox> {
        rank.value_as::<usize>()
            .ok()
            .and_then(|index| self.mailboxes.get(index))
            .ok_or(Error::InvalidRank {
                rank,
                size: self.size(),
            })
    }

    fn source_closed(&self, source: Option<Rank>) -> Option<Rank> {
        let source = source?;
        match self.mailbox(source) {
            Ok(mailbox) if mailbox.lock().closed => Some(source),
            _ => None,
        }
    }
}

impl fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTransport")
            .field("size", &self.mailboxes.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Transport for LocalTransport {
    fn send(&self, destination: Rank, envelope: Envelope) -> Result<()> {
        let mailbox = self.mailbox(destination)?;
        let mut state = mailbox.lock();
        if state.closed {
            return Err(Error::ChannelClosed(destination));
        }
        log::trace!("{} -> {}: {:?}", envelope.source, destination, envelope);
        state.bytes += envelope.payload.len();
        state.messages.push_back(envelope);
        drop(state);
        mailbox.arrived.notify_all();
        Ok(())
    }

    fn has_capacity(&self, destination: Rank, len: usize) -> bool {
        let capacity = match self.capacity {
            Some(capacity) => capacity,
            None => return true,
        };
        match self.mailbox(destination) {
            Ok(mailbox) => {
                let state = mailbox.lock();
                state.closed || state.messages.is_empty() || state.bytes + len <= capacity
            }
            Err(_) => true,
        }
    }

    fn try_receive(
        &self,
        receiver: Rank,
        source: Option<Rank>,
        tag: Option<Tag>,
    ) -> Result<Option<Envelope>> {
        let mailbox = self.mailbox(receiver)?;
        let mut state = mailbox.lock();
        let index = state
            .messages
            .iter()
            .position(|envelope| envelope.matches(source, tag));
        match index.and_then(|index| state.messages.remove(index)) {
            Some(envelope) => {
                state.bytes -= envelope.payload.len();
                Ok(Some(envelope))
            }
            None => {
                drop(state);
                match self.source_closed(source) {
                    Some(rank) => Err(Error::ChannelClosed(rank)),
                    None => Ok(None),
                }
            }
        }
    }

    fn peek(
        &self,
        receiver: Rank,
        source: Option<Rank>,
        tag: Option<Tag>,
    ) -> Result<Option<Peeked>> {
        let mailbox = self.mailbox(receiver)?;
        let state = mailbox.lock();
        let peeked = state
            .messages
            .iter()
            .find(|envelope| envelope.matches(source, tag))
            .map(|envelope| Peeked {
                source: envelope.source,
                tag: envelope.tag,
                len: envelope.payload.len(),
            });
        drop(state);
        match peeked {
            Some(peeked) => Ok(Some(peeked)),
            None => match self.source_closed(source) {
                Some(rank) => Err(Error::ChannelClosed(rank)),
                None => Ok(None),
            },
        }
    }

    fn park(&self, receiver: Rank, timeout: Duration) {
        if let Ok(mailbox) = self.mailbox(receiver) {
            let state = mailbox.lock();
            let _ = mailbox
                .arrived
                .wait_timeout(state, timeout)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn is_open(&self, rank: Rank) -> bool {
        self.mailbox(rank).map_or(false, |mailbox| !mailbox.lock().closed)
    }

    fn close(&self, rank: Rank) {
        if let Ok(mailbox) = self.mailbox(rank) {
            mailbox.lock().closed = true;
            mailbox.arrived.notify_all();
            log::debug!("rank {} closed its mailbox", rank);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(source: Rank, tag: Tag, payload: &[u8]) -> Envelope {
        Envelope {
            source,
            tag,
            protocol: Protocol::Eager,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn fifo_per_tag() {
        let transport = LocalTransport::new(2, None).unwrap();
        transport.send(1, envelope(0, 3, &[1])).unwrap();
        transport.send(1, envelope(0, 4, &[2])).unwrap();
        transport.send(1, envelope(0, 3, &[3])).unwrap();

        let first = transport.try_receive(1, Some(0), Some(3)).unwrap().unwrap();
        assert_eq!(first.payload, vec![1]);
        let second = transport.try_receive(1, Some(0), Some(3)).unwrap().unwrap();
        assert_eq!(second.payload, vec![3]);
        let wildcard = transport.try_receive(1, None, None).unwrap().unwrap();
        assert_eq!(wildcard.payload, vec![2]);
        assert_eq!(transport.try_receive(1, None, None).unwrap(), None);
    }

    #[test]
    fn wildcards_skip_control_traffic() {
        let transport = LocalTransport::new(2, None).unwrap();
        transport.send(0, envelope(1, CONTROL_TAG, &[])).unwrap();
        assert_eq!(transport.peek(0, None, None).unwrap(), None);
        assert_eq!(transport.try_receive(0, None, None).unwrap(), None);
        assert!(transport
            .try_receive(0, None, Some(CONTROL_TAG))
            .unwrap()
            .is_some());
    }

    #[test]
    fn peek_leaves_the_message() {
        let transport = LocalTransport::new(2, None).unwrap();
        transport.send(1, envelope(0, 0, &[9, 9, 9])).unwrap();
        let peeked = transport.peek(1, Some(0), None).unwrap().unwrap();
        assert_eq!(
            peeked,
            Peeked {
                source: 0,
                tag: 0,
                len: 3
            }
        );
        assert!(transport.try_receive(1, Some(0), Some(0)).unwrap().is_some());
    }

    #[test]
    fn bounded_mailbox() {
        let transport = LocalTransport::new(2, Some(4)).unwrap();
        assert!(transport.has_capacity(1, 100));
        transport.send(1, envelope(0, 0, &[0; 3])).unwrap();
        assert!(transport.has_capacity(1, 1));
        assert!(!transport.has_capacity(1, 2));
        transport.try_receive(1, None, None).unwrap();
        assert!(transport.has_capacity(1, 4));
    }

    #[test]
    fn closed_ranks() {
        let transport = LocalTransport::new(2, None).unwrap();
        transport.close(1);
        assert!(!transport.is_open(1));
        assert_eq!(
            transport.send(1, envelope(0, 0, &[])).unwrap_err(),
            Error::ChannelClosed(1)
        );
        assert_eq!(
            transport.try_receive(0, Some(1), None).unwrap_err(),
            Error::ChannelClosed(1)
        );
        assert_eq!(transport.try_receive(0, None, None).unwrap(), None);
    }

    #[test]
    fn ranks_outside_the_group() {
        let transport = LocalTransport::new(2, None).unwrap();
        assert_eq!(
            transport.send(2, envelope(0, 0, &[])).unwrap_err(),
            Error::InvalidRank { rank: 2, size: 2 }
        );
    }
}
