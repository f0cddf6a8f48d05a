//! The per-rank communication engine
//!
//! Every communicator owns an `Engine` that holds the outbox of messages not yet accepted by the
//! transport, the receives that were posted but not matched, and the completion state of all
//! non-blocking operations. Nothing happens in the background: the engine makes progress
//! whenever the owning rank calls into it.
//!
//! One pass of progress
//! 1. hands outbox entries to the transport, oldest first, as long as their destination accepts
//!    them,
//! 2. collects acknowledgements of synchronous sends,
//! 3. fails synchronous sends whose destination left,
//! 4. matches posted receives in posting order against the arrived messages.
//!
//! A synchronous send is an envelope carrying a sequence number. The receiver answers it with an
//! acknowledgement on the reserved control tag as soon as a receive matches it, which completes
//! the send.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::point_to_point::Status;
use crate::request::{Delivered, Outcome, RequestId, RequestTable};
use crate::topology::{Communicator, Rank};
use crate::transport::{Envelope, Protocol, Transport, CONTROL_TAG};
use crate::Tag;

/// Completion policy of a send
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SendMode {
    /// Eager through the staging area if small enough, synchronous otherwise
    Standard,
    /// Complete once the receiver matched the message
    Synchronous,
}

struct Outgoing {
    destination: Rank,
    envelope: Envelope,
    /// Whether the payload occupies the staging area
    staged: bool,
    request: Option<RequestId>,
}

struct Unacknowledged {
    destination: Rank,
    tag: Tag,
    len: usize,
    request: RequestId,
}

#[derive(Copy, Clone, Debug)]
struct Posted {
    source: Option<Rank>,
    tag: Option<Tag>,
}

pub(crate) struct Engine {
    rank: Rank,
    transport: Arc<dyn Transport>,
    config: Config,
    buffer_size: usize,
    staged_bytes: usize,
    outbox: VecDeque<Outgoing>,
    next_sequence: u64,
    unacknowledged: HashMap<u64, Unacknowledged>,
    /// Staged messages the transport refused, reported by the next send to that rank
    undelivered: HashMap<Rank, Error>,
    receives: BTreeMap<RequestId, Posted>,
    requests: RequestTable,
}

impl Engine {
    pub(crate) fn new(rank: Rank, transport: Arc<dyn Transport>, config: Config) -> Self {
        Engine {
            rank,
            transport,
            buffer_size: config.buffer_size,
            config,
            staged_bytes: 0,
            outbox: VecDeque::new(),
            next_sequence: 0,
            unacknowledged: HashMap::new(),
            undelivered: HashMap::new(),
            receives: BTreeMap::new(),
            requests: RequestTable::default(),
        }
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub(crate) fn set_buffer_size(&mut self, bytes: usize) {
        log::debug!(
            "rank {}: staging capacity {} -> {} bytes",
            self.rank,
            self.buffer_size,
            bytes
        );
        self.buffer_size = bytes;
    }

    pub(crate) fn staged_bytes(&self) -> usize {
        self.staged_bytes
    }

    fn staging_available(&self) -> usize {
        self.buffer_size.saturating_sub(self.staged_bytes)
    }

    /// Copy a message into the staging area. Completes locally.
    ///
    /// Fails with `ResourceExhausted` without blocking if the staging area has no room.
    pub(crate) fn buffered_send(
        &mut self,
        destination: Rank,
        tag: Tag,
        payload: Vec<u8>,
    ) -> Result<()> {
        // reclaim whatever the transport accepts by now
        self.progress()?;
        self.check_destination(destination)?;
        let available = self.staging_available();
        if payload.len() > available {
            return Err(Error::ResourceExhausted {
                requested: payload.len(),
                available,
            });
        }
        self.stage(destination, tag, payload);
        self.progress()
    }

    fn stage(&mut self, destination: Rank, tag: Tag, payload: Vec<u8>) {
        log::trace!(
            "rank {}: staging {} bytes for rank {} with tag {}",
            self.rank,
            payload.len(),
            destination,
            tag
        );
        self.staged_bytes += payload.len();
        self.outbox.push_back(Outgoing {
            destination,
            envelope: Envelope {
                source: self.rank,
                tag,
                protocol: Protocol::Eager,
                payload,
            },
            staged: true,
            request: None,
        });
    }

    /// Fails if an earlier staged message to `destination` was lost or `destination` left
    fn check_destination(&mut self, destination: Rank) -> Result<()> {
        if let Some(e) = self.undelivered.remove(&destination) {
            return Err(e);
        }
        if !self.transport.is_open(destination) {
            return Err(Error::ChannelClosed(destination));
        }
        Ok(())
    }

    /// Register a send and return the request that tracks it
    pub(crate) fn post_send(
        &mut self,
        destination: Rank,
        tag: Tag,
        payload: Vec<u8>,
        mode: SendMode,
    ) -> Result<RequestId> {
        self.flush(false);
        self.check_destination(destination)?;
        let id = self.requests.register();
        let len = payload.len();
        let eager = mode == SendMode::Standard
            && len <= self.config.eager_limit
            && len <= self.staging_available();

        if eager {
            self.stage(destination, tag, payload);
            self.requests.complete(
                id,
                Ok(Delivered {
                    status: Status::new(self.rank, tag, len),
                    payload: None,
                }),
            );
        } else {
            let sequence = self.next_sequence;
            self.next_sequence += 1;
            log::trace!(
                "rank {}: synchronous send #{} of {} bytes to rank {} with tag {}",
                self.rank,
                sequence,
                len,
                destination,
                tag
            );
            self.outbox.push_back(Outgoing {
                destination,
                envelope: Envelope {
                    source: self.rank,
                    tag,
                    protocol: Protocol::Synchronous { sequence },
                    payload,
                },
                staged: false,
                request: Some(id),
            });
        }
        self.progress()?;
        Ok(id)
    }

    /// Register a receive and return the request that tracks it
    pub(crate) fn post_receive(&mut self, source: Option<Rank>, tag: Option<Tag>) -> Result<RequestId> {
        let id = self.requests.register();
        self.receives.insert(id, Posted { source, tag });
        self.progress()?;
        Ok(id)
    }

    /// Look for a matching message without receiving it
    pub(crate) fn probe(&mut self, source: Option<Rank>, tag: Option<Tag>) -> Result<Option<Status>> {
        self.progress()?;
        let peeked = self.transport.peek(self.rank, source, tag)?;
        Ok(peeked.map(|p| Status::new(p.source, p.tag, p.len)))
    }

    pub(crate) fn is_complete(&self, id: RequestId) -> Result<bool> {
        self.requests.is_complete(id)
    }

    pub(crate) fn take(&mut self, id: RequestId) -> Result<Option<Outcome>> {
        self.requests.take(id)
    }

    /// Suspend until something arrives or the poll interval passes
    pub(crate) fn park(&self) {
        self.transport.park(self.rank, self.config.poll_interval);
    }

    pub(crate) fn progress(&mut self) -> Result<()> {
        self.flush(false);
        self.collect_acknowledgements()?;
        self.fail_departed()?;
        self.match_receives();
        Ok(())
    }

    /// Hand everything in the outbox to the transport, ignoring backpressure
    pub(crate) fn flush_all(&mut self) {
        self.flush(true);
        if self.requests.pending() > 0 {
            log::debug!(
                "rank {}: leaving with {} pending request(s)",
                self.rank,
                self.requests.pending()
            );
        }
    }

    fn flush(&mut self, force: bool) {
        let mut blocked: SmallVec<[Rank; 4]> = SmallVec::new();
        let mut held = VecDeque::new();
        while let Some(outgoing) = self.outbox.pop_front() {
            let destination = outgoing.destination;
            let accepted = !blocked.contains(&destination)
                && (force
                    || self
                        .transport
                        .has_capacity(destination, outgoing.envelope.payload.len()));
            if accepted {
                self.hand_over(outgoing);
            } else {
                if !blocked.contains(&destination) {
                    blocked.push(destination);
                }
                held.push_back(outgoing);
            }
        }
        self.outbox = held;
    }

    fn hand_over(&mut self, outgoing: Outgoing) {
        let Outgoing {
            destination,
            envelope,
            staged,
            request,
        } = outgoing;
        let len = envelope.payload.len();
        let tag = envelope.tag;
        let protocol = envelope.protocol;
        if staged {
            self.staged_bytes -= len;
        }

        match self.transport.send(destination, envelope) {
            Ok(()) => {
                if let (Protocol::Synchronous { sequence }, Some(request)) = (protocol, request) {
                    self.unacknowledged.insert(
                        sequence,
                        Unacknowledged {
                            destination,
                            tag,
                            len,
                            request,
                        },
                    );
                }
            }
            Err(e) => match request {
                Some(request) => self.requests.complete(request, Err(e)),
                None => {
                    log::warn!(
                        "rank {}: staged message of {} bytes for rank {} was not delivered: {}",
                        self.rank,
                        len,
                        destination,
                        e
                    );
                    self.undelivered.entry(destination).or_insert(e);
                }
            },
        }
    }

    fn collect_acknowledgements(&mut self) -> Result<()> {
        while let Some(envelope) = self
            .transport
            .try_receive(self.rank, None, Some(CONTROL_TAG))?
        {
            let sequence = match envelope.protocol {
                Protocol::Acknowledge { sequence } => sequence,
                other => {
                    log::warn!("rank {}: unexpected control message {:?}", self.rank, other);
                    continue;
                }
            };
            match self.unacknowledged.remove(&sequence) {
                Some(send) => {
                    log::trace!(
                        "rank {}: rank {} acknowledged send #{}",
                        self.rank,
                        envelope.source,
                        sequence
                    );
                    self.requests.complete(
                        send.request,
                        Ok(Delivered {
                            status: Status::new(self.rank, send.tag, send.len),
                            payload: None,
                        }),
                    );
                }
                None => log::warn!(
                    "rank {}: acknowledgement for unknown send #{}",
                    self.rank,
                    sequence
                ),
            }
        }
        Ok(())
    }

    fn fail_departed(&mut self) -> Result<()> {
        let departed = self
            .unacknowledged
            .values()
            .any(|send| !self.transport.is_open(send.destination));
        if !departed {
            return Ok(());
        }
        // a peer acknowledges before it closes
        self.collect_acknowledgements()?;
        let transport = &self.transport;
        let requests = &mut self.requests;
        self.unacknowledged.retain(|_, send| {
            if transport.is_open(send.destination) {
                true
            } else {
                requests.complete(send.request, Err(Error::ChannelClosed(send.destination)));
                false
            }
        });
        Ok(())
    }

    fn match_receives(&mut self) {
        let mut matched = Vec::new();
        for (&id, posted) in &self.receives {
            match self.transport.try_receive(self.rank, posted.source, posted.tag) {
                Ok(None) => {}
                Ok(Some(envelope)) => matched.push((id, Ok(envelope))),
                Err(e) => matched.push((id, Err(e))),
            }
        }
        for (id, received) in matched {
            self.receives.remove(&id);
            let outcome = received.map(|envelope| self.accept(envelope));
            self.requests.complete(id, outcome);
        }
    }

    fn accept(&self, envelope: Envelope) -> Delivered {
        if let Protocol::Synchronous { sequence } = envelope.protocol {
            let acknowledgement = Envelope {
                source: self.rank,
                tag: CONTROL_TAG,
                protocol: Protocol::Acknowledge { sequence },
                payload: Vec::new(),
            };
            if let Err(e) = self.transport.send(envelope.source, acknowledgement) {
                log::debug!(
                    "rank {}: could not acknowledge send #{} of rank {}: {}",
                    self.rank,
                    sequence,
                    envelope.source,
                    e
                );
            }
        }
        log::trace!(
            "rank {}: matched {} bytes from rank {} with tag {}",
            self.rank,
            envelope.payload.len(),
            envelope.source,
            envelope.tag
        );
        Delivered {
            status: Status::new(envelope.source, envelope.tag, envelope.payload.len()),
            payload: Some(envelope.payload),
        }
    }
}

/// Drive the engine of `comm` until `id` completes, parking between attempts
pub(crate) fn wait_for(comm: &Communicator, id: RequestId) -> Result<Outcome> {
    loop {
        {
            let mut engine = comm.engine.borrow_mut();
            engine.progress()?;
            if let Some(outcome) = engine.take(id)? {
                return Ok(outcome);
            }
        }
        comm.engine.borrow().park();
    }
}

/// Like `wait_for`, for operations without a request object
pub(crate) fn complete(comm: &Communicator, id: RequestId) -> Result<Delivered> {
    wait_for(comm, id)?
}
