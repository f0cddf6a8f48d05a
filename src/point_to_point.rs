//! Point to point communication
//!
//! Endpoints of communication are described by types that implement the `Source` and
//! `Destination` trait. Communication operations are implemented as default methods on those
//! traits.
//!
//! Messages between a pair of ranks that carry the same tag are received in the order they were
//! sent. A receive from `AnyProcess` takes whichever matching message arrived first.
//!
//! # Unfinished features
//!
//! - Ready mode send
//! - Persistent requests
//! - Matched probe

use std::fmt;
use std::mem;

use conv::ConvUtil;

use crate::datatype::traits::*;
use crate::datatype::Layout;
use crate::error::{Error, Result};
use crate::pack;
use crate::progress::{self, SendMode};
use crate::request::Request;
use crate::topology::traits::*;
use crate::topology::{AnyProcess, Process, Rank};
use crate::{Count, Tag};

/// Point to point communication traits
pub mod traits {
    pub use super::{Destination, Source};
}

fn check_tag(tag: Tag) -> Result<Tag> {
    if tag < 0 {
        Err(Error::InvalidTag(tag))
    } else {
        Ok(tag)
    }
}

fn deliver<Buf>(buf: &mut Buf, payload: &[u8]) -> Result<usize>
where
    Buf: BufferMut + ?Sized,
{
    pack::scatter(buf, payload).map_err(|e| {
        if let Error::Truncated { .. } = e {
            log::warn!("{}", e);
        }
        e
    })
}

fn probe_matching<'a, S>(source: &S, tag: Option<Tag>) -> Result<Status>
where
    S: Source<'a> + ?Sized,
{
    let comm = source.as_communicator();
    loop {
        if let Some(status) = comm.engine.borrow_mut().probe(source.source_rank(), tag)? {
            return Ok(status);
        }
        comm.engine.borrow().park();
    }
}

fn receive_matching<'a, S, Buf>(source: &S, buf: &mut Buf, tag: Option<Tag>) -> Result<Status>
where
    S: Source<'a> + ?Sized,
    Buf: BufferMut + ?Sized,
{
    // fail on unusable layouts before a message is consumed
    buf.as_layout().type_map()?;
    let comm = source.as_communicator();
    let id = comm
        .engine
        .borrow_mut()
        .post_receive(source.source_rank(), tag)?;
    let delivered = progress::complete(comm, id)?;
    if let Some(payload) = delivered.payload {
        deliver(buf, &payload)?;
    }
    Ok(delivered.status)
}

fn receive_vec_matching<'a, S, Msg>(source: &S, tag: Option<Tag>) -> Result<(Vec<Msg>, Status)>
where
    S: Source<'a> + ?Sized,
    Msg: Equivalence,
{
    let layout = Msg::equivalent_layout();
    let comm = source.as_communicator();
    let id = comm
        .engine
        .borrow_mut()
        .post_receive(source.source_rank(), tag)?;
    let delivered = progress::complete(comm, id)?;
    let payload = delivered.payload.unwrap_or_default();
    let count = match delivered.status.count(&layout) {
        Some(count) => count,
        None => {
            return Err(Error::Truncated {
                received: payload.len(),
                capacity: payload.len() - payload.len() % layout.size().max(1),
            })
        }
    };
    // all zeros is a valid value of every `Equivalence` type
    let mut res: Vec<Msg> = (0..count).map(|_| unsafe { mem::zeroed() }).collect();
    deliver(&mut res[..], &payload)?;
    Ok((res, delivered.status))
}

fn immediate_receive_matching<'a, S, Buf>(
    source: &S,
    buf: Buf,
    tag: Option<Tag>,
) -> Result<Request<'a, Buf>>
where
    S: Source<'a> + ?Sized,
    Buf: BufferMut,
{
    buf.as_layout().type_map()?;
    let comm = source.as_communicator();
    let id = comm
        .engine
        .borrow_mut()
        .post_receive(source.source_rank(), tag)?;
    Ok(Request::new(comm, id, buf, Some(deliver::<Buf>)))
}

fn blocking_send<'a, D, Buf>(destination: &D, buf: &Buf, tag: Tag, mode: SendMode) -> Result<()>
where
    D: Destination<'a> + ?Sized,
    Buf: Buffer + ?Sized,
{
    let tag = check_tag(tag)?;
    let payload = pack::gather(buf)?;
    let comm = destination.as_communicator();
    let id = comm
        .engine
        .borrow_mut()
        .post_send(destination.destination_rank(), tag, payload, mode)?;
    progress::complete(comm, id).map(|_| ())
}

fn immediate_send_mode<'a, D, Buf>(
    destination: &D,
    buf: Buf,
    tag: Tag,
    mode: SendMode,
) -> Result<Request<'a, Buf>>
where
    D: Destination<'a> + ?Sized,
    Buf: Buffer,
{
    let tag = check_tag(tag)?;
    let payload = pack::gather(&buf)?;
    let comm = destination.as_communicator();
    let id = comm
        .engine
        .borrow_mut()
        .post_send(destination.destination_rank(), tag, payload, mode)?;
    Ok(Request::new(comm, id, buf, None))
}

/// Something that can be used as the source in a point to point receive operation
///
/// # Examples
///
/// - A `Process` used as a source for a receive operation will receive data only from the
///   identified rank.
/// - An `AnyProcess` receives data from whichever rank sends a matching message first.
pub trait Source<'a>: AsCommunicator<'a> {
    /// `Rank` that identifies the source, `None` for any rank
    fn source_rank(&self) -> Option<Rank>;

    /// Probe a source for incoming messages.
    ///
    /// Probe `Source` `&self` for incoming messages with a certain tag. Blocks until a matching
    /// message is available; the message is not received.
    fn probe_with_tag(&self, tag: Tag) -> Result<Status> {
        let tag = check_tag(tag)?;
        probe_matching(self, Some(tag))
    }

    /// Probe a source for incoming messages.
    ///
    /// Probe `Source` `&self` for incoming messages with any tag.
    fn probe(&self) -> Result<Status> {
        probe_matching(self, None)
    }

    /// Asynchronously probe a source for incoming messages.
    ///
    /// Like `Probe` but returns a `None` immediately if there is no incoming message to be probed.
    fn immediate_probe_with_tag(&self, tag: Tag) -> Result<Option<Status>> {
        let tag = check_tag(tag)?;
        self.as_communicator()
            .engine
            .borrow_mut()
            .probe(self.source_rank(), Some(tag))
    }

    /// Asynchronously probe a source for incoming messages.
    ///
    /// Like `Probe` but returns a `None` immediately if there is no incoming message to be probed.
    fn immediate_probe(&self) -> Result<Option<Status>> {
        self.as_communicator()
            .engine
            .borrow_mut()
            .probe(self.source_rank(), None)
    }

    /// Receive a message containing a single instance of type `Msg`.
    ///
    /// Receive a message from `Source` `&self` tagged `tag` containing a single instance of type
    /// `Msg`.
    fn receive_with_tag<Msg>(&self, tag: Tag) -> Result<(Msg, Status)>
    where
        Msg: Equivalence,
    {
        // all zeros is a valid value of every `Equivalence` type
        let mut res: Msg = unsafe { mem::zeroed() };
        let status = self.receive_into_with_tag(&mut res, tag)?;
        Ok((res, status))
    }

    /// Receive a message containing a single instance of type `Msg`.
    ///
    /// Receive a message from `Source` `&self` containing a single instance of type `Msg`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rsmp::traits::*;
    ///
    /// let world = rsmp::Universe::local(2, rsmp::Config::default())?;
    /// world[0].process_at_rank(1)?.send(&2.5f64)?;
    /// let (x, _) = world[1].any_process().receive::<f64>()?;
    /// assert_eq!(x, 2.5);
    /// # Ok::<(), rsmp::Error>(())
    /// ```
    fn receive<Msg>(&self) -> Result<(Msg, Status)>
    where
        Msg: Equivalence,
    {
        let mut res: Msg = unsafe { mem::zeroed() };
        let status = receive_matching(self, &mut res, None)?;
        Ok((res, status))
    }

    /// Receive a message into a `Buffer`.
    ///
    /// Receive a message from `Source` `&self` tagged `tag` into `Buffer` `buf`.
    ///
    /// # Errors
    /// `Truncated` if the message is larger than `buf`. The message is consumed.
    fn receive_into_with_tag<Buf: ?Sized>(&self, buf: &mut Buf, tag: Tag) -> Result<Status>
    where
        Buf: BufferMut,
    {
        let tag = check_tag(tag)?;
        receive_matching(self, buf, Some(tag))
    }

    /// Receive a message into a `Buffer`.
    ///
    /// Receive a message from `Source` `&self` into `Buffer` `buf`.
    ///
    /// # Examples
    /// See `demos/vector_rows.rs`
    fn receive_into<Buf: ?Sized>(&self, buf: &mut Buf) -> Result<Status>
    where
        Buf: BufferMut,
    {
        receive_matching(self, buf, None)
    }

    /// Receive a message containing multiple instances of type `Msg` into a `Vec`.
    ///
    /// Receive a message from `Source` `&self` tagged `tag` containing multiple instances of type
    /// `Msg` into a `Vec`.
    fn receive_vec_with_tag<Msg>(&self, tag: Tag) -> Result<(Vec<Msg>, Status)>
    where
        Msg: Equivalence,
    {
        let tag = check_tag(tag)?;
        receive_vec_matching(self, Some(tag))
    }

    /// Receive a message containing multiple instances of type `Msg` into a `Vec`.
    ///
    /// Receive a message from `Source` `&self` containing multiple instances of type `Msg` into a
    /// `Vec`.
    ///
    /// # Examples
    /// See `demos/immediate_ring.rs`
    fn receive_vec<Msg>(&self) -> Result<(Vec<Msg>, Status)>
    where
        Msg: Equivalence,
    {
        receive_vec_matching(self, None)
    }

    /// Initiate an immediate (non-blocking) receive operation.
    ///
    /// Initiate receiving a message matching `tag` into `buf`. The request owns `buf` until it
    /// completes.
    fn immediate_receive_into_with_tag<Buf>(&self, buf: Buf, tag: Tag) -> Result<Request<'a, Buf>>
    where
        Buf: BufferMut,
    {
        let tag = check_tag(tag)?;
        immediate_receive_matching(self, buf, Some(tag))
    }

    /// Initiate an immediate (non-blocking) receive operation.
    ///
    /// Initiate receiving a message into `buf`. The request owns `buf` until it completes.
    ///
    /// # Examples
    /// See `demos/immediate_ring.rs`
    fn immediate_receive_into<Buf>(&self, buf: Buf) -> Result<Request<'a, Buf>>
    where
        Buf: BufferMut,
    {
        immediate_receive_matching(self, buf, None)
    }

}

impl<'a> Source<'a> for AnyProcess<'a> {
    fn source_rank(&self) -> Option<Rank> {
        None
    }
}

impl<'a> Source<'a> for Process<'a> {
    fn source_rank(&self) -> Option<Rank> {
        Some(self.rank())
    }
}

/// Something that can be used as the destination in a point to point send operation
///
/// # Examples
/// - Using a `Process` as the destination will send data to that specific rank.
pub trait Destination<'a>: AsCommunicator<'a> {
    /// `Rank` that identifies the destination
    fn destination_rank(&self) -> Rank;

    /// Blocking standard mode send operation
    ///
    /// Send the contents of a `Buffer` to the `Destination` `&self` and tag it.
    ///
    /// Small messages are staged and the call returns at once, larger ones wait for the
    /// matching receive.
    fn send_with_tag<Buf: ?Sized>(&self, buf: &Buf, tag: Tag) -> Result<()>
    where
        Buf: Buffer,
    {
        blocking_send(self, buf, tag, SendMode::Standard)
    }

    /// Blocking standard mode send operation
    ///
    /// Send the contents of a `Buffer` to the `Destination` `&self`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rsmp::traits::*;
    ///
    /// let world = rsmp::Universe::local(2, rsmp::Config::default())?;
    /// let v = vec![1.0f64, 2.0, 3.0];
    /// world[0].process_at_rank(1)?.send(&v[..])?;
    /// # Ok::<(), rsmp::Error>(())
    /// ```
    ///
    /// See also `demos/struct_send.rs`
    fn send<Buf: ?Sized>(&self, buf: &Buf) -> Result<()>
    where
        Buf: Buffer,
    {
        self.send_with_tag(buf, Tag::default())
    }

    /// Blocking buffered mode send operation
    ///
    /// Send the contents of a `Buffer` to the `Destination` `&self` and tag it.
    ///
    /// Copies the message into the staging area of the communicator and returns.
    ///
    /// # Errors
    /// `ResourceExhausted` if the staging area does not have room for the message. The call
    /// never blocks waiting for room.
    fn buffered_send_with_tag<Buf: ?Sized>(&self, buf: &Buf, tag: Tag) -> Result<()>
    where
        Buf: Buffer,
    {
        let tag = check_tag(tag)?;
        let payload = pack::gather(buf)?;
        self.as_communicator()
            .engine
            .borrow_mut()
            .buffered_send(self.destination_rank(), tag, payload)
    }

    /// Blocking buffered mode send operation
    ///
    /// Send the contents of a `Buffer` to the `Destination` `&self`.
    fn buffered_send<Buf: ?Sized>(&self, buf: &Buf) -> Result<()>
    where
        Buf: Buffer,
    {
        self.buffered_send_with_tag(buf, Tag::default())
    }

    /// Blocking synchronous mode send operation
    ///
    /// Send the contents of a `Buffer` to the `Destination` `&self` and tag it.
    ///
    /// Completes only once the matching receive operation has started. Two ranks that
    /// synchronously send to each other before either receives block forever.
    ///
    /// # Examples
    /// See `demos/deadlock.rs`
    fn synchronous_send_with_tag<Buf: ?Sized>(&self, buf: &Buf, tag: Tag) -> Result<()>
    where
        Buf: Buffer,
    {
        blocking_send(self, buf, tag, SendMode::Synchronous)
    }

    /// Blocking synchronous mode send operation
    ///
    /// Send the contents of a `Buffer` to the `Destination` `&self`.
    ///
    /// Completes only once the matching receive operation has started.
    fn synchronous_send<Buf: ?Sized>(&self, buf: &Buf) -> Result<()>
    where
        Buf: Buffer,
    {
        self.synchronous_send_with_tag(buf, Tag::default())
    }

    /// Initiate an immediate (non-blocking) standard mode send operation.
    ///
    /// Initiate sending the data in `buf` in standard mode and tag it. The request owns `buf`
    /// until it completes.
    fn immediate_send_with_tag<Buf>(&self, buf: Buf, tag: Tag) -> Result<Request<'a, Buf>>
    where
        Buf: Buffer,
    {
        immediate_send_mode(self, buf, tag, SendMode::Standard)
    }

    /// Initiate an immediate (non-blocking) standard mode send operation.
    ///
    /// Initiate sending the data in `buf` in standard mode.
    ///
    /// # Examples
    /// See `demos/immediate_ring.rs`
    fn immediate_send<Buf>(&self, buf: Buf) -> Result<Request<'a, Buf>>
    where
        Buf: Buffer,
    {
        self.immediate_send_with_tag(buf, Tag::default())
    }

    /// Initiate an immediate (non-blocking) synchronous mode send operation.
    ///
    /// Initiate sending the data in `buf` in synchronous mode and tag it. The request completes
    /// once the matching receive has started.
    fn immediate_synchronous_send_with_tag<Buf>(
        &self,
        buf: Buf,
        tag: Tag,
    ) -> Result<Request<'a, Buf>>
    where
        Buf: Buffer,
    {
        immediate_send_mode(self, buf, tag, SendMode::Synchronous)
    }

    /// Initiate an immediate (non-blocking) synchronous mode send operation.
    ///
    /// Initiate sending the data in `buf` in synchronous mode.
    fn immediate_synchronous_send<Buf>(&self, buf: Buf) -> Result<Request<'a, Buf>>
    where
        Buf: Buffer,
    {
        self.immediate_synchronous_send_with_tag(buf, Tag::default())
    }
}

impl<'a> Destination<'a> for Process<'a> {
    fn destination_rank(&self) -> Rank {
        self.rank()
    }
}

/// Describes the result of a point to point operation.
///
/// For a receive it describes the message that was received, for a send the message that was
/// sent.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Status {
    source: Rank,
    tag: Tag,
    len: usize,
}

impl Status {
    pub(crate) fn new(source: Rank, tag: Tag, len: usize) -> Status {
        Status { source, tag, len }
    }

    /// The rank of the message source
    pub fn source_rank(&self) -> Rank {
        self.source
    }

    /// The message tag
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Length of the message in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the message was empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of instances of `layout` contained in the message, `None` if the message does not
    /// consist of whole instances
    pub fn count(&self, layout: &Layout) -> Option<Count> {
        let size = layout.size();
        if size == 0 {
            return if self.len == 0 { Some(0) } else { None };
        }
        if self.len % size != 0 {
            return None;
        }
        (self.len / size).value_as().ok()
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Status {{ source_rank: {}, tag: {}, len: {} }}",
            self.source_rank(),
            self.tag(),
            self.len()
        )
    }
}

/// Sends the contents of `buf` to `destination` tagging it `sendtag` and
/// simultaneously receives a message tagged `receivetag` from `source` and replaces the
/// contents of `buf` with it.
///
/// Both operations progress together, so a ring of ranks that all call this does not deadlock.
pub fn send_receive_replace_into_with_tags<'a, B: ?Sized, D, S>(
    buf: &mut B,
    destination: &D,
    sendtag: Tag,
    source: &S,
    receivetag: Option<Tag>,
) -> Result<Status>
where
    B: Buffer + BufferMut,
    D: Destination<'a>,
    S: Source<'a>,
{
    let sendtag = check_tag(sendtag)?;
    if let Some(tag) = receivetag {
        check_tag(tag)?;
    }
    let payload = pack::gather(&*buf)?;
    let comm = destination.as_communicator();
    let (send, receive) = {
        let mut engine = comm.engine.borrow_mut();
        let send = engine.post_send(
            destination.destination_rank(),
            sendtag,
            payload,
            SendMode::Standard,
        )?;
        let receive = engine.post_receive(source.source_rank(), receivetag)?;
        (send, receive)
    };
    let delivered = progress::complete(comm, receive);
    let sent = progress::complete(comm, send);
    let delivered = delivered?;
    sent?;
    if let Some(payload) = delivered.payload {
        deliver(buf, &payload)?;
    }
    Ok(delivered.status)
}

/// Sends the contents of `buf` to `destination` and
/// simultaneously receives a message from `source` and replaces the contents of
/// `buf` with it.
///
/// # Examples
/// See `demos/nearest_neighbour.rs`
pub fn send_receive_replace_into<'a, B: ?Sized, D, S>(
    buf: &mut B,
    destination: &D,
    source: &S,
) -> Result<Status>
where
    B: Buffer + BufferMut,
    D: Destination<'a>,
    S: Source<'a>,
{
    send_receive_replace_into_with_tags(buf, destination, Tag::default(), source, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, Universe};

    #[test]
    fn status_counts_whole_instances() {
        let status = Status::new(1, 0, 12);
        assert_eq!(status.count(&i32::equivalent_layout()), Some(3));
        assert_eq!(status.count(&f64::equivalent_layout()), None);
        assert_eq!(status.count(&u8::equivalent_layout()), Some(12));
    }

    #[test]
    fn reserved_tags_are_rejected() {
        let world = Universe::local(2, Config::default()).unwrap();
        let p = world[0].process_at_rank(1).unwrap();
        assert_eq!(p.send_with_tag(&1i32, -1).unwrap_err(), Error::InvalidTag(-1));
        assert_eq!(
            world[1].any_process().immediate_probe_with_tag(-5).unwrap_err(),
            Error::InvalidTag(-5)
        );
    }

    #[test]
    fn send_to_self() {
        let world = Universe::local(1, Config::default()).unwrap();
        let me = world[0].this_process();
        me.send(&[1u16, 2, 3][..]).unwrap();
        let (v, status) = me.receive_vec::<u16>().unwrap();
        assert_eq!(v, vec![1, 2, 3]);
        assert_eq!(status.source_rank(), 0);
        assert_eq!(status.len(), 6);
    }

    #[test]
    fn truncated_messages_are_consumed() {
        let world = Universe::local(2, Config::default()).unwrap();
        world[0].process_at_rank(1).unwrap().send(&[1i32, 2, 3][..]).unwrap();
        world[0].process_at_rank(1).unwrap().send(&[4i32][..]).unwrap();

        let mut small = [0i32; 2];
        let source = world[1].process_at_rank(0).unwrap();
        assert_eq!(
            source.receive_into(&mut small[..]).unwrap_err(),
            Error::Truncated {
                received: 12,
                capacity: 8
            }
        );
        let status = source.receive_into(&mut small[..]).unwrap();
        assert_eq!(status.len(), 4);
        assert_eq!(small, [4, 0]);
    }
}
