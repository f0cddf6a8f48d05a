//! Request objects for non-blocking operations
//!
//! Non-blocking operations such as `immediate_send()` return request objects that own the
//! buffers involved in the operation so as to ensure proper access restrictions. In order to get
//! the buffers back from the request objects, a completion operation such as
//! [`wait()`](struct.Request.html#method.wait) or [`test()`](struct.Request.html#method.test) must
//! be used on the request object.
//!
//! **Note:** If the `Request` is dropped (as opposed to calling `wait` or `test` explicitly), the
//! program will panic. Pending operations cannot be cancelled.
//!
//! To handle request completion in an RAII style, a request can be wrapped in a
//! [`WaitGuard`](struct.WaitGuard.html), which waits for the operation when it is dropped.
//! Several requests can be completed together through a
//! [`RequestCollection`](struct.RequestCollection.html).

use std::collections::HashMap;
use std::fmt;
use std::thread;

use crate::error::{Error, Result};
use crate::point_to_point::Status;
use crate::progress;
use crate::topology::Communicator;

/// Identifies an in-flight operation within the request table of its communicator
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a completed operation leaves behind
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Delivered {
    pub(crate) status: Status,
    /// The message contents, for receives
    pub(crate) payload: Option<Vec<u8>>,
}

pub(crate) type Outcome = Result<Delivered>;

/// Completion state of all in-flight operations of one communicator
///
/// An entry is pending until the engine completes it, and is removed the moment its completion
/// is observed.
#[derive(Debug, Default)]
pub(crate) struct RequestTable {
    next: u64,
    entries: HashMap<RequestId, Option<Outcome>>,
}

impl RequestTable {
    pub(crate) fn register(&mut self) -> RequestId {
        let id = RequestId(self.next);
        self.next += 1;
        self.entries.insert(id, None);
        log::debug!("request {} registered", id);
        id
    }

    pub(crate) fn complete(&mut self, id: RequestId, outcome: Outcome) {
        match self.entries.get_mut(&id) {
            Some(entry) if entry.is_none() => {
                log::debug!("request {} completed: {:?}", id, outcome.as_ref().map(|d| d.status));
                *entry = Some(outcome);
            }
            Some(_) => log::warn!("request {} completed twice", id),
            None => log::warn!("completion of unknown request {}", id),
        }
    }

    pub(crate) fn is_complete(&self, id: RequestId) -> Result<bool> {
        match self.entries.get(&id) {
            Some(entry) => Ok(entry.is_some()),
            None => Err(Error::StaleRequest(id.0)),
        }
    }

    /// Removes and returns the outcome of `id` if it is complete
    pub(crate) fn take(&mut self, id: RequestId) -> Result<Option<Outcome>> {
        if !self.is_complete(id)? {
            return Ok(None);
        }
        Ok(self.entries.remove(&id).flatten())
    }

    pub(crate) fn pending(&self) -> usize {
        self.entries.values().filter(|entry| entry.is_none()).count()
    }
}

/// Writes a received payload into the owned buffer of a request
pub(crate) type Deliver<Owned> = fn(&mut Owned, &[u8]) -> Result<usize>;

/// A request object for a non-blocking operation that owns a buffer of type `Owned`
///
/// # Panics
///
/// Panics if the request object is dropped. To prevent this, call `wait` or `test` until it
/// succeeds. Alternatively, wrap the request inside a `WaitGuard`.
///
/// # Examples
///
/// See `demos/immediate_ring.rs`
#[must_use]
pub struct Request<'a, Owned> {
    comm: &'a Communicator,
    id: RequestId,
    data: Option<Owned>,
    deliver: Option<Deliver<Owned>>,
}

impl<'a, Owned> Request<'a, Owned> {
    pub(crate) fn new(
        comm: &'a Communicator,
        id: RequestId,
        data: Owned,
        deliver: Option<Deliver<Owned>>,
    ) -> Self {
        Request {
            comm,
            id,
            data: Some(data),
            deliver,
        }
    }

    /// Identifies the operation
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the operation to finish and return the buffer.
    ///
    /// Will block execution of the calling thread until the associated operation has finished.
    ///
    /// # Errors
    /// - `Truncated` if the received message was larger than the buffer; the message is consumed
    /// - `ChannelClosed` if the peer left before the operation could complete
    ///
    /// The request is complete either way. On error the owned buffer is dropped.
    pub fn wait(mut self) -> Result<(Owned, Status)> {
        let outcome = progress::wait_for(self.comm, self.id);
        self.finish(outcome)
    }

    /// Wait for the operation to finish, discarding the status.
    pub fn wait_without_status(self) -> Result<Owned> {
        self.wait().map(|(data, _)| data)
    }

    /// Test whether an operation has finished.
    ///
    /// If the operation has finished, the buffer and a `Status` are returned. Otherwise the
    /// request is returned unchanged and can be tested again.
    ///
    /// # Errors
    /// As for `wait`, an error completes the request and drops the owned buffer.
    pub fn test(mut self) -> Result<std::result::Result<(Owned, Status), Self>> {
        let observed = {
            let mut engine = self.comm.engine.borrow_mut();
            engine.progress().and_then(|()| engine.take(self.id))
        };
        match observed {
            Ok(None) => Ok(Err(self)),
            Ok(Some(outcome)) => self.finish(Ok(outcome)).map(Ok),
            Err(e) => self.finish(Err(e)).map(Ok),
        }
    }

    /// Whether the operation has finished, without observing its completion
    pub fn is_complete(&self) -> Result<bool> {
        let mut engine = self.comm.engine.borrow_mut();
        engine.progress()?;
        engine.is_complete(self.id)
    }

    fn finish(&mut self, outcome: Result<Outcome>) -> Result<(Owned, Status)> {
        let mut data = self.data.take().ok_or(Error::StaleRequest(self.id.0))?;
        let delivered = outcome??;
        if let (Some(deliver), Some(payload)) = (self.deliver, delivered.payload.as_ref()) {
            if let Err(e) = deliver(&mut data, payload) {
                log::warn!("request {}: {}", self.id, e);
                return Err(e);
            }
        }
        Ok((data, delivered.status))
    }
}

impl<'a, Owned> fmt::Debug for Request<'a, Owned> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("rank", &self.comm.rank())
            .field("id", &self.id)
            .finish()
    }
}

impl<'a, Owned> Drop for Request<'a, Owned> {
    fn drop(&mut self) {
        if self.data.is_some() && !thread::panicking() {
            panic!("request was dropped without being completed");
        }
    }
}

/// Guard object that waits for the completion of an operation when it is dropped
///
/// Errors of the operation are logged, the buffer is dropped.
///
/// # Examples
///
/// See `demos/immediate_ring.rs`
pub struct WaitGuard<'a, Owned>(Option<Request<'a, Owned>>);

impl<'a, Owned> Drop for WaitGuard<'a, Owned> {
    fn drop(&mut self) {
        if let Some(request) = self.0.take() {
            let id = request.id();
            if let Err(e) = request.wait() {
                log::error!("request {} failed while its guard was dropped: {}", id, e);
            }
        }
    }
}

impl<'a, Owned> From<Request<'a, Owned>> for WaitGuard<'a, Owned> {
    fn from(request: Request<'a, Owned>) -> Self {
        WaitGuard(Some(request))
    }
}

impl<'a, Owned> WaitGuard<'a, Owned> {
    /// Release the request from the guard
    pub fn into_request(mut self) -> Option<Request<'a, Owned>> {
        self.0.take()
    }
}

/// A collection of requests that can be completed together
///
/// Dropping a collection that still holds outstanding requests panics, like dropping the
/// requests themselves.
pub struct RequestCollection<'a, Owned> {
    requests: Vec<Option<Request<'a, Owned>>>,
}

impl<'a, Owned> Default for RequestCollection<'a, Owned> {
    fn default() -> Self {
        RequestCollection::new()
    }
}

impl<'a, Owned> FromIterator<Request<'a, Owned>> for RequestCollection<'a, Owned> {
    fn from_iter<I: IntoIterator<Item = Request<'a, Owned>>>(iter: I) -> Self {
        RequestCollection {
            requests: iter.into_iter().map(Some).collect(),
        }
    }
}

impl<'a, Owned> RequestCollection<'a, Owned> {
    /// An empty collection
    pub fn new() -> Self {
        RequestCollection {
            requests: Vec::new(),
        }
    }

    /// Add a request, it is identified by its insertion index
    pub fn push(&mut self, request: Request<'a, Owned>) {
        self.requests.push(Some(request));
    }

    /// Number of requests that were not completed yet
    pub fn outstanding(&self) -> usize {
        self.requests.iter().filter(|r| r.is_some()).count()
    }

    /// Number of requests ever added
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether no request was ever added
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Wait for every outstanding request, results are in insertion order.
    ///
    /// All requests are completed even if some of them fail; the first error is returned.
    pub fn wait_all(mut self) -> Result<Vec<(Owned, Status)>> {
        let mut completed = Vec::with_capacity(self.requests.len());
        let mut first_error = None;
        for request in self.requests.drain(..).flatten() {
            match request.wait() {
                Ok(done) => completed.push(done),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(completed),
        }
    }

    /// Wait for some outstanding request to complete and return its index, buffer and status.
    ///
    /// Returns `None` if there are no outstanding requests.
    pub fn wait_any(&mut self) -> Result<Option<(usize, Owned, Status)>> {
        loop {
            if let Some(done) = self.test_any()? {
                return Ok(Some(done));
            }
            match self.requests.iter().flatten().next() {
                Some(request) => request.comm.engine.borrow().park(),
                None => return Ok(None),
            }
        }
    }

    /// Test the outstanding requests once, in insertion order, and return the first one that
    /// completed.
    pub fn test_any(&mut self) -> Result<Option<(usize, Owned, Status)>> {
        for index in 0..self.requests.len() {
            if let Some(request) = self.requests[index].take() {
                match request.test()? {
                    Ok((data, status)) => return Ok(Some((index, data, status))),
                    Err(request) => self.requests[index] = Some(request),
                }
            }
        }
        Ok(None)
    }
}
