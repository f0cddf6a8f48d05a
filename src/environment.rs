//! Environmental management
//!
//! This module sets up the ranks of a computation. A `Universe` creates a fixed-size group of
//! communicators connected by one transport. `Universe::run` additionally gives every rank its
//! own thread of control.
//!
//! # Unfinished features
//!
//! - Process management: ranks of other OS processes can only join through a user provided
//!   `Transport`
use std::sync::Arc;
use std::thread;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::topology::{Communicator, Rank};
use crate::transport::{LocalTransport, Transport};

/// Bootstraps groups of ranks
#[derive(Copy, Clone, Debug)]
pub struct Universe;

impl Universe {
    /// Create `size` communicators connected by an in-process `LocalTransport`. The communicator
    /// of rank `r` is at index `r`.
    ///
    /// # Errors
    /// `InvalidRank` if `size` is not positive.
    ///
    /// # Examples
    /// See `demos/deadlock.rs`
    pub fn local(size: Rank, config: Config) -> Result<Vec<Communicator>> {
        check_size(size)?;
        let transport = LocalTransport::new(size, config.mailbox_capacity)?;
        Universe::with_transport(Arc::new(transport), size, config)
    }

    /// Create `size` communicators that talk through `transport`
    ///
    /// # Errors
    /// `InvalidRank` if `size` is not positive.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        size: Rank,
        config: Config,
    ) -> Result<Vec<Communicator>> {
        check_size(size)?;
        log::debug!("creating {} rank(s)", size);
        Ok((0..size)
            .map(|rank| Communicator::new(rank, size, Arc::clone(&transport), config.clone()))
            .collect())
    }

    /// Run `f` once per rank of a new local group, each on its own thread, and collect the
    /// results in rank order.
    ///
    /// A panic on any rank is propagated to the caller once all ranks have finished.
    ///
    /// # Examples
    /// See `demos/vector_rows.rs`
    pub fn run<F, R>(size: Rank, config: Config, f: F) -> Result<Vec<R>>
    where
        F: Fn(Communicator) -> R + Sync,
        R: Send,
    {
        let world = Universe::local(size, config)?;
        let f = &f;
        let outcomes: Vec<thread::Result<R>> = thread::scope(|scope| {
            let handles: Vec<_> = world
                .into_iter()
                .map(|comm| scope.spawn(move || f(comm)))
                .collect();
            handles.into_iter().map(|handle| handle.join()).collect()
        });

        let mut results = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        Ok(results)
    }
}

fn check_size(size: Rank) -> Result<()> {
    if size < 1 {
        return Err(Error::InvalidRank { rank: size, size });
    }
    Ok(())
}
