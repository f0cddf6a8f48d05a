//! Tuning knobs of the communication engine
//!
//! A `Config` is handed to `Universe` when the ranks are created. Every communicator carries its
//! own copy, the buffered-send staging capacity can additionally be changed per communicator with
//! `Communicator::set_buffer_size`.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable overriding `Config::buffer_size`
pub const BUFFER_SIZE_VAR: &str = "RSMP_BUFFER_SIZE";
/// Environment variable overriding `Config::eager_limit`
pub const EAGER_LIMIT_VAR: &str = "RSMP_EAGER_LIMIT";
/// Environment variable overriding `Config::poll_interval`, in microseconds
pub const POLL_INTERVAL_VAR: &str = "RSMP_POLL_INTERVAL_US";
/// Environment variable setting `Config::mailbox_capacity`
pub const MAILBOX_CAPACITY_VAR: &str = "RSMP_MAILBOX_CAPACITY";

/// Engine configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Capacity in bytes of the staging area that holds buffered sends until the transport
    /// accepts them
    pub buffer_size: usize,
    /// Standard mode sends of at most this many bytes complete eagerly, larger ones wait for
    /// the matching receive
    pub eager_limit: usize,
    /// How long a blocking call parks between progress attempts
    pub poll_interval: Duration,
    /// Maximum number of undelivered bytes a rank's mailbox holds. `None` means unbounded.
    pub mailbox_capacity: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            buffer_size: 1 << 20,
            eager_limit: 64 << 10,
            poll_interval: Duration::from_micros(50),
            mailbox_capacity: None,
        }
    }
}

impl Config {
    /// Set the staging capacity for buffered sends
    pub fn with_buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes;
        self
    }

    /// Set the largest standard mode send that completes eagerly
    pub fn with_eager_limit(mut self, bytes: usize) -> Self {
        self.eager_limit = bytes;
        self
    }

    /// Set the parking interval of blocking calls
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Bound the mailbox of every rank
    pub fn with_mailbox_capacity(mut self, bytes: Option<usize>) -> Self {
        self.mailbox_capacity = bytes;
        self
    }

    /// The default configuration, overridden by the `RSMP_*` environment variables that are set
    ///
    /// # Errors
    /// `InvalidConfig` if a variable is set to something that does not parse.
    pub fn from_env() -> Result<Self> {
        Config::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut config = Config::default();
        if let Some(bytes) = parse(&lookup, BUFFER_SIZE_VAR)? {
            config.buffer_size = bytes;
        }
        if let Some(bytes) = parse(&lookup, EAGER_LIMIT_VAR)? {
            config.eager_limit = bytes;
        }
        if let Some(micros) = parse::<u64, _>(&lookup, POLL_INTERVAL_VAR)? {
            if micros == 0 {
                return Err(Error::InvalidConfig {
                    key: POLL_INTERVAL_VAR,
                    reason: "poll interval must be positive".into(),
                });
            }
            config.poll_interval = Duration::from_micros(micros);
        }
        if let Some(bytes) = parse(&lookup, MAILBOX_CAPACITY_VAR)? {
            config.mailbox_capacity = Some(bytes);
        }
        log::debug!("configuration: {:?}", config);
        Ok(config)
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&'static str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| Error::InvalidConfig {
                key,
                reason: format!("{:?}: {}", value, e),
            }),
    }
}
