// vim: tw=80
//! Fundamental types used throughout muskox

use std::{fmt, io, num::ParseIntError, str::FromStr};

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

/// Globally unique identifier of a pool or vdev
///
/// Assigned by the engine at vdev creation time and stable for the life of
/// the vdev, even across device renumbering.  Rendered in decimal, just like
/// it appears in a pool's configuration.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct Guid(pub u64);

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Guid {
    type Err = ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        u64::from_str(s).map(Guid)
    }
}

impl From<u64> for Guid {
    fn from(g: u64) -> Self {
        Guid(g)
    }
}

/// Error type for all muskox operations
///
/// Serializable, because errors must cross the RPC boundary between muskoxd
/// and its clients.
#[derive(Clone, Debug, Deserialize, Error, Eq, PartialEq, Serialize)]
pub enum Error {
    /// A vdev's configuration carries both the boolean log flag and an
    /// allocation bias, and they contradict each other.
    #[error("vdev {0} has conflicting allocation class encodings")]
    ConflictingBias(Guid),
    /// Communication with the daemon failed
    #[error("I/O error: {0}")]
    Io(String),
    /// Invalid argument, reported before any RPC is made
    #[error("invalid argument: {0}")]
    Invalid(String),
    /// The named pool does not exist
    #[error("no such pool: {0}")]
    NoSuchPool(String),
    /// The named vdev does not exist in any requested pool
    #[error("no such vdev: {0}")]
    NoSuchVdev(String),
    /// A pool disappeared between samples, e.g. due to export
    #[error("pool is no longer available")]
    PoolMissing,
    /// The daemon sent something unintelligible
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// The process exit status that this error maps to.
    ///
    /// Usage errors exit with 2, matching clap's convention; everything else
    /// exits with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Invalid(_) => 2,
            _ => 1,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
