// vim: tw=80
//! RPC definitions for communication between the muskox CLI and muskoxd

use std::{fmt, str::FromStr};

use serde_derive::{Deserialize, Serialize};

use crate::{
    activity::{
        CheckpointStats,
        RaidzExpandStats,
        RebuildStats,
        RemovalStats,
        ScanStats,
    },
    types::{Error, Guid},
    vdev::VdevStats,
};

/// Wire form of one vdev tree node.
///
/// Unlike [`crate::vdev::VdevNode`] this carries the allocation class in its
/// historical dual encoding, because that's what the engine's on-disk labels
/// store.  Conversion to `VdevNode` reconciles the two.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct VdevConfig {
    /// Engine type tag, e.g. "disk", "mirror", "raidz"
    pub vtype: String,
    pub guid: Guid,
    /// Position among the parent's children
    pub id: u64,
    pub path: Option<String>,
    /// Parity level; meaningful only when `vtype` is "raidz"
    pub nparity: u64,
    /// Legacy log marker
    pub is_log: bool,
    /// Newer allocation-bias marker: "log", "dedup", or "special"
    pub alloc_bias: Option<String>,
    pub not_present: bool,
    pub children: Vec<VdevConfig>,
    pub spares: Vec<VdevConfig>,
    pub cache: Vec<VdevConfig>,
    pub stats: Option<VdevStats>,
    pub rebuild: Option<RebuildStats>,
    pub scan: Option<ScanStats>,
    pub removal: Option<RemovalStats>,
    pub checkpoint: Option<CheckpointStats>,
    pub raidz_expand: Option<RaidzExpandStats>,
}

/// One pool's full configuration snapshot
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PoolConfig {
    pub name: String,
    pub guid: Guid,
    /// Bytes queued for asynchronous freeing
    pub freeing: u64,
    /// Deduplication ratio, scaled by 100
    pub dedup_ratio: u64,
    /// Count of known data errors
    pub error_count: u64,
    pub root: VdevConfig,
}

/// The current configuration plus the previously sampled one, when the
/// daemon still has it.  Statistics deltas are computed between the two.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ConfigPair {
    pub current: PoolConfig,
    pub previous: Option<PoolConfig>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PoolInfo {
    pub name: String,
    pub guid: Guid,
}

/// A background operation that `muskox wait` can block on
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Activity {
    /// Checkpoint discard
    Discard,
    /// Background freeing
    Free,
    Initialize,
    /// Resilver of a replacing or spare vdev
    Replace,
    Remove,
    Resilver,
    Scrub,
    Trim,
    RaidzExpand,
}

impl Activity {
    pub const ALL: [Activity; 9] = [
        Activity::Discard,
        Activity::Free,
        Activity::Initialize,
        Activity::Replace,
        Activity::Remove,
        Activity::Resilver,
        Activity::Scrub,
        Activity::Trim,
        Activity::RaidzExpand,
    ];

    /// Column header used by the wait status display
    pub fn label(&self) -> &'static str {
        match self {
            Activity::Discard => "DISCARD",
            Activity::Free => "FREE",
            Activity::Initialize => "INITIALIZE",
            Activity::Replace => "REPLACE",
            Activity::Remove => "REMOVE",
            Activity::Resilver => "RESILVER",
            Activity::Scrub => "SCRUB",
            Activity::Trim => "TRIM",
            Activity::RaidzExpand => "RAIDZ_EXPAND",
        }
    }
}

impl FromStr for Activity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "discard" => Ok(Activity::Discard),
            "free" => Ok(Activity::Free),
            "initialize" => Ok(Activity::Initialize),
            "replace" => Ok(Activity::Replace),
            "remove" => Ok(Activity::Remove),
            "resilver" => Ok(Activity::Resilver),
            "scrub" => Ok(Activity::Scrub),
            "trim" => Ok(Activity::Trim),
            "raidz_expand" => Ok(Activity::RaidzExpand),
            _ => Err(Error::Invalid(format!("invalid activity '{s}'"))),
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub mod pool {
    use serde_derive::{Deserialize, Serialize};

    use super::{Activity, Request};

    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct Get {
        pub name: String,
    }

    pub fn get(name: String) -> Request {
        Request::PoolGet(Get { name })
    }

    pub fn list() -> Request {
        Request::PoolList
    }

    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct Refresh {
        pub name: String,
    }

    pub fn refresh(name: String) -> Request {
        Request::PoolRefresh(Refresh { name })
    }

    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct Wait {
        pub name: String,
        /// Return once none of these remain in progress
        pub activities: Vec<Activity>,
    }

    pub fn wait(name: String, activities: Vec<Activity>) -> Request {
        Request::PoolWait(Wait { name, activities })
    }
}

/// An RPC request from muskox to muskoxd
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum Request {
    PoolGet(pool::Get),
    PoolList,
    PoolRefresh(pool::Refresh),
    PoolWait(pool::Wait),
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum Response {
    PoolGet(Result<ConfigPair, Error>),
    PoolList(Result<Vec<PoolInfo>, Error>),
    /// true iff the pool has gone missing
    PoolRefresh(Result<bool, Error>),
    /// true iff the call actually waited for anything
    PoolWait(Result<bool, Error>),
}

impl Response {
    pub fn into_pool_get(self) -> Result<ConfigPair, Error> {
        match self {
            Response::PoolGet(r) => r,
            x => panic!("Unexpected response type {x:?}"),
        }
    }

    pub fn into_pool_list(self) -> Result<Vec<PoolInfo>, Error> {
        match self {
            Response::PoolList(r) => r,
            x => panic!("Unexpected response type {x:?}"),
        }
    }

    pub fn into_pool_refresh(self) -> Result<bool, Error> {
        match self {
            Response::PoolRefresh(r) => r,
            x => panic!("Unexpected response type {x:?}"),
        }
    }

    pub fn into_pool_wait(self) -> Result<bool, Error> {
        match self {
            Response::PoolWait(r) => r,
            x => panic!("Unexpected response type {x:?}"),
        }
    }
}

#[cfg(test)]
mod t {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn activity_from_str() {
        assert_eq!(Ok(Activity::RaidzExpand), "raidz_expand".parse());
        assert_eq!(Ok(Activity::Scrub), "scrub".parse());
        assert!("defrag".parse::<Activity>().is_err());
    }

    #[test]
    fn request_round_trip() {
        let req = pool::wait(
            "tank".to_owned(),
            vec![Activity::Scrub, Activity::Trim],
        );
        let buf = bincode::serialize(&req).unwrap();
        let back: Request = bincode::deserialize(&buf).unwrap();
        match back {
            Request::PoolWait(w) => {
                assert_eq!("tank", w.name);
                assert_eq!(vec![Activity::Scrub, Activity::Trim],
                           w.activities);
            }
            x => panic!("deserialized as {x:?}"),
        }
    }

    #[test]
    fn refresh_response_round_trip() {
        let resp = Response::PoolRefresh(Ok(true));
        let buf = bincode::serialize(&resp).unwrap();
        let back: Response = bincode::deserialize(&buf).unwrap();
        assert_eq!(Ok(true), back.into_pool_refresh());
    }

    #[test]
    #[should_panic(expected = "Unexpected response type")]
    fn wrong_accessor_panics() {
        Response::PoolList(Ok(vec![])).into_pool_wait().unwrap();
    }
}
