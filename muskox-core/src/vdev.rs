// vim: tw=80
//! The vdev tree model
//!
//! A pool's configuration is a tree of virtual devices: a synthetic root,
//! interior grouping vdevs (mirrors, raidz groups, replacing pairs), and leaf
//! devices (disks and files).  Every sample of a pool's state arrives as one
//! of these trees, with an optional statistics block per node.

use serde_derive::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    activity::{
        CheckpointStats,
        InitializeStatus,
        RaidzExpandStats,
        RebuildStats,
        RemovalStats,
        ScanStats,
        TrimStatus,
    },
    rpc::VdevConfig,
    types::{Error, Guid, Result},
};

/// Direction index into per-vdev operation and byte counters
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IoDirection {
    Read = 0,
    Write = 1,
}

pub const IO_DIRECTIONS: usize = 2;

/// Number of power-of-two buckets in a latency histogram.  Bucket `i` counts
/// events in `[2^i, 2^(i+1))` nanoseconds.
pub const LAT_HISTO_BUCKETS: usize = 37;

/// Number of power-of-two buckets in a request-size histogram
pub const RQ_HISTO_BUCKETS: usize = 25;

/// What a vdev is
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VdevKind {
    /// The synthetic root of every tree
    Root,
    Mirror,
    RaidZ(u8),
    Disk,
    File,
    /// A hot spare, as it appears in the spares list
    Spare,
    /// A temporary parent pairing an old device with its replacement
    Replacing,
    /// A removed top-level vdev that lives on only as a block-pointer
    /// mapping
    Indirect,
    /// A gap in the top-level numbering left by a removed vdev
    Hole,
    /// A device that could not be opened at import time
    Missing,
    /// A distributed spare inside a draid group
    DraidSpare,
    /// Forward compatibility: a type this build doesn't know about
    Other(String),
}

impl VdevKind {
    /// Parse an engine type tag.  `parity` only matters for raidz.
    pub fn from_tag(tag: &str, parity: u64) -> Self {
        match tag {
            "root" => VdevKind::Root,
            "mirror" => VdevKind::Mirror,
            "raidz" => VdevKind::RaidZ(parity.clamp(1, 3) as u8),
            "disk" => VdevKind::Disk,
            "file" => VdevKind::File,
            "spare" => VdevKind::Spare,
            "replacing" => VdevKind::Replacing,
            "indirect" => VdevKind::Indirect,
            "hole" => VdevKind::Hole,
            "missing" => VdevKind::Missing,
            "dspare" => VdevKind::DraidSpare,
            other => VdevKind::Other(other.to_owned()),
        }
    }

    /// The display tag, including raidz parity
    pub fn tag(&self) -> String {
        match self {
            VdevKind::Root => "root".to_owned(),
            VdevKind::Mirror => "mirror".to_owned(),
            VdevKind::RaidZ(p) => format!("raidz{p}"),
            VdevKind::Disk => "disk".to_owned(),
            VdevKind::File => "file".to_owned(),
            VdevKind::Spare => "spare".to_owned(),
            VdevKind::Replacing => "replacing".to_owned(),
            VdevKind::Indirect => "indirect".to_owned(),
            VdevKind::Hole => "hole".to_owned(),
            VdevKind::Missing => "missing".to_owned(),
            VdevKind::DraidSpare => "dspare".to_owned(),
            VdevKind::Other(tag) => tag.clone(),
        }
    }
}

/// Which allocation class a top-level vdev serves
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AllocClass {
    #[default]
    Normal,
    /// Intent log
    Log,
    /// Dedup table blocks
    Dedup,
    /// Metadata and small blocks
    Special,
}

impl AllocClass {
    /// Section header used by the CLI
    pub fn section(&self) -> &'static str {
        match self {
            AllocClass::Normal => "",
            AllocClass::Log => "logs",
            AllocClass::Dedup => "dedup",
            AllocClass::Special => "special",
        }
    }
}

/// Coarse vdev state, ordered from least to most usable
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub enum VdevState {
    #[default]
    Unknown,
    Closed,
    Offline,
    Removed,
    CantOpen,
    Faulted,
    Degraded,
    Healthy,
}

/// Why a vdev is in a degraded or unopenable state
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    PartialEq,
    Serialize,
)]
pub enum VdevAux {
    #[default]
    None,
    OpenFailed,
    CorruptData,
    NoReplicas,
    BadGuidSum,
    TooSmall,
    BadLabel,
    VersionNewer,
    VersionOlder,
    UnsupportedFeat,
    /// A hot spare has taken over for this device
    Spared,
    ErrExceeded,
    IoFailure,
    BadLog,
    External,
    SplitPool,
    AshiftTooBig,
    ChildrenOffline,
    Active,
}

impl VdevAux {
    /// One-line explanation printed next to the state column, or None when
    /// the code needs no elaboration.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            VdevAux::None => None,
            VdevAux::OpenFailed => Some("cannot open"),
            VdevAux::CorruptData => Some("corrupted data"),
            VdevAux::NoReplicas => Some("insufficient replicas"),
            VdevAux::BadGuidSum => Some("missing device"),
            VdevAux::TooSmall => Some("device too small"),
            VdevAux::BadLabel => Some("invalid label"),
            VdevAux::VersionNewer => Some("newer version"),
            VdevAux::VersionOlder => Some("older version"),
            VdevAux::UnsupportedFeat => Some("unsupported feature(s)"),
            VdevAux::Spared => None,
            VdevAux::ErrExceeded => Some("too many errors"),
            VdevAux::IoFailure => Some("experienced I/O failures"),
            VdevAux::BadLog => Some("bad intent log"),
            VdevAux::External => Some("external device fault"),
            VdevAux::SplitPool => Some("split into new pool"),
            VdevAux::AshiftTooBig => Some("unsupported minimum blocksize"),
            VdevAux::ChildrenOffline => Some("all children offline"),
            VdevAux::Active => Some("currently in use"),
        }
    }
}

/// Pending and active I/O counts for one scheduler queue
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    PartialEq,
    Serialize,
)]
pub struct QueueStats {
    pub pend: u64,
    pub active: u64,
}

/// Depths of all the per-vdev scheduler queues
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    PartialEq,
    Serialize,
)]
pub struct QueueDepths {
    pub sync_read: QueueStats,
    pub sync_write: QueueStats,
    pub async_read: QueueStats,
    pub async_write: QueueStats,
    pub scrub: QueueStats,
    pub trim: QueueStats,
    pub rebuild: QueueStats,
}

/// One vdev's statistics block, as sampled atomically by the engine
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct VdevStats {
    pub state: VdevState,
    pub aux: VdevAux,
    /// Total usable space, nonzero only on the root and top-level vdevs
    pub space: u64,
    pub alloc: u64,
    /// Space after accounting for raidz deflation
    pub deflated: u64,
    /// Additional space available after an `online -e`
    pub expand_size: u64,
    pub read_errors: u64,
    pub write_errors: u64,
    pub checksum_errors: u64,
    pub slow_ios: u64,
    /// Cumulative operation counts, indexed by [`IoDirection`]
    pub ops: [u64; IO_DIRECTIONS],
    /// Cumulative byte counts, indexed by [`IoDirection`]
    pub bytes: [u64; IO_DIRECTIONS],
    /// Free-space fragmentation percentage; None when not yet computed
    pub fragmentation: Option<u8>,
    pub configured_ashift: u64,
    pub physical_ashift: u64,
    /// Bytes recovered by self-healing reads
    pub self_healed: u64,
    /// This top-level vdev is being evacuated
    pub removing: bool,
    /// New allocations are administratively disabled here
    pub noalloc: bool,
    /// A resilver of this vdev has been deferred until the current one
    /// finishes
    pub resilver_deferred: bool,
    /// Bytes of this vdev already handled by the pool-wide scan
    pub scan_processed: u64,
    pub initialize: InitializeStatus,
    pub trim: TrimStatus,
    /// Total-latency histograms, one per direction
    pub read_latency: Vec<u64>,
    pub write_latency: Vec<u64>,
    /// Disk-only latency histograms, excluding queueing time
    pub disk_read_latency: Vec<u64>,
    pub disk_write_latency: Vec<u64>,
    /// Request-size histograms
    pub read_request_size: Vec<u64>,
    pub write_request_size: Vec<u64>,
    pub queues: QueueDepths,
    /// When this sample was taken, in nanoseconds on a monotonic clock
    pub timestamp: u64,
}

impl VdevStats {
    /// The state word the CLI prints
    pub fn health(&self) -> &'static str {
        match self.state {
            VdevState::Closed | VdevState::Offline => "OFFLINE",
            VdevState::Removed => "REMOVED",
            VdevState::CantOpen => {
                if self.aux == VdevAux::CorruptData {
                    "FAULTED"
                } else {
                    "UNAVAIL"
                }
            }
            VdevState::Faulted => "FAULTED",
            VdevState::Degraded => "DEGRADED",
            VdevState::Healthy => "ONLINE",
            VdevState::Unknown => "UNKNOWN",
        }
    }

    /// The state word for a device listed in the spares section, which uses
    /// INUSE/AVAIL instead of the ordinary vocabulary.
    pub fn spare_health(&self) -> &'static str {
        if self.aux == VdevAux::Spared {
            "INUSE"
        } else if self.state == VdevState::Healthy {
            "AVAIL"
        } else {
            self.health()
        }
    }
}

/// One node of a pool's vdev tree
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VdevNode {
    pub kind: VdevKind,
    /// Reconciled allocation class; meaningful on top-level vdevs
    pub class: AllocClass,
    pub guid: Guid,
    /// Position among the parent's children, stable across samples
    pub id: u64,
    /// Device node or file path; always present on disk and file leaves
    pub path: Option<String>,
    /// The device was absent at open; `path` names where it used to be
    pub not_present: bool,
    pub children: Vec<VdevNode>,
    /// Hot spares; populated only on the root
    pub spares: Vec<VdevNode>,
    /// L2 cache devices; populated only on the root
    pub cache: Vec<VdevNode>,
    pub stats: Option<VdevStats>,
    /// Sequential rebuild progress; top-level vdevs only
    pub rebuild: Option<RebuildStats>,
    /// Pool-wide scan progress; root only
    pub scan: Option<ScanStats>,
    /// Device-removal progress; root only
    pub removal: Option<RemovalStats>,
    /// Checkpoint state; root only
    pub checkpoint: Option<CheckpointStats>,
    /// Raidz-expansion progress; root only
    pub raidz_expand: Option<RaidzExpandStats>,
}

impl Default for VdevKind {
    fn default() -> Self {
        VdevKind::Root
    }
}

impl VdevNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty() && self.kind != VdevKind::Root
    }

    pub fn is_hole(&self) -> bool {
        self.kind == VdevKind::Hole
    }

    pub fn is_indirect(&self) -> bool {
        self.kind == VdevKind::Indirect
    }

    /// Preorder traversal of this node and all descendants, including
    /// spares and cache devices.
    pub fn iter(&self) -> Iter<'_> {
        Iter { stack: vec![self] }
    }

    /// Find any descendant by guid
    pub fn find(&self, guid: Guid) -> Option<&VdevNode> {
        self.iter().find(|n| n.guid == guid)
    }
}

/// Iterator returned by [`VdevNode::iter`]
pub struct Iter<'a> {
    stack: Vec<&'a VdevNode>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a VdevNode;

    fn next(&mut self) -> Option<&'a VdevNode> {
        let node = self.stack.pop()?;
        self.stack.extend(node.cache.iter().rev());
        self.stack.extend(node.spares.iter().rev());
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

impl TryFrom<VdevConfig> for VdevNode {
    type Error = Error;

    /// Build the tree from its wire form, reconciling the legacy dual
    /// encoding of the allocation class.
    ///
    /// Old configurations mark log vdevs with a boolean; newer ones carry a
    /// bias string that also covers dedup and special vdevs.  Either alone
    /// is accepted, as is agreement; a contradiction fails the whole
    /// conversion rather than guessing which writer was right.
    fn try_from(cfg: VdevConfig) -> Result<Self> {
        let class = match (cfg.is_log, cfg.alloc_bias.as_deref()) {
            (false, None) => AllocClass::Normal,
            (_, Some("log")) | (true, None) => AllocClass::Log,
            (false, Some("dedup")) => AllocClass::Dedup,
            (false, Some("special")) => AllocClass::Special,
            (true, Some(bias)) => {
                warn!(guid = %cfg.guid, bias,
                    "log flag contradicts allocation bias");
                return Err(Error::ConflictingBias(cfg.guid));
            }
            (false, Some(bias)) => {
                warn!(guid = %cfg.guid, bias, "unknown allocation bias");
                AllocClass::Normal
            }
        };
        let children = cfg
            .children
            .into_iter()
            .map(VdevNode::try_from)
            .collect::<Result<Vec<_>>>()?;
        let spares = cfg
            .spares
            .into_iter()
            .map(VdevNode::try_from)
            .collect::<Result<Vec<_>>>()?;
        let cache = cfg
            .cache
            .into_iter()
            .map(VdevNode::try_from)
            .collect::<Result<Vec<_>>>()?;
        // Histograms never grow past their defined bucket counts; a newer
        // engine's extra buckets are dropped rather than rendered with
        // bogus bound labels.
        let mut stats = cfg.stats;
        if let Some(vs) = stats.as_mut() {
            for h in [
                &mut vs.read_latency,
                &mut vs.write_latency,
                &mut vs.disk_read_latency,
                &mut vs.disk_write_latency,
            ] {
                h.truncate(LAT_HISTO_BUCKETS);
            }
            vs.read_request_size.truncate(RQ_HISTO_BUCKETS);
            vs.write_request_size.truncate(RQ_HISTO_BUCKETS);
        }
        Ok(VdevNode {
            kind: VdevKind::from_tag(&cfg.vtype, cfg.nparity),
            class,
            guid: cfg.guid,
            id: cfg.id,
            path: cfg.path,
            not_present: cfg.not_present,
            children,
            spares,
            cache,
            stats,
            rebuild: cfg.rebuild,
            scan: cfg.scan,
            removal: cfg.removal,
            checkpoint: cfg.checkpoint,
            raidz_expand: cfg.raidz_expand,
        })
    }
}

#[cfg(test)]
mod t {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn leaf_cfg(guid: u64, path: &str) -> VdevConfig {
        VdevConfig {
            vtype: "disk".to_owned(),
            guid: Guid(guid),
            path: Some(path.to_owned()),
            ..Default::default()
        }
    }

    mod kind {
        use super::*;
        use pretty_assertions::assert_eq;

        #[rstest]
        #[case("mirror", 0, VdevKind::Mirror)]
        #[case("raidz", 2, VdevKind::RaidZ(2))]
        #[case("dspare", 0, VdevKind::DraidSpare)]
        #[case("hole", 0, VdevKind::Hole)]
        fn from_tag(
            #[case] tag: &str,
            #[case] parity: u64,
            #[case] expected: VdevKind,
        ) {
            assert_eq!(expected, VdevKind::from_tag(tag, parity));
        }

        // A tag from a newer engine survives a round trip unchanged
        #[test]
        fn unknown_tag_is_preserved() {
            let k = VdevKind::from_tag("quantum", 0);
            assert_eq!(VdevKind::Other("quantum".to_owned()), k);
            assert_eq!("quantum", k.tag());
        }

        #[test]
        fn raidz_tag_includes_parity() {
            assert_eq!("raidz3", VdevKind::RaidZ(3).tag());
        }
    }

    mod class {
        use super::*;
        use pretty_assertions::assert_eq;

        #[rstest]
        #[case(false, None, AllocClass::Normal)]
        #[case(true, None, AllocClass::Log)]
        #[case(true, Some("log"), AllocClass::Log)]
        #[case(false, Some("log"), AllocClass::Log)]
        #[case(false, Some("dedup"), AllocClass::Dedup)]
        #[case(false, Some("special"), AllocClass::Special)]
        fn reconciliation(
            #[case] is_log: bool,
            #[case] bias: Option<&str>,
            #[case] expected: AllocClass,
        ) {
            let cfg = VdevConfig {
                is_log,
                alloc_bias: bias.map(str::to_owned),
                ..leaf_cfg(1, "/dev/da0")
            };
            let node = VdevNode::try_from(cfg).unwrap();
            assert_eq!(expected, node.class);
        }

        #[test]
        fn contradiction_is_rejected() {
            let cfg = VdevConfig {
                is_log: true,
                alloc_bias: Some("dedup".to_owned()),
                ..leaf_cfg(99, "/dev/da0")
            };
            assert_eq!(
                Err(Error::ConflictingBias(Guid(99))),
                VdevNode::try_from(cfg)
            );
        }

        // A bad child poisons the whole tree conversion
        #[test]
        fn contradiction_in_child_fails_parent() {
            let root = VdevConfig {
                vtype: "root".to_owned(),
                guid: Guid(1),
                children: vec![VdevConfig {
                    is_log: true,
                    alloc_bias: Some("special".to_owned()),
                    ..leaf_cfg(2, "/dev/da0")
                }],
                ..Default::default()
            };
            assert_eq!(
                Err(Error::ConflictingBias(Guid(2))),
                VdevNode::try_from(root)
            );
        }

        #[test]
        fn unknown_bias_falls_back_to_normal() {
            let cfg = VdevConfig {
                alloc_bias: Some("frobnication".to_owned()),
                ..leaf_cfg(1, "/dev/da0")
            };
            let node = VdevNode::try_from(cfg).unwrap();
            assert_eq!(AllocClass::Normal, node.class);
        }
    }

    #[test]
    fn oversized_histograms_are_clamped() {
        let cfg = VdevConfig {
            stats: Some(VdevStats {
                read_latency: vec![1; LAT_HISTO_BUCKETS + 8],
                write_request_size: vec![2; RQ_HISTO_BUCKETS + 8],
                ..Default::default()
            }),
            ..leaf_cfg(1, "/dev/da0")
        };
        let node = VdevNode::try_from(cfg).unwrap();
        let vs = node.stats.unwrap();
        assert_eq!(LAT_HISTO_BUCKETS, vs.read_latency.len());
        assert_eq!(RQ_HISTO_BUCKETS, vs.write_request_size.len());
    }

    mod health {
        use super::*;
        use pretty_assertions::assert_eq;

        #[rstest]
        #[case(VdevState::Healthy, VdevAux::None, "ONLINE")]
        #[case(VdevState::Degraded, VdevAux::ErrExceeded, "DEGRADED")]
        #[case(VdevState::Faulted, VdevAux::None, "FAULTED")]
        #[case(VdevState::CantOpen, VdevAux::OpenFailed, "UNAVAIL")]
        #[case(VdevState::CantOpen, VdevAux::CorruptData, "FAULTED")]
        #[case(VdevState::Offline, VdevAux::None, "OFFLINE")]
        #[case(VdevState::Removed, VdevAux::None, "REMOVED")]
        fn words(
            #[case] state: VdevState,
            #[case] aux: VdevAux,
            #[case] expected: &str,
        ) {
            let vs = VdevStats {
                state,
                aux,
                ..Default::default()
            };
            assert_eq!(expected, vs.health());
        }

        #[test]
        fn spare_vocabulary() {
            let avail = VdevStats {
                state: VdevState::Healthy,
                ..Default::default()
            };
            assert_eq!("AVAIL", avail.spare_health());
            let inuse = VdevStats {
                state: VdevState::Healthy,
                aux: VdevAux::Spared,
                ..Default::default()
            };
            assert_eq!("INUSE", inuse.spare_health());
            let faulted = VdevStats {
                state: VdevState::Faulted,
                ..Default::default()
            };
            assert_eq!("FAULTED", faulted.spare_health());
        }

        #[test]
        fn state_ordering() {
            assert!(VdevState::Faulted < VdevState::Degraded);
            assert!(VdevState::Degraded < VdevState::Healthy);
        }
    }

    #[test]
    fn iter_visits_spares_and_cache() {
        let root = VdevConfig {
            vtype: "root".to_owned(),
            guid: Guid(1),
            children: vec![VdevConfig {
                vtype: "mirror".to_owned(),
                guid: Guid(2),
                children: vec![leaf_cfg(3, "/dev/da0"),
                               leaf_cfg(4, "/dev/da1")],
                ..Default::default()
            }],
            spares: vec![leaf_cfg(5, "/dev/da2")],
            cache: vec![leaf_cfg(6, "/dev/da3")],
            ..Default::default()
        };
        let tree = VdevNode::try_from(root).unwrap();
        let guids: Vec<u64> = tree.iter().map(|n| n.guid.0).collect();
        assert_eq!(vec![1, 2, 3, 4, 5, 6], guids);
        assert_eq!(Guid(5), tree.find(Guid(5)).unwrap().guid);
        assert!(tree.find(Guid(7)).is_none());
    }
}
