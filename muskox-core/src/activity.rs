// vim: tw=80
//! Background-operation progress tracking
//!
//! The engine reports long-running maintenance operations (scrubs, resilvers,
//! device removals, raidz expansions, checkpoint discards, per-leaf
//! initialize and trim passes, and sequential rebuilds) as little state
//! machines with byte counters.  This module models those machines and
//! computes the derived quantities the CLI prints: completion fractions,
//! transfer rates, and ETAs.
//!
//! Rates always come from the current pass's counters rather than the
//! cumulative ones, so a scrub that was paused for a week doesn't report a
//! nonsense average.

use serde_derive::{Deserialize, Serialize};

use crate::{
    rpc::Activity,
    vdev::{VdevKind, VdevNode},
};

/// Nanoseconds per second
pub const NANOSEC: u64 = 1_000_000_000;

/// Never print an ETA further out than this.  A month-long projection is
/// noise, not information.
pub const MAX_ESTIMATE_SECS: u64 = 30 * 24 * 60 * 60;

/// Never print an ETA computed from a rate below this, in bytes per second.
/// Very low rates early in a pass produce wild overestimates.
pub const MIN_ESTIMATE_RATE: u64 = 10 * 1024 * 1024;

/// State shared by the per-leaf initialize and trim machines
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
pub enum ProgressState {
    /// Never started on this vdev
    #[default]
    None,
    Active,
    Canceled,
    Suspended,
    Complete,
}

impl ProgressState {
    pub fn adjective(&self) -> &'static str {
        match self {
            ProgressState::None => "uninitialized",
            ProgressState::Active => "active",
            ProgressState::Canceled => "canceled",
            ProgressState::Suspended => "suspended",
            ProgressState::Complete => "completed",
        }
    }
}

/// Progress of one leaf vdev's initialization pass
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
pub struct InitializeStatus {
    pub state: ProgressState,
    /// Bytes written so far
    pub bytes_done: u64,
    /// Estimated total bytes to write
    pub bytes_est: u64,
    /// When the current state was entered, in seconds since the epoch
    pub action_time: u64,
}

impl InitializeStatus {
    pub fn percent(&self) -> u64 {
        percent_done(self.state, self.bytes_done, self.bytes_est)
    }
}

/// Progress of one leaf vdev's trim pass
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
pub struct TrimStatus {
    pub state: ProgressState,
    pub bytes_done: u64,
    pub bytes_est: u64,
    pub action_time: u64,
    /// The device cannot trim at all.  Overrides `state` for display.
    pub unsupported: bool,
}

impl TrimStatus {
    pub fn percent(&self) -> u64 {
        percent_done(self.state, self.bytes_done, self.bytes_est)
    }
}

/// Integer completion percentage.
///
/// The divisor is padded by one so a zero estimate can't divide by zero, at
/// the cost of reporting 99% for a just-finished pass; a terminal state
/// pins the result to 100.
fn percent_done(state: ProgressState, done: u64, est: u64) -> u64 {
    if state == ProgressState::Complete {
        100
    } else {
        (done as u128 * 100 / (est as u128 + 1)) as u64
    }
}

/// What kind of scan the pool-wide scanner is running
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
pub enum ScanFunc {
    #[default]
    None,
    Scrub,
    Resilver,
    /// Scrub of only the blocks already known to be damaged
    ErrorScrub,
}

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
pub enum ScanState {
    #[default]
    None,
    Scanning,
    Finished,
    Canceled,
}

/// Pool-wide scrub/resilver progress
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
pub struct ScanStats {
    pub func: ScanFunc,
    pub state: ScanState,
    /// Start of the whole scan, seconds since the epoch
    pub start_time: u64,
    /// End of the scan, valid only in a terminal state
    pub end_time: u64,
    /// Total bytes the scan will examine
    pub to_examine: u64,
    /// Bytes examined so far, cumulative over all passes
    pub examined: u64,
    pub skipped: u64,
    /// Bytes actually repaired or issued for repair
    pub processed: u64,
    pub errors: u64,
    /// Bytes issued so far, cumulative
    pub issued: u64,
    /// Start of the current pass
    pub pass_start: u64,
    /// Bytes examined in the current pass
    pub pass_examined: u64,
    /// Bytes issued in the current pass
    pub pass_issued: u64,
    /// When the current pause began, 0 if not paused
    pub pass_scrub_pause: u64,
    /// Total seconds the current pass has spent paused
    pub pass_scrub_spent_paused: u64,
}

impl ScanStats {
    pub fn is_active(&self) -> bool {
        self.state == ScanState::Scanning
    }

    pub fn fraction_done(&self) -> f64 {
        if self.to_examine == 0 {
            0.0
        } else {
            self.examined as f64 / self.to_examine as f64
        }
    }

    /// Seconds the current pass has been running, excluding paused time
    pub fn pass_elapsed(&self, now: u64) -> u64 {
        let end = if self.pass_scrub_pause != 0 {
            self.pass_scrub_pause
        } else {
            now
        };
        end.saturating_sub(self.pass_start)
            .saturating_sub(self.pass_scrub_spent_paused)
            .max(1)
    }

    /// Examination rate over the current pass, bytes per second
    pub fn scan_rate(&self, now: u64) -> u64 {
        self.pass_examined / self.pass_elapsed(now)
    }

    /// Issue rate over the current pass, bytes per second
    pub fn issue_rate(&self, now: u64) -> u64 {
        self.pass_issued / self.pass_elapsed(now)
    }

    /// Estimated seconds to completion, or None when no trustworthy
    /// estimate exists.
    pub fn eta_secs(&self, now: u64) -> Option<u64> {
        let total = self.to_examine.max(self.issued);
        eta_secs(total - self.issued.min(total), self.issue_rate(now))
    }
}

/// Progress of a top-level vdev removal
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
pub struct RemovalStats {
    pub state: ScanState,
    /// Guid value of the top-level vdev being removed
    pub removing_vdev: u64,
    pub start_time: u64,
    pub end_time: u64,
    pub to_copy: u64,
    pub copied: u64,
    /// Memory consumed by the indirect mapping, in bytes
    pub mapping_memory: u64,
}

impl RemovalStats {
    pub fn is_active(&self) -> bool {
        self.state == ScanState::Scanning
    }

    pub fn rate(&self, now: u64) -> u64 {
        let elapsed = now.saturating_sub(self.start_time).max(1);
        self.copied / elapsed
    }

    pub fn eta_secs(&self, now: u64) -> Option<u64> {
        eta_secs(self.to_copy.saturating_sub(self.copied), self.rate(now))
    }
}

/// Progress of a raidz expansion
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
pub struct RaidzExpandStats {
    pub state: ScanState,
    /// Guid value of the raidz vdev being expanded
    pub expanding_vdev: u64,
    pub start_time: u64,
    pub end_time: u64,
    pub to_reflow: u64,
    pub reflowed: u64,
    /// The reflow is stalled until an in-progress resilver completes
    pub waiting_for_resilver: bool,
}

impl RaidzExpandStats {
    pub fn is_active(&self) -> bool {
        self.state == ScanState::Scanning
    }

    pub fn rate(&self, now: u64) -> u64 {
        let elapsed = now.saturating_sub(self.start_time).max(1);
        self.reflowed / elapsed
    }

    pub fn eta_secs(&self, now: u64) -> Option<u64> {
        eta_secs(self.to_reflow.saturating_sub(self.reflowed), self.rate(now))
    }
}

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
pub enum CheckpointState {
    #[default]
    None,
    Exists,
    Discarding,
}

/// Pool checkpoint existence and discard progress
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
pub struct CheckpointStats {
    pub state: CheckpointState,
    pub start_time: u64,
    /// Bytes still held by the checkpoint
    pub space: u64,
}

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
pub enum RebuildState {
    #[default]
    None,
    Active,
    Canceled,
    Complete,
}

/// Progress of a sequential rebuild on one top-level vdev
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
pub struct RebuildStats {
    pub state: RebuildState,
    pub start_time: u64,
    pub end_time: u64,
    pub bytes_scanned: u64,
    pub bytes_issued: u64,
    pub bytes_rebuilt: u64,
    pub bytes_est: u64,
    /// Milliseconds the current pass has been running
    pub pass_time_ms: u64,
    pub pass_bytes_scanned: u64,
    pub pass_bytes_issued: u64,
    pub errors: u64,
}

impl RebuildStats {
    pub fn is_active(&self) -> bool {
        self.state == RebuildState::Active
    }

    pub fn fraction_done(&self) -> f64 {
        if self.bytes_est == 0 {
            0.0
        } else {
            self.bytes_scanned as f64 / self.bytes_est as f64
        }
    }

    pub fn scan_rate(&self) -> u64 {
        let secs = (self.pass_time_ms / 1000).max(1);
        self.pass_bytes_scanned / secs
    }

    pub fn issue_rate(&self) -> u64 {
        let secs = (self.pass_time_ms / 1000).max(1);
        self.pass_bytes_issued / secs
    }

    pub fn eta_secs(&self) -> Option<u64> {
        eta_secs(
            self.bytes_est.saturating_sub(self.bytes_issued),
            self.issue_rate(),
        )
    }
}

/// Project a completion time, suppressing untrustworthy estimates.
///
/// Returns None when the rate is below [`MIN_ESTIMATE_RATE`] or the
/// projection exceeds [`MAX_ESTIMATE_SECS`].
pub fn eta_secs(remaining: u64, rate: u64) -> Option<u64> {
    if rate < MIN_ESTIMATE_RATE {
        return None;
    }
    let secs = remaining / rate;
    if secs > MAX_ESTIMATE_SECS {
        None
    } else {
        Some(secs)
    }
}

/// Format a duration as days/hours/minutes/seconds, omitting leading zero
/// fields.
pub fn secs_to_dhms(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs / 3600) % 24;
    let mins = (secs / 60) % 60;
    let s = secs % 60;
    if days > 0 {
        format!("{days} days {hours:02}:{mins:02}:{s:02}")
    } else {
        format!("{hours:02}:{mins:02}:{s:02}")
    }
}

fn resilver_remaining(root: &VdevNode) -> u64 {
    let mut rem = 0;
    if let Some(sss) = &root.scan {
        if sss.func == ScanFunc::Resilver && sss.is_active() {
            rem += sss.to_examine.saturating_sub(sss.issued);
        }
    }
    for node in root.iter() {
        if let Some(rs) = &node.rebuild {
            if rs.is_active() {
                rem += rs.bytes_est.saturating_sub(rs.bytes_issued);
            }
        }
    }
    rem
}

/// How many bytes of work remain for one activity on one pool.
///
/// `freeing` is the pool's background-freeing backlog, which lives outside
/// the vdev tree.  Zero means the activity is not in progress, which is how
/// the wait display decides which columns to show.
pub fn remaining_bytes(
    root: &VdevNode,
    freeing: u64,
    act: Activity,
) -> u64 {
    match act {
        Activity::Free => freeing,
        Activity::Discard => match &root.checkpoint {
            Some(cs) if cs.state == CheckpointState::Discarding => cs.space,
            _ => 0,
        },
        Activity::Initialize => root
            .iter()
            .filter(|n| n.is_leaf())
            .filter_map(|n| n.stats.as_ref())
            .filter(|vs| vs.initialize.state == ProgressState::Active)
            .map(|vs| {
                vs.initialize.bytes_est.saturating_sub(vs.initialize.bytes_done)
            })
            .sum(),
        Activity::Trim => root
            .iter()
            .filter(|n| n.is_leaf())
            .filter_map(|n| n.stats.as_ref())
            .filter(|vs| {
                vs.trim.state == ProgressState::Active && !vs.trim.unsupported
            })
            .map(|vs| vs.trim.bytes_est.saturating_sub(vs.trim.bytes_done))
            .sum(),
        Activity::Scrub => match &root.scan {
            Some(sss)
                if (sss.func == ScanFunc::Scrub ||
                    sss.func == ScanFunc::ErrorScrub) &&
                    sss.is_active() =>
            {
                sss.to_examine.saturating_sub(sss.issued)
            }
            _ => 0,
        },
        Activity::Resilver => resilver_remaining(root),
        // A replacement is done when the resilver into the new device is,
        // and only replacing or spare parents mark one as underway.
        Activity::Replace => {
            let replacing = root.iter().any(|n| {
                n.kind == VdevKind::Replacing || n.kind == VdevKind::Spare
            });
            if replacing {
                resilver_remaining(root)
            } else {
                0
            }
        }
        Activity::Remove => match &root.removal {
            Some(prs) if prs.is_active() => {
                prs.to_copy.saturating_sub(prs.copied)
            }
            _ => 0,
        },
        Activity::RaidzExpand => match &root.raidz_expand {
            Some(pres) if pres.is_active() => {
                pres.to_reflow.saturating_sub(pres.reflowed)
            }
            _ => 0,
        },
    }
}
