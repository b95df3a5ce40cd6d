// vim: tw=80
//! The statistics delta engine
//!
//! All iostat-style output is the difference between two samples of the
//! same vdev's counters, scaled to per-second rates by the interval between
//! the samples' timestamps.  Old and new samples are joined by guid, never
//! by tree position, so a device added or removed between samples can't
//! shift the pairing of its siblings.

use std::collections::HashMap;

use crate::{
    activity::NANOSEC,
    types::Guid,
    vdev::{VdevNode, VdevStats, IO_DIRECTIONS},
};

/// The difference between two samples of one vdev's counters
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StatsDelta {
    pub ops: [u64; IO_DIRECTIONS],
    pub bytes: [u64; IO_DIRECTIONS],
    /// Nanoseconds between the samples
    pub tdelta: u64,
    /// Multiplier converting a counter delta into a per-second rate
    pub scale: f64,
}

impl StatsDelta {
    /// Compute the delta between two samples.
    ///
    /// With no old sample the counters themselves are the delta and the
    /// scale is exactly 1.0, so a first report shows cumulative totals
    /// rather than a rate.  Identical timestamps also pin the scale to 1.0
    /// rather than dividing by zero.
    pub fn new(old: Option<&VdevStats>, new: &VdevStats) -> Self {
        match old {
            None => StatsDelta {
                ops: new.ops,
                bytes: new.bytes,
                tdelta: 0,
                scale: 1.0,
            },
            Some(o) => {
                let mut ops = [0; IO_DIRECTIONS];
                let mut bytes = [0; IO_DIRECTIONS];
                for i in 0..IO_DIRECTIONS {
                    ops[i] = new.ops[i].saturating_sub(o.ops[i]);
                    bytes[i] = new.bytes[i].saturating_sub(o.bytes[i]);
                }
                let tdelta = new.timestamp.saturating_sub(o.timestamp);
                let scale = if tdelta == 0 {
                    1.0
                } else {
                    NANOSEC as f64 / tdelta as f64
                };
                StatsDelta {
                    ops,
                    bytes,
                    tdelta,
                    scale,
                }
            }
        }
    }

    /// Convert a counter delta into a per-second rate
    pub fn rate(&self, delta: u64) -> u64 {
        (delta as f64 * self.scale) as u64
    }
}

/// Element-wise histogram difference.
///
/// Buckets the old sample doesn't have are treated as zero, so histograms
/// that grew between engine versions still subtract cleanly.
pub fn sub_histo(old: Option<&[u64]>, new: &[u64]) -> Vec<u64> {
    new.iter()
        .enumerate()
        .map(|(i, &n)| {
            let o = old.and_then(|o| o.get(i)).copied().unwrap_or(0);
            n.saturating_sub(o)
        })
        .collect()
}

/// The average value of a power-of-two-bucketed histogram.
///
/// Each bucket `i` covers `[2^i, 2^(i+1))` and is represented by the
/// midpoint of its lower half-open bound, `2^i + 2^i/2`.  Returns 0 for an
/// empty histogram.
pub fn single_histo_average(histo: &[u64]) -> u64 {
    let count: u64 = histo.iter().sum();
    if count == 0 {
        return 0;
    }
    let mut total = 0u128;
    for (i, &c) in histo.iter().enumerate() {
        let midpoint = (1u64 << i) + ((1u64 << i) / 2);
        total += midpoint as u128 * c as u128;
    }
    (total / count as u128) as u64
}

/// The old sample's statistics, indexed by guid.
///
/// Built once per reporting interval; the renderer then walks the *new*
/// tree and looks each vdev's previous sample up here.  Guids present only
/// in the old tree fall out naturally, and guids new to this sample get
/// the first-sample treatment.
#[derive(Debug, Default)]
pub struct DeltaMap {
    old: HashMap<Guid, VdevStats>,
}

impl DeltaMap {
    pub fn build(old_root: Option<&VdevNode>) -> Self {
        let mut old = HashMap::new();
        if let Some(root) = old_root {
            for node in root.iter() {
                if let Some(vs) = &node.stats {
                    old.insert(node.guid, vs.clone());
                }
            }
        }
        DeltaMap { old }
    }

    pub fn old_stats(&self, guid: Guid) -> Option<&VdevStats> {
        self.old.get(&guid)
    }

    /// The delta for one vdev of the new tree, or None if the vdev has no
    /// statistics at all.
    pub fn delta(&self, node: &VdevNode) -> Option<StatsDelta> {
        node.stats
            .as_ref()
            .map(|ns| StatsDelta::new(self.old_stats(node.guid), ns))
    }
}
