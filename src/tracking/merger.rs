//! Reconciles the background scratch queue into the in-memory path.

use crate::storage::scratch::{self, Scratch, ScratchError};
use crate::tracking::buffer::{Admission, SampleBuffer};
use crate::tracking::types::TrackingPoint;

/// What one merge tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Entries read from scratch
    pub read: usize,
    /// Entries new to the path (not deduplicated away)
    pub fresh: usize,
    /// Entries the admission predicate accepted
    pub admitted: usize,
    /// Whether the scratch queue was cleared this tick
    pub cleared: bool,
}

/// Merges the background stream into the foreground path.
///
/// Timestamp equality means "same sample": anything already in the path is
/// skipped, and replaying the same scratch twice appends nothing new.
#[derive(Debug, Default)]
pub struct SampleMerger {
    merged_total: u64,
}

impl SampleMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the scratch queue into the buffer.
    ///
    /// The clear is optimistic: the queue length is re-read after the
    /// merge and the empty value is written only if no new background
    /// entries arrived meanwhile. Entries left behind surface again on the
    /// next tick and dedup keeps them from double-counting.
    pub fn drain(
        &mut self,
        scratch_store: &dyn Scratch,
        buffer: &mut SampleBuffer,
    ) -> Result<MergeReport, ScratchError> {
        let queued = scratch::read_points(scratch_store)?;
        let mut report = MergeReport {
            read: queued.len(),
            ..MergeReport::default()
        };
        if queued.is_empty() {
            return Ok(report);
        }

        let fresh: Vec<TrackingPoint> = queued
            .iter()
            .filter(|p| !buffer.contains_timestamp(p.timestamp))
            .copied()
            .collect();
        report.fresh = fresh.len();

        let tail_ts = buffer.last().map(|p| p.timestamp);
        let in_tail_order = match tail_ts {
            None => fresh.windows(2).all(|w| w[0].timestamp <= w[1].timestamp),
            Some(tail) => {
                fresh.iter().all(|p| p.timestamp > tail)
                    && fresh.windows(2).all(|w| w[0].timestamp <= w[1].timestamp)
            }
        };

        if in_tail_order {
            for p in fresh {
                if buffer.append(p) == Admission::Admitted {
                    report.admitted += 1;
                }
            }
        } else {
            // Background entries interleave with the foreground tail, so
            // appending would break timestamp order. Rebuild: union, sort,
            // replay through a fresh buffer under the same thresholds.
            report.admitted = Self::rebuild(buffer, fresh);
        }

        self.merged_total += report.admitted as u64;

        // Optimistic clear.
        let post_len = scratch::read_points(scratch_store)?.len();
        if post_len == report.read {
            scratch::write_points(scratch_store, &[])?;
            report.cleared = true;
        } else {
            tracing::debug!(
                read = report.read,
                now = post_len,
                "scratch grew during drain, leaving queue for next tick"
            );
        }

        Ok(report)
    }

    fn rebuild(buffer: &mut SampleBuffer, fresh: Vec<TrackingPoint>) -> usize {
        let mut union = buffer.snapshot();
        union.extend(fresh);
        union.sort_by(|a, b| {
            a.timestamp
                .partial_cmp(&b.timestamp)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        union.dedup_by(|a, b| a.timestamp == b.timestamp);

        let before = buffer.len();
        buffer.rebuild_from(union);
        buffer.len().saturating_sub(before)
    }

    /// Samples admitted across all drains.
    pub fn merged_total(&self) -> u64 {
        self.merged_total
    }
}
