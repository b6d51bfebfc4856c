//! Background-emission scratch writer.

use std::sync::Arc;

use rand::Rng;

use crate::storage::scratch::{self, Scratch, ScratchError};
use crate::tracking::types::TrackingPoint;

/// Bound on the scratch point queue. When the cap is hit the oldest
/// entries are evicted first; those are the ones most likely already
/// merged into the live path.
pub const SCRATCH_POINT_CAP: usize = 1000;

/// Appends background emissions to the scratch point queue.
///
/// Wall-clock stamps produced in the same batch can collide. Each write
/// resolves collisions with a sub-millisecond positive jitter, re-drawn
/// until the stamp differs from every stamp already queued, so timestamp
/// equality always means "same logical sample" downstream.
pub struct BackgroundWriter {
    scratch: Arc<dyn Scratch>,
}

impl BackgroundWriter {
    pub fn new(scratch: Arc<dyn Scratch>) -> Self {
        Self { scratch }
    }

    /// Append one emission, jittering its timestamp on collision and
    /// trimming the queue to the last [`SCRATCH_POINT_CAP`] entries.
    pub fn push(&self, point: TrackingPoint) -> Result<TrackingPoint, ScratchError> {
        let mut points = scratch::read_points(self.scratch.as_ref())?;

        let mut stamped = point;
        let mut rng = rand::thread_rng();
        while points.iter().any(|p| p.timestamp == stamped.timestamp) {
            stamped.timestamp = point.timestamp + rng.gen_range(0.0001..0.001);
        }

        points.push(stamped);
        if points.len() > SCRATCH_POINT_CAP {
            let excess = points.len() - SCRATCH_POINT_CAP;
            points.drain(..excess);
        }

        scratch::write_points(self.scratch.as_ref(), &points)?;
        Ok(stamped)
    }
}
