//! Staleness cache for the full status block.
//!
//! Reading `GET ALLS` is the heaviest exchange on the stove bus, so one
//! snapshot is shared by the `GET ALLS` handler and discovery. A snapshot
//! younger than [`STATUS_CACHE_TTL`] is reused; anything older is re-read
//! by whichever caller observes it. The cache has a single writer (the
//! control loop) and is stamped with a monotonic clock, so calls sharing
//! the same `now` refresh at most once.

use std::time::{Duration, Instant};

use crate::device::{AllStatus, StoveDevice};
use crate::error::DeviceResult;

pub const STATUS_CACHE_TTL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Default)]
pub struct StatusCache {
    snapshot: Option<(Instant, AllStatus)>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the stored snapshot may still be served at `now`.
    pub fn is_fresh(&self, now: Instant) -> bool {
        match &self.snapshot {
            Some((at, _)) => now.saturating_duration_since(*at) <= STATUS_CACHE_TTL,
            None => false,
        }
    }

    /// Return the cached snapshot, reading the device first when stale.
    ///
    /// A failed read leaves the previous snapshot untouched.
    pub fn get_or_refresh<D>(&mut self, now: Instant, device: &mut D) -> DeviceResult<AllStatus>
    where
        D: StoveDevice + ?Sized,
    {
        if let Some((_, status)) = self.snapshot.as_ref().filter(|_| self.is_fresh(now)) {
            return Ok(status.clone());
        }

        let status = device.get_all_status()?;
        tracing::debug!(category = "cache", "Refreshed status snapshot");
        self.snapshot = Some((now, status.clone()));
        Ok(status)
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        self.snapshot.as_ref().map(|(at, _)| *at)
    }

    pub fn invalidate(&mut self) {
        self.snapshot = None;
    }
}
