//! Aggregation of captured windows into one cumulative profile.
//!
//! The aggregator owns the only "current" profile. Every read and write
//! goes through the same lock, and the published profile is swapped as a
//! whole `Arc`, so readers never observe a partially merged profile.

use crate::profile::{Profile, ProfileCodec};
use crate::utils::config::{DEFAULT_SOURCE, RESET_SOURCE};
use crate::utils::error::{FetchError, UpdateError};
use log::debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Source of profiles for the reporting side.
///
/// `duration` and `timeout` exist for fetchers that capture on demand; the
/// aggregator ignores them. The returned label names a URL the profile was
/// re-fetched from, and is empty when there is none.
pub trait Fetcher: Send + Sync {
    fn fetch(
        &self,
        source: &str,
        duration: Duration,
        timeout: Duration,
    ) -> Result<(Arc<Profile>, String), FetchError>;
}

pub struct Aggregator {
    codec: Arc<dyn ProfileCodec>,
    empty: Arc<Profile>,
    current: Mutex<Option<Arc<Profile>>>,
}

impl Aggregator {
    /// Create an aggregator with `empty` as merge base and reset target
    pub fn new(codec: Arc<dyn ProfileCodec>, empty: Arc<Profile>) -> Self {
        Self {
            codec,
            empty,
            current: Mutex::new(None),
        }
    }

    /// Fold one captured window into the cumulative profile
    ///
    /// The first window becomes the cumulative profile as-is. Later windows
    /// are scaled against it, merged, pruned and validated; only a fully
    /// valid result is published.
    ///
    /// # Errors
    /// The stage that failed. The cumulative profile is unchanged.
    pub fn update(&self, bytes: &[u8]) -> Result<(), UpdateError> {
        // Decoding only touches the caller's bytes.
        let window = self.codec.decode(bytes).map_err(UpdateError::Decode)?;

        // Held through the merge so a concurrent reset cannot be overwritten
        // by a merge computed against the pre-reset profile.
        let mut current = self.lock();
        let Some(base) = current.as_ref() else {
            debug!("First window becomes the cumulative profile");
            *current = Some(Arc::new(window));
            return Ok(());
        };

        let mut pfs = vec![Profile::clone(base), window];
        self.codec.scale(&mut pfs).map_err(UpdateError::Scale)?;

        let mut merged = self.codec.merge(&pfs).map_err(UpdateError::Merge)?;
        self.codec.remove_uninteresting(&mut merged);
        self.codec.check_valid(&merged).map_err(UpdateError::Validate)?;

        debug!(
            "Cumulative profile now {} stacks, {} {}",
            merged.samples.len(),
            merged.total_weight(),
            merged.sample_type.unit
        );
        *current = Some(Arc::new(merged));

        Ok(())
    }

    /// Resolve a fetch token
    ///
    /// * `""` - the cumulative profile, or the empty profile if none yet
    /// * `"-"` - reset to the empty profile, then return it, as one step
    ///
    /// # Errors
    /// * `FetchError::UnknownSource` - any other token; state is untouched
    pub fn fetch_source(&self, source: &str) -> Result<Arc<Profile>, FetchError> {
        match source {
            RESET_SOURCE => {
                let mut current = self.lock();
                *current = Some(Arc::clone(&self.empty));
                Ok(Arc::clone(&self.empty))
            }
            DEFAULT_SOURCE => Ok(self.current()),
            other => Err(FetchError::UnknownSource(other.to_string())),
        }
    }

    /// Snapshot of the cumulative profile
    pub fn current(&self) -> Arc<Profile> {
        self.lock()
            .as_ref()
            .map(Arc::clone)
            .unwrap_or_else(|| Arc::clone(&self.empty))
    }

    /// Replace the cumulative profile with the empty profile
    pub fn reset(&self) {
        *self.lock() = Some(Arc::clone(&self.empty));
    }

    /// Whether any window has been published since creation
    pub fn has_profile(&self) -> bool {
        self.lock().is_some()
    }

    pub fn empty_profile(&self) -> Arc<Profile> {
        Arc::clone(&self.empty)
    }

    // A panic while holding the lock never leaves a half-written profile:
    // the slot is only ever assigned a complete Arc.
    fn lock(&self) -> MutexGuard<'_, Option<Arc<Profile>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Fetcher for Aggregator {
    fn fetch(
        &self,
        source: &str,
        _duration: Duration,
        _timeout: Duration,
    ) -> Result<(Arc<Profile>, String), FetchError> {
        self.fetch_source(source).map(|p| (p, String::new()))
    }
}
