//! Background loop that captures fixed-length windows and folds each one
//! into the aggregator.
//!
//! States: Idle -> Capturing -> Draining -> Capturing -> ... -> Stopped

use crate::aggregator::Aggregator;
use crate::capture::SnapshotSource;
use crate::signal::CancelSignal;
use crate::utils::error::{CaptureError, UpdateError};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Idle,
    Capturing,
    Draining,
    Stopped,
}

/// Why a tick produced no merge
#[derive(Error, Debug)]
pub enum TickError {
    #[error("failed to capture window: {0}")]
    Capture(#[from] CaptureError),

    #[error("failed to merge profiles: {0}")]
    Update(#[from] UpdateError),
}

/// Counters for one run of the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorReport {
    pub ticks: u64,
    pub merged: u64,
    pub failed: u64,
}

/// What the loop hands back when it exits
pub struct CollectorOutcome {
    pub source: Box<dyn SnapshotSource>,
    pub report: CollectorReport,
}

pub struct CollectorLoop {
    source: Box<dyn SnapshotSource>,
    aggregator: Arc<Aggregator>,
    interval: Duration,
    state: CollectorState,
    report: CollectorReport,
}

impl CollectorLoop {
    pub fn new(
        source: Box<dyn SnapshotSource>,
        aggregator: Arc<Aggregator>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            aggregator,
            interval,
            state: CollectorState::Idle,
            report: CollectorReport::default(),
        }
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    pub fn report(&self) -> CollectorReport {
        self.report
    }

    /// Open the first capture window
    pub fn begin(&mut self) {
        self.open_window();
    }

    /// Drain the current window into the aggregator and open the next one.
    ///
    /// A failed window is discarded, never retried; the next window starts
    /// regardless.
    pub fn tick(&mut self) -> Result<(), TickError> {
        self.report.ticks += 1;
        self.state = CollectorState::Draining;

        let result = self
            .source
            .stop()
            .map_err(TickError::from)
            .and_then(|bytes| self.aggregator.update(&bytes).map_err(TickError::from));

        match &result {
            Ok(()) => self.report.merged += 1,
            Err(_) => self.report.failed += 1,
        }

        self.open_window();
        result
    }

    /// Close any open window without merging it
    pub fn finish(&mut self) {
        if self.state == CollectorState::Capturing {
            if let Err(e) = self.source.stop() {
                debug!("Discarding partial window failed: {}", e);
            }
        }
        self.state = CollectorState::Stopped;
    }

    /// Run until `cancel` fires.
    ///
    /// Cancellation is checked ahead of the timer on every iteration, so no
    /// tick runs once cancellation has been observed. Source calls run on
    /// the blocking pool since closing a window symbolizes synchronously.
    pub async fn run(mut self, mut cancel: CancelSignal) -> CollectorOutcome {
        info!("Collector started, interval {:?}", self.interval);
        let (this, ()) = self.on_blocking_pool(Self::begin).await;
        self = this;

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let (this, result) = self.on_blocking_pool(Self::tick).await;
                    self = this;
                    if let Err(e) = result {
                        error!("{}", e);
                    }
                }
            }
        }

        let (this, ()) = self.on_blocking_pool(Self::finish).await;
        self = this;
        info!(
            "Collector stopped after {} ticks ({} merged, {} failed)",
            self.report.ticks, self.report.merged, self.report.failed
        );

        CollectorOutcome {
            source: self.source,
            report: self.report,
        }
    }

    async fn on_blocking_pool<R, F>(self, f: F) -> (Self, R)
    where
        R: Send + 'static,
        F: FnOnce(&mut Self) -> R + Send + 'static,
    {
        let joined = tokio::task::spawn_blocking(move || {
            let mut this = self;
            let result = f(&mut this);
            (this, result)
        })
        .await;
        match joined {
            Ok(done) => done,
            // Blocking tasks are never aborted, so this is a panic in the source.
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }

    fn open_window(&mut self) {
        match self.source.start() {
            Ok(()) => self.state = CollectorState::Capturing,
            Err(e) => {
                warn!("Failed to start capture window: {}", e);
                self.state = CollectorState::Idle;
            }
        }
    }
}
