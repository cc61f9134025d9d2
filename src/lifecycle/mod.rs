//! Lifecycle controller: at most one running aggregation per controller.
//!
//! `start` is idempotent while running and `stop` is a no-op when idle.
//! Dropping a running controller cancels its tasks as well, since both
//! cancellation senders go away with it.

use crate::aggregator::{Aggregator, Fetcher};
use crate::capture::SnapshotSource;
use crate::collector::{CollectorLoop, CollectorOutcome, CollectorReport};
use crate::profile::{Profile, ProfileCodec};
use crate::report::request_router;
use crate::server::{AccessControlledServer, ServerHandle};
use crate::signal::Cancellation;
use crate::utils::config::ControllerConfig;
use crate::utils::error::{FetchError, LifecycleError};
use log::{debug, error, info};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[cfg(unix)]
use crate::capture::CpuSampler;
#[cfg(unix)]
use crate::profile::JsonCodec;

struct RunningInstance {
    aggregator: Arc<Aggregator>,
    cancellation: Cancellation,
    collector: JoinHandle<CollectorOutcome>,
    server: ServerHandle,
}

struct ControllerState {
    /// Parked here between runs; owned by the collector while running
    source: Option<Box<dyn SnapshotSource>>,
    running: Option<RunningInstance>,
}

pub struct ProfilerController {
    codec: Arc<dyn ProfileCodec>,
    empty: OnceLock<Arc<Profile>>,
    state: Mutex<ControllerState>,
}

impl ProfilerController {
    pub fn new(source: impl SnapshotSource + 'static, codec: Arc<dyn ProfileCodec>) -> Self {
        Self {
            codec,
            empty: OnceLock::new(),
            state: Mutex::new(ControllerState {
                source: Some(Box::new(source)),
                running: None,
            }),
        }
    }

    /// Controller sampling this process's CPU usage
    #[cfg(unix)]
    pub fn cpu() -> Self {
        Self::new(CpuSampler::default(), Arc::new(JsonCodec))
    }

    /// Start collecting every `interval` and serve on `localhost:port`
    pub async fn start(&self, interval: Duration, port: u16) -> Result<(), LifecycleError> {
        self.start_with(ControllerConfig::new(interval, port)).await
    }

    /// Start with an explicit bind host
    ///
    /// # Errors
    /// * `LifecycleError::InvalidInterval` - zero interval
    /// * `LifecycleError::EmptyProfile` - the baseline capture failed
    /// * `LifecycleError::Serve` - the listener could not be bound
    pub async fn start_with(&self, config: ControllerConfig) -> Result<(), LifecycleError> {
        if config.interval.is_zero() {
            return Err(LifecycleError::InvalidInterval);
        }

        let mut state = self.state.lock().await;
        if state.running.is_some() {
            debug!("Profiler already running, start ignored");
            return Ok(());
        }

        let mut source = state
            .source
            .take()
            .ok_or(LifecycleError::SourceUnavailable)?;

        let empty = match self.empty_profile(&mut *source) {
            Ok(empty) => empty,
            Err(e) => {
                state.source = Some(source);
                return Err(e);
            }
        };
        let aggregator = Arc::new(Aggregator::new(Arc::clone(&self.codec), empty));

        let fetcher: Arc<dyn Fetcher> = aggregator.clone();
        let router = request_router(fetcher, Arc::clone(&self.codec));
        let server =
            match AccessControlledServer::bind(&config.listen_address(), &config.host, router)
                .await
            {
                Ok(server) => server.spawn(),
                Err(e) => {
                    state.source = Some(source);
                    return Err(e.into());
                }
            };

        let (cancellation, signal) = Cancellation::new();
        let collector = tokio::spawn(
            CollectorLoop::new(source, Arc::clone(&aggregator), config.interval).run(signal),
        );

        info!(
            "Profiler started: every {:?}, serving on {}",
            config.interval,
            server.local_addr()
        );

        state.running = Some(RunningInstance {
            aggregator,
            cancellation,
            collector,
            server,
        });

        Ok(())
    }

    /// Stop collecting and serving
    ///
    /// Returns the finished collector's counters, or `None` if nothing
    /// was running.
    pub async fn stop(&self) -> Result<Option<CollectorReport>, LifecycleError> {
        let mut state = self.state.lock().await;
        let Some(mut running) = state.running.take() else {
            return Ok(None);
        };

        running.cancellation.cancel();
        let served = running.server.shutdown().await;

        let report = match running.collector.await {
            Ok(outcome) => {
                state.source = Some(outcome.source);
                Some(outcome.report)
            }
            Err(e) => {
                error!("Collector task failed: {}", e);
                None
            }
        };

        info!("Profiler stopped");
        served?;
        Ok(report)
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running.is_some()
    }

    /// Address the server is bound to, while running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let state = self.state.lock().await;
        state.running.as_ref().map(|r| r.server.local_addr())
    }

    pub async fn aggregator(&self) -> Option<Arc<Aggregator>> {
        let state = self.state.lock().await;
        state.running.as_ref().map(|r| Arc::clone(&r.aggregator))
    }

    /// Fetch from the running aggregator; see `Aggregator::fetch_source`
    pub async fn fetch(&self, source: &str) -> Result<Arc<Profile>, FetchError> {
        let aggregator = self.aggregator().await.ok_or(FetchError::NotRunning)?;
        aggregator.fetch_source(source)
    }

    /// Baseline "zero" profile, captured once by opening and immediately
    /// closing a window
    fn empty_profile(
        &self,
        source: &mut dyn SnapshotSource,
    ) -> Result<Arc<Profile>, LifecycleError> {
        if let Some(empty) = self.empty.get() {
            return Ok(Arc::clone(empty));
        }

        source.start().map_err(empty_failed)?;
        let bytes = source.stop().map_err(empty_failed)?;
        let profile = self.codec.decode(&bytes).map_err(empty_failed)?;

        debug!("Computed empty profile ({})", profile.sample_type);
        Ok(Arc::clone(self.empty.get_or_init(|| Arc::new(profile))))
    }
}

fn empty_failed(e: impl std::fmt::Display) -> LifecycleError {
    LifecycleError::EmptyProfile(e.to_string())
}
