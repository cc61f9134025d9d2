//! rtprof
//!
//! Continuous in-process profiling: a background collector captures
//! fixed-length sampling windows, folds them into one cumulative
//! profile, and a loopback-only HTTP endpoint serves the result.
//!
//! ## Getting Started
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use std::time::Duration;
//!
//! let controller = rtprof::ProfilerController::cpu();
//! controller.start(Duration::from_secs(5), 8080).await?;
//! // ... GET http://localhost:8080/top
//! controller.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod capture;
pub mod collector;
pub mod lifecycle;
pub mod profile;
pub mod report;
pub mod server;
pub mod signal;
pub mod utils;

pub use aggregator::{Aggregator, Fetcher};
pub use capture::SnapshotSource;
pub use collector::{CollectorLoop, CollectorReport, CollectorState};
pub use lifecycle::ProfilerController;
pub use profile::{JsonCodec, Profile, ProfileCodec};
pub use server::{AccessControlledServer, RequestRouter, ServerHandle};
pub use signal::{CancelSignal, Cancellation};
pub use utils::config::ControllerConfig;
