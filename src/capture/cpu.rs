//! In-process CPU sampler backed by the `pprof` crate.

use super::stack_builder::{build_collapsed_stacks, SampledChain};
use super::SnapshotSource;
use crate::profile::{JsonCodec, Profile, ProfileCodec, SampleType};
use crate::utils::config::SamplerConfig;
use crate::utils::error::CaptureError;
use chrono::Utc;
use log::debug;
use pprof::{ProfilerGuard, ProfilerGuardBuilder};

/// Samples the whole process with SIGPROF at a fixed frequency.
///
/// Only one sampler may be active per process; `start` fails while
/// another guard is alive.
pub struct CpuSampler {
    config: SamplerConfig,
    guard: Option<ProfilerGuard<'static>>,
    started_at: i64,
}

impl CpuSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self {
            config,
            guard: None,
            started_at: 0,
        }
    }
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::new(SamplerConfig::default())
    }
}

impl SnapshotSource for CpuSampler {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.guard.is_some() {
            return Err(CaptureError::AlreadyCapturing);
        }
        let guard = ProfilerGuardBuilder::default()
            .frequency(self.config.frequency)
            .blocklist(self.config.blocklist.as_slice())
            .build()?;
        self.guard = Some(guard);
        self.started_at = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        Ok(())
    }

    fn stop(&mut self) -> Result<Vec<u8>, CaptureError> {
        let guard = self.guard.take().ok_or(CaptureError::NotCapturing)?;
        let report = guard.report().build()?;
        // Dropping the guard disarms the profiling timer.
        drop(guard);

        let chains: Vec<SampledChain> = report
            .data
            .iter()
            .map(|(frames, count)| SampledChain {
                frames: frames
                    .frames
                    .iter()
                    .map(|symbols| symbols.iter().map(|s| s.name()).collect())
                    .collect(),
                thread: Some(frames.thread_name.clone()),
                count: (*count).max(0) as u64,
            })
            .collect();

        let period = self.config.period_nanos();
        let samples = build_collapsed_stacks(&chains, period);
        debug!(
            "Captured {} stacks over {:?}",
            samples.len(),
            report.timing.duration
        );

        let mut profile = Profile::empty(SampleType::cpu(), period)
            .with_samples(samples)
            .with_duration_nanos(report.timing.duration.as_nanos() as u64)
            .with_drop_frames(self.config.drop_frames.clone());
        profile.time_nanos = self.started_at;

        Ok(JsonCodec.encode(&profile)?)
    }
}
