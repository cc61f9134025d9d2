//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use rtprof::profile::{CollapsedStack, JsonCodec, Profile, ProfileCodec, SampleType};
use rtprof::utils::error::CaptureError;
use rtprof::SnapshotSource;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Empty CPU profile with a 1ns period
pub fn empty_profile() -> Profile {
    Profile::empty(SampleType::cpu(), 1)
}

pub fn profile(samples: &[(&str, u64)]) -> Profile {
    empty_profile().with_samples(
        samples
            .iter()
            .map(|(stack, weight)| CollapsedStack::new(*stack, *weight))
            .collect(),
    )
}

/// Encoded window holding `samples`
pub fn window(samples: &[(&str, u64)]) -> Vec<u8> {
    JsonCodec
        .encode(&profile(samples))
        .expect("fixture profile encodes")
}

/// What one scripted window produces when closed
pub enum Window {
    Bytes(Vec<u8>),
    Fail,
}

/// Snapshot source replaying a fixed script of windows.
///
/// Once the script is exhausted every window is empty. Start/stop calls
/// are counted through shared handles so tests can observe a source that
/// has been moved into a collector.
#[derive(Default)]
pub struct ScriptedSource {
    script: VecDeque<Window>,
    capturing: bool,
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, window: Window) -> Self {
        self.script.push_back(window);
        self
    }

    pub fn then_samples(self, samples: &[(&str, u64)]) -> Self {
        self.then(Window::Bytes(window(samples)))
    }

    pub fn then_corrupt(self) -> Self {
        self.then(Window::Bytes(b"{ not a profile".to_vec()))
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl SnapshotSource for ScriptedSource {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.capturing {
            return Err(CaptureError::AlreadyCapturing);
        }
        self.capturing = true;
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<Vec<u8>, CaptureError> {
        if !self.capturing {
            return Err(CaptureError::NotCapturing);
        }
        self.capturing = false;
        self.stops.fetch_add(1, Ordering::SeqCst);
        match self.script.pop_front() {
            Some(Window::Bytes(bytes)) => Ok(bytes),
            Some(Window::Fail) => Err(CaptureError::NotCapturing),
            None => Ok(window(&[])),
        }
    }
}

pub fn codec() -> Arc<dyn ProfileCodec> {
    Arc::new(JsonCodec)
}
