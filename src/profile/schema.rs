//! Profile data model.
//!
//! A profile is a flat list of collapsed stacks with one value each,
//! plus the header fields needed to merge profiles meaningfully.
//! Format of a stack: "root;caller;leaf"

use crate::utils::config::PROFILE_VERSION;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single collapsed stack entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollapsedStack {
    /// Stack trace as semicolon-separated string, root first
    pub stack: String,

    /// Sample value attributed to this stack, in the profile's unit
    pub weight: u64,
}

impl CollapsedStack {
    pub fn new(stack: impl Into<String>, weight: u64) -> Self {
        Self {
            stack: stack.into(),
            weight,
        }
    }

    /// Frames from root to leaf
    pub fn frames(&self) -> impl Iterator<Item = &str> {
        self.stack.split(';')
    }

    /// Innermost frame
    pub fn leaf(&self) -> &str {
        self.stack.rsplit(';').next().unwrap_or(&self.stack)
    }

    /// Folded-format line: "root;leaf 1000"
    pub fn to_line(&self) -> String {
        format!("{} {}", self.stack, self.weight)
    }
}

/// Unit of a sample value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueUnit {
    Count,
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
}

impl ValueUnit {
    /// Nanoseconds per unit, `None` for dimensionless counts
    pub fn nanos(self) -> Option<u64> {
        match self {
            ValueUnit::Count => None,
            ValueUnit::Nanoseconds => Some(1),
            ValueUnit::Microseconds => Some(1_000),
            ValueUnit::Milliseconds => Some(1_000_000),
            ValueUnit::Seconds => Some(1_000_000_000),
        }
    }

    pub fn is_time(self) -> bool {
        self.nanos().is_some()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueUnit::Count => "count",
            ValueUnit::Nanoseconds => "nanoseconds",
            ValueUnit::Microseconds => "microseconds",
            ValueUnit::Milliseconds => "milliseconds",
            ValueUnit::Seconds => "seconds",
        }
    }
}

impl fmt::Display for ValueUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the sample values measure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleType {
    /// e.g. "cpu"
    pub name: String,
    pub unit: ValueUnit,
}

impl SampleType {
    pub fn new(name: impl Into<String>, unit: ValueUnit) -> Self {
        Self {
            name: name.into(),
            unit,
        }
    }

    /// CPU time in nanoseconds, what the sampler produces
    pub fn cpu() -> Self {
        Self::new("cpu", ValueUnit::Nanoseconds)
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.unit)
    }
}

/// Structured profile exchanged between the sampler, the aggregator and
/// the reporting side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Schema version for compatibility checking
    pub version: String,

    pub sample_type: SampleType,

    /// Sampling period, in the sample type's unit
    #[serde(default)]
    pub period: u64,

    /// Wall time covered by the profile
    #[serde(default)]
    pub duration_nanos: u64,

    /// Start of the covered window (unix nanos, 0 = unknown)
    #[serde(default)]
    pub time_nanos: i64,

    /// Frame prefixes pruned by `remove_uninteresting`
    #[serde(default)]
    pub drop_frames: Vec<String>,

    #[serde(default)]
    pub samples: Vec<CollapsedStack>,
}

impl Profile {
    /// Structurally valid profile with no samples
    pub fn empty(sample_type: SampleType, period: u64) -> Self {
        Self {
            version: PROFILE_VERSION.to_string(),
            sample_type,
            period,
            duration_nanos: 0,
            time_nanos: 0,
            drop_frames: Vec::new(),
            samples: Vec::new(),
        }
    }

    pub fn with_samples(mut self, samples: Vec<CollapsedStack>) -> Self {
        self.samples = samples;
        self
    }

    pub fn with_duration_nanos(mut self, duration_nanos: u64) -> Self {
        self.duration_nanos = duration_nanos;
        self
    }

    pub fn with_drop_frames(mut self, drop_frames: Vec<String>) -> Self {
        self.drop_frames = drop_frames;
        self
    }

    /// Sum of all sample values
    pub fn total_weight(&self) -> u64 {
        self.samples
            .iter()
            .fold(0u64, |total, s| total.saturating_add(s.weight))
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Weight attributed to an exact stack
    pub fn weight_of(&self, stack: &str) -> u64 {
        self.samples
            .iter()
            .filter(|s| s.stack == stack)
            .fold(0u64, |total, s| total.saturating_add(s.weight))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapsed_stack_to_line() {
        let stack = CollapsedStack::new("main;execute;storage_read", 1000);
        assert_eq!(stack.to_line(), "main;execute;storage_read 1000");
        assert_eq!(stack.leaf(), "storage_read");
        assert_eq!(stack.frames().count(), 3);
    }

    #[test]
    fn test_unit_nanos() {
        assert_eq!(ValueUnit::Milliseconds.nanos(), Some(1_000_000));
        assert!(!ValueUnit::Count.is_time());
    }

    #[test]
    fn test_unit_serde_lowercase() {
        let json = serde_json::to_string(&ValueUnit::Microseconds).unwrap();
        assert_eq!(json, "\"microseconds\"");
    }

    #[test]
    fn test_total_weight() {
        let profile = Profile::empty(SampleType::cpu(), 10).with_samples(vec![
            CollapsedStack::new("a;b", 30),
            CollapsedStack::new("a;c", 12),
        ]);
        assert_eq!(profile.total_weight(), 42);
        assert_eq!(profile.weight_of("a;c"), 12);
        assert_eq!(profile.weight_of("a"), 0);
    }
}
