//! Top-N function table from a profile.
//!
//! Flat is the value attributed to a function as the leaf of a stack, cum
//! the value of every sample whose stack contains it. These are the first
//! places to look when optimizing.

use crate::profile::Profile;
use crate::utils::config::RUNTIME_FRAME_PREFIXES;
use log::debug;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum OptionError {
    #[error("invalid unit string")]
    Unit,

    #[error("invalid sort order {0:?}, expected flat or cum")]
    Sort(String),

    #[error("invalid runtime selector {0:?}, expected default, exclude or only")]
    Selector(String),
}

/// Display unit for time-valued profiles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Unit {
    #[default]
    #[serde(rename = "s")]
    Second,
    #[serde(rename = "ms")]
    Millisecond,
    #[serde(rename = "us")]
    Microsecond,
}

impl Unit {
    fn nanos(self) -> f64 {
        match self {
            Unit::Second => 1e9,
            Unit::Millisecond => 1e6,
            Unit::Microsecond => 1e3,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Unit::Second => "s",
            Unit::Millisecond => "ms",
            Unit::Microsecond => "us",
        })
    }
}

impl FromStr for Unit {
    type Err = OptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s" => Ok(Unit::Second),
            "ms" => Ok(Unit::Millisecond),
            "us" => Ok(Unit::Microsecond),
            _ => Err(OptionError::Unit),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    #[default]
    Flat,
    Cum,
}

impl FromStr for SortBy {
    type Err = OptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat" => Ok(SortBy::Flat),
            "cum" => Ok(SortBy::Cum),
            other => Err(OptionError::Sort(other.to_string())),
        }
    }
}

/// Treatment of runtime/library frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Selector {
    #[default]
    Default,
    Exclude,
    Only,
}

impl FromStr for Selector {
    type Err = OptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Selector::Default),
            "exclude" => Ok(Selector::Exclude),
            "only" => Ok(Selector::Only),
            other => Err(OptionError::Selector(other.to_string())),
        }
    }
}

/// Report options. Patterns match frames by substring.
#[derive(Debug, Clone, Default)]
pub struct TopOptions {
    pub unit: Unit,
    pub sort: SortBy,
    pub runtime: Selector,
    /// Keep only samples with a frame matching any pattern
    pub focus: Vec<String>,
    /// Remove matching frames
    pub hide: Vec<String>,
    /// Keep only matching frames
    pub show: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub flat: f64,
    pub flat_percent: f64,
    pub sum_percent: f64,
    pub cum: f64,
    pub cum_percent: f64,
    pub function: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub unit: Unit,
    pub rows: Vec<Row>,
    pub label: String,
    pub errors: Vec<String>,
}

impl Report {
    /// Plain-text table in the familiar `flat flat% sum% cum cum%` layout
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        if !self.label.is_empty() {
            out.push_str(&self.label);
            out.push('\n');
        }
        for e in &self.errors {
            out.push_str(e);
            out.push('\n');
        }
        out.push_str(&format!(
            "{:>10} {:>7} {:>7} {:>10} {:>7}  function ({})\n",
            "flat", "flat%", "sum%", "cum", "cum%", self.unit
        ));
        for row in &self.rows {
            out.push_str(&format!(
                "{:>10.3} {:>6.2}% {:>6.2}% {:>10.3} {:>6.2}%  {}\n",
                row.flat, row.flat_percent, row.sum_percent, row.cum, row.cum_percent, row.function
            ));
        }
        out
    }
}

/// Compute the top `count` functions of `profile`
pub fn top(profile: &Profile, count: usize, options: &TopOptions, label: &str) -> Report {
    let mut hide: Vec<&str> = options.hide.iter().map(String::as_str).collect();
    let mut show: Vec<&str> = options.show.iter().map(String::as_str).collect();
    match options.runtime {
        Selector::Default => {}
        Selector::Exclude => hide.extend_from_slice(RUNTIME_FRAME_PREFIXES),
        Selector::Only => show.extend_from_slice(RUNTIME_FRAME_PREFIXES),
    }
    let focus: Vec<&str> = options.focus.iter().map(String::as_str).collect();

    let mut flat: HashMap<&str, u64> = HashMap::new();
    let mut cum: HashMap<&str, u64> = HashMap::new();
    let mut total: u64 = 0;

    for sample in &profile.samples {
        if !focus.is_empty() && !sample.frames().any(|f| matches_any(f, &focus)) {
            continue;
        }
        let frames: Vec<&str> = sample
            .frames()
            .filter(|f| !matches_any(f, &hide))
            .filter(|f| show.is_empty() || matches_any(f, &show))
            .collect();
        let Some(&leaf) = frames.last() else {
            continue;
        };

        total = total.saturating_add(sample.weight);
        let leaf_total = flat.entry(leaf).or_insert(0);
        *leaf_total = leaf_total.saturating_add(sample.weight);
        let unique: HashSet<&str> = frames.iter().copied().collect();
        for f in unique {
            let cum_total = cum.entry(f).or_insert(0);
            *cum_total = cum_total.saturating_add(sample.weight);
        }
    }

    debug!(
        "Top table over {} functions, total weight {}",
        cum.len(),
        total
    );

    let mut functions: Vec<(&str, u64, u64)> = cum
        .iter()
        .map(|(f, c)| (*f, flat.get(f).copied().unwrap_or(0), *c))
        .collect();
    functions.sort_by(|a, b| {
        let (ka, kb) = match options.sort {
            SortBy::Flat => ((a.1, a.2), (b.1, b.2)),
            SortBy::Cum => ((a.2, a.1), (b.2, b.1)),
        };
        kb.cmp(&ka).then_with(|| a.0.cmp(&b.0))
    });

    let convert = |v: u64| to_display_unit(profile, options.unit, v);
    let percent = |v: u64| {
        if total > 0 {
            v as f64 * 100.0 / total as f64
        } else {
            0.0
        }
    };

    let mut sum_percent = 0.0;
    let rows = functions
        .into_iter()
        .take(count)
        .map(|(function, f, c)| {
            sum_percent += percent(f);
            Row {
                flat: convert(f),
                flat_percent: percent(f),
                sum_percent,
                cum: convert(c),
                cum_percent: percent(c),
                function: function.to_string(),
            }
        })
        .collect();

    let mut errors = Vec::new();
    if total == 0 && !profile.is_empty() {
        errors.push("no samples matched the current filters".to_string());
    }

    Report {
        unit: options.unit,
        rows,
        label: label.to_string(),
        errors,
    }
}

fn matches_any(frame: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| frame.contains(p))
}

/// Convert a sample value to the display unit; counts are shown as-is
fn to_display_unit(profile: &Profile, unit: Unit, value: u64) -> f64 {
    match profile.sample_type.unit.nanos() {
        Some(nanos) => value as f64 * nanos as f64 / unit.nanos(),
        None => value as f64,
    }
}
