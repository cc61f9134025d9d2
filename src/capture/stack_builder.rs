//! Build collapsed stacks from sampled call chains.
//!
//! Samplers report call chains leaf first, with inlined functions grouped
//! per frame. Collapsed stacks are root first: "main;execute;storage_read 1000"
//! means main called execute which called storage_read, and 1000 units of
//! the sample value were attributed to that path.

use crate::profile::CollapsedStack;
use log::debug;
use std::collections::HashMap;

/// One sampled call chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampledChain {
    /// Frames from leaf to root; each frame lists its symbols innermost first
    pub frames: Vec<Vec<String>>,

    /// Thread the sample was taken on, used as the stack root when set
    pub thread: Option<String>,

    /// Number of times this chain was sampled
    pub count: u64,
}

/// Fold sampled chains into collapsed stacks
///
/// # Arguments
/// * `chains` - Sampled call chains
/// * `period` - Value of one sample (e.g. nanoseconds per tick)
///
/// # Returns
/// Collapsed stacks sorted by weight (descending), one per unique path
pub fn build_collapsed_stacks(chains: &[SampledChain], period: u64) -> Vec<CollapsedStack> {
    debug!("Building collapsed stacks from {} sampled chains", chains.len());

    // Map to aggregate stacks: stack_string -> total_weight
    let mut stack_map: HashMap<String, u64> = HashMap::new();

    for chain in chains {
        let mut names: Vec<&str> = Vec::new();
        if let Some(thread) = chain.thread.as_deref().filter(|t| !t.trim().is_empty()) {
            names.push(symbol_name(thread));
        }
        for frame in chain.frames.iter().rev() {
            for symbol in frame.iter().rev() {
                names.push(symbol_name(symbol));
            }
        }
        if names.is_empty() {
            continue;
        }

        let weight = chain.count.saturating_mul(period);
        let total = stack_map.entry(names.join(";")).or_insert(0);
        *total = total.saturating_add(weight);
    }

    let mut stacks: Vec<CollapsedStack> = stack_map
        .into_iter()
        .map(|(stack, weight)| CollapsedStack::new(stack, weight))
        .collect();

    stacks.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.stack.cmp(&b.stack)));

    debug!("Built {} unique collapsed stacks", stacks.len());

    stacks
}

/// Frame names must not break the folded format
fn symbol_name(symbol: &str) -> &str {
    let trimmed = symbol.trim();
    if trimmed.is_empty() || trimmed.contains([';', '\n', '\r']) {
        "unknown"
    } else {
        trimmed
    }
}
