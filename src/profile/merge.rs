//! Merging scaled profiles and pruning uninteresting frames.

use super::schema::{CollapsedStack, Profile};
use crate::utils::config::PROFILE_VERSION;
use crate::utils::error::CodecError;
use log::debug;
use std::collections::HashMap;

/// Merge profiles into one, summing the weights of identical stacks
///
/// Profiles must already be scaled to the same sample type (see
/// `scale_profiles`).
///
/// # Errors
/// * `CodecError::NoProfiles` - `profiles` is empty
/// * `CodecError::IncompatibleSampleTypes` - sample types differ
pub fn merge_profiles(profiles: &[Profile]) -> Result<Profile, CodecError> {
    let first = profiles.first().ok_or(CodecError::NoProfiles)?;

    for p in &profiles[1..] {
        if p.sample_type != first.sample_type {
            return Err(CodecError::IncompatibleSampleTypes(
                first.sample_type.to_string(),
                p.sample_type.to_string(),
            ));
        }
    }

    let mut stack_map: HashMap<&str, u64> = HashMap::new();
    let mut duration_nanos: u64 = 0;
    let mut time_nanos: i64 = 0;
    let mut period: u64 = 0;
    let mut drop_frames: Vec<String> = Vec::new();

    for p in profiles {
        for sample in &p.samples {
            let total = stack_map.entry(sample.stack.as_str()).or_insert(0);
            *total = total.saturating_add(sample.weight);
        }
        duration_nanos = duration_nanos.saturating_add(p.duration_nanos);
        if p.time_nanos != 0 && (time_nanos == 0 || p.time_nanos < time_nanos) {
            time_nanos = p.time_nanos;
        }
        period = period.max(p.period);
        for frame in &p.drop_frames {
            if !drop_frames.contains(frame) {
                drop_frames.push(frame.clone());
            }
        }
    }

    let samples = sorted_stacks(
        stack_map
            .into_iter()
            .map(|(stack, weight)| CollapsedStack::new(stack, weight)),
    );

    debug!(
        "Merged {} profiles into {} unique stacks",
        profiles.len(),
        samples.len()
    );

    Ok(Profile {
        version: PROFILE_VERSION.to_string(),
        sample_type: first.sample_type.clone(),
        period,
        duration_nanos,
        time_nanos,
        drop_frames,
        samples,
    })
}

/// Strip frames matching the profile's `drop_frames` prefixes
///
/// Walking from the root, leading matching frames are kept; the first
/// matching frame after a non-matching one is removed together with
/// everything beneath it. A stack is therefore never emptied and its
/// weight is never lost. Zero-weight samples are dropped and identical
/// stacks are folded back together.
pub fn remove_uninteresting(profile: &mut Profile) {
    let drop_frames = &profile.drop_frames;
    let mut stack_map: HashMap<String, u64> = HashMap::new();

    for sample in profile.samples.drain(..) {
        if sample.weight == 0 {
            continue;
        }
        let kept = pruned_frames(sample.frames(), drop_frames);
        let total = stack_map.entry(kept.join(";")).or_insert(0);
        *total = total.saturating_add(sample.weight);
    }

    profile.samples = sorted_stacks(
        stack_map
            .into_iter()
            .map(|(stack, weight)| CollapsedStack::new(stack, weight)),
    );
}

fn pruned_frames<'a>(
    frames: impl Iterator<Item = &'a str>,
    drop_frames: &[String],
) -> Vec<&'a str> {
    let is_dropped = |frame: &str| drop_frames.iter().any(|d| frame.starts_with(d.as_str()));
    let mut kept = Vec::new();
    let mut seen_user_frame = false;
    for frame in frames {
        if is_dropped(frame) {
            if seen_user_frame {
                break;
            }
        } else {
            seen_user_frame = true;
        }
        kept.push(frame);
    }
    kept
}

/// Heaviest stacks first, ties broken by stack for stable output
fn sorted_stacks(stacks: impl Iterator<Item = CollapsedStack>) -> Vec<CollapsedStack> {
    let mut stacks: Vec<CollapsedStack> = stacks.collect();
    stacks.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.stack.cmp(&b.stack)));
    stacks
}
