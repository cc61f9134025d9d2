mod common;

use common::{codec, empty_profile, profile, window};
use pretty_assertions::assert_eq;
use rtprof::profile::{check_valid, JsonCodec, ProfileCodec};
use rtprof::utils::error::{FetchError, UpdateError};
use rtprof::{Aggregator, Fetcher};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn aggregator() -> Aggregator {
    Aggregator::new(codec(), Arc::new(empty_profile()))
}

#[test]
fn test_fetch_before_any_update_is_empty() {
    let agg = aggregator();

    let current = agg.fetch_source("").unwrap();
    assert!(current.is_empty());
    assert!(!agg.has_profile());

    let reset = agg.fetch_source("-").unwrap();
    assert!(reset.is_empty());
    assert!(agg.has_profile());
}

#[test]
fn test_reset_is_idempotent() {
    let agg = aggregator();
    agg.update(&window(&[("main;work", 7)])).unwrap();

    agg.reset();
    let once = agg.current();
    agg.reset();
    let twice = agg.current();

    assert_eq!(*once, *twice);
    assert!(Arc::ptr_eq(&once, &agg.empty_profile()));
}

#[test]
fn test_unknown_source_does_not_mutate() {
    let agg = aggregator();
    agg.update(&window(&[("main;work", 7)])).unwrap();
    let before = agg.current();

    let err = agg
        .fetch("http://host:6060/debug/profile", Duration::ZERO, Duration::ZERO)
        .unwrap_err();

    assert_eq!(
        err,
        FetchError::UnknownSource("http://host:6060/debug/profile".to_string())
    );
    assert_eq!(err.to_string(), "unknown source http://host:6060/debug/profile");
    assert!(Arc::ptr_eq(&before, &agg.current()));
}

#[test]
fn test_merge_sums_every_window() {
    let agg = aggregator();
    let windows: &[&[(&str, u64)]] = &[
        &[("main;parse", 3), ("main;eval", 4)],
        &[("main;eval", 6)],
        &[("main;parse", 1), ("main;io;read", 2)],
    ];
    for samples in windows {
        agg.update(&window(samples)).unwrap();
    }

    let current = agg.current();
    assert_eq!(current.weight_of("main;parse"), 4);
    assert_eq!(current.weight_of("main;eval"), 10);
    assert_eq!(current.weight_of("main;io;read"), 2);
    assert_eq!(current.total_weight(), 16);
}

#[test]
fn test_pruning_never_loses_merged_weight() {
    let agg = aggregator();
    let pruned = |weight| {
        let p = profile(&[("pprof::timer;main;work", weight)])
            .with_drop_frames(vec!["pprof::".to_string()]);
        JsonCodec.encode(&p).unwrap()
    };

    agg.update(&pruned(5)).unwrap();
    agg.update(&pruned(5)).unwrap();
    agg.update(&pruned(5)).unwrap();

    assert_eq!(agg.current().total_weight(), 15);
}

#[test]
fn test_invalid_window_is_rejected_without_side_effects() {
    let agg = aggregator();
    agg.update(&window(&[("main", 5)])).unwrap();
    let before = agg.current();

    // Duplicate stacks fail validation at decode time.
    let duplicate = JsonCodec
        .encode(&profile(&[("main;a", 1), ("main;a", 2)]))
        .unwrap();
    let err = agg.update(&duplicate).unwrap_err();
    assert!(matches!(err, UpdateError::Decode(_)));

    let err = agg.update(b"   ").unwrap_err();
    assert!(matches!(err, UpdateError::Decode(_)));

    assert!(Arc::ptr_eq(&before, &agg.current()));
}

#[test]
fn test_concurrent_fetch_never_sees_partial_merge() {
    let agg = Arc::new(aggregator());
    agg.update(&window(&[("main;a", 1), ("main;b", 1)])).unwrap();

    let writer = {
        let agg = Arc::clone(&agg);
        thread::spawn(move || {
            for _ in 0..200 {
                agg.update(&window(&[("main;a", 1), ("main;b", 1)])).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let agg = Arc::clone(&agg);
            thread::spawn(move || {
                for _ in 0..200 {
                    let p = agg.fetch_source("").unwrap();
                    check_valid(&p).unwrap();
                    // Both stacks always advance together.
                    assert_eq!(p.weight_of("main;a"), p.weight_of("main;b"));
                    JsonCodec.encode(&p).unwrap();
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(agg.current().weight_of("main;a"), 201);
}

#[test]
fn test_reset_racing_updates_is_never_lost() {
    let agg = Arc::new(aggregator());

    let writer = {
        let agg = Arc::clone(&agg);
        thread::spawn(move || {
            for _ in 0..100 {
                agg.update(&window(&[("main", 1)])).unwrap();
            }
        })
    };
    for _ in 0..20 {
        agg.fetch_source("-").unwrap();
    }
    writer.join().unwrap();

    // The last reset is followed by at most the remaining updates.
    let current = agg.current();
    assert!(current.weight_of("main") <= 100);

    let reset = agg.fetch_source("-").unwrap();
    assert!(reset.is_empty());
    assert!(agg.current().is_empty());
}
