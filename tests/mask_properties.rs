//! Property-based tests for the masking engine.

use channelpack::mask::{apply_duration, slices, trigger_mask, DurationKind, DurationRule, Part};
use channelpack::{Channel, ChannelStore, View};
use proptest::prelude::*;

fn bools(bits: &[u8]) -> Vec<bool> {
    bits.iter().map(|&b| b != 0).collect()
}

fn mask_strategy(max_len: usize) -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 0..max_len)
}

/// Two trigger sequences of equal length.
fn trigger_pair() -> impl Strategy<Value = (Vec<bool>, Vec<bool>)> {
    (0usize..60).prop_flat_map(|n| {
        (
            prop::collection::vec(prop::bool::weighted(0.3), n),
            prop::collection::vec(prop::bool::weighted(0.3), n),
        )
    })
}

fn kind_strategy() -> impl Strategy<Value = DurationKind> {
    prop_oneof![
        Just(DurationKind::Strict),
        Just(DurationKind::Min),
        Just(DurationKind::Max),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn slices_cover_exactly_the_true_positions(mask in mask_strategy(80)) {
        let parts = slices(&mask);
        let mut covered = vec![false; mask.len()];
        let mut last_stop = None;
        for part in &parts {
            prop_assert!(part.start < part.stop);
            if let Some(prev) = last_stop {
                // sorted, and separated by at least one false record
                prop_assert!(part.start > prev);
            }
            last_stop = Some(part.stop);
            covered[part.range()].fill(true);
        }
        prop_assert_eq!(covered, mask);
    }

    #[test]
    fn stop_edge_closes_an_active_window((start, stop) in trigger_pair()) {
        let out = trigger_mask(&start, &stop, 0).unwrap();
        prop_assert_eq!(out.len(), start.len());
        if start.contains(&true) && stop.contains(&true) {
            for i in 1..out.len() {
                let edge = stop[i] && !stop[i - 1];
                if edge && out[i - 1] {
                    prop_assert!(!out[i], "record {} passed a stop edge: {:?}", i, out);
                }
            }
        }
    }

    #[test]
    fn start_only_is_false_then_true(start in mask_strategy(60)) {
        let stop = vec![false; start.len()];
        let out = trigger_mask(&start, &stop, 3).unwrap();
        match start.iter().position(|&b| b) {
            Some(first) => {
                for (i, &o) in out.iter().enumerate() {
                    prop_assert_eq!(o, i >= first);
                }
            }
            None => prop_assert!(out.iter().all(|&o| o)),
        }
    }

    #[test]
    fn stop_only_is_true_up_to_the_extended_stop(
        stop in mask_strategy(60),
        extend in 0usize..5,
    ) {
        let start = vec![false; stop.len()];
        let out = trigger_mask(&start, &stop, extend).unwrap();
        match stop.iter().position(|&b| b) {
            Some(first) => {
                for (i, &o) in out.iter().enumerate() {
                    prop_assert_eq!(o, i < first + extend);
                }
            }
            None => prop_assert!(out.iter().all(|&o| o)),
        }
    }

    #[test]
    fn duration_only_clears_and_is_idempotent(
        mask in mask_strategy(80),
        kind in kind_strategy(),
        value in 0u32..8,
    ) {
        let rule = DurationRule::new(kind, f64::from(value)).unwrap();
        let once = apply_duration(&mask, &slices(&mask), Some(&rule), 1.0).unwrap();
        for (after, before) in once.iter().zip(&mask) {
            prop_assert!(!after || *before);
        }
        let twice = apply_duration(&once, &slices(&once), Some(&rule), 1.0).unwrap();
        prop_assert_eq!(twice, once);
    }

    #[test]
    fn nan_and_filter_views_agree(
        (values, mask) in (0usize..50).prop_flat_map(|n| (
            prop::collection::vec(-1e6f64..1e6, n),
            prop::collection::vec(any::<bool>(), n),
        )),
    ) {
        let mut store = ChannelStore::from_channels([(0, values)]).unwrap();
        store.set_mask(mask).unwrap();

        let nan = store.get(0, None, Some(View::Nan)).unwrap().into_owned();
        let filtered = store.get(0, None, Some(View::Filter)).unwrap().into_owned();
        let kept: Vec<_> = nan.values().filter(|v| !v.is_missing()).collect();
        prop_assert_eq!(kept, filtered.values().collect::<Vec<_>>());
    }
}

// ---------------------------------------------------------------------------
// Worked scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_start_after_last_stop_runs_to_the_end() {
    let start = bools(&[0, 0, 0, 1, 0, 0]);
    let stop = bools(&[0, 1, 0, 0, 0, 0]);
    assert_eq!(trigger_mask(&start, &stop, 0).unwrap(), bools(&[0, 0, 0, 1, 1, 1]));
}

#[test]
fn scenario_second_start_without_stop() {
    let start = bools(&[1, 0, 0, 0, 0, 1]);
    let stop = bools(&[0, 0, 1, 0, 0, 0]);
    assert_eq!(trigger_mask(&start, &stop, 0).unwrap(), bools(&[1, 1, 0, 0, 0, 1]));
    assert_eq!(trigger_mask(&start, &stop, 1).unwrap(), bools(&[1, 1, 1, 0, 0, 1]));
}

#[test]
fn scenario_stop_run_started_before_start_does_not_close() {
    // only a stop run beginning after the start can close its window
    let start = bools(&[0, 1, 1, 0]);
    let stop = bools(&[1, 1, 1, 0]);
    assert_eq!(trigger_mask(&start, &stop, 0).unwrap(), bools(&[0, 1, 1, 1]));

    let stop = bools(&[1, 1, 1, 0, 0, 1, 0]);
    let start = bools(&[0, 1, 1, 0, 0, 0, 0]);
    assert_eq!(
        trigger_mask(&start, &stop, 0).unwrap(),
        bools(&[0, 1, 1, 1, 1, 0, 0])
    );
}

#[test]
fn scenario_min_duration_clears_short_runs() {
    let mask = bools(&[1, 1, 0, 1, 1, 1, 1, 0]);
    let parts = slices(&mask);
    assert_eq!(parts, vec![Part::new(0, 2), Part::new(3, 7)]);
    let rule = DurationRule::min(3.0).unwrap();
    assert_eq!(
        apply_duration(&mask, &parts, Some(&rule), 1.0).unwrap(),
        bools(&[0, 0, 0, 1, 1, 1, 1, 0])
    );
}

#[test]
fn scenario_views_over_one_channel() {
    let mut store = ChannelStore::from_channels([(0, vec![10i64, 20, 30])]).unwrap();
    store.set_mask(vec![true, false, true]).unwrap();

    assert_eq!(
        store.get(0, None, Some(View::Filter)).unwrap().into_owned(),
        Channel::Integer(vec![10, 30])
    );
    let Channel::Float(nan) = store.get(0, None, Some(View::Nan)).unwrap().into_owned() else {
        panic!("nan view of an integer channel should be float");
    };
    assert_eq!(nan[0], 10.0);
    assert!(nan[1].is_nan());
    assert_eq!(nan[2], 30.0);
}

#[test]
fn slices_of_uniform_masks() {
    assert_eq!(slices(&[true; 7]), vec![Part::new(0, 7)]);
    assert!(slices(&[false; 7]).is_empty());
    assert!(slices(&[]).is_empty());
}
