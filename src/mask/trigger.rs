use log::trace;

use super::slices::slices;
use crate::error::{PackError, Result};

// ---------------------------------------------------------------------------
// Gate: which trigger sequences take part in the scan
// ---------------------------------------------------------------------------

/// The trigger configuration a mask is derived from.
///
/// The degenerate variants exist because "no stop triggers" and "a stop
/// trigger that never fires" mean different things to a caller that
/// configures conditions; [`trigger_mask`] picks a variant from the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate<'a> {
    /// Nothing to gate on: every record is accepted.
    Open,
    /// Rejected until the first start record, accepted from there on.
    StartOnly(&'a [bool]),
    /// Accepted up to the first stop record (plus extension), rejected after.
    StopOnly(&'a [bool]),
    /// Start runs paired with the first stop run that follows them.
    StartStop { start: &'a [bool], stop: &'a [bool] },
}

impl<'a> Gate<'a> {
    /// Classify two trigger sequences by whether they ever fire.
    pub fn from_triggers(start: &'a [bool], stop: &'a [bool]) -> Self {
        match (start.contains(&true), stop.contains(&true)) {
            (false, false) => Gate::Open,
            (true, false) => Gate::StartOnly(start),
            (false, true) => Gate::StopOnly(stop),
            (true, true) => Gate::StartStop { start, stop },
        }
    }

    /// Scan the triggers and return a mask of `len` records.
    pub fn mask(&self, len: usize, stop_extend: usize) -> Result<Vec<bool>> {
        match *self {
            Gate::Open => Ok(vec![true; len]),
            Gate::StartOnly(start) => {
                check_len("start trigger", len, start)?;
                Ok(start_only(start))
            }
            Gate::StopOnly(stop) => {
                check_len("stop trigger", len, stop)?;
                Ok(stop_only(stop, stop_extend))
            }
            Gate::StartStop { start, stop } => {
                check_len("start trigger", len, start)?;
                check_len("stop trigger", len, stop)?;
                Ok(paired(start, stop, stop_extend))
            }
        }
    }
}

/// Combine a start and a stop trigger sequence into one mask.
///
/// Each start run opens a window at its first record; the window closes
/// at the first record of the first stop run beginning strictly after
/// it, widened by `stop_extend` records. A stop record that coincides
/// with a start while a window is open is rejected. Only the first record
/// of a stop run closes a window, so a stop run already firing when the
/// start arrives is passed over. A start run with no later stop keeps the
/// mask true to the end.
pub fn trigger_mask(start: &[bool], stop: &[bool], stop_extend: usize) -> Result<Vec<bool>> {
    check_len("stop trigger", start.len(), stop)?;
    Gate::from_triggers(start, stop).mask(start.len(), stop_extend)
}

fn check_len(what: &str, len: usize, seq: &[bool]) -> Result<()> {
    if seq.len() == len {
        Ok(())
    } else {
        Err(PackError::length(what, len, seq.len()))
    }
}

fn fill(out: &mut [bool], from: usize, to: usize) {
    let to = to.min(out.len());
    if from < to {
        out[from..to].fill(true);
    }
}

fn start_only(start: &[bool]) -> Vec<bool> {
    let mut out = vec![false; start.len()];
    if let Some(first) = start.iter().position(|&b| b) {
        fill(&mut out, first, start.len());
    }
    out
}

fn stop_only(stop: &[bool], stop_extend: usize) -> Vec<bool> {
    match stop.iter().position(|&b| b) {
        Some(first) => {
            let mut out = vec![false; stop.len()];
            fill(&mut out, 0, first.saturating_add(stop_extend));
            out
        }
        None => vec![true; stop.len()],
    }
}

fn paired(start: &[bool], stop: &[bool], stop_extend: usize) -> Vec<bool> {
    let len = start.len();
    let mut out = vec![false; len];
    let stop_edges: Vec<usize> = slices(stop).into_iter().map(|p| p.start).collect();

    // first record of the stop run that closed the latest window
    let mut closed_at: Option<usize> = None;

    for run in slices(start) {
        let mut first = run.start;
        if let Some(edge) = closed_at {
            if first < edge {
                continue;
            }
            if first == edge {
                // the stop wins this record; the start may resume after it
                first += 1;
                if first >= run.stop {
                    continue;
                }
            }
        }

        let next = stop_edges.partition_point(|&s| s <= first);
        match stop_edges.get(next) {
            Some(&edge) => {
                trace!("window [{first}, {edge}) + {stop_extend}");
                fill(&mut out, first, edge.saturating_add(stop_extend));
                closed_at = Some(edge);
            }
            None => {
                trace!("open window from {first} to the end");
                fill(&mut out, first, len);
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bools(bits: &[u8]) -> Vec<bool> {
        bits.iter().map(|&b| b != 0).collect()
    }

    #[test]
    fn descending_flanks_are_selected() {
        let height = [1, 2, 3, 4, 5, 4, 3, 2, 1, 2, 3, 4, 5, 4, 3, 2, 1];
        let start: Vec<bool> = height.iter().map(|&h| h == 5).collect();
        let stop: Vec<bool> = height.iter().map(|&h| h == 1).collect();

        let mask = trigger_mask(&start, &stop, 0).unwrap();
        let picked: Vec<i32> = height
            .iter()
            .zip(&mask)
            .filter(|(_, &m)| m)
            .map(|(&h, _)| h)
            .collect();
        assert_eq!(picked, vec![5, 4, 3, 2, 5, 4, 3, 2]);
    }

    #[test]
    fn empty_sequences() {
        assert!(trigger_mask(&[], &[], 3).unwrap().is_empty());
    }

    #[test]
    fn one_start_one_stop() {
        let mask = trigger_mask(&bools(&[0, 1, 0, 0]), &bools(&[0, 0, 0, 1]), 0).unwrap();
        assert_eq!(mask, bools(&[0, 1, 1, 0]));
    }

    #[test]
    fn stop_extend_is_clipped() {
        let mask = trigger_mask(&bools(&[1, 0, 0, 0]), &bools(&[0, 0, 1, 0]), 10).unwrap();
        assert_eq!(mask, bools(&[1, 1, 1, 1]));
    }

    #[test]
    fn start_inside_window_is_ignored() {
        let start = bools(&[1, 0, 1, 0, 0, 0]);
        let stop = bools(&[0, 0, 0, 1, 0, 0]);
        assert_eq!(trigger_mask(&start, &stop, 0).unwrap(), bools(&[1, 1, 1, 0, 0, 0]));
    }

    #[test]
    fn start_on_closing_stop_resumes_after_it() {
        let start = bools(&[1, 0, 0, 1, 1, 0, 0]);
        let stop = bools(&[0, 0, 0, 1, 0, 0, 1]);
        assert_eq!(
            trigger_mask(&start, &stop, 0).unwrap(),
            bools(&[1, 1, 1, 0, 1, 1, 0])
        );
    }

    #[test]
    fn mismatched_lengths_fail() {
        let err = trigger_mask(&[true, false], &[false], 0).unwrap_err();
        assert!(matches!(err, PackError::LengthMismatch { expected: 2, found: 1, .. }));
    }

    #[test]
    fn configured_start_that_never_fires_rejects_all() {
        let start = [false; 4];
        assert_eq!(Gate::StartOnly(&start).mask(4, 0).unwrap(), vec![false; 4]);
        // classified from data, the same arrays leave the gate open
        assert_eq!(trigger_mask(&start, &start, 0).unwrap(), vec![true; 4]);
    }
}
