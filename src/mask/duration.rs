use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::slices::Part;
use crate::error::{PackError, Result};

/// How a part's length is compared with the rule's threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationKind {
    /// Length must equal the threshold.
    Strict,
    /// Length must be at least the threshold.
    Min,
    /// Length must be at most the threshold.
    Max,
}

impl DurationKind {
    fn accepts(self, len: usize, threshold: usize) -> bool {
        match self {
            DurationKind::Strict => len == threshold,
            DurationKind::Min => len >= threshold,
            DurationKind::Max => len <= threshold,
        }
    }
}

impl fmt::Display for DurationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DurationKind::Strict => "strict",
            DurationKind::Min => "min",
            DurationKind::Max => "max",
        })
    }
}

impl FromStr for DurationKind {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(DurationKind::Strict),
            "min" => Ok(DurationKind::Min),
            "max" => Ok(DurationKind::Max),
            other => Err(PackError::InvalidDurationRule(format!(
                "unknown kind '{other}', expected strict, min or max"
            ))),
        }
    }
}

/// A duration policy: `kind` compared against `value` time units.
///
/// The value is scaled by a sample rate at application time, so a rule of
/// `min 2.5` with a sample rate of 100 requires parts of 250 records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRule", into = "RawRule")]
pub struct DurationRule {
    kind: DurationKind,
    value: f64,
}

impl DurationRule {
    pub fn new(kind: DurationKind, value: f64) -> Result<Self> {
        if !value.is_finite() || value < 0.0 {
            return Err(PackError::InvalidDurationRule(format!(
                "duration must be finite and non-negative, got {value}"
            )));
        }
        Ok(Self { kind, value })
    }

    pub fn strict(value: f64) -> Result<Self> {
        Self::new(DurationKind::Strict, value)
    }

    pub fn min(value: f64) -> Result<Self> {
        Self::new(DurationKind::Min, value)
    }

    pub fn max(value: f64) -> Result<Self> {
        Self::new(DurationKind::Max, value)
    }

    pub fn kind(&self) -> DurationKind {
        self.kind
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Threshold in records: `round(value * samplerate)`.
    pub fn threshold(&self, samplerate: f64) -> Result<usize> {
        check_samplerate(samplerate)?;
        let records = (self.value * samplerate).round();
        if records > usize::MAX as f64 {
            return Err(PackError::InvalidDurationRule(format!(
                "{self} at {samplerate} samples per unit overflows the record axis"
            )));
        }
        Ok(records as usize)
    }
}

impl fmt::Display for DurationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.value)
    }
}

/// Parses `"<kind> <value>"`, e.g. `"min 3"` or `"strict 0.5"`.
impl FromStr for DurationRule {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self> {
        let mut words = s.split_whitespace();
        let (Some(kind), Some(value), None) = (words.next(), words.next(), words.next()) else {
            return Err(PackError::InvalidDurationRule(format!(
                "expected '<kind> <value>', got '{s}'"
            )));
        };
        let value: f64 = value.parse().map_err(|_| {
            PackError::InvalidDurationRule(format!("'{value}' is not a number"))
        })?;
        Self::new(kind.parse()?, value)
    }
}

#[derive(Serialize, Deserialize)]
struct RawRule {
    kind: DurationKind,
    value: f64,
}

impl TryFrom<RawRule> for DurationRule {
    type Error = PackError;

    fn try_from(raw: RawRule) -> Result<Self> {
        DurationRule::new(raw.kind, raw.value)
    }
}

impl From<DurationRule> for RawRule {
    fn from(rule: DurationRule) -> Self {
        RawRule {
            kind: rule.kind,
            value: rule.value,
        }
    }
}

pub(crate) fn check_samplerate(samplerate: f64) -> Result<()> {
    if samplerate.is_finite() && samplerate > 0.0 {
        Ok(())
    } else {
        Err(PackError::InvalidSampleRate(samplerate))
    }
}

/// Clear every part of `mask` whose length breaks `rule`.
///
/// `parts` are normally `slices(mask)`. Records are only ever cleared,
/// never set, so the result is a subset of `mask`. A `None` rule returns
/// the mask unchanged.
pub fn apply_duration(
    mask: &[bool],
    parts: &[Part],
    rule: Option<&DurationRule>,
    samplerate: f64,
) -> Result<Vec<bool>> {
    let mut out = mask.to_vec();
    let Some(rule) = rule else {
        return Ok(out);
    };
    let threshold = rule.threshold(samplerate)?;

    for part in parts {
        if part.start >= part.stop || part.stop > mask.len() {
            return Err(PackError::InvalidPart {
                start: part.start,
                stop: part.stop,
                len: mask.len(),
            });
        }
        if !rule.kind.accepts(part.len(), threshold) {
            out[part.range()].fill(false);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::slices::slices;

    #[test]
    fn threshold_scales_and_rounds() {
        let rule = DurationRule::min(2.5).unwrap();
        assert_eq!(rule.threshold(100.0).unwrap(), 250);
        assert_eq!(rule.threshold(1.0).unwrap(), 3);
        assert_eq!(DurationRule::min(0.4).unwrap().threshold(1.0).unwrap(), 0);
    }

    #[test]
    fn strict_and_max() {
        let mask = [true, true, false, true, true, true, false, true];
        let parts = slices(&mask);

        let strict = DurationRule::strict(3.0).unwrap();
        assert_eq!(
            apply_duration(&mask, &parts, Some(&strict), 1.0).unwrap(),
            vec![false, false, false, true, true, true, false, false]
        );

        let max = DurationRule::max(2.0).unwrap();
        assert_eq!(
            apply_duration(&mask, &parts, Some(&max), 1.0).unwrap(),
            vec![true, true, false, false, false, false, false, true]
        );
    }

    #[test]
    fn no_rule_is_identity() {
        let mask = [true, false, true];
        assert_eq!(apply_duration(&mask, &slices(&mask), None, 1.0).unwrap(), mask);
    }

    #[test]
    fn bad_inputs_are_rejected() {
        assert!(DurationRule::min(-1.0).is_err());
        assert!(DurationRule::min(f64::NAN).is_err());
        let rule = DurationRule::min(1.0).unwrap();
        assert_eq!(
            apply_duration(&[true], &[Part::new(0, 1)], Some(&rule), 0.0),
            Err(PackError::InvalidSampleRate(0.0))
        );
        assert!(apply_duration(&[true], &[Part::new(0, 2)], Some(&rule), 1.0).is_err());
    }

    #[test]
    fn parses_rule_text() {
        let rule: DurationRule = "max 4".parse().unwrap();
        assert_eq!(rule.kind(), DurationKind::Max);
        assert_eq!(rule.value(), 4.0);
        assert!("longest 4".parse::<DurationRule>().is_err());
        assert!("min".parse::<DurationRule>().is_err());
        assert!("min x".parse::<DurationRule>().is_err());
    }

    #[test]
    fn serde_round_trip_validates() {
        let rule = DurationRule::strict(2.0).unwrap();
        let json = serde_json::to_string(&rule).unwrap();
        assert_eq!(json, r#"{"kind":"strict","value":2.0}"#);
        assert_eq!(serde_json::from_str::<DurationRule>(&json).unwrap(), rule);
        assert!(serde_json::from_str::<DurationRule>(r#"{"kind":"min","value":-2}"#).is_err());
    }
}
