use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use super::store::ChannelStore;
use crate::error::{PackError, Result};
use crate::mask::duration::{apply_duration, check_samplerate, DurationRule};
use crate::mask::expr::{combine, Condition};
use crate::mask::slices::slices;
use crate::mask::trigger::Gate;

// ---------------------------------------------------------------------------
// Category: which list a condition belongs to
// ---------------------------------------------------------------------------

/// The role a condition expression plays in building the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Generic condition; all of them are ANDed.
    Cond,
    /// Start trigger; all of them are ANDed into one trigger.
    Start,
    /// Stop trigger; all of them are ANDed into one trigger.
    Stop,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Cond, Category::Start, Category::Stop];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Cond => "cond",
            Category::Start => "start",
            Category::Stop => "stop",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PackError::InvalidCategory(s.trim().to_string()))
    }
}

// ---------------------------------------------------------------------------
// Conditions: the full masking recipe
// ---------------------------------------------------------------------------

/// Every input the masking engine needs to turn a store into a mask.
///
/// The mask is `combine(cond) & gate(start, stop)`, then cleared of parts
/// that break `duration`. The gate is chosen by which trigger lists are
/// configured, so a start condition that never fires rejects every record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Conditions {
    pub cond: Vec<String>,
    pub start: Vec<String>,
    pub stop: Vec<String>,
    pub duration: Option<DurationRule>,
    pub samplerate: f64,
    pub stop_extend: usize,
}

impl Default for Conditions {
    fn default() -> Self {
        Self {
            cond: Vec::new(),
            start: Vec::new(),
            stop: Vec::new(),
            duration: None,
            samplerate: 1.0,
            stop_extend: 0,
        }
    }
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `expr` and, if it is valid, append it to `category`.
    pub fn add(&mut self, category: Category, expr: &str) -> Result<()> {
        Condition::parse(expr)?;
        self.list_mut(category).push(expr.to_string());
        Ok(())
    }

    pub fn clear(&mut self, category: Category) {
        self.list_mut(category).clear();
    }

    pub fn list(&self, category: Category) -> &[String] {
        match category {
            Category::Cond => &self.cond,
            Category::Start => &self.start,
            Category::Stop => &self.stop,
        }
    }

    fn list_mut(&mut self, category: Category) -> &mut Vec<String> {
        match category {
            Category::Cond => &mut self.cond,
            Category::Start => &mut self.start,
            Category::Stop => &mut self.stop,
        }
    }

    /// True when a category holds at least one non-blank expression.
    pub fn configured(&self, category: Category) -> bool {
        self.list(category).iter().any(|e| !e.trim().is_empty())
    }

    /// No conditions and no duration rule: the mask is all true.
    pub fn is_empty(&self) -> bool {
        self.duration.is_none() && !Category::ALL.into_iter().any(|c| self.configured(c))
    }

    pub fn with_duration(mut self, rule: DurationRule, samplerate: f64) -> Result<Self> {
        check_samplerate(samplerate)?;
        self.duration = Some(rule);
        self.samplerate = samplerate;
        Ok(self)
    }

    /// Evaluate the recipe against `store` and return the resulting mask.
    pub fn mask(&self, store: &ChannelStore) -> Result<Vec<bool>> {
        let len = store.len();
        let mut mask = combine(&self.cond, store)?;

        let start = self
            .configured(Category::Start)
            .then(|| combine(&self.start, store))
            .transpose()?;
        let stop = self
            .configured(Category::Stop)
            .then(|| combine(&self.stop, store))
            .transpose()?;

        let gate = match (&start, &stop) {
            (None, None) => Gate::Open,
            (Some(start), None) => Gate::StartOnly(start),
            (None, Some(stop)) => Gate::StopOnly(stop),
            (Some(start), Some(stop)) => Gate::StartStop { start, stop },
        };
        let gated = gate.mask(len, self.stop_extend)?;
        mask.iter_mut().zip(gated).for_each(|(m, g)| *m &= g);

        if let Some(rule) = &self.duration {
            mask = apply_duration(&mask, &slices(&mask), Some(rule), self.samplerate)?;
        }
        debug!(
            "conditions selected {} of {len} records",
            mask.iter().filter(|&&m| m).count()
        );
        Ok(mask)
    }
}

impl fmt::Display for Conditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for category in Category::ALL {
            for (n, expr) in self.list(category).iter().enumerate() {
                writeln!(f, "{category}{}: {expr}", n + 1)?;
            }
        }
        if let Some(rule) = &self.duration {
            writeln!(f, "duration: {rule}")?;
        }
        writeln!(f, "samplerate: {}", self.samplerate)?;
        write!(f, "stop_extend: {}", self.stop_extend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Channel;

    fn store() -> ChannelStore {
        ChannelStore::from_channels([(0, Channel::Integer(vec![1, 2, 3, 4, 5, 4, 3, 2, 1]))])
            .unwrap()
            .with_names([(0, "height")])
    }

    #[test]
    fn empty_recipe_selects_everything() {
        let c = Conditions::new();
        assert!(c.is_empty());
        assert_eq!(c.mask(&store()).unwrap(), vec![true; 9]);
    }

    #[test]
    fn invalid_expressions_are_not_stored() {
        let mut c = Conditions::new();
        assert!(c.add(Category::Cond, "%('height') >").is_err());
        assert!(c.cond.is_empty());
        c.add(Category::Cond, "%('height') > 2").unwrap();
        assert_eq!(c.cond.len(), 1);
    }

    #[test]
    fn configured_start_that_never_fires() {
        let mut c = Conditions::new();
        c.add(Category::Start, "%('height') > 100").unwrap();
        assert_eq!(c.mask(&store()).unwrap(), vec![false; 9]);
    }

    #[test]
    fn start_stop_with_cond_and_duration() {
        let mut c = Conditions::new();
        c.add(Category::Start, "%('height') == 5").unwrap();
        c.add(Category::Stop, "%('height') == 2").unwrap();
        c.add(Category::Cond, "%('height') != 4").unwrap();
        let bits: Vec<u8> = c.mask(&store()).unwrap().iter().map(|&b| b as u8).collect();
        assert_eq!(bits, vec![0, 0, 0, 0, 1, 0, 1, 0, 0]);

        let c = c.with_duration(DurationRule::min(2.0).unwrap(), 1.0).unwrap();
        assert_eq!(c.mask(&store()).unwrap(), vec![false; 9]);
    }

    #[test]
    fn display_numbers_each_category() {
        let mut c = Conditions::new();
        c.add(Category::Cond, "%(0) > 1").unwrap();
        c.add(Category::Cond, "%(0) < 5").unwrap();
        c.add(Category::Stop, "%(0) == 3").unwrap();
        let text = c.to_string();
        assert!(text.contains("cond1: %(0) > 1"));
        assert!(text.contains("cond2: %(0) < 5"));
        assert!(text.contains("stop1: %(0) == 3"));
    }

    #[test]
    fn category_parses() {
        assert_eq!("Start".parse::<Category>().unwrap(), Category::Start);
        assert!("begin".parse::<Category>().is_err());
    }
}
