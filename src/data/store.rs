use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::filter::Conditions;
use super::model::{Channel, Value};
use crate::error::{PackError, Result};
use crate::mask::duration::{apply_duration, DurationRule};
use crate::mask::expr::Binder;
use crate::mask::slices::{slices, Part};

/// Prefix of the fallback channel names (`ch0`, `ch1`, ...).
pub const DEFAULT_FALLBACK_PREFIX: &str = "ch";

// ---------------------------------------------------------------------------
// ChannelId – how callers refer to a channel
// ---------------------------------------------------------------------------

/// A reference to a channel.
///
/// Resolution order is fixed: an exact integer key, then a match in the
/// name table (first match wins), then the fallback pattern
/// `<prefix><key>` (e.g. `ch4`). Keys only take the first tier; names
/// take the second and third.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelId {
    Key(usize),
    Name(String),
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelId::Key(k) => write!(f, "{k}"),
            ChannelId::Name(name) => f.write_str(name),
        }
    }
}

impl From<usize> for ChannelId {
    fn from(key: usize) -> Self {
        ChannelId::Key(key)
    }
}

impl From<&str> for ChannelId {
    fn from(name: &str) -> Self {
        ChannelId::Name(name.to_string())
    }
}

impl From<String> for ChannelId {
    fn from(name: String) -> Self {
        ChannelId::Name(name)
    }
}

impl From<&ChannelId> for ChannelId {
    fn from(id: &ChannelId) -> Self {
        id.clone()
    }
}

/// Parses digits as a key and anything else as a name.
impl FromStr for ChannelId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().parse::<usize>() {
            Ok(key) => ChannelId::Key(key),
            Err(_) => ChannelId::Name(s.to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// View – how the mask shapes returned data
// ---------------------------------------------------------------------------

/// Read-time transformation applied when retrieving a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    /// The untouched array.
    #[default]
    Raw,
    /// Masked-out records replaced by NaN (numeric) or `Null`.
    Nan,
    /// Only the masked-in records.
    Filter,
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            View::Raw => "raw",
            View::Nan => "nan",
            View::Filter => "filter",
        })
    }
}

impl FromStr for View {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" | "ignore" => Ok(View::Raw),
            "nan" => Ok(View::Nan),
            "filter" => Ok(View::Filter),
            other => Err(PackError::InvalidView(other.to_string())),
        }
    }
}

/// How [`ChannelStore::name`] renders a channel name.
#[derive(Debug, Clone, Default)]
pub enum NameStyle {
    /// The name as stored.
    #[default]
    Full,
    /// The first whitespace-separated word of the name.
    FirstWord,
    /// The first match of a pattern in the name: its first capture group
    /// if the pattern has one, the whole match otherwise.
    Pattern(Regex),
    /// `<prefix><key>`, regardless of the name table.
    Fallback,
}

impl NameStyle {
    pub fn pattern(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(NameStyle::Pattern)
            .map_err(|e| PackError::InvalidPattern(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ChannelStore
// ---------------------------------------------------------------------------

/// Channels sharing one record axis, plus the mask over that axis.
///
/// Invariants held by every method:
/// * all channels have the same length `N` (the record count)
/// * `mask().len() == N`
/// * replacing or appending data resets the mask to all true
#[derive(Debug, Clone, Default)]
pub struct ChannelStore {
    data: BTreeMap<usize, Channel>,
    names: BTreeMap<usize, String>,
    mask: Vec<bool>,
    view: View,
    fallback_prefix: Option<String>,
    sources: Vec<PathBuf>,
}

impl ChannelStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store over `data`, rejecting channels of unequal length.
    pub fn from_channels<I, C>(data: I) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, C)>,
        C: Into<Channel>,
    {
        let mut store = Self::new();
        store.replace_data(data.into_iter().map(|(k, c)| (k, c.into())).collect())?;
        Ok(store)
    }

    /// Builder-style [`set_names`](Self::set_names).
    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = (usize, S)>,
        S: Into<String>,
    {
        self.set_names(names);
        self
    }

    // -- shape --

    /// Record count `N`.
    pub fn len(&self) -> usize {
        self.mask.len()
    }

    /// True when the store holds no channels.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn channel_count(&self) -> usize {
        self.data.len()
    }

    /// Channel keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = usize> + '_ {
        self.data.keys().copied()
    }

    // -- data mutation --

    /// Replace all channel data. Lengths are validated before anything changes.
    pub fn replace_data(&mut self, data: BTreeMap<usize, Channel>) -> Result<()> {
        let mut lens = data.iter().map(|(k, c)| (k, c.len()));
        if let Some((_, expected)) = lens.next() {
            if let Some((key, found)) = lens.find(|&(_, len)| len != expected) {
                return Err(PackError::length(format!("channel {key}"), expected, found));
            }
        }
        self.data = data;
        self.mask_reset();
        Ok(())
    }

    /// Insert or replace one channel. Resets the mask.
    ///
    /// Unless it is the only channel, its length must match the store's.
    pub fn insert(&mut self, key: usize, channel: impl Into<Channel>) -> Result<Option<Channel>> {
        let channel = channel.into();
        let others = self.data.keys().any(|&k| k != key);
        if others && channel.len() != self.len() {
            return Err(PackError::length(format!("channel {key}"), self.len(), channel.len()));
        }
        let previous = self.data.insert(key, channel);
        self.mask_reset();
        Ok(previous)
    }

    /// Append the records of `other` after this store's records.
    ///
    /// An empty store adopts `other` wholesale. Otherwise both stores must
    /// have the same channel keys (and the same named keys when both carry
    /// names). Resets the mask since `N` changes.
    pub fn append(&mut self, other: ChannelStore) -> Result<()> {
        if self.data.is_empty() {
            self.data = other.data;
        } else if !other.data.is_empty() {
            let mine: BTreeSet<usize> = self.data.keys().copied().collect();
            let theirs: BTreeSet<usize> = other.data.keys().copied().collect();
            if mine != theirs {
                return Err(PackError::KeySetMismatch(format!(
                    "data keys {mine:?} vs {theirs:?}"
                )));
            }
            if !self.names.is_empty() && !other.names.is_empty() {
                let mine: BTreeSet<&usize> = self.names.keys().collect();
                let theirs: BTreeSet<&usize> = other.names.keys().collect();
                if mine != theirs {
                    return Err(PackError::KeySetMismatch(format!(
                        "name keys {mine:?} vs {theirs:?}"
                    )));
                }
            }
            for (key, channel) in self.data.iter_mut() {
                if let Some(tail) = other.data.get(key) {
                    *channel = channel.concat(tail);
                }
            }
        }

        if self.names.is_empty() {
            self.names = other.names;
        }
        self.sources.extend(other.sources);
        self.mask_reset();
        Ok(())
    }

    // -- names --

    /// Replace the name table. It need not cover every key.
    pub fn set_names<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = (usize, S)>,
        S: Into<String>,
    {
        self.names = names.into_iter().map(|(k, n)| (k, n.into())).collect();
    }

    pub fn names(&self) -> &BTreeMap<usize, String> {
        &self.names
    }

    pub fn fallback_prefix(&self) -> &str {
        self.fallback_prefix
            .as_deref()
            .unwrap_or(DEFAULT_FALLBACK_PREFIX)
    }

    /// The prefix must look like an identifier: a letter or `_`, then
    /// letters, digits or `_`, and must not end in a digit.
    pub fn set_fallback_prefix(&mut self, prefix: &str) -> Result<()> {
        let ends_in_digit = prefix.chars().last().is_some_and(|c| c.is_ascii_digit());
        if !is_identifier(prefix) || ends_in_digit {
            return Err(PackError::InvalidPrefix(prefix.to_string()));
        }
        self.fallback_prefix = Some(prefix.to_string());
        Ok(())
    }

    /// `<prefix><key>` for `key`.
    pub fn fallback_name(&self, key: usize) -> String {
        format!("{}{key}", self.fallback_prefix())
    }

    /// The name of a channel rendered in `style`.
    pub fn name(&self, id: impl Into<ChannelId>, style: NameStyle) -> Result<String> {
        let id = id.into();
        let key = self.resolve(&id)?;
        if let NameStyle::Fallback = style {
            return Ok(self.fallback_name(key));
        }
        let name = self
            .names
            .get(&key)
            .ok_or_else(|| PackError::UnknownChannel(format!("no name for channel {key}")))?;
        match style {
            NameStyle::FirstWord => Ok(name.split_whitespace().next().unwrap_or("").to_string()),
            NameStyle::Pattern(re) => re
                .captures(name)
                .and_then(|caps| caps.get(1).or_else(|| caps.get(0)))
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| PackError::NameMismatch {
                    name: name.clone(),
                    pattern: re.as_str().to_string(),
                }),
            NameStyle::Full | NameStyle::Fallback => Ok(name.clone()),
        }
    }

    // -- sources --

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    pub fn add_source(&mut self, path: impl AsRef<Path>) {
        self.sources.push(path.as_ref().to_path_buf());
    }

    // -- lookup --

    /// Resolve `id` to a data key through the three lookup tiers.
    pub fn resolve(&self, id: &ChannelId) -> Result<usize> {
        match id {
            ChannelId::Key(key) if self.data.contains_key(key) => Ok(*key),
            ChannelId::Key(key) => Err(PackError::UnknownChannel(key.to_string())),
            ChannelId::Name(name) => {
                if let Some((&key, _)) = self.names.iter().find(|(_, n)| *n == name) {
                    return if self.data.contains_key(&key) {
                        Ok(key)
                    } else {
                        Err(PackError::UnknownChannel(name.clone()))
                    };
                }
                name.strip_prefix(self.fallback_prefix())
                    .and_then(|digits| digits.parse::<usize>().ok())
                    .filter(|key| self.data.contains_key(key))
                    .ok_or_else(|| PackError::UnknownChannel(name.clone()))
            }
        }
    }

    /// The raw channel for `id`.
    pub fn channel(&self, id: impl Into<ChannelId>) -> Result<&Channel> {
        let key = self.resolve(&id.into())?;
        self.data
            .get(&key)
            .ok_or_else(|| PackError::UnknownChannel(key.to_string()))
    }

    /// Channel data through a part or a view.
    ///
    /// `part` wins over `view` and returns exactly that part's records.
    /// Without a part, `view` (or the store's default view when `None`)
    /// decides between raw, nan-substituted and filtered data.
    pub fn get(
        &self,
        id: impl Into<ChannelId>,
        part: Option<usize>,
        view: Option<View>,
    ) -> Result<Cow<'_, Channel>> {
        let channel = self.channel(id)?;
        if let Some(part) = part {
            let bounds = self.part_bounds(part)?;
            return Ok(Cow::Owned(channel.slice(bounds.range())));
        }
        Ok(match view.unwrap_or(self.view) {
            View::Raw => Cow::Borrowed(channel),
            View::Nan => Cow::Owned(channel.nan_masked(&self.mask)),
            View::Filter => Cow::Owned(channel.compress(&self.mask)),
        })
    }

    /// Value → occurrence count over a channel, or over one part of it.
    pub fn counter(
        &self,
        id: impl Into<ChannelId>,
        part: Option<usize>,
    ) -> Result<BTreeMap<Value, usize>> {
        let data = self.get(id, part, Some(View::Raw))?;
        let mut counts = BTreeMap::new();
        for value in data.values() {
            *counts.entry(value).or_insert(0) += 1;
        }
        Ok(counts)
    }

    // -- mask --

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// Replace the mask; its length must equal the record count.
    pub fn set_mask(&mut self, mask: Vec<bool>) -> Result<()> {
        if mask.len() != self.len() && !(self.data.is_empty() && mask.is_empty()) {
            return Err(PackError::length("mask", self.len(), mask.len()));
        }
        self.mask = mask;
        debug!("mask set, {} parts", self.slices().len());
        Ok(())
    }

    /// All true over the current records; empty when there is no data.
    pub fn mask_reset(&mut self) {
        let len = self.data.values().next().map_or(0, Channel::len);
        self.mask = vec![true; len];
        debug!("mask reset to {len} records");
    }

    pub fn view(&self) -> View {
        self.view
    }

    /// Default view for [`get`](Self::get) calls that pass `None`.
    pub fn set_view(&mut self, view: View) {
        self.view = view;
    }

    /// Clear parts of the mask that break `rule` at `samplerate`.
    pub fn apply_duration(&mut self, rule: &DurationRule, samplerate: f64) -> Result<&[bool]> {
        self.mask = apply_duration(&self.mask, &self.slices(), Some(rule), samplerate)?;
        Ok(&self.mask)
    }

    /// Evaluate `conditions` against this store and make the result the mask.
    pub fn apply_conditions(&mut self, conditions: &Conditions) -> Result<&[bool]> {
        let mask = conditions.mask(self)?;
        self.set_mask(mask)?;
        Ok(&self.mask)
    }

    // -- parts --

    /// The true runs of the current mask, recomputed on every call.
    pub fn slices(&self) -> Vec<Part> {
        slices(&self.mask)
    }

    /// Part indices `0..number_of_parts`.
    pub fn parts(&self) -> Vec<usize> {
        (0..self.slices().len()).collect()
    }

    /// The interval of part `part`.
    pub fn part_bounds(&self, part: usize) -> Result<Part> {
        let parts = self.slices();
        parts
            .get(part)
            .copied()
            .ok_or(PackError::PartOutOfRange {
                part,
                count: parts.len(),
            })
    }

    // -- records --

    /// Iterate records as tuples across the named channels, in key order.
    ///
    /// `part` and `view` select records as in [`ChannelStore::get`].
    /// Field names come from the name table. Without a name table, or when
    /// `fallback` is set and the names cannot serve as field names (not an
    /// identifier, duplicated), fallback names cover every channel.
    pub fn records(
        &self,
        part: Option<usize>,
        view: Option<View>,
        fallback: bool,
    ) -> Result<Records<'_>> {
        let fields = match self.record_fields() {
            Ok(fields) => fields,
            Err(err) if fallback => {
                warn!("{err}; using fallback field names");
                self.fallback_fields()
            }
            Err(err) => return Err(err),
        };

        let columns = fields
            .iter()
            .map(|(key, _)| self.get(*key, part, view))
            .collect::<Result<Vec<_>>>()?;
        let len = columns.first().map_or(0, |c| c.len());

        Ok(Records {
            fields: fields.into_iter().map(|(_, name)| name).collect(),
            columns,
            pos: 0,
            len,
        })
    }

    fn record_fields(&self) -> Result<Vec<(usize, String)>> {
        if self.names.is_empty() {
            return Ok(self.fallback_fields());
        }
        let mut seen = BTreeSet::new();
        let mut fields = Vec::with_capacity(self.names.len());
        for (&key, name) in &self.names {
            if !self.data.contains_key(&key) {
                return Err(PackError::UnknownChannel(name.clone()));
            }
            if !is_identifier(name) || !seen.insert(name.as_str()) {
                return Err(PackError::InvalidFieldName(name.clone()));
            }
            fields.push((key, name.clone()));
        }
        Ok(fields)
    }

    fn fallback_fields(&self) -> Vec<(usize, String)> {
        self.keys().map(|k| (k, self.fallback_name(k))).collect()
    }
}

impl Binder for ChannelStore {
    fn bind(&self, id: &ChannelId) -> Result<&Channel> {
        self.channel(id)
    }

    fn record_count(&self) -> usize {
        self.len()
    }
}

/// Letter or `_` first, then letters, digits or `_`.
fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One record: a value per field, fields shared by every record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Arc<[String]>,
    values: Vec<Value>,
}

impl Record {
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// The value of field `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let i = self.fields.iter().position(|f| f == name)?;
        self.values.get(i)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl std::ops::Index<usize> for Record {
    type Output = Value;

    fn index(&self, i: usize) -> &Value {
        &self.values[i]
    }
}

/// Lazy iterator over the records of a store, see [`ChannelStore::records`].
#[derive(Debug)]
pub struct Records<'a> {
    fields: Arc<[String]>,
    columns: Vec<Cow<'a, Channel>>,
    pos: usize,
    len: usize,
}

impl Records<'_> {
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl Iterator for Records<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        if self.pos >= self.len {
            return None;
        }
        let values = self
            .columns
            .iter()
            .map(|c| c.value(self.pos).unwrap_or(Value::Null))
            .collect();
        self.pos += 1;
        Some(Record {
            fields: Arc::clone(&self.fields),
            values,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.len - self.pos;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Records<'_> {}
