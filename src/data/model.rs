use std::fmt;
use std::ops::Range;

// ---------------------------------------------------------------------------
// Value – a single cell of a channel
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value.
/// Used as a `BTreeMap` key (see `ChannelStore::counter`) so it must be `Ord`.
/// Equality follows the ordering: `-0.0` equals `0.0` and a NaN equals itself.
#[derive(Debug, Clone)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

// -- Manual Eq/Ord so we can put Value in BTreeMap --

/// Folds `-0.0` into `0.0` so ordering, equality and hashing agree on zero.
fn float_key(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                Text(_) => 4,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => float_key(*a).total_cmp(&float_key(*b)),
            (Text(a), Text(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Text(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => float_key(*f).to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => Ok(()),
        }
    }
}

impl Value {
    /// Try to interpret the value as an `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Missing marker: `Null`, or a float NaN.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(v) => v.is_nan(),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Channel – one column of the record axis
// ---------------------------------------------------------------------------

/// One channel: a flat, typed column of records.
#[derive(Debug, Clone, PartialEq)]
pub enum Channel {
    Float(Vec<f64>),
    Integer(Vec<i64>),
    Bool(Vec<bool>),
    Text(Vec<String>),
    /// Mixed or nullable cells.
    Object(Vec<Value>),
}

macro_rules! each_channel {
    ($channel:expr, $v:ident => $body:expr) => {
        match $channel {
            Channel::Float($v) => $body,
            Channel::Integer($v) => $body,
            Channel::Bool($v) => $body,
            Channel::Text($v) => $body,
            Channel::Object($v) => $body,
        }
    };
}

macro_rules! map_channel {
    ($channel:expr, $v:ident => $body:expr) => {
        match $channel {
            Channel::Float($v) => Channel::Float($body),
            Channel::Integer($v) => Channel::Integer($body),
            Channel::Bool($v) => Channel::Bool($body),
            Channel::Text($v) => Channel::Text($body),
            Channel::Object($v) => Channel::Object($body),
        }
    };
}

impl Channel {
    /// Number of records.
    pub fn len(&self) -> usize {
        each_channel!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short type name used in messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Channel::Float(_) => "float",
            Channel::Integer(_) => "integer",
            Channel::Bool(_) => "bool",
            Channel::Text(_) => "text",
            Channel::Object(_) => "object",
        }
    }

    /// Float and integer channels are numeric; their missing marker is NaN.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Channel::Float(_) | Channel::Integer(_))
    }

    /// The cell at record `i`, if in range.
    pub fn value(&self, i: usize) -> Option<Value> {
        match self {
            Channel::Float(v) => v.get(i).map(|&x| Value::Float(x)),
            Channel::Integer(v) => v.get(i).map(|&x| Value::Integer(x)),
            Channel::Bool(v) => v.get(i).map(|&x| Value::Bool(x)),
            Channel::Text(v) => v.get(i).map(|x| Value::Text(x.clone())),
            Channel::Object(v) => v.get(i).cloned(),
        }
    }

    /// Iterate all cells as [`Value`]s.
    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).filter_map(move |i| self.value(i))
    }

    /// The numeric view of the channel, `None` for text or mixed data.
    ///
    /// Integers are widened, booleans become 0/1 and `Null` cells of an
    /// otherwise numeric object channel become NaN.
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            Channel::Float(v) => Some(v.clone()),
            Channel::Integer(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Channel::Bool(v) => Some(v.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect()),
            Channel::Text(_) => None,
            Channel::Object(v) => v
                .iter()
                .map(|x| match x {
                    Value::Null => Some(f64::NAN),
                    other => other.as_f64(),
                })
                .collect(),
        }
    }

    /// Records `range` as a new channel.
    pub fn slice(&self, range: Range<usize>) -> Channel {
        map_channel!(self, v => v[range].to_vec())
    }

    /// Keep only records whose `mask` element is true.
    pub fn compress(&self, mask: &[bool]) -> Channel {
        map_channel!(self, v => v
            .iter()
            .zip(mask)
            .filter(|(_, &keep)| keep)
            .map(|(x, _)| x.clone())
            .collect())
    }

    /// Replace records whose `mask` element is false with a missing marker.
    ///
    /// Numeric channels come back as `Float` with NaN, every other kind as
    /// `Object` with `Null`. The length is preserved.
    pub fn nan_masked(&self, mask: &[bool]) -> Channel {
        if let Some(numbers) = self.numeric_cells() {
            return Channel::Float(
                numbers
                    .zip(mask)
                    .map(|(x, &keep)| if keep { x } else { f64::NAN })
                    .collect(),
            );
        }
        Channel::Object(
            self.values()
                .zip(mask)
                .map(|(x, &keep)| if keep { x } else { Value::Null })
                .collect(),
        )
    }

    fn numeric_cells(&self) -> Option<Box<dyn Iterator<Item = f64> + '_>> {
        match self {
            Channel::Float(v) => Some(Box::new(v.iter().copied())),
            Channel::Integer(v) => Some(Box::new(v.iter().map(|&x| x as f64))),
            _ => None,
        }
    }

    /// Concatenate `other` after `self`.
    ///
    /// Matching kinds stay as they are, integer and float widen to float,
    /// anything else falls back to an object channel.
    pub fn concat(&self, other: &Channel) -> Channel {
        match (self, other) {
            (Channel::Float(a), Channel::Float(b)) => Channel::Float([a.as_slice(), b.as_slice()].concat()),
            (Channel::Integer(a), Channel::Integer(b)) => {
                Channel::Integer([a.as_slice(), b.as_slice()].concat())
            }
            (Channel::Bool(a), Channel::Bool(b)) => Channel::Bool([a.as_slice(), b.as_slice()].concat()),
            (Channel::Text(a), Channel::Text(b)) => Channel::Text([a.as_slice(), b.as_slice()].concat()),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let mut joined = a.numeric_cells().map(|c| c.collect::<Vec<_>>()).unwrap_or_default();
                joined.extend(b.numeric_cells().into_iter().flatten());
                Channel::Float(joined)
            }
            (a, b) => Channel::Object(a.values().chain(b.values()).collect()),
        }
    }

    /// Build the tightest typed channel that holds `values`.
    ///
    /// * all integers → `Integer`
    /// * numbers with or without nulls → `Float` (null becomes NaN)
    /// * all booleans → `Bool`
    /// * all text → `Text`
    /// * anything else → `Object`
    pub fn from_values(values: Vec<Value>) -> Channel {
        let all = |pred: fn(&Value) -> bool| values.iter().all(pred);

        if all(|v| matches!(v, Value::Integer(_))) && !values.is_empty() {
            Channel::Integer(
                values
                    .iter()
                    .filter_map(|v| match v {
                        Value::Integer(i) => Some(*i),
                        _ => None,
                    })
                    .collect(),
            )
        } else if all(|v| matches!(v, Value::Integer(_) | Value::Float(_) | Value::Null))
            && values.iter().any(|v| !matches!(v, Value::Null))
        {
            Channel::Float(values.iter().map(|v| v.as_f64().unwrap_or(f64::NAN)).collect())
        } else if all(|v| matches!(v, Value::Bool(_))) {
            Channel::Bool(values.iter().map(|v| matches!(v, Value::Bool(true))).collect())
        } else if all(|v| matches!(v, Value::Text(_))) {
            Channel::Text(values.into_iter().map(|v| v.to_string()).collect())
        } else {
            Channel::Object(values)
        }
    }
}

impl From<Vec<f64>> for Channel {
    fn from(v: Vec<f64>) -> Self {
        Channel::Float(v)
    }
}

impl From<Vec<i64>> for Channel {
    fn from(v: Vec<i64>) -> Self {
        Channel::Integer(v)
    }
}

impl From<Vec<bool>> for Channel {
    fn from(v: Vec<bool>) -> Self {
        Channel::Bool(v)
    }
}

impl From<Vec<String>> for Channel {
    fn from(v: Vec<String>) -> Self {
        Channel::Text(v)
    }
}

impl From<Vec<&str>> for Channel {
    fn from(v: Vec<&str>) -> Self {
        Channel::Text(v.into_iter().map(String::from).collect())
    }
}

impl From<Vec<Value>> for Channel {
    fn from(v: Vec<Value>) -> Self {
        Channel::Object(v)
    }
}
