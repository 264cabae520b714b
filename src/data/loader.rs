use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use arrow::array::{ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use log::{info, warn};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{Channel, Value};
use super::store::ChannelStore;

/// Delimiters tried, in order, when none is given.
const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Rows inspected when sniffing the delimiter.
const SNIFF_ROWS: usize = 20;

// ---------------------------------------------------------------------------
// Options and result
// ---------------------------------------------------------------------------

/// Whether the first row of a delimited file holds channel names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Header {
    /// Header when the first row has text above a numeric second row.
    #[default]
    Auto,
    Present,
    Absent,
}

/// Per-call loader settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Field delimiter; sniffed from the data when `None`.
    pub delimiter: Option<u8>,
    pub header: Header,
    /// Source columns to keep. Kept channels retain their column numbers.
    pub usecols: Option<Vec<usize>>,
    /// Numbers are written with `,` as the decimal mark.
    pub decimal_comma: bool,
}

/// Channel data and names read from one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Loaded {
    pub data: BTreeMap<usize, Channel>,
    pub names: BTreeMap<usize, String>,
}

impl Loaded {
    fn retain_columns(&mut self, usecols: Option<&[usize]>) -> Result<()> {
        let Some(usecols) = usecols else {
            return Ok(());
        };
        if let Some(missing) = usecols.iter().find(|&&k| !self.data.contains_key(&k)) {
            bail!("column {missing} requested but the file has {} columns", self.data.len());
        }
        self.data.retain(|k, _| usecols.contains(k));
        self.names.retain(|k, _| usecols.contains(k));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Read channels from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv` / `.txt` / `.tsv` / `.dat` – delimited text, one channel per column
/// * `.json` – `[{ "a": 1, "b": 2 }, ...]` or `{ "a": [1, ...], "b": [2, ...] }`
/// * `.parquet` / `.pq` – one channel per primitive column
pub fn load_file(path: &Path, options: &LoadOptions) -> Result<Loaded> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let mut loaded = match ext.as_str() {
        "csv" | "txt" | "tsv" | "dat" => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            parse_delimited(&text, options)?
        }
        "json" => load_json(path)?,
        "parquet" | "pq" => load_parquet(path)?,
        other => bail!("Unsupported file extension: .{other}"),
    };
    if ext == "json" || ext == "parquet" || ext == "pq" {
        loaded.retain_columns(options.usecols.as_deref())?;
    }

    let records = loaded.data.values().next().map_or(0, Channel::len);
    info!(
        "loaded {} channels x {records} records from {}",
        loaded.data.len(),
        path.display()
    );
    Ok(loaded)
}

/// [`load_file`] wrapped into a store, with names and source set.
pub fn load_store(path: &Path, options: &LoadOptions) -> Result<ChannelStore> {
    let loaded = load_file(path, options)?;
    let mut store = ChannelStore::new();
    store
        .replace_data(loaded.data)
        .with_context(|| format!("building channels from {}", path.display()))?;
    store.set_names(loaded.names);
    store.add_source(path);
    Ok(store)
}

// ---------------------------------------------------------------------------
// Delimited text
// ---------------------------------------------------------------------------

/// Parse delimited text into channels keyed by 0-based column number.
pub fn parse_delimited(text: &str, options: &LoadOptions) -> Result<Loaded> {
    let delimiter = match options.delimiter {
        Some(d) => d,
        None => sniff_delimiter(text, options.decimal_comma),
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("delimited row {row_no}"))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        rows.push(record);
    }

    let has_header = match options.header {
        Header::Present => true,
        Header::Absent => false,
        Header::Auto => looks_like_header(&rows, options.decimal_comma),
    };
    let (header, body) = match rows.split_first() {
        Some((first, rest)) if has_header => (Some(first), rest),
        _ => (None, rows.as_slice()),
    };

    let width = header.or(body.first()).map_or(0, csv::StringRecord::len);
    let columns: Vec<usize> = match &options.usecols {
        Some(cols) => {
            if let Some(bad) = cols.iter().find(|&&c| c >= width) {
                bail!("column {bad} requested but the file has {width} columns");
            }
            cols.clone()
        }
        None => (0..width).collect(),
    };

    let mut loaded = Loaded::default();
    for &col in &columns {
        let values = body
            .iter()
            .map(|row| guess_value(row.get(col).unwrap_or(""), options.decimal_comma))
            .collect();
        loaded.data.insert(col, Channel::from_values(values));
        if let Some(name) = header.and_then(|h| h.get(col)) {
            loaded.names.insert(col, name.to_string());
        }
    }
    Ok(loaded)
}

/// Pick the candidate delimiter that splits the first rows into the same
/// number (more than one) of fields; the widest split wins.
fn sniff_delimiter(text: &str, decimal_comma: bool) -> u8 {
    let sample: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_ROWS)
        .collect();

    let mut best = (b',', 1);
    for delimiter in DELIMITERS {
        if decimal_comma && delimiter == b',' {
            continue;
        }
        let mut widths = sample.iter().map(|l| l.split(delimiter as char).count());
        let Some(width) = widths.next() else {
            continue;
        };
        if width > best.1 && widths.all(|w| w == width) {
            best = (delimiter, width);
        }
    }
    if best.1 == 1 && decimal_comma {
        b';'
    } else {
        best.0
    }
}

fn looks_like_header(rows: &[csv::StringRecord], decimal_comma: bool) -> bool {
    let [first, second, ..] = rows else {
        return false;
    };
    first.iter().zip(second.iter()).any(|(a, b)| {
        parse_number(a, decimal_comma).is_none() && parse_number(b, decimal_comma).is_some()
    })
}

fn parse_number(s: &str, decimal_comma: bool) -> Option<Value> {
    let owned;
    let s = if decimal_comma {
        owned = s.replace(',', ".");
        owned.as_str()
    } else {
        s
    };
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Integer(i));
    }
    s.parse::<f64>().ok().map(Value::Float)
}

fn guess_value(s: &str, decimal_comma: bool) -> Value {
    if s.is_empty() {
        return Value::Null;
    }
    if let Some(number) = parse_number(s, decimal_comma) {
        return number;
    }
    match s.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::Text(s.to_string()),
    }
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Two layouts are accepted (as written by `df.to_json(orient=...)`):
///
/// ```json
/// [ { "time": 0.0, "valve": true }, { "time": 0.1, "valve": false } ]
/// { "time": [0.0, 0.1], "valve": [true, false] }
/// ```
///
/// Channels are keyed in object key order.
fn load_json(path: &Path) -> Result<Loaded> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;
    parse_json(&root)
}

fn parse_json(root: &JsonValue) -> Result<Loaded> {
    let mut columns: Vec<(String, Vec<Value>)> = Vec::new();

    match root {
        JsonValue::Array(records) => {
            for (i, rec) in records.iter().enumerate() {
                let obj = rec
                    .as_object()
                    .with_context(|| format!("Row {i} is not a JSON object"))?;
                for name in obj.keys() {
                    if !columns.iter().any(|(n, _)| n == name) {
                        columns.push((name.clone(), vec![Value::Null; i]));
                    }
                }
                for (name, cells) in columns.iter_mut() {
                    cells.push(obj.get(name).map_or(Value::Null, json_to_value));
                }
            }
        }
        JsonValue::Object(obj) => {
            for (name, val) in obj {
                let cells = val
                    .as_array()
                    .with_context(|| format!("Column '{name}' is not a JSON array"))?;
                columns.push((name.clone(), cells.iter().map(json_to_value).collect()));
            }
        }
        _ => bail!("Expected a top-level JSON array or object"),
    }

    let mut loaded = Loaded::default();
    for (key, (name, cells)) in columns.into_iter().enumerate() {
        loaded.data.insert(key, Channel::from_values(cells));
        loaded.names.insert(key, name);
    }
    Ok(loaded)
}

fn json_to_value(val: &JsonValue) -> Value {
    match val {
        JsonValue::String(s) => Value::Text(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                Value::Text(n.to_string())
            }
        }
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Null => Value::Null,
        other => Value::Text(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load every primitive column of a Parquet file as a channel.
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`). Nested columns are skipped.
fn load_parquet(path: &Path) -> Result<Loaded> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let schema = builder.schema().clone();
    let reader = builder.build().context("building parquet reader")?;

    let mut cells: BTreeMap<usize, Vec<Value>> = BTreeMap::new();
    for (key, field) in schema.fields().iter().enumerate() {
        if is_supported(field.data_type()) {
            cells.insert(key, Vec::new());
        } else {
            warn!(
                "skipping parquet column '{}' of type {:?}",
                field.name(),
                field.data_type()
            );
        }
    }

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for (key, column_cells) in cells.iter_mut() {
            let values = column_values(batch.column(*key))
                .with_context(|| format!("reading parquet column {key}"))?;
            column_cells.extend(values);
        }
    }

    let mut loaded = Loaded::default();
    for (key, values) in cells {
        loaded.data.insert(key, Channel::from_values(values));
        loaded.names.insert(key, schema.field(key).name().clone());
    }
    Ok(loaded)
}

// -- Parquet / Arrow helpers --

fn is_supported(data_type: &DataType) -> bool {
    data_type.is_integer()
        || data_type.is_floating()
        || matches!(
            data_type,
            DataType::Boolean | DataType::Utf8 | DataType::LargeUtf8
        )
}

/// Cells of one Arrow column; nulls become [`Value::Null`].
fn column_values(col: &ArrayRef) -> Result<Vec<Value>> {
    let dt = col.data_type();
    let cells: Vec<Value> = if dt.is_integer() {
        let ints = cast(col.as_ref(), &DataType::Int64).context("casting to Int64")?;
        ints.as_primitive::<Int64Type>()
            .iter()
            .map(|v| v.map_or(Value::Null, Value::Integer))
            .collect()
    } else if dt.is_floating() {
        let floats = cast(col.as_ref(), &DataType::Float64).context("casting to Float64")?;
        floats
            .as_primitive::<Float64Type>()
            .iter()
            .map(|v| v.map_or(Value::Null, Value::Float))
            .collect()
    } else {
        match dt {
            DataType::Boolean => col
                .as_boolean()
                .iter()
                .map(|v| v.map_or(Value::Null, Value::Bool))
                .collect(),
            DataType::Utf8 => col
                .as_string::<i32>()
                .iter()
                .map(|v| v.map_or(Value::Null, |s| Value::Text(s.to_string())))
                .collect(),
            DataType::LargeUtf8 => col
                .as_string::<i64>()
                .iter()
                .map(|v| v.map_or(Value::Null, |s| Value::Text(s.to_string())))
                .collect(),
            other => bail!("unsupported column type {other:?}"),
        }
    };
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delimited(text: &str) -> Loaded {
        parse_delimited(text, &LoadOptions::default()).unwrap()
    }

    #[test]
    fn sniffs_semicolons_and_header() {
        let loaded = delimited("time;valve;mode\n0.0;1;idle\n0.5;0;run\n");
        assert_eq!(loaded.names.get(&2).map(String::as_str), Some("mode"));
        assert_eq!(loaded.data[&0], Channel::Float(vec![0.0, 0.5]));
        assert_eq!(loaded.data[&1], Channel::Integer(vec![1, 0]));
        assert_eq!(loaded.data[&2], Channel::from(vec!["idle", "run"]));
    }

    #[test]
    fn headerless_numeric_table() {
        let loaded = delimited("1\t2\n3\t4\n");
        assert!(loaded.names.is_empty());
        assert_eq!(loaded.data[&1], Channel::Integer(vec![2, 4]));
    }

    #[test]
    fn decimal_comma() {
        let options = LoadOptions {
            decimal_comma: true,
            ..Default::default()
        };
        let loaded = parse_delimited("a;b\n1,5;2\n2,5;3\n", &options).unwrap();
        assert_eq!(loaded.data[&0], Channel::Float(vec![1.5, 2.5]));
    }

    #[test]
    fn usecols_keep_column_numbers() {
        let options = LoadOptions {
            usecols: Some(vec![2]),
            ..Default::default()
        };
        let loaded = parse_delimited("a,b,c\n1,2,3\n", &options).unwrap();
        assert_eq!(loaded.data.keys().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(loaded.names[&2], "c");

        let options = LoadOptions {
            usecols: Some(vec![5]),
            ..Default::default()
        };
        assert!(parse_delimited("a,b,c\n1,2,3\n", &options).is_err());
    }

    #[test]
    fn empty_cells_become_nan_in_numeric_columns() {
        let loaded = delimited("x,y\n1,2\n,3\n");
        let Channel::Float(x) = &loaded.data[&0] else {
            panic!("expected a float channel");
        };
        assert_eq!(x[0], 1.0);
        assert!(x[1].is_nan());
    }

    #[test]
    fn json_layouts_agree() {
        let records: JsonValue =
            serde_json::from_str(r#"[{"a": 1, "b": "x"}, {"a": 2, "b": "y"}]"#).unwrap();
        let columns: JsonValue =
            serde_json::from_str(r#"{"a": [1, 2], "b": ["x", "y"]}"#).unwrap();
        assert_eq!(parse_json(&records).unwrap(), parse_json(&columns).unwrap());
    }

    #[test]
    fn json_missing_fields_are_null() {
        let root: JsonValue =
            serde_json::from_str(r#"[{"a": 1.5}, {"a": 2.5, "b": true}]"#).unwrap();
        let loaded = parse_json(&root).unwrap();
        assert_eq!(loaded.data[&1], Channel::Object(vec![Value::Null, Value::Bool(true)]));
    }
}
