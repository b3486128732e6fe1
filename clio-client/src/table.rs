//! Tabular view of annotation records.
//!
//! Clio records are open-ended JSON objects. An [`AnnotationTable`] holds a
//! batch of them as rows over the union of their fields. A cell is `None`
//! when the record lacks the field (or holds JSON `null`); that is the
//! "no value" marker, never an error. Array values, such as a 3-element
//! position, stay a single cell.

use serde_json::{Map, Value};

/// Identifier of a body (neuron) in a dataset.
pub type BodyId = u64;

/// Name of the identifier column.
pub const BODYID: &str = "bodyid";

/// Rows of annotation records over a union of columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationTable {
    columns: Vec<String>,
    rows: Vec<Vec<Option<Value>>>,
}

impl AnnotationTable {
    /// An empty table with no columns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from record objects.
    ///
    /// Columns are the union of all keys with `bodyid` first. The rest follow
    /// the record in which each key first appears; keys introduced by the same
    /// record come in that record's key order, which for a `serde_json::Map`
    /// is sorted by name.
    pub fn from_records(records: impl IntoIterator<Item = Map<String, Value>>) -> Self {
        let mut table = Self::new();
        for record in records {
            table.push_record(record);
        }
        table
    }

    /// Build a table from a JSON array of objects.
    ///
    /// `null` is an empty table. Anything else that is not an array of
    /// objects is an error describing the offending element.
    pub fn from_json(value: Value) -> Result<Self, String> {
        let items = match value {
            Value::Null => return Ok(Self::new()),
            Value::Array(items) => items,
            other => return Err(format!("expected an array of records, got {}", json_kind(&other))),
        };

        let mut records = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            match item {
                Value::Object(record) => records.push(record),
                other => {
                    return Err(format!("record {} is {}, not an object", i, json_kind(&other)));
                }
            }
        }
        Ok(Self::from_records(records))
    }

    /// Append one record, widening the column set as needed.
    pub fn push_record(&mut self, record: Map<String, Value>) {
        for key in record.keys() {
            if self.column_index(key).is_some() {
                continue;
            }
            if key == BODYID {
                self.columns.insert(0, key.clone());
                for row in &mut self.rows {
                    row.insert(0, None);
                }
            } else {
                self.columns.push(key.clone());
                for row in &mut self.rows {
                    row.push(None);
                }
            }
        }

        let mut row = vec![None; self.columns.len()];
        for (key, value) in record {
            if value.is_null() {
                continue;
            }
            if let Some(idx) = self.column_index(&key) {
                row[idx] = Some(value);
            }
        }
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value at `row`/`column`, `None` for "no value" or out of range.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_ref()
    }

    /// Iterate over rows.
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |cells| Row { table: self, cells })
    }

    /// Cells of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<Option<&Value>>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx].as_ref()).collect())
    }

    /// First row whose `bodyid` equals `id`.
    pub fn find(&self, id: BodyId) -> Option<Row<'_>> {
        self.rows().find(|row| row.bodyid() == Some(id))
    }

    /// Records as JSON objects, omitting "no value" cells.
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.rows().map(|row| row.to_record()).collect()
    }
}

/// A borrowed table row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a AnnotationTable,
    cells: &'a [Option<Value>],
}

impl<'a> Row<'a> {
    /// Cell for `column`, `None` for "no value".
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        let idx = self.table.column_index(column)?;
        self.cells[idx].as_ref()
    }

    /// The row's `bodyid`, when present and an unsigned integer.
    pub fn bodyid(&self) -> Option<BodyId> {
        self.get(BODYID).and_then(bodyid_from_value)
    }

    /// `(column, cell)` pairs in column order.
    pub fn cells(&self) -> impl Iterator<Item = (&'a str, Option<&'a Value>)> {
        self.table
            .columns
            .iter()
            .map(String::as_str)
            .zip(self.cells.iter().map(Option::as_ref))
    }

    pub fn to_record(&self) -> Map<String, Value> {
        self.cells()
            .filter_map(|(k, v)| v.map(|v| (k.to_string(), v.clone())))
            .collect()
    }
}

/// Interpret a JSON value as a body id.
///
/// Accepts unsigned integers, integral floats and numeric strings.
pub fn bodyid_from_value(value: &Value) -> Option<BodyId> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f < u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
