//! Normalization and reporting for annotation writes.
//!
//! Callers hand `set_annotations` either a `{bodyid: {field: value}}` mapping
//! or an [`AnnotationTable`]. Both become one list of [`RecordUpdate`]s here,
//! before any request is made, so the write path only ever sees one shape.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ClioError, Result};
use crate::table::{AnnotationTable, BODYID, BodyId, bodyid_from_value};

/// Options for `set_annotations`.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Clio version to associate with the annotations. `None` lets the server
    /// use its head version.
    pub version: Option<String>,

    /// Send empty values (table "no value" cells and JSON nulls) as `null`,
    /// clearing those fields on the server. Off by default, in which case
    /// empty values are left out of the update.
    pub write_empty_fields: bool,
}

/// A partial update of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub bodyid: BodyId,
    pub fields: Map<String, Value>,
}

impl RecordUpdate {
    /// JSON body sent to the server: the fields plus `bodyid`.
    pub fn to_body(&self) -> Value {
        let mut body = Map::with_capacity(self.fields.len() + 1);
        body.insert(BODYID.to_string(), Value::from(self.bodyid));
        body.extend(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        Value::Object(body)
    }
}

/// Annotations accepted by `set_annotations`.
#[derive(Debug, Clone)]
pub enum AnnotationInput {
    /// `{bodyid: {field: value}}`.
    Records(BTreeMap<BodyId, Map<String, Value>>),
    /// One row per record, with a `bodyid` column.
    Table(AnnotationTable),
}

impl AnnotationInput {
    /// Accept a JSON object keyed by body id or an array of records.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => {
                let mut records = BTreeMap::new();
                for (key, fields) in map {
                    let id = key.trim().parse::<BodyId>().map_err(|_| {
                        ClioError::InvalidInput(format!("'{}' is not a body id", key))
                    })?;
                    let Value::Object(fields) = fields else {
                        return Err(ClioError::InvalidInput(format!(
                            "annotations for {} must be an object",
                            id
                        )));
                    };
                    records.insert(id, fields);
                }
                Ok(Self::Records(records))
            }
            array @ Value::Array(_) => AnnotationTable::from_json(array)
                .map(Self::Table)
                .map_err(ClioError::InvalidInput),
            _ => Err(ClioError::InvalidInput(
                "expected an object keyed by body id or an array of records".to_string(),
            )),
        }
    }

    /// Normalize into per-record updates.
    ///
    /// Updates left without any field are dropped; their ids are returned as
    /// the second element so they can be reported as skipped.
    pub fn into_updates(self, options: &WriteOptions) -> Result<(Vec<RecordUpdate>, Vec<BodyId>)> {
        let raw = match self {
            Self::Records(records) => records_to_updates(records)?,
            Self::Table(table) => table_to_updates(&table)?,
        };

        let mut updates = Vec::with_capacity(raw.len());
        let mut skipped = Vec::new();
        for mut update in raw {
            // Empty cells are already JSON null; they are either sent as is
            // or dropped.
            if !options.write_empty_fields {
                update.fields.retain(|_, v| !v.is_null());
            }

            if update.fields.is_empty() {
                skipped.push(update.bodyid);
            } else {
                updates.push(update);
            }
        }
        Ok((updates, skipped))
    }
}

fn records_to_updates(records: BTreeMap<BodyId, Map<String, Value>>) -> Result<Vec<RecordUpdate>> {
    records
        .into_iter()
        .map(|(bodyid, mut fields)| {
            if let Some(inner) = fields.remove(BODYID) {
                if bodyid_from_value(&inner) != Some(bodyid) {
                    return Err(ClioError::InvalidInput(format!(
                        "record keyed {} carries a different bodyid {}",
                        bodyid, inner
                    )));
                }
            }
            Ok(RecordUpdate { bodyid, fields })
        })
        .collect()
}

fn table_to_updates(table: &AnnotationTable) -> Result<Vec<RecordUpdate>> {
    if !table.has_column(BODYID) {
        return Err(ClioError::InvalidInput(
            "annotation table must contain a `bodyid` column".to_string(),
        ));
    }

    let mut seen = BTreeSet::new();
    let mut updates = Vec::with_capacity(table.len());
    for (i, row) in table.rows().enumerate() {
        let bodyid = match row.get(BODYID) {
            None => {
                return Err(ClioError::InvalidInput(format!("row {} has an empty bodyid", i)));
            }
            Some(value) => bodyid_from_value(value).ok_or_else(|| {
                ClioError::InvalidInput(format!("row {} has an invalid bodyid {}", i, value))
            })?,
        };
        if !seen.insert(bodyid) {
            return Err(ClioError::InvalidInput(format!(
                "table contains duplicate bodyid {}",
                bodyid
            )));
        }

        // Keep "no value" cells as explicit nulls; write options decide later.
        let fields = row
            .cells()
            .filter(|(column, _)| *column != BODYID)
            .map(|(column, value)| (column.to_string(), value.cloned().unwrap_or(Value::Null)))
            .collect();
        updates.push(RecordUpdate { bodyid, fields });
    }
    Ok(updates)
}

impl From<BTreeMap<BodyId, Map<String, Value>>> for AnnotationInput {
    fn from(records: BTreeMap<BodyId, Map<String, Value>>) -> Self {
        Self::Records(records)
    }
}

impl From<HashMap<BodyId, Map<String, Value>>> for AnnotationInput {
    fn from(records: HashMap<BodyId, Map<String, Value>>) -> Self {
        Self::Records(records.into_iter().collect())
    }
}

impl From<AnnotationTable> for AnnotationInput {
    fn from(table: AnnotationTable) -> Self {
        Self::Table(table)
    }
}

impl From<&AnnotationTable> for AnnotationInput {
    fn from(table: &AnnotationTable) -> Self {
        Self::Table(table.clone())
    }
}

/// A record that could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteFailure {
    pub bodyid: BodyId,
    /// HTTP status, when the server answered.
    pub status: Option<u16>,
    pub reason: String,
}

/// Per-record outcome of a `set_annotations` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub succeeded: Vec<BodyId>,
    pub failed: Vec<WriteFailure>,
    /// Records never sent because an earlier credential failure stopped the batch.
    pub not_attempted: Vec<BodyId>,
    /// Records with nothing to write after normalization.
    pub skipped: Vec<BodyId>,
}

impl WriteReport {
    /// Whether every record that had something to write was written.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.not_attempted.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<BodyId> {
        self.failed.iter().map(|f| f.bodyid).collect()
    }
}

impl fmt::Display for WriteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attempted = self.succeeded.len() + self.failed.len();
        write!(
            f,
            "{} of {} annotation writes failed",
            self.failed.len(),
            attempted + self.not_attempted.len()
        )?;
        for failure in &self.failed {
            write!(f, "; {}: {}", failure.bodyid, failure.reason)?;
        }
        if !self.not_attempted.is_empty() {
            write!(f, "; not attempted: {:?}", self.not_attempted)?;
        }
        Ok(())
    }
}
