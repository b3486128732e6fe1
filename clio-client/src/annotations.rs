//! Reading and writing annotation records for one dataset.

use clio_core::{ApiRequest, TransportError};
use serde_json::Value;

use crate::api::{Api, extend_url};
use crate::dataset::Dataset;
use crate::error::{ClioError, Result};
use crate::query::AnnotationQuery;
use crate::table::AnnotationTable;
use crate::write::{AnnotationInput, WriteFailure, WriteOptions, WriteReport};

/// Column holding the key of a group annotation returned in keyed form.
const GROUP_ANNOTATION_ID: &str = "id";

/// Annotation operations bound to a resolved dataset.
#[derive(Debug, Clone)]
pub struct AnnotationClient {
    api: Api,
    dataset: Dataset,
}

impl AnnotationClient {
    pub fn new(api: Api, dataset: Dataset) -> Self {
        Self { api, dataset }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Fetch records matching `query` as a table.
    ///
    /// An empty id list returns an empty table without contacting the server.
    pub async fn fetch_annotations(&self, query: &AnnotationQuery) -> Result<AnnotationTable> {
        let request = match query {
            AnnotationQuery::BodyIds(ids) if ids.is_empty() => {
                return Ok(AnnotationTable::new());
            }
            AnnotationQuery::All => ApiRequest::get(self.neurons_url(&["all"])?),
            _ => ApiRequest::post(self.neurons_url(&["query"])?, query.body()),
        };

        let records: Value = self.api.json(&request).await?;
        let table = table_from_response(records, &request)?;
        tracing::debug!(dataset = %self.dataset.name(), rows = table.len(), "Fetched annotations");
        Ok(table)
    }

    /// Write `input`, one request per record.
    ///
    /// Returns the report when every record was written. Otherwise returns
    /// [`ClioError::PartialWrite`] carrying it. A credential failure stops the
    /// batch; if it happens before anything was written, it is returned as is.
    pub async fn set_annotations(&self, input: AnnotationInput, options: &WriteOptions) -> Result<WriteReport> {
        let (updates, skipped) = input.into_updates(options)?;
        let mut report = WriteReport {
            skipped,
            ..Default::default()
        };

        let mut url = self.neurons_url(&[])?;
        if let Some(version) = options.version.as_deref() {
            url.query_pairs_mut().append_pair("version", version);
        }

        let mut pending = updates.into_iter();
        while let Some(update) = pending.next() {
            let request = ApiRequest::post(url.clone(), Some(update.to_body()));
            match self.api.execute(&request).await {
                Ok(_) => report.succeeded.push(update.bodyid),
                Err(ClioError::Credential(e)) => {
                    if report.succeeded.is_empty() && report.failed.is_empty() {
                        return Err(e.into());
                    }
                    tracing::warn!(bodyid = update.bodyid, error = %e, "Stopping annotation writes");
                    report.failed.push(WriteFailure {
                        bodyid: update.bodyid,
                        status: None,
                        reason: e.to_string(),
                    });
                    report.not_attempted.extend(pending.by_ref().map(|u| u.bodyid));
                }
                Err(e) => {
                    tracing::warn!(bodyid = update.bodyid, error = %e, "Annotation write failed");
                    report.failed.push(WriteFailure {
                        bodyid: update.bodyid,
                        status: e.status(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            dataset = %self.dataset.name(),
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "Wrote annotations"
        );

        if report.is_complete() {
            Ok(report)
        } else {
            Err(ClioError::PartialWrite(report))
        }
    }

    /// Point annotations of `group`, or the caller's own when `None`.
    pub async fn fetch_group_annotations(&self, group: Option<&str>) -> Result<AnnotationTable> {
        let mut url = self.api.endpoint(&["v2", "annotations", self.dataset.name()])?;
        if let Some(group) = group.filter(|g| !g.is_empty()) {
            url.query_pairs_mut().append_pair("groups", group);
        }
        let request = ApiRequest::get(url);

        let annotations: Value = self.api.json(&request).await?;
        // Some servers key annotations by id instead of returning a list; the
        // key becomes the `id` column unless the record carries its own.
        let annotations = match annotations {
            Value::Object(map) => Value::Array(
                map.into_iter()
                    .map(|(key, record)| match record {
                        Value::Object(mut fields) => {
                            fields.entry(GROUP_ANNOTATION_ID).or_insert(Value::String(key));
                            Value::Object(fields)
                        }
                        other => other,
                    })
                    .collect(),
            ),
            other => other,
        };
        table_from_response(annotations, &request)
    }

    fn neurons_url(&self, rest: &[&str]) -> Result<url::Url> {
        let mut segments = vec!["neurons"];
        segments.extend_from_slice(rest);
        extend_url(self.dataset.endpoint(), &segments)
    }
}

fn table_from_response(value: Value, request: &ApiRequest) -> Result<AnnotationTable> {
    AnnotationTable::from_json(value).map_err(|message| {
        TransportError::InvalidResponse {
            url: request.url.to_string(),
            message,
        }
        .into()
    })
}
