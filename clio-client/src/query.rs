//! Annotation queries.
//!
//! A query is exactly one of: a list of body ids, a set of field filters, or
//! everything. [`QueryBuilder`] rejects attempts to mix ids and filters.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{ClioError, Result};
use crate::table::{BODYID, BodyId};

/// What `fetch_annotations` should return.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AnnotationQuery {
    /// Every record in the dataset.
    #[default]
    All,
    /// Records for these bodies. An empty list matches nothing.
    BodyIds(Vec<BodyId>),
    /// Records matching every `field = value` pair. An array value matches
    /// any of its elements.
    Filter(BTreeMap<String, Value>),
}

impl AnnotationQuery {
    pub fn all() -> Self {
        Self::All
    }

    pub fn bodyids(ids: impl IntoIterator<Item = BodyId>) -> Self {
        Self::BodyIds(ids.into_iter().collect())
    }

    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    /// JSON body for the query endpoint; `None` for [`AnnotationQuery::All`].
    pub(crate) fn body(&self) -> Option<Value> {
        match self {
            Self::All => None,
            Self::BodyIds(ids) => {
                let mut body = Map::new();
                body.insert(BODYID.to_string(), Value::from(ids.clone()));
                Some(Value::Object(body))
            }
            Self::Filter(filters) => Some(Value::Object(
                filters.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            )),
        }
    }
}

impl From<Vec<BodyId>> for AnnotationQuery {
    fn from(ids: Vec<BodyId>) -> Self {
        Self::BodyIds(ids)
    }
}

impl From<&[BodyId]> for AnnotationQuery {
    fn from(ids: &[BodyId]) -> Self {
        Self::BodyIds(ids.to_vec())
    }
}

impl<const N: usize> From<[BodyId; N]> for AnnotationQuery {
    fn from(ids: [BodyId; N]) -> Self {
        Self::BodyIds(ids.to_vec())
    }
}

impl From<BodyId> for AnnotationQuery {
    fn from(id: BodyId) -> Self {
        Self::BodyIds(vec![id])
    }
}

/// Assembles an [`AnnotationQuery`] from optional ids and filters.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    bodyids: Option<Vec<BodyId>>,
    filters: BTreeMap<String, Value>,
}

impl QueryBuilder {
    /// Restrict to these bodies. Calling it again extends the list.
    pub fn bodyids(mut self, ids: impl IntoIterator<Item = BodyId>) -> Self {
        self.bodyids.get_or_insert_with(Vec::new).extend(ids);
        self
    }

    pub fn bodyid(self, id: BodyId) -> Self {
        self.bodyids([id])
    }

    /// Require `field` to equal `value` (or one of its elements, for arrays).
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    /// Validate and build the query.
    pub fn build(self) -> Result<AnnotationQuery> {
        if let Some(field) = self.filters.keys().find(|k| k.trim().is_empty()) {
            return Err(ClioError::InvalidQuery(format!("empty filter field name {:?}", field)));
        }

        match (self.bodyids, self.filters.is_empty()) {
            (Some(_), false) => Err(ClioError::InvalidQuery(
                "body ids and field filters cannot be combined; query one or the other".to_string(),
            )),
            (Some(ids), true) => Ok(AnnotationQuery::BodyIds(ids)),
            (None, false) => Ok(AnnotationQuery::Filter(self.filters)),
            (None, true) => Ok(AnnotationQuery::All),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_builder_is_all() {
        assert_eq!(AnnotationQuery::builder().build().unwrap(), AnnotationQuery::All);
    }

    #[test]
    fn test_empty_id_list_is_not_all() {
        let query = AnnotationQuery::builder().bodyids(Vec::new()).build().unwrap();
        assert_eq!(query, AnnotationQuery::BodyIds(vec![]));
        assert_ne!(query, AnnotationQuery::All);
    }

    #[test]
    fn test_ids_and_filters_are_rejected() {
        let result = AnnotationQuery::builder()
            .bodyid(154109)
            .filter("soma_side", "RHS")
            .build();
        assert!(matches!(result, Err(ClioError::InvalidQuery(_))));
    }

    #[test]
    fn test_empty_filter_name_is_rejected() {
        let result = AnnotationQuery::builder().filter(" ", "x").build();
        assert!(matches!(result, Err(ClioError::InvalidQuery(_))));
    }

    #[test]
    fn test_request_bodies() {
        assert_eq!(AnnotationQuery::All.body(), None);
        assert_eq!(
            AnnotationQuery::bodyids([154109, 24053]).body(),
            Some(json!({"bodyid": [154109, 24053]}))
        );

        let query = AnnotationQuery::builder()
            .filter("hemilineage", "7B")
            .filter("soma_side", json!(["LHS", "RHS"]))
            .build()
            .unwrap();
        assert_eq!(
            query.body(),
            Some(json!({"hemilineage": "7B", "soma_side": ["LHS", "RHS"]}))
        );
    }
}
