//! Workspace API — the remote Notion databases the engine reads and patches.
//!
//! `WorkspaceApi` is the only seam between the reconciliation engine and the
//! network. `NotionClient` implements it over HTTP; tests swap in an
//! in-memory fake.

pub mod client;
pub mod filter;
pub mod props;

#[cfg(test)]
pub(crate) mod fake;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ApiFailure;

pub use client::NotionClient;
pub use filter::Filter;

/// A page as returned by the API.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub id: String,
    pub properties: Map<String, Value>,
}

impl RawRecord {
    /// Read a page object. A missing, null or mistyped `id` or `properties`
    /// becomes empty rather than an error.
    pub fn from_value(value: &Value) -> Self {
        Self {
            id: value
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            properties: value
                .get("properties")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        }
    }
}

/// Property names and types of a database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseSchema {
    pub properties: BTreeMap<String, String>,
}

/// A typed property value for a patch request.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Checkbox(bool),
    Number(f64),
    Status(String),
    Relation(Vec<String>),
}

impl PropertyValue {
    /// Render in the API's `{ "<type>": <value> }` form.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Checkbox(b) => serde_json::json!({ "checkbox": b }),
            Self::Number(n) => serde_json::json!({ "number": n }),
            Self::Status(name) => serde_json::json!({ "status": { "name": name } }),
            Self::Relation(ids) => {
                let refs: Vec<Value> = ids
                    .iter()
                    .map(|id| serde_json::json!({ "id": id }))
                    .collect();
                serde_json::json!({ "relation": refs })
            }
        }
    }
}

/// Build a `{ "properties": { ... } }` patch body.
pub fn patch_body(properties: &[(String, PropertyValue)]) -> Value {
    let props: Map<String, Value> = properties
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect();
    serde_json::json!({ "properties": props })
}

/// Request/response operations against the remote workspace.
///
/// Every failure is returned as an `ApiFailure`; implementations never retry.
#[async_trait]
pub trait WorkspaceApi: Send + Sync {
    /// Query a database, returning every record matching `filter`.
    async fn query(&self, database_id: &str, filter: &Filter) -> Result<Vec<RawRecord>, ApiFailure>;

    /// Read a database's property schema.
    async fn get_database(&self, database_id: &str) -> Result<DatabaseSchema, ApiFailure>;

    /// Read a single page.
    async fn get_page(&self, page_id: &str) -> Result<RawRecord, ApiFailure>;

    /// Partially update a page's properties.
    async fn patch_page(
        &self,
        page_id: &str,
        properties: &[(String, PropertyValue)],
    ) -> Result<(), ApiFailure>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn raw_record_tolerates_missing_fields() {
        let record = RawRecord::from_value(&json!({ "object": "page" }));
        assert_eq!(record.id, "");
        assert!(record.properties.is_empty());
    }

    #[test]
    fn raw_record_tolerates_null_fields() {
        let record = RawRecord::from_value(&json!({ "id": null, "properties": null }));
        assert_eq!(record, RawRecord::default());

        let record = RawRecord::from_value(&json!({ "id": 7, "properties": ["x"] }));
        assert_eq!(record, RawRecord::default());
    }

    #[test]
    fn relation_patch_body() {
        let body = patch_body(&[(
            "予定".to_string(),
            PropertyValue::Relation(vec!["a".into(), "b".into()]),
        )]);
        assert_eq!(
            body,
            json!({ "properties": { "予定": { "relation": [{ "id": "a" }, { "id": "b" }] } } })
        );
    }

    #[test]
    fn flag_patch_bodies() {
        assert_eq!(PropertyValue::Checkbox(true).to_json(), json!({ "checkbox": true }));
        assert_eq!(PropertyValue::Number(1.0).to_json(), json!({ "number": 1.0 }));
        assert_eq!(
            PropertyValue::Status("Done".into()).to_json(),
            json!({ "status": { "name": "Done" } })
        );
    }
}
