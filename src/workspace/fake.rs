//! In-memory `WorkspaceApi` for engine tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{DatabaseSchema, Filter, PropertyValue, RawRecord, WorkspaceApi, props};
use crate::error::ApiFailure;

#[derive(Default)]
struct State {
    pages: HashMap<String, RawRecord>,
    /// database id -> page ids in insertion order
    databases: HashMap<String, Vec<String>>,
    /// page id -> statuses returned by the next patches
    patch_failures: HashMap<String, Vec<u16>>,
    /// database id -> status returned by the next query
    query_failures: HashMap<String, u16>,
    patches: Vec<(String, Vec<(String, PropertyValue)>)>,
}

/// Pages grouped into databases, with injectable failures.
#[derive(Default)]
pub(crate) struct FakeWorkspace {
    state: Mutex<State>,
}

impl FakeWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, database_id: &str, id: &str, properties: Value) {
        let record = RawRecord {
            id: id.to_string(),
            properties: properties.as_object().cloned().unwrap_or_default(),
        };
        let mut state = self.state.lock().unwrap();
        state.pages.insert(id.to_string(), record);
        state
            .databases
            .entry(database_id.to_string())
            .or_default()
            .push(id.to_string());
    }

    pub fn page(&self, id: &str) -> RawRecord {
        self.state.lock().unwrap().pages[id].clone()
    }

    /// Fail the next patch of `page_id` with each status in turn.
    pub fn fail_patches(&self, page_id: &str, statuses: &[u16]) {
        self.state
            .lock()
            .unwrap()
            .patch_failures
            .insert(page_id.to_string(), statuses.to_vec());
    }

    pub fn fail_next_query(&self, database_id: &str, status: u16) {
        self.state
            .lock()
            .unwrap()
            .query_failures
            .insert(database_id.to_string(), status);
    }

    /// Page ids patched so far, in call order.
    pub fn patched_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .patches
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }
}

fn matches(record: &RawRecord, filter: &Filter) -> bool {
    let p = &record.properties;
    match filter {
        Filter::And(all) => all.iter().all(|f| matches(record, f)),
        Filter::CheckboxEquals { property, value } => props::checkbox(p, property) == *value,
        Filter::NumberEquals { property, value } => props::number(p, property) == Some(*value),
        Filter::StatusEquals { property, value } => props::status_name(p, property) == *value,
        Filter::RelationIsNotEmpty { property } => !props::relation_ids(p, property).is_empty(),
        Filter::RelationContains { property, id } => {
            props::relation_ids(p, property).iter().any(|r| r == id)
        }
    }
}

fn apply(record: &mut RawRecord, name: &str, value: &PropertyValue) {
    let json = match value {
        PropertyValue::Checkbox(b) => json!({ "type": "checkbox", "checkbox": b }),
        PropertyValue::Number(n) => json!({ "type": "number", "number": n }),
        PropertyValue::Status(s) => json!({ "type": "status", "status": { "name": s } }),
        PropertyValue::Relation(ids) => {
            let refs: Vec<Value> = ids.iter().map(|id| json!({ "id": id })).collect();
            json!({ "type": "relation", "relation": refs })
        }
    };
    record.properties.insert(name.to_string(), json);
}

#[async_trait]
impl WorkspaceApi for FakeWorkspace {
    async fn query(
        &self,
        database_id: &str,
        filter: &Filter,
    ) -> Result<Vec<RawRecord>, ApiFailure> {
        let mut state = self.state.lock().unwrap();
        if let Some(status) = state.query_failures.remove(database_id) {
            return Err(ApiFailure::http(status, "query failed"));
        }
        let ids = state.databases.get(database_id).cloned().unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| state.pages.get(id))
            .filter(|record| matches(record, filter))
            .cloned()
            .collect())
    }

    async fn get_database(&self, database_id: &str) -> Result<DatabaseSchema, ApiFailure> {
        let state = self.state.lock().unwrap();
        let ids = state
            .databases
            .get(database_id)
            .ok_or_else(|| ApiFailure::http(404, "database not found"))?;
        let mut properties = BTreeMap::new();
        for record in ids.iter().filter_map(|id| state.pages.get(id)) {
            for (name, value) in &record.properties {
                let kind = value
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                properties.insert(name.clone(), kind);
            }
        }
        Ok(DatabaseSchema { properties })
    }

    async fn get_page(&self, page_id: &str) -> Result<RawRecord, ApiFailure> {
        self.state
            .lock()
            .unwrap()
            .pages
            .get(page_id)
            .cloned()
            .ok_or_else(|| ApiFailure::http(404, "page not found"))
    }

    async fn patch_page(
        &self,
        page_id: &str,
        properties: &[(String, PropertyValue)],
    ) -> Result<(), ApiFailure> {
        let mut state = self.state.lock().unwrap();
        state.patches.push((page_id.to_string(), properties.to_vec()));

        if let Some(queue) = state.patch_failures.get_mut(page_id)
            && !queue.is_empty()
        {
            let status = queue.remove(0);
            return Err(ApiFailure::http(status, "patch failed"));
        }

        let record = state
            .pages
            .get_mut(page_id)
            .ok_or_else(|| ApiFailure::http(404, "page not found"))?;
        for (name, value) in properties {
            apply(record, name, value);
        }
        Ok(())
    }
}
