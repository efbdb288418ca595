//! Notion HTTP client.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use super::{DatabaseSchema, Filter, PropertyValue, RawRecord, WorkspaceApi, patch_body};
use crate::config::NotionConfig;
use crate::error::{ApiFailure, ConfigError};

/// Upper bound on pages followed for a single query.
const MAX_QUERY_PAGES: usize = 100;

/// One page of query results. Results stay untyped so a single malformed
/// record can't fail the whole page.
#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Option<Vec<Value>>,
    #[serde(default)]
    has_more: Option<bool>,
    #[serde(default)]
    next_cursor: Option<String>,
}

impl QueryResponse {
    fn records(&self) -> Vec<RawRecord> {
        self.results
            .iter()
            .flatten()
            .map(RawRecord::from_value)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct DatabaseResponse {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

/// `WorkspaceApi` over the Notion REST API.
pub struct NotionClient {
    base_url: String,
    client: reqwest::Client,
}

impl NotionClient {
    /// Build the client. Header values that can't be sent and a failing TLS
    /// backend are configuration problems, reported before any request.
    pub fn new(config: &NotionConfig) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}", config.api_key.expose_secret());
        let mut auth = HeaderValue::from_str(&bearer).map_err(|e| ConfigError::InvalidValue {
            key: "NOTION_API_KEY".to_string(),
            message: format!("not a valid header value: {e}"),
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let version =
            HeaderValue::from_str(&config.notion_version).map_err(|e| ConfigError::InvalidValue {
                key: "NOTION_VERSION".to_string(),
                message: format!("not a valid header value: {e}"),
            })?;
        headers.insert("notion-version", version);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "http_client".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// Send a request; any non-2xx status is a failure. The body is left
    /// unread on success.
    async fn send_checked(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ApiFailure> {
        let resp = request
            .send()
            .await
            .map_err(|e| ApiFailure::transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ApiFailure::http(status.as_u16(), text));
        }
        Ok(resp)
    }

    /// Send a request and decode its 2xx JSON body.
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiFailure> {
        self.send_checked(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ApiFailure::transport(format!("invalid response body: {e}")))
    }
}

#[async_trait]
impl WorkspaceApi for NotionClient {
    async fn query(
        &self,
        database_id: &str,
        filter: &Filter,
    ) -> Result<Vec<RawRecord>, ApiFailure> {
        let url = self.url(&format!("databases/{database_id}/query"));
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_QUERY_PAGES {
            let mut body = serde_json::json!({ "filter": filter.to_json() });
            if let Some(ref c) = cursor {
                body["start_cursor"] = Value::String(c.clone());
            }

            let page: QueryResponse = self.send(self.client.post(&url).json(&body)).await?;
            let batch = page.records();
            debug!(database_id, count = batch.len(), "Query page fetched");
            records.extend(batch);

            match page.next_cursor {
                Some(next) if page.has_more.unwrap_or(false) => cursor = Some(next),
                _ => return Ok(records),
            }
        }

        Err(ApiFailure::transport(format!(
            "query on {database_id} exceeded {MAX_QUERY_PAGES} pages"
        )))
    }

    async fn get_database(&self, database_id: &str) -> Result<DatabaseSchema, ApiFailure> {
        let url = self.url(&format!("databases/{database_id}"));
        let db: DatabaseResponse = self.send(self.client.get(&url)).await?;

        let properties: BTreeMap<String, String> = db
            .properties
            .unwrap_or_default()
            .into_iter()
            .map(|(name, info)| {
                let kind = info
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                (name, kind)
            })
            .collect();

        Ok(DatabaseSchema { properties })
    }

    async fn get_page(&self, page_id: &str) -> Result<RawRecord, ApiFailure> {
        let url = self.url(&format!("pages/{page_id}"));
        let page: Value = self.send(self.client.get(&url)).await?;
        Ok(RawRecord::from_value(&page))
    }

    async fn patch_page(
        &self,
        page_id: &str,
        properties: &[(String, PropertyValue)],
    ) -> Result<(), ApiFailure> {
        let url = self.url(&format!("pages/{page_id}"));
        // A 2xx is the whole answer; the echoed page isn't needed.
        self.send_checked(self.client.patch(&url).json(&patch_body(properties)))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let mut config = NotionConfig::new("secret_test");
        config.base_url = "http://localhost:1234/v1/".to_string();
        let client = NotionClient::new(&config).unwrap();
        assert_eq!(client.url("pages/p1"), "http://localhost:1234/v1/pages/p1");
    }

    #[test]
    fn unprintable_api_key_is_a_config_error() {
        let config = NotionConfig::new("bad\nkey");
        let err = NotionClient::new(&config).err().unwrap();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "NOTION_API_KEY"),
            "got {err:?}"
        );
    }

    #[test]
    fn unprintable_version_is_a_config_error() {
        let mut config = NotionConfig::new("secret_test");
        config.notion_version = "2022\r\n".to_string();
        let err = NotionClient::new(&config).err().unwrap();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "NOTION_VERSION"),
            "got {err:?}"
        );
    }

    #[test]
    fn query_response_defaults() {
        let page: QueryResponse = serde_json::from_str("{}").unwrap();
        assert!(page.records().is_empty());
        assert!(!page.has_more.unwrap_or(false));
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn malformed_result_does_not_poison_page() {
        let page: QueryResponse = serde_json::from_value(json!({
            "results": [
                { "id": "s1", "properties": { "x": { "type": "checkbox", "checkbox": false } } },
                { "id": null, "properties": null },
                "not an object",
            ],
            "has_more": null,
            "next_cursor": null,
        }))
        .unwrap();

        let records = page.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id, "s1");
        assert_eq!(records[0].properties.len(), 1);
        assert_eq!(records[1], RawRecord::default());
        assert_eq!(records[2], RawRecord::default());
    }
}
