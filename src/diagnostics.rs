//! Startup diagnostics — log the property schema of each database.

use tracing::{info, warn};

use crate::error::ApiFailure;
use crate::workspace::{DatabaseSchema, WorkspaceApi};

/// Read one database's property names and types.
pub async fn describe_database(
    api: &dyn WorkspaceApi,
    database_id: &str,
) -> Result<DatabaseSchema, ApiFailure> {
    api.get_database(database_id).await
}

/// Log every property of each database. Failures are logged and skipped.
///
/// Returns how many databases were described.
pub async fn log_schemas(api: &dyn WorkspaceApi, database_ids: &[&str]) -> usize {
    let mut described = 0;
    for &database_id in database_ids {
        match describe_database(api, database_id).await {
            Ok(schema) => {
                info!(database_id, count = schema.properties.len(), "Database properties");
                for (name, kind) in &schema.properties {
                    info!(database_id, property = %name, kind = %kind, "  property");
                }
                described += 1;
            }
            Err(e) => {
                warn!(database_id, error = %e, "Failed to read database properties");
            }
        }
    }
    described
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::workspace::fake::FakeWorkspace;

    #[tokio::test]
    async fn describes_known_and_skips_unknown() {
        let fake = FakeWorkspace::new();
        fake.insert(
            "db1",
            "p1",
            json!({
                "タイトル": { "type": "title", "title": [] },
                "フラグ": { "type": "checkbox", "checkbox": false }
            }),
        );

        let schema = describe_database(&fake, "db1").await.unwrap();
        assert_eq!(schema.properties.get("フラグ").map(String::as_str), Some("checkbox"));
        assert_eq!(schema.properties.get("タイトル").map(String::as_str), Some("title"));

        assert_eq!(log_schemas(&fake, &["db1", "missing"]).await, 1);
    }
}
