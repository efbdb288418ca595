//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default Notion API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.notion.com/v1";

/// Protocol version sent on every request.
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";

/// Default seconds between poll cycles.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maps semantic field names to the property names used by the remote
/// schema. Built once and handed to the engine; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMap {
    /// Schedule title.
    pub title: String,
    /// Schedule processed flag.
    pub flag: String,
    /// Schedule relation to its client.
    pub client: String,
    /// Schedule effort value (number or formula).
    pub workload: String,
    pub start_date: String,
    pub end_date: String,
    /// Workload summary relation identifying the owning client.
    pub summary_client: String,
    /// Workload summary relation that receives schedule links.
    pub summary_schedules: String,
    /// Schedule relation to its parent task. `None` disables parent linking.
    pub parent_task: Option<String>,
    /// Parent task relation listing its children.
    pub child_tasks: Option<String>,
}

impl Default for PropertyMap {
    fn default() -> Self {
        Self {
            title: "タイトル".to_string(),
            flag: "フラグ".to_string(),
            client: "顧問先".to_string(),
            workload: "工数".to_string(),
            start_date: "開始日".to_string(),
            end_date: "終了日".to_string(),
            summary_client: "顧問先".to_string(),
            summary_schedules: "予定".to_string(),
            parent_task: None,
            child_tasks: None,
        }
    }
}

impl PropertyMap {
    /// Both hierarchy relations, if parent linking is configured.
    pub fn hierarchy(&self) -> Option<(&str, &str)> {
        match (&self.parent_task, &self.child_tasks) {
            (Some(parent), Some(children)) => Some((parent.as_str(), children.as_str())),
            _ => None,
        }
    }
}

/// How the flag property is typed in the schedule schema.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FlagKind {
    /// `false` = unprocessed, `true` = processed.
    #[default]
    Checkbox,
    /// `0` = unprocessed, `1` = processed.
    Number,
    /// Named status options.
    Status {
        unprocessed: String,
        processed: String,
    },
}

/// How a schedule link is written into the workload summary relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMode {
    /// Always append. A retry after a failed flag update duplicates the link.
    #[default]
    Append,
    /// Skip the append when the schedule is already linked.
    AppendIfMissing,
}

/// Everything the engine needs to know about the remote schema.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub schedule_db_id: String,
    pub workload_db_id: String,
    pub properties: PropertyMap,
    pub flag_kind: FlagKind,
    pub link_mode: LinkMode,
    pub poll_interval: Duration,
}

impl EngineSettings {
    pub fn new(schedule_db_id: impl Into<String>, workload_db_id: impl Into<String>) -> Self {
        Self {
            schedule_db_id: schedule_db_id.into(),
            workload_db_id: workload_db_id.into(),
            properties: PropertyMap::default(),
            flag_kind: FlagKind::default(),
            link_mode: LinkMode::default(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

/// Connection settings for the Notion client.
#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub notion_version: String,
    pub timeout: Duration,
}

impl NotionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            base_url: DEFAULT_BASE_URL.to_string(),
            notion_version: DEFAULT_NOTION_VERSION.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub notion: NotionConfig,
    pub engine: EngineSettings,
    /// List both databases' properties before the first cycle.
    pub diagnostics: bool,
}

impl SyncConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require =
            |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let api_key = require("NOTION_API_KEY")?;
        let schedule_db_id = require("NOTION_SCHEDULE_DB_ID")?;
        let workload_db_id = require("NOTION_WORKLOAD_DB_ID")?;

        let mut notion = NotionConfig::new(api_key);
        if let Some(url) = get("NOTION_BASE_URL") {
            notion.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(version) = get("NOTION_VERSION") {
            notion.notion_version = version;
        }
        if let Some(raw) = get("NOTION_TIMEOUT_SECS") {
            notion.timeout = Duration::from_secs(parse_secs("NOTION_TIMEOUT_SECS", &raw)?);
        }

        let mut engine = EngineSettings::new(schedule_db_id, workload_db_id);
        if let Some(raw) = get("SYNC_POLL_INTERVAL_SECS") {
            engine.poll_interval =
                Duration::from_secs(parse_secs("SYNC_POLL_INTERVAL_SECS", &raw)?);
        }
        engine.flag_kind = parse_flag_kind(&get)?;
        if let Some(raw) = get("SYNC_LINK_MODE") {
            engine.link_mode = match raw.trim().to_ascii_lowercase().as_str() {
                "append" => LinkMode::Append,
                "append-if-missing" => LinkMode::AppendIfMissing,
                other => return Err(invalid("SYNC_LINK_MODE", format!("unknown mode '{other}'"))),
            };
        }

        let props = &mut engine.properties;
        let overrides: [(&str, &mut String); 8] = [
            ("SYNC_PROP_TITLE", &mut props.title),
            ("SYNC_PROP_FLAG", &mut props.flag),
            ("SYNC_PROP_CLIENT", &mut props.client),
            ("SYNC_PROP_WORKLOAD", &mut props.workload),
            ("SYNC_PROP_START_DATE", &mut props.start_date),
            ("SYNC_PROP_END_DATE", &mut props.end_date),
            ("SYNC_PROP_SUMMARY_CLIENT", &mut props.summary_client),
            ("SYNC_PROP_SUMMARY_SCHEDULES", &mut props.summary_schedules),
        ];
        for (key, slot) in overrides {
            if let Some(value) = get(key) {
                *slot = value;
            }
        }
        props.parent_task = get("SYNC_PROP_PARENT_TASK");
        props.child_tasks = get("SYNC_PROP_CHILD_TASKS");
        if props.parent_task.is_some() != props.child_tasks.is_some() {
            return Err(invalid(
                "SYNC_PROP_PARENT_TASK",
                "parent and child task properties must be set together".to_string(),
            ));
        }

        let diagnostics = match get("SYNC_DIAGNOSTICS") {
            Some(raw) => parse_bool("SYNC_DIAGNOSTICS", &raw)?,
            None => false,
        };

        Ok(Self {
            notion,
            engine,
            diagnostics,
        })
    }
}

fn parse_flag_kind<F>(get: &F) -> Result<FlagKind, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get("SYNC_FLAG_KIND") else {
        return Ok(FlagKind::default());
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "checkbox" => Ok(FlagKind::Checkbox),
        "number" => Ok(FlagKind::Number),
        "status" => Ok(FlagKind::Status {
            unprocessed: get("SYNC_FLAG_UNPROCESSED").unwrap_or_else(|| "未処理".to_string()),
            processed: get("SYNC_FLAG_PROCESSED").unwrap_or_else(|| "処理済み".to_string()),
        }),
        other => Err(invalid("SYNC_FLAG_KIND", format!("unknown flag kind '{other}'"))),
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(invalid(key, "must be greater than zero".to_string())),
        Ok(secs) => Ok(secs),
        Err(e) => Err(invalid(key, e.to_string())),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(invalid(key, format!("expected a boolean, got '{other}'"))),
    }
}

fn invalid(key: &str, message: String) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message,
    }
}
