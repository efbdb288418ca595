//! Reconciliation engine — links new schedules into their client's workload
//! summary and marks them processed.
//!
//! Each cycle:
//! 1. Query schedules that are unprocessed and linked to a client
//! 2. For each, in the order returned: find the client's workload summary,
//!    append the schedule to its relation, then flip the schedule's flag
//! 3. Report every entry's outcome, then sleep until the next cycle
//!
//! The flag is the only record of completion. An entry that fails anywhere
//! keeps its flag unprocessed and is rediscovered on the next cycle. A flag
//! update that fails after the link was written leaves the link in place,
//! so under `LinkMode::Append` the retry links the schedule a second time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{EngineSettings, LinkMode};
use crate::error::{FailureKind, SyncFailure};
use crate::schedule::{ScheduleEntity, to_schedule_entity};
use crate::workspace::filter::Filter;
use crate::workspace::{PropertyValue, WorkspaceApi, props};

/// Where an entry ended up after one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Linked and flagged.
    Processed,
    /// No usable workload summary record (missing, or the lookup failed).
    FailedAtLookup,
    /// Parent task could not be updated; nothing else was written.
    FailedAtParent,
    /// Link was not written; flag untouched.
    FailedAtLink,
    /// Link written, flag still unprocessed.
    FailedAtFlag,
}

/// Outcome of reconciling one schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryReport {
    pub schedule_id: String,
    pub title: String,
    pub state: EntryState,
    /// Workload summary the schedule was matched to, if any.
    pub workload_id: Option<String>,
    pub failure: Option<SyncFailure>,
}

impl EntryReport {
    fn processed(entry: &ScheduleEntity, workload_id: String) -> Self {
        Self {
            schedule_id: entry.id.clone(),
            title: entry.title.clone(),
            state: EntryState::Processed,
            workload_id: Some(workload_id),
            failure: None,
        }
    }

    fn failed(
        entry: &ScheduleEntity,
        state: EntryState,
        workload_id: Option<String>,
        failure: SyncFailure,
    ) -> Self {
        Self {
            schedule_id: entry.id.clone(),
            title: entry.title.clone(),
            state,
            workload_id,
            failure: Some(failure),
        }
    }

    pub fn is_processed(&self) -> bool {
        self.state == EntryState::Processed
    }
}

/// Result of one poll cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    /// Set when discovery failed; the cycle then has no entries.
    pub fetch_failure: Option<SyncFailure>,
    pub entries: Vec<EntryReport>,
}

impl CycleReport {
    pub fn processed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_processed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.entries.len() - self.processed_count()
    }
}

/// Polls the schedule database and reconciles new entries one at a time.
pub struct ReconcileEngine {
    api: Arc<dyn WorkspaceApi>,
    settings: EngineSettings,
    cycles: AtomicU64,
}

impl ReconcileEngine {
    pub fn new(api: Arc<dyn WorkspaceApi>, settings: EngineSettings) -> Self {
        Self {
            api,
            settings,
            cycles: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Fetch schedules that are unprocessed and linked to a client.
    pub async fn discover(&self) -> Result<Vec<ScheduleEntity>, SyncFailure> {
        let props = &self.settings.properties;
        let filter = Filter::and([
            self.settings.flag_kind.unprocessed_filter(&props.flag),
            Filter::relation_is_not_empty(&props.client),
        ]);

        let records = self
            .api
            .query(&self.settings.schedule_db_id, &filter)
            .await
            .map_err(|e| SyncFailure::from_api(FailureKind::Fetch, e))?;

        Ok(records
            .iter()
            .map(|r| to_schedule_entity(r, props, &self.settings.flag_kind))
            .filter(ScheduleEntity::is_eligible)
            .collect())
    }

    /// Find the workload summary record for the entry's client. The first
    /// match wins.
    pub async fn locate_summary(&self, entry: &ScheduleEntity) -> Result<String, SyncFailure> {
        let filter =
            Filter::relation_contains(&self.settings.properties.summary_client, &entry.client_id);

        let matches = self
            .api
            .query(&self.settings.workload_db_id, &filter)
            .await
            .map_err(|e| SyncFailure::from_api(FailureKind::Fetch, e))?;

        if matches.len() > 1 {
            warn!(
                schedule_id = %entry.id,
                client_id = %entry.client_id,
                count = matches.len(),
                "Multiple workload summaries match client, using the first"
            );
        }

        matches
            .into_iter()
            .next()
            .map(|r| r.id)
            .ok_or_else(|| SyncFailure::not_found(&entry.client_id))
    }

    /// Append the entry to its parent task's child relation.
    pub async fn link_parent(
        &self,
        parent_id: &str,
        entry: &ScheduleEntity,
    ) -> Result<(), SyncFailure> {
        let Some((_, children)) = self.settings.properties.hierarchy() else {
            return Ok(());
        };
        self.append_relation(parent_id, children, &entry.id, FailureKind::ParentUpdate)
            .await
    }

    /// Append the entry to the workload summary's schedule relation.
    pub async fn link_schedule(
        &self,
        workload_id: &str,
        entry: &ScheduleEntity,
    ) -> Result<(), SyncFailure> {
        self.append_relation(
            workload_id,
            &self.settings.properties.summary_schedules,
            &entry.id,
            FailureKind::LinkUpdate,
        )
        .await
    }

    /// Flip the entry's flag to processed.
    pub async fn mark_processed(&self, entry: &ScheduleEntity) -> Result<(), SyncFailure> {
        let update = [(
            self.settings.properties.flag.clone(),
            self.settings.flag_kind.processed_value(),
        )];
        self.api
            .patch_page(&entry.id, &update)
            .await
            .map_err(|e| SyncFailure::from_api(FailureKind::FlagUpdate, e))
    }

    /// Read a page's relation, append `id`, and write it back.
    async fn append_relation(
        &self,
        page_id: &str,
        property: &str,
        id: &str,
        kind: FailureKind,
    ) -> Result<(), SyncFailure> {
        let page = self
            .api
            .get_page(page_id)
            .await
            .map_err(|e| SyncFailure::from_api(FailureKind::Fetch, e))?;

        let mut ids = props::relation_ids(&page.properties, property);
        if self.settings.link_mode == LinkMode::AppendIfMissing && ids.iter().any(|x| x == id) {
            debug!(page_id, id, property, "Already linked, skipping append");
            return Ok(());
        }
        ids.push(id.to_string());

        self.api
            .patch_page(page_id, &[(property.to_string(), PropertyValue::Relation(ids))])
            .await
            .map_err(|e| SyncFailure::from_api(kind, e))
    }

    /// Reconcile one entry: lookup, parent link, link, flag. Each step runs
    /// only if the previous one succeeded.
    pub async fn process_entry(&self, entry: &ScheduleEntity) -> EntryReport {
        let workload_id = match self.locate_summary(entry).await {
            Ok(id) => id,
            Err(failure) => {
                return EntryReport::failed(entry, EntryState::FailedAtLookup, None, failure);
            }
        };

        if let Some(parent_id) = &entry.parent_task_id
            && let Err(failure) = self.link_parent(parent_id, entry).await
        {
            let state = EntryState::FailedAtParent;
            return EntryReport::failed(entry, state, Some(workload_id), failure);
        }

        if let Err(failure) = self.link_schedule(&workload_id, entry).await {
            let state = EntryState::FailedAtLink;
            return EntryReport::failed(entry, state, Some(workload_id), failure);
        }

        if let Err(failure) = self.mark_processed(entry).await {
            let state = EntryState::FailedAtFlag;
            return EntryReport::failed(entry, state, Some(workload_id), failure);
        }

        EntryReport::processed(entry, workload_id)
    }

    /// One full pass: discover, then process entries strictly in sequence.
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let started_at = Utc::now();
        debug!(cycle, "Sync cycle started");

        let entries = match self.discover().await {
            Ok(entries) => entries,
            Err(failure) => {
                error!(
                    cycle,
                    code = failure.code(),
                    error = %failure,
                    "Failed to fetch new schedule entries"
                );
                return CycleReport {
                    cycle,
                    started_at,
                    fetch_failure: Some(failure),
                    entries: Vec::new(),
                };
            }
        };

        let mut reports = Vec::with_capacity(entries.len());
        for entry in &entries {
            let report = self.process_entry(entry).await;
            log_entry(&report);
            reports.push(report);
        }

        let report = CycleReport {
            cycle,
            started_at,
            fetch_failure: None,
            entries: reports,
        };
        if !report.entries.is_empty() {
            info!(
                cycle,
                processed = report.processed_count(),
                failed = report.failed_count(),
                "Sync cycle finished"
            );
        }
        report
    }

    /// Poll until `shutdown` becomes `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.settings.poll_interval.as_secs(),
            schedule_db = %self.settings.schedule_db_id,
            workload_db = %self.settings.workload_db_id,
            "Workload sync started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.run_cycle().await;

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Workload sync shutting down");
    }
}

fn log_entry(report: &EntryReport) {
    let Some(failure) = &report.failure else {
        info!(
            schedule_id = %report.schedule_id,
            title = %report.title,
            workload_id = report.workload_id.as_deref().unwrap_or_default(),
            "Schedule linked and marked processed"
        );
        return;
    };

    if failure.kind == FailureKind::NotFound {
        warn!(
            schedule_id = %report.schedule_id,
            title = %report.title,
            code = failure.code(),
            "{failure}"
        );
    } else {
        error!(
            schedule_id = %report.schedule_id,
            title = %report.title,
            state = ?report.state,
            code = failure.code(),
            status = failure.status,
            "Failed to reconcile schedule: {}",
            failure.message
        );
    }
}

/// Spawn the polling loop as a background task.
pub fn spawn_sync_loop(
    engine: Arc<ReconcileEngine>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move { engine.run(shutdown).await })
}
