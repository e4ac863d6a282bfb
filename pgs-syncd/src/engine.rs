//! Sync engine
//!
//! Runs one sync pass: enumerate the remote dataset, push content through
//! the sink, and upsert every touched entity into the registry under a
//! single session id. Passes that observe the full dataset finish with an
//! orphan sweep: registry rows left on an older session were absent from
//! the remote payload and their local objects are removed.
//!
//! Staged passes (stage_1 procedures/doctors, stage_2 cases, stage_3
//! sweep) share one session id persisted in the settings table, so the
//! pipeline survives process restarts between stages.

use chrono::{DateTime, Utc};
use pgs_common::db::{
    registry, settings, sync_log, ItemType, RegistryUpsert, SyncSource, SyncStatus, SyncType,
    WpObjectType,
};
use pgs_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::content::{ContentSink, WordPressSink};
use crate::remote::{content_hash, CasePayload, DoctorPayload, GalleryApi, GalleryClient, ProcedurePayload};
use crate::AppState;

/// Settings key carrying the session id shared by staged passes
const STAGE_SESSION_KEY: &str = "stage_session";

/// One sync request as accepted from the HTTP API or the scheduler
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub sync_type: SyncType,
    pub source: SyncSource,
    /// Required for single syncs; ignored otherwise
    pub procedure_api_id: Option<i64>,
}

/// Result of a finished pass
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub log_id: i64,
    pub status: SyncStatus,
    pub items_processed: u32,
    pub items_failed: u32,
    pub orphans_removed: u64,
    pub session: String,
}

/// Snapshot of the currently running job, for status polling
#[derive(Debug, Clone, Serialize)]
pub struct ActiveJob {
    pub log_id: i64,
    pub sync_type: SyncType,
    pub sync_source: SyncSource,
    pub phase: String,
    pub items_processed: u32,
    pub items_failed: u32,
    pub started_at: DateTime<Utc>,
}

/// At-most-one-active-job gate.
///
/// Callers race on `begin`; the write lock makes the check-and-set
/// atomic, so concurrent triggers cannot both start a pass.
#[derive(Clone, Default)]
pub struct JobTracker {
    inner: Arc<RwLock<Option<ActiveJob>>>,
}

impl JobTracker {
    /// Claim the job slot. Returns false when a job is already active.
    pub async fn begin(&self, job: ActiveJob) -> bool {
        let mut guard = self.inner.write().await;
        if guard.is_some() {
            return false;
        }
        *guard = Some(job);
        true
    }

    pub async fn update(&self, f: impl FnOnce(&mut ActiveJob)) {
        if let Some(job) = self.inner.write().await.as_mut() {
            f(job);
        }
    }

    pub async fn snapshot(&self) -> Option<ActiveJob> {
        self.inner.read().await.clone()
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

#[derive(Default)]
struct PassCounters {
    processed: u32,
    failed: u32,
    errors: Vec<String>,
    orphans_removed: u64,
}

/// Claim the job slot and run the requested pass on a background task.
///
/// Returns None when a sync is already active. The spawned task always
/// releases the slot, pass outcome or not.
pub async fn launch(
    state: &AppState,
    request: SyncRequest,
) -> Option<tokio::task::JoinHandle<()>> {
    let job = ActiveJob {
        log_id: 0,
        sync_type: request.sync_type,
        sync_source: request.source,
        phase: "starting".to_string(),
        items_processed: 0,
        items_failed: 0,
        started_at: Utc::now(),
    };
    if !state.jobs.begin(job).await {
        return None;
    }

    let engine = SyncEngine::new(
        GalleryClient::new(&state.config.remote),
        WordPressSink::new(&state.config.wordpress),
        state.config.remote.api_token.clone(),
        state.config.remote.property_id,
    );
    let db = state.db.clone();
    let jobs = state.jobs.clone();

    Some(tokio::spawn(async move {
        match engine.run(&db, &request, &jobs).await {
            Ok(outcome) => info!(
                "Sync run #{} finished: {} processed, {} failed, {} orphan(s) removed",
                outcome.log_id,
                outcome.items_processed,
                outcome.items_failed,
                outcome.orphans_removed
            ),
            Err(e) => error!("Sync pass failed: {e}"),
        }
        jobs.clear().await;
    }))
}

/// One sync pass over a remote source and a content sink
pub struct SyncEngine<A, S> {
    remote: A,
    sink: S,
    api_token: String,
    property_id: i64,
}

impl<A: GalleryApi, S: ContentSink> SyncEngine<A, S> {
    pub fn new(remote: A, sink: S, api_token: String, property_id: i64) -> Self {
        Self {
            remote,
            sink,
            api_token,
            property_id,
        }
    }

    /// Run one pass. The sync log entry is always finished, even when the
    /// pass aborts.
    pub async fn run(
        &self,
        db: &SqlitePool,
        request: &SyncRequest,
        jobs: &JobTracker,
    ) -> Result<SyncOutcome> {
        let session = self.session_for(db, request.sync_type).await?;
        let log_id = sync_log::start(db, request.sync_type, request.source).await?;
        jobs.update(|j| j.log_id = log_id).await;

        info!(
            "Sync run #{log_id} started: type={}, source={}, session={session}",
            request.sync_type, request.source
        );

        let mut counters = PassCounters::default();
        let result = self.execute(db, request, &session, jobs, &mut counters).await;

        let status = match &result {
            Ok(()) => SyncStatus::Completed,
            Err(e) => {
                counters.errors.push(e.to_string());
                SyncStatus::Failed
            }
        };
        let error_text = if counters.errors.is_empty() {
            None
        } else {
            Some(counters.errors.join("\n"))
        };

        // A bookkeeping failure must not mask the pass outcome
        if let Err(e) = sync_log::finish(
            db,
            log_id,
            status,
            counters.processed,
            counters.failed,
            error_text.as_deref(),
        )
        .await
        {
            warn!("Failed to record sync outcome for run #{log_id}: {e}");
        }

        result?;
        Ok(SyncOutcome {
            log_id,
            status,
            items_processed: counters.processed,
            items_failed: counters.failed,
            orphans_removed: counters.orphans_removed,
            session,
        })
    }

    /// Session id for this pass. Full/partial/single passes mint their
    /// own; staged passes share one through the settings table.
    async fn session_for(&self, db: &SqlitePool, sync_type: SyncType) -> Result<String> {
        match sync_type {
            SyncType::Stage1 => {
                let session = new_session();
                settings::set_setting(db, STAGE_SESSION_KEY, &session).await?;
                Ok(session)
            }
            SyncType::Stage2 | SyncType::Stage3 => settings::get_setting(db, STAGE_SESSION_KEY)
                .await?
                .ok_or_else(|| {
                    Error::InvalidInput(
                        "no staged sync in progress; run stage_1 first".to_string(),
                    )
                }),
            _ => Ok(new_session()),
        }
    }

    async fn execute(
        &self,
        db: &SqlitePool,
        request: &SyncRequest,
        session: &str,
        jobs: &JobTracker,
        counters: &mut PassCounters,
    ) -> Result<()> {
        // Partial passes skip pushing unchanged content; everything else
        // pushes unconditionally.
        let skip_unchanged = request.sync_type == SyncType::Partial;

        match request.sync_type {
            SyncType::Full | SyncType::Partial => {
                self.sync_doctors(db, session, skip_unchanged, jobs, counters).await?;
                self.sync_procedures(db, session, skip_unchanged, jobs, counters).await?;
                self.sync_all_cases(db, session, skip_unchanged, jobs, counters).await?;
                self.sweep_orphans(db, session, jobs, counters).await?;
            }
            SyncType::Single => {
                let procedure_api_id = request.procedure_api_id.ok_or_else(|| {
                    Error::InvalidInput("single sync requires procedure_api_id".to_string())
                })?;
                self.sync_procedure_cases(db, procedure_api_id, session, false, jobs, counters)
                    .await?;
            }
            SyncType::Stage1 => {
                self.sync_doctors(db, session, false, jobs, counters).await?;
                self.sync_procedures(db, session, false, jobs, counters).await?;
            }
            SyncType::Stage2 => {
                self.sync_all_cases(db, session, false, jobs, counters).await?;
            }
            SyncType::Stage3 => {
                self.sweep_orphans(db, session, jobs, counters).await?;
                settings::delete_setting(db, STAGE_SESSION_KEY).await?;
            }
        }

        Ok(())
    }

    async fn sync_procedures(
        &self,
        db: &SqlitePool,
        session: &str,
        skip_unchanged: bool,
        jobs: &JobTracker,
        counters: &mut PassCounters,
    ) -> Result<()> {
        jobs.update(|j| j.phase = "procedures".to_string()).await;

        let procedures = self.remote.procedures().await?;
        for procedure in &procedures {
            match self
                .sync_one_procedure(db, procedure, session, skip_unchanged)
                .await
            {
                Ok(()) => counters.processed += 1,
                Err(e) => {
                    counters.failed += 1;
                    counters.errors.push(format!("procedure {}: {e}", procedure.id));
                    warn!("Procedure {} failed to sync: {e}", procedure.id);
                }
            }
            self.publish_counts(jobs, counters).await;
        }

        Ok(())
    }

    async fn sync_one_procedure(
        &self,
        db: &SqlitePool,
        procedure: &ProcedurePayload,
        session: &str,
        skip_unchanged: bool,
    ) -> Result<()> {
        let hash = content_hash(procedure);
        let existing =
            registry::get(db, ItemType::Procedure, procedure.id, &self.api_token, 0).await?;

        let wordpress_id = match &existing {
            Some(row) if skip_unchanged && row.sync_hash == hash => row.wordpress_id,
            _ => self.sink.apply_procedure(procedure).await?,
        };

        registry::upsert(
            db,
            &RegistryUpsert {
                item_type: ItemType::Procedure,
                api_id: procedure.id,
                wordpress_id,
                wordpress_type: WpObjectType::Term,
                api_token: self.api_token.clone(),
                property_id: self.property_id,
                procedure_api_id: 0,
                sync_hash: hash,
                sync_session: session.to_string(),
            },
        )
        .await
    }

    async fn sync_doctors(
        &self,
        db: &SqlitePool,
        session: &str,
        skip_unchanged: bool,
        jobs: &JobTracker,
        counters: &mut PassCounters,
    ) -> Result<()> {
        jobs.update(|j| j.phase = "doctors".to_string()).await;

        let doctors = self.remote.doctors().await?;
        for doctor in &doctors {
            match self.sync_one_doctor(db, doctor, session, skip_unchanged).await {
                Ok(()) => counters.processed += 1,
                Err(e) => {
                    counters.failed += 1;
                    counters.errors.push(format!("doctor {}: {e}", doctor.id));
                    warn!("Doctor {} failed to sync: {e}", doctor.id);
                }
            }
            self.publish_counts(jobs, counters).await;
        }

        Ok(())
    }

    async fn sync_one_doctor(
        &self,
        db: &SqlitePool,
        doctor: &DoctorPayload,
        session: &str,
        skip_unchanged: bool,
    ) -> Result<()> {
        let hash = content_hash(doctor);
        let existing = registry::get(db, ItemType::Doctor, doctor.id, &self.api_token, 0).await?;

        let wordpress_id = match &existing {
            Some(row) if skip_unchanged && row.sync_hash == hash => row.wordpress_id,
            _ => self.sink.apply_doctor(doctor).await?,
        };

        registry::upsert(
            db,
            &RegistryUpsert {
                item_type: ItemType::Doctor,
                api_id: doctor.id,
                wordpress_id,
                wordpress_type: WpObjectType::Post,
                api_token: self.api_token.clone(),
                property_id: self.property_id,
                procedure_api_id: 0,
                sync_hash: hash,
                sync_session: session.to_string(),
            },
        )
        .await
    }

    /// Sync cases for every procedure the remote lists. One procedure's
    /// case listing failing is recorded and the pass moves on.
    async fn sync_all_cases(
        &self,
        db: &SqlitePool,
        session: &str,
        skip_unchanged: bool,
        jobs: &JobTracker,
        counters: &mut PassCounters,
    ) -> Result<()> {
        let procedures = self.remote.procedures().await?;

        for procedure in &procedures {
            if let Err(e) = self
                .sync_procedure_cases(db, procedure.id, session, skip_unchanged, jobs, counters)
                .await
            {
                counters.failed += 1;
                counters
                    .errors
                    .push(format!("cases of procedure {}: {e}", procedure.id));
                warn!("Case listing for procedure {} failed: {e}", procedure.id);
            }
        }

        Ok(())
    }

    async fn sync_procedure_cases(
        &self,
        db: &SqlitePool,
        procedure_api_id: i64,
        session: &str,
        skip_unchanged: bool,
        jobs: &JobTracker,
        counters: &mut PassCounters,
    ) -> Result<()> {
        jobs.update(|j| j.phase = format!("cases of procedure {procedure_api_id}")).await;

        let cases = self.remote.cases(procedure_api_id).await?;
        for case in &cases {
            match self.sync_one_case(db, case, session, skip_unchanged).await {
                Ok(()) => counters.processed += 1,
                Err(e) => {
                    counters.failed += 1;
                    counters.errors.push(format!("case {}: {e}", case.id));
                    warn!("Case {} failed to sync: {e}", case.id);
                }
            }
            self.publish_counts(jobs, counters).await;
        }

        Ok(())
    }

    async fn sync_one_case(
        &self,
        db: &SqlitePool,
        case: &CasePayload,
        session: &str,
        skip_unchanged: bool,
    ) -> Result<()> {
        let hash = content_hash(case);
        let existing = registry::get(
            db,
            ItemType::Case,
            case.id,
            &self.api_token,
            case.procedure_id,
        )
        .await?;

        let wordpress_id = match &existing {
            Some(row) if skip_unchanged && row.sync_hash == hash => row.wordpress_id,
            _ => self.sink.apply_case(case).await?,
        };

        registry::upsert(
            db,
            &RegistryUpsert {
                item_type: ItemType::Case,
                api_id: case.id,
                wordpress_id,
                wordpress_type: WpObjectType::Post,
                api_token: self.api_token.clone(),
                property_id: self.property_id,
                procedure_api_id: case.procedure_id,
                sync_hash: hash,
                sync_session: session.to_string(),
            },
        )
        .await
    }

    /// Remove local objects for registry rows the current session never
    /// touched, then drop those rows. Individual removal failures are
    /// counted and the sweep continues; the failed rows keep their old
    /// session and surface again next pass.
    async fn sweep_orphans(
        &self,
        db: &SqlitePool,
        session: &str,
        jobs: &JobTracker,
        counters: &mut PassCounters,
    ) -> Result<()> {
        jobs.update(|j| j.phase = "orphan cleanup".to_string()).await;

        let orphans = registry::find_orphans(db, session, &self.api_token, None).await?;
        if orphans.is_empty() {
            return Ok(());
        }

        info!("Found {} orphaned mapping(s) to remove", orphans.len());

        let mut removable = Vec::new();
        for row in &orphans {
            match self
                .sink
                .remove(row.item_type, row.wordpress_id, row.wordpress_type)
                .await
            {
                Ok(()) => removable.push(row.id),
                Err(e) => {
                    counters.failed += 1;
                    counters
                        .errors
                        .push(format!("remove {} {}: {e}", row.item_type, row.api_id));
                    warn!("Failed to remove {} {}: {e}", row.item_type, row.api_id);
                }
            }
        }

        counters.orphans_removed = registry::delete_by_ids(db, &removable).await?;
        self.publish_counts(jobs, counters).await;

        Ok(())
    }

    async fn publish_counts(&self, jobs: &JobTracker, counters: &PassCounters) {
        let (processed, failed) = (counters.processed, counters.failed);
        jobs.update(|j| {
            j.items_processed = processed;
            j.items_failed = failed;
        })
        .await;
    }
}

fn new_session() -> String {
    Uuid::new_v4().simple().to_string()
}
