//! Sync engine integration tests
//!
//! Drive full/partial/single/staged passes against an in-memory database
//! with a scripted remote and a recording sink.

use async_trait::async_trait;
use pgs_common::db::{
    init_memory_database, registry, settings, sync_log, ItemType, SyncSource, SyncStatus,
    SyncType, WpObjectType,
};
use pgs_common::{Error, Result};
use pgs_syncd::content::ContentSink;
use pgs_syncd::engine::{JobTracker, SyncEngine, SyncRequest};
use pgs_syncd::remote::{CasePayload, DoctorPayload, GalleryApi, ProcedurePayload};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// Scripted remote: in-memory dataset mutated between passes
#[derive(Clone, Default)]
struct StubGallery {
    procedures: Arc<Mutex<Vec<ProcedurePayload>>>,
    cases: Arc<Mutex<HashMap<i64, Vec<CasePayload>>>>,
    doctors: Arc<Mutex<Vec<DoctorPayload>>>,
    fail_listing: Arc<AtomicBool>,
}

#[async_trait]
impl GalleryApi for StubGallery {
    async fn procedures(&self) -> Result<Vec<ProcedurePayload>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Error::Remote("listing unavailable".to_string()));
        }
        Ok(self.procedures.lock().unwrap().clone())
    }

    async fn cases(&self, procedure_api_id: i64) -> Result<Vec<CasePayload>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Error::Remote("listing unavailable".to_string()));
        }
        Ok(self
            .cases
            .lock()
            .unwrap()
            .get(&procedure_api_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn doctors(&self) -> Result<Vec<DoctorPayload>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Error::Remote("listing unavailable".to_string()));
        }
        Ok(self.doctors.lock().unwrap().clone())
    }
}

/// Records every apply/remove and hands out stable local ids per entity
#[derive(Clone, Default)]
struct RecordingSink {
    next_id: Arc<AtomicI64>,
    assigned: Arc<Mutex<HashMap<(ItemType, i64), i64>>>,
    applies: Arc<Mutex<Vec<String>>>,
    removed: Arc<Mutex<Vec<(ItemType, i64)>>>,
}

impl RecordingSink {
    fn assign(&self, item_type: ItemType, api_id: i64, label: String) -> i64 {
        self.applies.lock().unwrap().push(label);
        *self
            .assigned
            .lock()
            .unwrap()
            .entry((item_type, api_id))
            .or_insert_with(|| 1000 + self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn apply_count(&self) -> usize {
        self.applies.lock().unwrap().len()
    }

    fn reset_applies(&self) {
        self.applies.lock().unwrap().clear();
    }

    fn removed(&self) -> Vec<(ItemType, i64)> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentSink for RecordingSink {
    async fn apply_procedure(&self, procedure: &ProcedurePayload) -> Result<i64> {
        Ok(self.assign(
            ItemType::Procedure,
            procedure.id,
            format!("procedure:{}", procedure.id),
        ))
    }

    async fn apply_case(&self, case: &CasePayload) -> Result<i64> {
        Ok(self.assign(ItemType::Case, case.id, format!("case:{}", case.id)))
    }

    async fn apply_doctor(&self, doctor: &DoctorPayload) -> Result<i64> {
        Ok(self.assign(ItemType::Doctor, doctor.id, format!("doctor:{}", doctor.id)))
    }

    async fn remove(
        &self,
        item_type: ItemType,
        wordpress_id: i64,
        _wordpress_type: WpObjectType,
    ) -> Result<()> {
        self.removed.lock().unwrap().push((item_type, wordpress_id));
        Ok(())
    }
}

fn procedure(id: i64, name: &str) -> ProcedurePayload {
    ProcedurePayload {
        id,
        name: name.to_string(),
        slug: name.to_lowercase().replace(' ', "-"),
        description: String::new(),
    }
}

fn case(id: i64, procedure_id: i64) -> CasePayload {
    CasePayload {
        id,
        procedure_id,
        title: format!("Case {id}"),
        details: serde_json::Value::Null,
        photos: vec![],
    }
}

/// 1 doctor, 2 procedures, cases {101, 102, 103} under procedure 1
fn seed() -> StubGallery {
    let gallery = StubGallery::default();
    *gallery.doctors.lock().unwrap() = vec![DoctorPayload {
        id: 1,
        name: "Dr. Reyes".to_string(),
        slug: "dr-reyes".to_string(),
        bio: String::new(),
    }];
    *gallery.procedures.lock().unwrap() = vec![procedure(1, "Rhinoplasty"), procedure(2, "Facelift")];
    gallery
        .cases
        .lock()
        .unwrap()
        .insert(1, vec![case(101, 1), case(102, 1), case(103, 1)]);
    gallery
}

fn engine(gallery: &StubGallery, sink: &RecordingSink) -> SyncEngine<StubGallery, RecordingSink> {
    SyncEngine::new(gallery.clone(), sink.clone(), "T".to_string(), 7)
}

fn request(sync_type: SyncType) -> SyncRequest {
    SyncRequest {
        sync_type,
        source: SyncSource::Manual,
        procedure_api_id: None,
    }
}

#[tokio::test]
async fn full_pass_maps_the_whole_dataset() {
    let db = init_memory_database().await.unwrap();
    let (gallery, sink) = (seed(), RecordingSink::default());
    let jobs = JobTracker::default();

    let outcome = engine(&gallery, &sink)
        .run(&db, &request(SyncType::Full), &jobs)
        .await
        .unwrap();

    assert_eq!(outcome.status, SyncStatus::Completed);
    assert_eq!(outcome.items_processed, 6); // 1 doctor + 2 procedures + 3 cases
    assert_eq!(outcome.items_failed, 0);
    assert_eq!(outcome.orphans_removed, 0);

    let counts = registry::stats_by_type(&db).await.unwrap();
    assert_eq!(counts.cases, 3);
    assert_eq!(counts.procedures, 2);
    assert_eq!(counts.doctors, 1);

    // Case identity carries its procedure context
    let row = registry::get(&db, ItemType::Case, 101, "T", 1).await.unwrap();
    assert!(row.is_some());
    assert_eq!(row.unwrap().last_sync_session, outcome.session);

    let log = &sync_log::recent(&db, 1).await.unwrap()[0];
    assert_eq!(log.sync_status, SyncStatus::Completed);
    assert_eq!(log.items_processed, 6);
    assert!(log.completed_at.is_some());
}

#[tokio::test]
async fn second_pass_sweeps_the_removed_case() {
    let db = init_memory_database().await.unwrap();
    let (gallery, sink) = (seed(), RecordingSink::default());
    let jobs = JobTracker::default();
    let eng = engine(&gallery, &sink);

    eng.run(&db, &request(SyncType::Full), &jobs).await.unwrap();
    let wp_id_103 = registry::get(&db, ItemType::Case, 103, "T", 1)
        .await
        .unwrap()
        .unwrap()
        .wordpress_id;

    // Case 103 disappears from the remote
    gallery
        .cases
        .lock()
        .unwrap()
        .insert(1, vec![case(101, 1), case(102, 1)]);

    let outcome = eng.run(&db, &request(SyncType::Full), &jobs).await.unwrap();

    assert_eq!(outcome.orphans_removed, 1);
    assert!(sink.removed().contains(&(ItemType::Case, wp_id_103)));

    let counts = registry::stats_by_type(&db).await.unwrap();
    assert_eq!(counts.cases, 2);
    assert!(registry::get(&db, ItemType::Case, 103, "T", 1).await.unwrap().is_none());
}

#[tokio::test]
async fn partial_pass_skips_unchanged_content_but_refreshes_sessions() {
    let db = init_memory_database().await.unwrap();
    let (gallery, sink) = (seed(), RecordingSink::default());
    let jobs = JobTracker::default();
    let eng = engine(&gallery, &sink);

    eng.run(&db, &request(SyncType::Full), &jobs).await.unwrap();
    assert_eq!(sink.apply_count(), 6);
    sink.reset_applies();

    let outcome = eng.run(&db, &request(SyncType::Partial), &jobs).await.unwrap();

    // Nothing changed remotely: no content pushed, nothing orphaned,
    // every row moved to the new session
    assert_eq!(sink.apply_count(), 0);
    assert_eq!(outcome.orphans_removed, 0);
    assert_eq!(outcome.items_processed, 6);
    let refreshed: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sync_registry WHERE last_sync_session = ?",
    )
    .bind(&outcome.session)
    .fetch_one(&db)
    .await
    .unwrap();
    assert_eq!(refreshed, 6);

    // One procedure changes; only it gets pushed again
    gallery.procedures.lock().unwrap()[0].description = "Updated copy".to_string();
    sink.reset_applies();

    eng.run(&db, &request(SyncType::Partial), &jobs).await.unwrap();
    assert_eq!(sink.apply_count(), 1);
}

#[tokio::test]
async fn staged_pipeline_shares_one_session_across_stages() {
    let db = init_memory_database().await.unwrap();
    let (gallery, sink) = (seed(), RecordingSink::default());
    let jobs = JobTracker::default();
    let eng = engine(&gallery, &sink);

    // Baseline full pass, then case 103 disappears from the remote
    eng.run(&db, &request(SyncType::Full), &jobs).await.unwrap();
    gallery
        .cases
        .lock()
        .unwrap()
        .insert(1, vec![case(101, 1), case(102, 1)]);

    let s1 = eng.run(&db, &request(SyncType::Stage1), &jobs).await.unwrap();
    let s2 = eng.run(&db, &request(SyncType::Stage2), &jobs).await.unwrap();
    assert_eq!(s1.session, s2.session, "stages share the persisted session");
    assert_eq!(s1.items_processed, 3); // doctor + 2 procedures
    assert_eq!(s2.items_processed, 2); // cases 101, 102

    let s3 = eng.run(&db, &request(SyncType::Stage3), &jobs).await.unwrap();
    assert_eq!(s3.session, s1.session);
    assert_eq!(s3.orphans_removed, 1, "stage_3 sweeps what stages 1-2 never touched");
    assert!(registry::get(&db, ItemType::Case, 103, "T", 1).await.unwrap().is_none());

    // Stage session is consumed
    assert_eq!(settings::get_setting(&db, "stage_session").await.unwrap(), None);
}

#[tokio::test]
async fn stage_2_without_stage_1_is_rejected() {
    let db = init_memory_database().await.unwrap();
    let (gallery, sink) = (seed(), RecordingSink::default());

    let err = engine(&gallery, &sink)
        .run(&db, &request(SyncType::Stage2), &JobTracker::default())
        .await;
    assert!(matches!(err, Err(Error::InvalidInput(_))));

    // Rejected before any log entry was opened
    assert!(sync_log::recent(&db, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn single_sync_touches_one_procedure_and_never_sweeps() {
    let db = init_memory_database().await.unwrap();
    let (gallery, sink) = (seed(), RecordingSink::default());
    let jobs = JobTracker::default();
    let eng = engine(&gallery, &sink);

    eng.run(&db, &request(SyncType::Full), &jobs).await.unwrap();

    // Case 103 disappears remotely, then a single sync of procedure 1
    gallery
        .cases
        .lock()
        .unwrap()
        .insert(1, vec![case(101, 1), case(102, 1)]);

    let mut single = request(SyncType::Single);
    single.procedure_api_id = Some(1);
    let outcome = eng.run(&db, &single, &jobs).await.unwrap();

    assert_eq!(outcome.items_processed, 2);
    assert_eq!(outcome.orphans_removed, 0);

    // 103 keeps its old mapping until a full pass decides otherwise
    assert!(registry::get(&db, ItemType::Case, 103, "T", 1).await.unwrap().is_some());
}

#[tokio::test]
async fn single_sync_requires_a_procedure() {
    let db = init_memory_database().await.unwrap();
    let (gallery, sink) = (seed(), RecordingSink::default());

    let err = engine(&gallery, &sink)
        .run(&db, &request(SyncType::Single), &JobTracker::default())
        .await;
    assert!(matches!(err, Err(Error::InvalidInput(_))));

    // The pass was opened and closed as failed
    let log = &sync_log::recent(&db, 1).await.unwrap()[0];
    assert_eq!(log.sync_status, SyncStatus::Failed);
    assert!(log.completed_at.is_some());
}

#[tokio::test]
async fn listing_failure_fails_the_pass_but_closes_the_log() {
    let db = init_memory_database().await.unwrap();
    let (gallery, sink) = (seed(), RecordingSink::default());
    gallery.fail_listing.store(true, Ordering::SeqCst);

    let err = engine(&gallery, &sink)
        .run(&db, &request(SyncType::Full), &JobTracker::default())
        .await;
    assert!(matches!(err, Err(Error::Remote(_))));

    let log = &sync_log::recent(&db, 1).await.unwrap()[0];
    assert_eq!(log.sync_status, SyncStatus::Failed);
    assert!(log.completed_at.is_some());
    assert!(log
        .error_messages
        .as_deref()
        .unwrap_or_default()
        .contains("listing unavailable"));
}

#[tokio::test]
async fn scheduled_source_is_recorded_on_the_log_entry() {
    let db = init_memory_database().await.unwrap();
    let (gallery, sink) = (seed(), RecordingSink::default());

    let mut cron = request(SyncType::Partial);
    cron.source = SyncSource::Cron;
    engine(&gallery, &sink)
        .run(&db, &cron, &JobTracker::default())
        .await
        .unwrap();

    let log = &sync_log::recent(&db, 1).await.unwrap()[0];
    assert_eq!(log.sync_source, SyncSource::Cron);
}
