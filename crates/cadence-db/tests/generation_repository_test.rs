//! PostgreSQL integration tests for the generation repository.
//!
//! Run with a migrated-on-the-fly database:
//! `DATABASE_URL=postgres://... cargo test -p cadence-db -- --ignored`

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use cadence_db::test_fixtures::{new_music_job, test_database_url};
use cadence_db::{
    new_v7, CatalogEntry, CatalogRepository, CompletionWrite, Database, GenerationRepository,
    GenerationStatus, NewVariant, ReconcileFilter, StoredArtifactRecord, TerminalUpdate,
    WriteOutcome,
};

async fn setup() -> Database {
    let db = Database::connect(&test_database_url())
        .await
        .expect("connect to test database");
    sqlx::migrate!("../../migrations")
        .run(&db.pool)
        .await
        .expect("run migrations");
    db
}

fn record(index: i32) -> StoredArtifactRecord {
    StoredArtifactRecord {
        artifact_index: index,
        artifact_url: Some(format!("https://cdn.example/{}.mp3", index)),
        storage_path: if index == 0 {
            Some(format!("generations/x/music/t_{}.mp3", index))
        } else {
            None
        },
        content_hash: None,
        size_bytes: None,
        fallback_reason: None,
        artifact: Default::default(),
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_insert_and_promote_to_processing() {
    let db = setup().await;
    let job = db.generations.insert(new_music_job(Uuid::new_v4())).await.unwrap();
    assert_eq!(job.status, GenerationStatus::Pending);

    assert!(db.generations.mark_processing(job.id).await.unwrap());
    assert!(!db.generations.mark_processing(job.id).await.unwrap());

    let found = db
        .generations
        .find_by_task_id(&job.provider_task_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.status, GenerationStatus::Processing);

    let processing = db
        .generations
        .list_processing(&ReconcileFilter::for_job(job.id))
        .await
        .unwrap();
    assert_eq!(processing.len(), 1);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_complete_twice_inserts_variants_once() {
    let db = setup().await;
    let owner = Uuid::new_v4();
    let job = db.generations.insert(new_music_job(owner)).await.unwrap();
    db.generations.mark_processing(job.id).await.unwrap();

    let write = CompletionWrite {
        job_id: job.id,
        owner_id: owner,
        kind: job.kind,
        provider_task_id: job.provider_task_id.clone(),
        parameters: job.parameters.clone(),
        primary: record(0),
        metadata_patch: json!({"recovery_method": "callback"}),
        variants: vec![
            NewVariant {
                id: new_v7(),
                title: "Fixture Song (Variant 2)".to_string(),
                record: record(1),
                metadata: json!({"is_additional_variant": true}),
            },
            NewVariant {
                id: new_v7(),
                title: "Fixture Song (Variant 3)".to_string(),
                record: record(2),
                metadata: json!({"is_additional_variant": true}),
            },
        ],
        catalog_entry: CatalogEntry {
            owner_id: owner,
            content_type: "music_tracks".to_string(),
            content_id: job.id,
        },
        completed_at: Utc::now(),
        callback_received_at: Some(Utc::now()),
    };

    let first = db.generations.complete(&write).await.unwrap();
    assert_eq!(
        first,
        WriteOutcome::Applied {
            variants_inserted: 2,
            catalog_created: true
        }
    );

    // A racing path with fresh variant ids loses on the status guard.
    let mut second = write.clone();
    for v in &mut second.variants {
        v.id = new_v7();
    }
    assert_eq!(db.generations.complete(&second).await.unwrap(), WriteOutcome::Superseded);

    let variants = db.generations.list_variants(job.id).await.unwrap();
    assert_eq!(variants.len(), 2);
    assert!(variants.iter().all(|v| v.parent_generation_id == Some(job.id)));
    assert!(db.catalog.contains(job.id).await.unwrap());

    let stored = db.generations.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, GenerationStatus::Completed);
    assert_eq!(stored.metadata["recovery_method"], "callback");
    assert!(stored.callback_received_at.is_some());
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_terminal_state_is_never_overwritten() {
    let db = setup().await;
    let job = db.generations.insert(new_music_job(Uuid::new_v4())).await.unwrap();
    db.generations.mark_processing(job.id).await.unwrap();

    let rejected = TerminalUpdate {
        job_id: job.id,
        status: GenerationStatus::Rejected,
        error_message: "M".to_string(),
        metadata_patch: json!({}),
        completed_at: Utc::now(),
        callback_received_at: None,
    };
    assert!(db.generations.resolve_terminal(&rejected).await.unwrap());

    let failed = TerminalUpdate {
        status: GenerationStatus::Failed,
        error_message: "late".to_string(),
        ..rejected
    };
    assert!(!db.generations.resolve_terminal(&failed).await.unwrap());

    let stored = db.generations.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, GenerationStatus::Rejected);
    assert_eq!(stored.error_message.as_deref(), Some("M"));
}
