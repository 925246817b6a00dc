use std::fs;
use std::path::Path;

use facematch_cli::cli::{ListArgs, RemoveArgs, SettingsArgs};
use facematch_cli::errors::{AppError, CoreError};
use facematch_cli::faces::{run_list, run_remove};
use facematch_core::faces::store::{EmbeddingStore, FilesystemEmbeddingStore};
use facematch_core::faces::vector::{Embedding, FaceRegion, PoolTag, SubjectRecord, Vector};
use tempfile::tempdir;

const DIMENSION: usize = 4;

fn settings(root: &Path) -> SettingsArgs {
    let config = root.join("config.toml");
    fs::write(&config, format!("dimension = {DIMENSION}\n")).unwrap();
    SettingsArgs {
        config: Some(config),
        store_dir: Some(root.join("store")),
        shared_secret: None,
    }
}

fn seed(root: &Path, pool: PoolTag, subject_id: &str) {
    let store = FilesystemEmbeddingStore::open(root.join("store"), DIMENSION).unwrap();
    let lock = store.lock_pool(pool).unwrap();
    store
        .commit(
            &lock,
            SubjectRecord {
                pool,
                subject_id: subject_id.into(),
                display_name: None,
                enrolled_at: "2025-02-02T10:00:00.000Z".into(),
            },
            Embedding {
                id: format!("emb-{subject_id}"),
                pool,
                subject_id: subject_id.into(),
                vector: Vector::new(vec![0.1; DIMENSION]),
                face_region: FaceRegion {
                    left: 0,
                    top: 0,
                    right: 100,
                    bottom: 100,
                },
                created_at: "2025-02-02T10:00:00.000Z".into(),
            },
        )
        .unwrap();
}

#[test]
fn list_and_remove_work_without_encoder_models() {
    let dir = tempdir().unwrap();
    seed(dir.path(), PoolTag::Student, "s-1");
    seed(dir.path(), PoolTag::Staff, "t-1");

    let listing = run_list(&ListArgs {
        pool: None,
        settings: settings(dir.path()),
    })
    .unwrap();
    assert_eq!(listing.pools.len(), 2);
    assert_eq!(listing.pools[1].subjects[0].subject_id, "t-1");

    let removal = run_remove(&RemoveArgs {
        pool: PoolTag::Student,
        subject: "s-1".into(),
        settings: settings(dir.path()),
    })
    .unwrap();
    assert_eq!(removal.removed_embedding_ids, vec!["emb-s-1".to_string()]);

    let listing = run_list(&ListArgs {
        pool: Some(PoolTag::Student),
        settings: settings(dir.path()),
    })
    .unwrap();
    assert!(listing.pools[0].subjects.is_empty());
}

#[test]
fn removing_unknown_subject_reports_not_found() {
    let dir = tempdir().unwrap();
    let err = run_remove(&RemoveArgs {
        pool: PoolTag::Staff,
        subject: "ghost".into(),
        settings: settings(dir.path()),
    })
    .unwrap_err();
    assert!(matches!(
        err,
        AppError::Core(CoreError::SubjectNotFound { .. })
    ));
}

#[test]
fn remove_sees_subjects_enrolled_after_the_store_was_opened() {
    let dir = tempdir().unwrap();
    let stale = FilesystemEmbeddingStore::open(dir.path().join("store"), DIMENSION).unwrap();
    seed(dir.path(), PoolTag::Student, "s-1");
    seed(dir.path(), PoolTag::Student, "s-2");

    run_remove(&RemoveArgs {
        pool: PoolTag::Student,
        subject: "s-1".into(),
        settings: settings(dir.path()),
    })
    .unwrap();

    // A handle opened before any of this still writes on top of the latest file.
    let lock = stale.lock_pool(PoolTag::Student).unwrap();
    let ids: Vec<_> = stale
        .subjects(PoolTag::Student)
        .unwrap()
        .into_iter()
        .map(|record| record.subject_id)
        .collect();
    assert_eq!(ids, vec!["s-2"]);
    drop(lock);
    assert!(dir.path().join("store").join("student.lock").exists());
}
