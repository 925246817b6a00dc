use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};
use crate::faces::vector::{Embedding, PoolTag, SubjectRecord};

const POOL_DOCUMENT_VERSION: u32 = 1;

/// Write access to one pool. Released when dropped.
#[derive(Debug)]
#[must_use = "the pool is unlocked as soon as the lock is dropped"]
pub struct PoolLock {
    pool: PoolTag,
    file: Option<File>,
}

impl PoolLock {
    /// A lock with nothing behind it, for stores that never leave the process.
    pub fn in_process(pool: PoolTag) -> Self {
        Self { pool, file: None }
    }

    pub fn pool(&self) -> PoolTag {
        self.pool
    }

    fn check(&self, pool: PoolTag) -> AppResult<()> {
        if self.pool != pool {
            return Err(AppError::Configuration(format!(
                "lock for pool {} used to write pool {pool}",
                self.pool
            )));
        }
        Ok(())
    }
}

impl Drop for PoolLock {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            if let Err(err) = FileExt::unlock(file) {
                debug!(pool = %self.pool, error = %err, "failed to release pool lock");
            }
        }
    }
}

/// Enrolled subjects and their embeddings, partitioned by pool.
///
/// Writes go through a [`PoolLock`] taken with `lock_pool`, so a duplicate
/// check and the commit that follows it see the same pool contents.
pub trait EmbeddingStore {
    /// Embeddings of `pool` in insertion order.
    fn embeddings(&self, pool: PoolTag) -> AppResult<Vec<Embedding>>;

    fn subjects(&self, pool: PoolTag) -> AppResult<Vec<SubjectRecord>>;

    fn subject(&self, pool: PoolTag, subject_id: &str) -> AppResult<Option<SubjectRecord>>;

    /// Blocks until no other writer holds `pool`, then refreshes the pool from
    /// durable storage.
    fn lock_pool(&self, pool: PoolTag) -> AppResult<PoolLock>;

    /// Stores the subject and its embedding together; on error neither is kept.
    fn commit(&self, lock: &PoolLock, subject: SubjectRecord, embedding: Embedding)
        -> AppResult<()>;

    /// Deletes the subject and every embedding that references it.
    fn remove_subject(&self, lock: &PoolLock, subject_id: &str) -> AppResult<Vec<Embedding>>;
}

impl<T: EmbeddingStore + ?Sized> EmbeddingStore for Arc<T> {
    fn embeddings(&self, pool: PoolTag) -> AppResult<Vec<Embedding>> {
        (**self).embeddings(pool)
    }

    fn subjects(&self, pool: PoolTag) -> AppResult<Vec<SubjectRecord>> {
        (**self).subjects(pool)
    }

    fn subject(&self, pool: PoolTag, subject_id: &str) -> AppResult<Option<SubjectRecord>> {
        (**self).subject(pool, subject_id)
    }

    fn lock_pool(&self, pool: PoolTag) -> AppResult<PoolLock> {
        (**self).lock_pool(pool)
    }

    fn commit(
        &self,
        lock: &PoolLock,
        subject: SubjectRecord,
        embedding: Embedding,
    ) -> AppResult<()> {
        (**self).commit(lock, subject, embedding)
    }

    fn remove_subject(&self, lock: &PoolLock, subject_id: &str) -> AppResult<Vec<Embedding>> {
        (**self).remove_subject(lock, subject_id)
    }
}

impl<T: EmbeddingStore + ?Sized> EmbeddingStore for Box<T> {
    fn embeddings(&self, pool: PoolTag) -> AppResult<Vec<Embedding>> {
        (**self).embeddings(pool)
    }

    fn subjects(&self, pool: PoolTag) -> AppResult<Vec<SubjectRecord>> {
        (**self).subjects(pool)
    }

    fn subject(&self, pool: PoolTag, subject_id: &str) -> AppResult<Option<SubjectRecord>> {
        (**self).subject(pool, subject_id)
    }

    fn lock_pool(&self, pool: PoolTag) -> AppResult<PoolLock> {
        (**self).lock_pool(pool)
    }

    fn commit(
        &self,
        lock: &PoolLock,
        subject: SubjectRecord,
        embedding: Embedding,
    ) -> AppResult<()> {
        (**self).commit(lock, subject, embedding)
    }

    fn remove_subject(&self, lock: &PoolLock, subject_id: &str) -> AppResult<Vec<Embedding>> {
        (**self).remove_subject(lock, subject_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct PoolState {
    subjects: Vec<SubjectRecord>,
    embeddings: Vec<Embedding>,
}

impl PoolState {
    fn subject(&self, subject_id: &str) -> Option<&SubjectRecord> {
        self.subjects
            .iter()
            .find(|record| record.subject_id == subject_id)
    }

    fn with_commit(&self, subject: SubjectRecord, embedding: Embedding) -> AppResult<Self> {
        if embedding.pool != subject.pool || embedding.subject_id != subject.subject_id {
            return Err(AppError::Configuration(format!(
                "embedding {} does not belong to subject {} in pool {}",
                embedding.id, subject.subject_id, subject.pool
            )));
        }
        if self.subject(&subject.subject_id).is_some() {
            return Err(AppError::SubjectAlreadyEnrolled {
                pool: subject.pool,
                subject_id: subject.subject_id,
            });
        }

        let mut next = self.clone();
        next.subjects.push(subject);
        next.embeddings.push(embedding);
        Ok(next)
    }

    fn without_subject(&self, pool: PoolTag, subject_id: &str) -> AppResult<(Self, Vec<Embedding>)> {
        if self.subject(subject_id).is_none() {
            return Err(AppError::SubjectNotFound {
                pool,
                subject_id: subject_id.to_string(),
            });
        }

        let mut next = Self::default();
        let mut removed = Vec::new();
        next.subjects = self
            .subjects
            .iter()
            .filter(|record| record.subject_id != subject_id)
            .cloned()
            .collect();
        for embedding in &self.embeddings {
            if embedding.subject_id == subject_id {
                removed.push(embedding.clone());
            } else {
                next.embeddings.push(embedding.clone());
            }
        }
        Ok((next, removed))
    }
}

/// Process-local store; reads run concurrently under the read lock.
#[derive(Debug, Default)]
pub struct MemoryEmbeddingStore {
    pools: RwLock<HashMap<PoolTag, PoolState>>,
}

impl MemoryEmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EmbeddingStore for MemoryEmbeddingStore {
    fn embeddings(&self, pool: PoolTag) -> AppResult<Vec<Embedding>> {
        Ok(self
            .pools
            .read()
            .get(&pool)
            .map(|state| state.embeddings.clone())
            .unwrap_or_default())
    }

    fn subjects(&self, pool: PoolTag) -> AppResult<Vec<SubjectRecord>> {
        Ok(self
            .pools
            .read()
            .get(&pool)
            .map(|state| state.subjects.clone())
            .unwrap_or_default())
    }

    fn subject(&self, pool: PoolTag, subject_id: &str) -> AppResult<Option<SubjectRecord>> {
        Ok(self
            .pools
            .read()
            .get(&pool)
            .and_then(|state| state.subject(subject_id).cloned()))
    }

    fn lock_pool(&self, pool: PoolTag) -> AppResult<PoolLock> {
        Ok(PoolLock::in_process(pool))
    }

    fn commit(
        &self,
        lock: &PoolLock,
        subject: SubjectRecord,
        embedding: Embedding,
    ) -> AppResult<()> {
        lock.check(subject.pool)?;
        let mut pools = self.pools.write();
        let state = pools.entry(subject.pool).or_default();
        *state = state.with_commit(subject, embedding)?;
        Ok(())
    }

    fn remove_subject(&self, lock: &PoolLock, subject_id: &str) -> AppResult<Vec<Embedding>> {
        let pool = lock.pool();
        let mut pools = self.pools.write();
        let state = pools.entry(pool).or_default();
        let (next, removed) = state.without_subject(pool, subject_id)?;
        *state = next;
        Ok(removed)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PoolDocument {
    version: u32,
    pool: PoolTag,
    #[serde(default)]
    subjects: Vec<SubjectRecord>,
    #[serde(default)]
    embeddings: Vec<Embedding>,
}

/// One JSON document per pool under `dir`, rewritten whole on every change.
///
/// Reads are served from the pools loaded at `open`. Writers in any process
/// serialize on an exclusive lock of `<dir>/<pool>.lock` and re-read the pool
/// document while holding it.
#[derive(Debug)]
pub struct FilesystemEmbeddingStore {
    dir: PathBuf,
    dimension: usize,
    pools: RwLock<HashMap<PoolTag, PoolState>>,
}

impl FilesystemEmbeddingStore {
    pub fn open(dir: impl Into<PathBuf>, dimension: usize) -> AppResult<Self> {
        let dir = dir.into();
        let mut pools = HashMap::new();
        for pool in PoolTag::ALL {
            let path = pool_path(&dir, pool);
            let state = read_pool_document(&path, pool, dimension)?;
            debug!(
                %pool,
                path = %path.display(),
                subjects = state.subjects.len(),
                embeddings = state.embeddings.len(),
                "loaded pool"
            );
            pools.insert(pool, state);
        }

        Ok(Self {
            dir,
            dimension,
            pools: RwLock::new(pools),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn pool_path(&self, pool: PoolTag) -> PathBuf {
        pool_path(&self.dir, pool)
    }

    pub fn lock_path(&self, pool: PoolTag) -> PathBuf {
        self.dir.join(format!("{}.lock", pool.as_str()))
    }

    fn load(&self, pool: PoolTag) -> AppResult<PoolState> {
        read_pool_document(&self.pool_path(pool), pool, self.dimension)
    }
}

impl EmbeddingStore for FilesystemEmbeddingStore {
    fn embeddings(&self, pool: PoolTag) -> AppResult<Vec<Embedding>> {
        Ok(self
            .pools
            .read()
            .get(&pool)
            .map(|state| state.embeddings.clone())
            .unwrap_or_default())
    }

    fn subjects(&self, pool: PoolTag) -> AppResult<Vec<SubjectRecord>> {
        Ok(self
            .pools
            .read()
            .get(&pool)
            .map(|state| state.subjects.clone())
            .unwrap_or_default())
    }

    fn subject(&self, pool: PoolTag, subject_id: &str) -> AppResult<Option<SubjectRecord>> {
        Ok(self
            .pools
            .read()
            .get(&pool)
            .and_then(|state| state.subject(subject_id).cloned()))
    }

    fn lock_pool(&self, pool: PoolTag) -> AppResult<PoolLock> {
        let path = self.lock_path(pool);
        fs::create_dir_all(&self.dir).map_err(|source| AppError::StoreWrite {
            path: self.dir.clone(),
            source,
        })?;
        let lock_err = |source: std::io::Error| AppError::StoreLock {
            path: path.clone(),
            source,
        };

        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let file = options.open(&path).map_err(lock_err)?;
        file.lock_exclusive().map_err(lock_err)?;
        let lock = PoolLock {
            pool,
            file: Some(file),
        };

        let state = self.load(pool)?;
        debug!(%pool, embeddings = state.embeddings.len(), "pool locked and refreshed");
        self.pools.write().insert(pool, state);
        Ok(lock)
    }

    fn commit(
        &self,
        lock: &PoolLock,
        subject: SubjectRecord,
        embedding: Embedding,
    ) -> AppResult<()> {
        let pool = subject.pool;
        lock.check(pool)?;
        embedding
            .vector
            .validate(self.dimension, &format!("embedding {}", embedding.id))?;
        let mut pools = self.pools.write();
        let next = self.load(pool)?.with_commit(subject, embedding)?;
        write_pool_document(&self.pool_path(pool), pool, &next)?;
        info!(%pool, embeddings = next.embeddings.len(), "pool document updated");
        pools.insert(pool, next);
        Ok(())
    }

    fn remove_subject(&self, lock: &PoolLock, subject_id: &str) -> AppResult<Vec<Embedding>> {
        let pool = lock.pool();
        let mut pools = self.pools.write();
        let (next, removed) = self.load(pool)?.without_subject(pool, subject_id)?;
        write_pool_document(&self.pool_path(pool), pool, &next)?;
        info!(%pool, subject_id, removed = removed.len(), "pool document updated");
        pools.insert(pool, next);
        Ok(removed)
    }
}

pub fn pool_path(dir: &Path, pool: PoolTag) -> PathBuf {
    dir.join(format!("{}.json", pool.as_str()))
}

fn read_pool_document(path: &Path, pool: PoolTag, dimension: usize) -> AppResult<PoolState> {
    if !path.exists() {
        return Ok(PoolState::default());
    }

    let data = fs::read(path).map_err(|source| AppError::StoreRead {
        path: path.to_path_buf(),
        source,
    })?;
    let document: PoolDocument =
        serde_json::from_slice(&data).map_err(|err| AppError::InvalidStore {
            path: path.to_path_buf(),
            message: format!("invalid pool document: {err}"),
        })?;

    let invalid = |message: String| AppError::InvalidStore {
        path: path.to_path_buf(),
        message,
    };
    if document.version != POOL_DOCUMENT_VERSION {
        return Err(invalid(format!(
            "unsupported document version {}",
            document.version
        )));
    }
    if document.pool != pool {
        return Err(invalid(format!(
            "document is for pool {}, expected {pool}",
            document.pool
        )));
    }

    let mut known = HashSet::new();
    for subject in &document.subjects {
        if subject.pool != pool {
            return Err(invalid(format!(
                "subject {} is tagged with pool {}",
                subject.subject_id, subject.pool
            )));
        }
        if !known.insert(subject.subject_id.as_str()) {
            return Err(invalid(format!(
                "subject {} appears more than once",
                subject.subject_id
            )));
        }
    }
    for embedding in &document.embeddings {
        embedding
            .vector
            .validate(dimension, &format!("stored embedding {}", embedding.id))?;
        if embedding.pool != pool {
            return Err(invalid(format!(
                "embedding {} is tagged with pool {}",
                embedding.id, embedding.pool
            )));
        }
        if !known.contains(embedding.subject_id.as_str()) {
            return Err(invalid(format!(
                "embedding {} references unknown subject {}",
                embedding.id, embedding.subject_id
            )));
        }
    }

    Ok(PoolState {
        subjects: document.subjects,
        embeddings: document.embeddings,
    })
}

fn write_pool_document(path: &Path, pool: PoolTag, state: &PoolState) -> AppResult<()> {
    let write_err = |source: std::io::Error| AppError::StoreWrite {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| AppError::StoreWrite {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let document = PoolDocument {
        version: POOL_DOCUMENT_VERSION,
        pool,
        subjects: state.subjects.clone(),
        embeddings: state.embeddings.clone(),
    };
    let serialized = serde_json::to_vec_pretty(&document)?;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
    {
        let file = tmp.as_file_mut();
        {
            let mut writer = BufWriter::new(&mut *file);
            writer.write_all(&serialized).map_err(write_err)?;
            writer.write_all(b"\n").map_err(write_err)?;
            writer.flush().map_err(write_err)?;
        }
        file.sync_all().map_err(write_err)?;
    }

    let file = tmp.persist(path).map_err(|err| write_err(err.error))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = file.metadata().map_err(write_err)?.permissions();
        perms.set_mode(0o600);
        file.set_permissions(perms).map_err(write_err)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faces::vector::{FaceRegion, Vector, FACE_EMBEDDING_DIM};
    use tempfile::TempDir;

    fn subject(pool: PoolTag, id: &str) -> SubjectRecord {
        SubjectRecord {
            pool,
            subject_id: id.into(),
            display_name: None,
            enrolled_at: "2025-03-01T08:00:00.000Z".into(),
        }
    }

    fn commit_one<S: EmbeddingStore>(
        store: &S,
        subject: SubjectRecord,
        embedding: Embedding,
    ) -> AppResult<()> {
        let lock = store.lock_pool(subject.pool)?;
        store.commit(&lock, subject, embedding)
    }

    fn remove_one<S: EmbeddingStore>(
        store: &S,
        pool: PoolTag,
        subject_id: &str,
    ) -> AppResult<Vec<Embedding>> {
        let lock = store.lock_pool(pool)?;
        store.remove_subject(&lock, subject_id)
    }

    fn embedding(pool: PoolTag, subject_id: &str, id: &str) -> Embedding {
        Embedding {
            id: id.into(),
            pool,
            subject_id: subject_id.into(),
            vector: Vector::new(vec![0.05; FACE_EMBEDDING_DIM]),
            face_region: FaceRegion {
                left: 1,
                top: 2,
                right: 101,
                bottom: 102,
            },
            created_at: "2025-03-01T08:00:00.000Z".into(),
        }
    }

    #[test]
    fn memory_store_keeps_pools_apart() {
        let store = MemoryEmbeddingStore::new();
        commit_one(
            &store,
            subject(PoolTag::Student, "s-1"),
            embedding(PoolTag::Student, "s-1", "e-1"),
        )
        .unwrap();
        commit_one(
            &store,
            subject(PoolTag::Staff, "t-1"),
            embedding(PoolTag::Staff, "t-1", "e-2"),
        )
        .unwrap();

        let students = store.embeddings(PoolTag::Student).unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].id, "e-1");
        assert!(store.subject(PoolTag::Staff, "s-1").unwrap().is_none());
    }

    #[test]
    fn commit_rejects_existing_subject_without_side_effects() {
        let store = MemoryEmbeddingStore::new();
        commit_one(
            &store,
            subject(PoolTag::Student, "s-1"),
            embedding(PoolTag::Student, "s-1", "e-1"),
        )
        .unwrap();
        let err = commit_one(
            &store,
            subject(PoolTag::Student, "s-1"),
            embedding(PoolTag::Student, "s-1", "e-2"),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::SubjectAlreadyEnrolled { .. }));
        assert_eq!(store.embeddings(PoolTag::Student).unwrap().len(), 1);
    }

    #[test]
    fn commit_rejects_mismatched_pair() {
        let store = MemoryEmbeddingStore::new();
        let err = commit_one(
            &store,
            subject(PoolTag::Student, "s-1"),
            embedding(PoolTag::Staff, "s-1", "e-1"),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        assert!(store.subjects(PoolTag::Student).unwrap().is_empty());
        assert!(store.embeddings(PoolTag::Staff).unwrap().is_empty());
    }

    #[test]
    fn remove_cascades_to_embeddings() {
        let store = MemoryEmbeddingStore::new();
        commit_one(
            &store,
            subject(PoolTag::Staff, "t-1"),
            embedding(PoolTag::Staff, "t-1", "e-1"),
        )
        .unwrap();
        commit_one(
            &store,
            subject(PoolTag::Staff, "t-2"),
            embedding(PoolTag::Staff, "t-2", "e-2"),
        )
        .unwrap();

        let removed = remove_one(&store, PoolTag::Staff, "t-1").unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, "e-1");
        let remaining = store.embeddings(PoolTag::Staff).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].subject_id, "t-2");

        let err = remove_one(&store, PoolTag::Staff, "t-1").unwrap_err();
        assert!(matches!(err, AppError::SubjectNotFound { .. }));
    }

    #[test]
    fn filesystem_store_round_trip_preserves_order() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemEmbeddingStore::open(tmp.path(), FACE_EMBEDDING_DIM).unwrap();
        for idx in 0..3 {
            let id = format!("s-{idx}");
            commit_one(
                &store,
                subject(PoolTag::Student, &id),
                embedding(PoolTag::Student, &id, &format!("e-{idx}")),
            )
            .unwrap();
        }

        let reopened = FilesystemEmbeddingStore::open(tmp.path(), FACE_EMBEDDING_DIM).unwrap();
        let ids: Vec<_> = reopened
            .embeddings(PoolTag::Student)
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["e-0", "e-1", "e-2"]);
        assert!(reopened.embeddings(PoolTag::Staff).unwrap().is_empty());
        assert!(!reopened.pool_path(PoolTag::Staff).exists());
    }

    #[cfg(unix)]
    #[test]
    fn filesystem_store_writes_private_files() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let store = FilesystemEmbeddingStore::open(tmp.path(), FACE_EMBEDDING_DIM).unwrap();
        commit_one(
            &store,
            subject(PoolTag::Staff, "t-1"),
            embedding(PoolTag::Staff, "t-1", "e-1"),
        )
        .unwrap();
        let mode = fs::metadata(store.pool_path(PoolTag::Staff))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn failed_commit_leaves_cache_untouched() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemEmbeddingStore::open(tmp.path(), FACE_EMBEDDING_DIM).unwrap();
        let lock = store.lock_pool(PoolTag::Student).unwrap();
        // A directory where the pool file should go cannot be read or replaced.
        fs::create_dir(store.pool_path(PoolTag::Student)).unwrap();

        let err = store
            .commit(
                &lock,
                subject(PoolTag::Student, "s-1"),
                embedding(PoolTag::Student, "s-1", "e-1"),
            )
            .unwrap_err();
        assert!(matches!(err, AppError::StoreRead { .. }));
        assert!(store.subject(PoolTag::Student, "s-1").unwrap().is_none());
        assert!(store.embeddings(PoolTag::Student).unwrap().is_empty());
    }

    #[test]
    fn commit_requires_lock_for_the_same_pool() {
        let store = MemoryEmbeddingStore::new();
        let lock = store.lock_pool(PoolTag::Staff).unwrap();
        let err = store
            .commit(
                &lock,
                subject(PoolTag::Student, "s-1"),
                embedding(PoolTag::Student, "s-1", "e-1"),
            )
            .unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        assert!(store.subjects(PoolTag::Student).unwrap().is_empty());
    }

    #[test]
    fn handles_on_one_directory_do_not_overwrite_each_other() {
        let tmp = TempDir::new().unwrap();
        let first = FilesystemEmbeddingStore::open(tmp.path(), FACE_EMBEDDING_DIM).unwrap();
        let second = FilesystemEmbeddingStore::open(tmp.path(), FACE_EMBEDDING_DIM).unwrap();

        commit_one(
            &first,
            subject(PoolTag::Student, "s-1"),
            embedding(PoolTag::Student, "s-1", "e-1"),
        )
        .unwrap();
        // `second` loaded the pool before that commit.
        assert!(second.subject(PoolTag::Student, "s-1").unwrap().is_none());

        let lock = second.lock_pool(PoolTag::Student).unwrap();
        assert!(second.subject(PoolTag::Student, "s-1").unwrap().is_some());
        second
            .commit(
                &lock,
                subject(PoolTag::Student, "s-2"),
                embedding(PoolTag::Student, "s-2", "e-2"),
            )
            .unwrap();
        drop(lock);

        remove_one(&first, PoolTag::Student, "s-1").unwrap();

        let reopened = FilesystemEmbeddingStore::open(tmp.path(), FACE_EMBEDDING_DIM).unwrap();
        let ids: Vec<_> = reopened
            .subjects(PoolTag::Student)
            .unwrap()
            .into_iter()
            .map(|record| record.subject_id)
            .collect();
        assert_eq!(ids, vec!["s-2"]);
    }

    #[test]
    fn pool_lock_excludes_other_handles_until_dropped() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemEmbeddingStore::open(tmp.path(), FACE_EMBEDDING_DIM).unwrap();
        let lock = store.lock_pool(PoolTag::Staff).unwrap();
        assert_eq!(lock.pool(), PoolTag::Staff);

        let other = File::open(store.lock_path(PoolTag::Staff)).unwrap();
        assert!(other.try_lock_exclusive().is_err());
        // Pools lock independently.
        let student = store.lock_pool(PoolTag::Student).unwrap();
        drop(student);

        drop(lock);
        other.try_lock_exclusive().unwrap();
        FileExt::unlock(&other).unwrap();
    }

    #[test]
    fn load_rejects_wrong_dimension() {
        let tmp = TempDir::new().unwrap();
        let mut bad = embedding(PoolTag::Student, "s-1", "e-1");
        bad.vector = Vector::new(vec![0.1; 64]);
        let document = PoolDocument {
            version: POOL_DOCUMENT_VERSION,
            pool: PoolTag::Student,
            subjects: vec![subject(PoolTag::Student, "s-1")],
            embeddings: vec![bad],
        };
        fs::write(
            pool_path(tmp.path(), PoolTag::Student),
            serde_json::to_vec(&document).unwrap(),
        )
        .unwrap();

        let err = FilesystemEmbeddingStore::open(tmp.path(), FACE_EMBEDDING_DIM).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn load_rejects_orphan_embeddings() {
        let tmp = TempDir::new().unwrap();
        let document = PoolDocument {
            version: POOL_DOCUMENT_VERSION,
            pool: PoolTag::Staff,
            subjects: vec![],
            embeddings: vec![embedding(PoolTag::Staff, "ghost", "e-1")],
        };
        fs::write(
            pool_path(tmp.path(), PoolTag::Staff),
            serde_json::to_vec(&document).unwrap(),
        )
        .unwrap();

        let err = FilesystemEmbeddingStore::open(tmp.path(), FACE_EMBEDDING_DIM).unwrap_err();
        match err {
            AppError::InvalidStore { message, .. } => assert!(message.contains("ghost")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn load_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        fs::write(pool_path(tmp.path(), PoolTag::Student), b"{not json").unwrap();
        let err = FilesystemEmbeddingStore::open(tmp.path(), FACE_EMBEDDING_DIM).unwrap_err();
        assert!(matches!(err, AppError::InvalidStore { .. }));
    }
}
