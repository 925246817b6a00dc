use std::fmt;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::capture::CapturedImage;
use crate::errors::{AppError, AppResult};
use crate::faces::encoder::EncoderClient;
use crate::faces::matcher::{MatchDecision, Matcher, NearestNeighbor, Tolerances};
use crate::faces::quality::{FaceDetector, QualityGate};
use crate::faces::store::EmbeddingStore;
use crate::faces::vector::{validate_subject_id, Embedding, PoolTag, SubjectRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentState {
    Received,
    QualityChecked,
    Encoded,
    DuplicateChecked,
    Committed,
    Rejected,
}

impl fmt::Display for EnrollmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnrollmentState::Received => "received",
            EnrollmentState::QualityChecked => "quality_checked",
            EnrollmentState::Encoded => "encoded",
            EnrollmentState::DuplicateChecked => "duplicate_checked",
            EnrollmentState::Committed => "committed",
            EnrollmentState::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct EnrollmentOutcome {
    pub subject: SubjectRecord,
    pub embedding: Embedding,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectRemoval {
    pub pool: PoolTag,
    pub subject_id: String,
    pub removed_embedding_ids: Vec<String>,
}

#[derive(Debug, Default)]
struct PoolLocks {
    student: Mutex<()>,
    staff: Mutex<()>,
}

impl PoolLocks {
    fn get(&self, pool: PoolTag) -> &Mutex<()> {
        match pool {
            PoolTag::Student => &self.student,
            PoolTag::Staff => &self.staff,
        }
    }
}

/// Quality check, encode, duplicate check and commit for new subjects.
///
/// The duplicate check and the commit run under a per-pool lock, so two
/// concurrent enrollments of the same face cannot both pass the check. The lock
/// is a mutex for threads sharing this guard plus the store's own pool lock,
/// which also holds off other processes writing the same store. Encoding runs
/// before either is taken.
pub struct EnrollmentGuard<D, E, S, B> {
    gate: QualityGate<D>,
    encoder: E,
    store: S,
    matcher: Matcher<B>,
    tolerances: Tolerances,
    locks: PoolLocks,
}

impl<D, E, S, B> EnrollmentGuard<D, E, S, B>
where
    D: FaceDetector,
    E: EncoderClient,
    S: EmbeddingStore,
    B: NearestNeighbor,
{
    pub fn new(
        gate: QualityGate<D>,
        encoder: E,
        store: S,
        matcher: Matcher<B>,
        tolerances: Tolerances,
    ) -> Self {
        Self {
            gate,
            encoder,
            store,
            matcher,
            tolerances,
            locks: PoolLocks::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn tolerances(&self) -> Tolerances {
        self.tolerances
    }

    pub fn enroll(
        &self,
        pool: PoolTag,
        subject_id: &str,
        image: &CapturedImage,
    ) -> AppResult<Embedding> {
        self.enroll_subject(pool, subject_id, None, image)
            .map(|outcome| outcome.embedding)
    }

    pub fn enroll_subject(
        &self,
        pool: PoolTag,
        subject_id: &str,
        display_name: Option<&str>,
        image: &CapturedImage,
    ) -> AppResult<EnrollmentOutcome> {
        let mut logs = Vec::new();
        let result = self.run(pool, subject_id, display_name, image, &mut logs);
        if let Err(err) = &result {
            warn!(
                %pool,
                subject_id,
                state = %EnrollmentState::Rejected,
                error = %err,
                retryable = err.is_retryable(),
                "enrollment rejected"
            );
        }
        result.map(|(subject, embedding)| EnrollmentOutcome {
            subject,
            embedding,
            logs,
        })
    }

    fn run(
        &self,
        pool: PoolTag,
        subject_id: &str,
        display_name: Option<&str>,
        image: &CapturedImage,
        logs: &mut Vec<String>,
    ) -> AppResult<(SubjectRecord, Embedding)> {
        validate_subject_id(subject_id)?;
        info!(%pool, subject_id, state = %EnrollmentState::Received, origin = image.origin(), "enrollment started");
        logs.push(format!("Received {} for {pool}/{subject_id}", image.origin()));

        if self.store.subject(pool, subject_id)?.is_some() {
            return Err(AppError::SubjectAlreadyEnrolled {
                pool,
                subject_id: subject_id.to_string(),
            });
        }

        let region = self.gate.evaluate(image.rgb()).into_result()?;
        info!(%pool, subject_id, state = %EnrollmentState::QualityChecked, "quality gate passed");
        logs.push(format!(
            "Quality gate accepted face region {}x{}",
            region.width(),
            region.height()
        ));

        let vector = self
            .encoder
            .encode_region(image, region, true)
            .into_vector(self.matcher.dimension())?;
        info!(%pool, subject_id, state = %EnrollmentState::Encoded, "face encoded");
        logs.push(format!("Encoded face into {} values", vector.len()));

        let _pool_guard = self.locks.get(pool).lock();
        let pool_lock = self.store.lock_pool(pool)?;

        // Re-checked under the lock; a concurrent enrollment may have won.
        if self.store.subject(pool, subject_id)?.is_some() {
            return Err(AppError::SubjectAlreadyEnrolled {
                pool,
                subject_id: subject_id.to_string(),
            });
        }

        let decision =
            self.matcher
                .find_match(&self.store, pool, &vector, self.tolerances.duplicate())?;
        if let MatchDecision::Matched {
            subject_id: existing,
            distance,
            ..
        } = decision
        {
            info!(%pool, subject_id, existing_subject_id = %existing, distance, "duplicate face");
            return Err(AppError::DuplicateFace {
                pool,
                existing_subject_id: existing,
            });
        }
        info!(%pool, subject_id, state = %EnrollmentState::DuplicateChecked, "no duplicate found");
        logs.push("Duplicate check passed".to_string());

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let subject = SubjectRecord {
            pool,
            subject_id: subject_id.to_string(),
            display_name: display_name.map(str::to_string),
            enrolled_at: now.clone(),
        };
        let embedding = Embedding {
            id: Uuid::new_v4().to_string(),
            pool,
            subject_id: subject_id.to_string(),
            vector,
            face_region: region,
            created_at: now,
        };
        self.store
            .commit(&pool_lock, subject.clone(), embedding.clone())?;
        info!(
            %pool,
            subject_id,
            embedding_id = %embedding.id,
            state = %EnrollmentState::Committed,
            "enrollment committed"
        );
        logs.push(format!("Stored embedding {}", embedding.id));

        Ok((subject, embedding))
    }

    /// Deletes a subject and its embeddings, serialized with enrollments into
    /// the same pool.
    pub fn remove_subject(&self, pool: PoolTag, subject_id: &str) -> AppResult<SubjectRemoval> {
        validate_subject_id(subject_id)?;
        let _pool_guard = self.locks.get(pool).lock();
        let pool_lock = self.store.lock_pool(pool)?;
        let removed = self.store.remove_subject(&pool_lock, subject_id)?;
        info!(%pool, subject_id, removed = removed.len(), "subject removed");
        Ok(SubjectRemoval {
            pool,
            subject_id: subject_id.to_string(),
            removed_embedding_ids: removed.into_iter().map(|embedding| embedding.id).collect(),
        })
    }
}
