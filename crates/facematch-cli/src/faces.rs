use std::collections::HashMap;

use facematch_core::capture::CapturedImage;
use facematch_core::faces::encoder::screen_and_encode;
use facematch_core::faces::enrollment::{EnrollmentOutcome, SubjectRemoval};
use facematch_core::faces::matcher::{validate_tolerance, MatchDecision};
use facematch_core::faces::quality::{QualityVerdict, RejectionReason};
use facematch_core::faces::store::EmbeddingStore;
use facematch_core::faces::vector::{validate_subject_id, FaceRegion, PoolTag, Vector};
use serde::Serialize;

use crate::cli::{CheckArgs, EncodeArgs, EnrollArgs, IdentifyArgs, ListArgs, RemoveArgs};
use crate::config::load_settings;
use crate::errors::AppResult;
use crate::wiring::Components;

#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub image: String,
    pub width: u32,
    pub height: u32,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_region: Option<FaceRegion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EncodeOutcome {
    pub image: String,
    pub enrollment_mode: bool,
    pub face_region: FaceRegion,
    pub encoding: Vector,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentifyOutcome {
    pub image: String,
    pub pool: PoolTag,
    pub tolerance: f64,
    pub decision: MatchDecision,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectSummary {
    pub subject_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub enrolled_at: String,
    pub embeddings: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolListing {
    pub pool: PoolTag,
    pub subjects: Vec<SubjectSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListOutcome {
    pub pools: Vec<PoolListing>,
}

pub fn run_check(args: &CheckArgs) -> AppResult<CheckOutcome> {
    let config = load_settings(&args.settings)?;
    let components = Components::new(&config, args.settings.shared_secret.as_deref());
    let image = CapturedImage::open(&args.image)?;
    let verdict = components.quality_gate().evaluate(image.rgb());

    let (face_region, reason) = match verdict {
        QualityVerdict::Accepted(region) => (Some(region), None),
        QualityVerdict::Rejected(reason) => (None, Some(reason)),
    };
    Ok(CheckOutcome {
        image: image.origin().to_string(),
        width: image.width(),
        height: image.height(),
        accepted: verdict.is_accepted(),
        face_region,
        reason,
    })
}

pub fn run_encode(args: &EncodeArgs) -> AppResult<EncodeOutcome> {
    let config = load_settings(&args.settings)?;
    let components = Components::new(&config, args.settings.shared_secret.as_deref());
    let image = CapturedImage::open(&args.image)?;
    let encoder = components.encoder()?;
    let (face_region, encoding) = screen_and_encode(
        &components.quality_gate(),
        &encoder,
        &image,
        args.enrollment,
        config.dimension,
    )?;
    Ok(EncodeOutcome {
        image: image.origin().to_string(),
        enrollment_mode: args.enrollment,
        face_region,
        encoding,
    })
}

pub fn run_enroll(args: &EnrollArgs) -> AppResult<EnrollmentOutcome> {
    let config = load_settings(&args.settings)?;
    let components = Components::new(&config, args.settings.shared_secret.as_deref());
    let image = CapturedImage::open(&args.image)?;
    let guard = components.enrollment_guard()?;
    Ok(guard.enroll_subject(args.pool, &args.subject, args.name.as_deref(), &image)?)
}

pub fn run_identify(args: &IdentifyArgs) -> AppResult<IdentifyOutcome> {
    let config = load_settings(&args.settings)?;
    let tolerance = args.tolerance.unwrap_or(config.identification_tolerance);
    validate_tolerance(tolerance)?;

    let components = Components::new(&config, args.settings.shared_secret.as_deref());
    let image = CapturedImage::open(&args.image)?;
    let service = components.identification_service()?;
    let decision = service.identify(args.pool, &image, tolerance)?;
    Ok(IdentifyOutcome {
        image: image.origin().to_string(),
        pool: args.pool,
        tolerance,
        decision,
    })
}

/// Removal only touches the store, so it works without encoder models. It
/// takes the same pool lock as enrollment.
pub fn run_remove(args: &RemoveArgs) -> AppResult<SubjectRemoval> {
    let config = load_settings(&args.settings)?;
    validate_subject_id(&args.subject)?;
    let store = Components::new(&config, None).store()?;
    let lock = store.lock_pool(args.pool)?;
    let removed = store.remove_subject(&lock, &args.subject)?;
    tracing::info!(pool = %args.pool, subject_id = %args.subject, removed = removed.len(), "subject removed");
    Ok(SubjectRemoval {
        pool: args.pool,
        subject_id: args.subject.clone(),
        removed_embedding_ids: removed.into_iter().map(|embedding| embedding.id).collect(),
    })
}

pub fn run_list(args: &ListArgs) -> AppResult<ListOutcome> {
    let config = load_settings(&args.settings)?;
    let store = Components::new(&config, None).store()?;
    list_pools(&store, args.pool)
}

pub fn list_pools<S: EmbeddingStore + ?Sized>(
    store: &S,
    only: Option<PoolTag>,
) -> AppResult<ListOutcome> {
    let mut pools = Vec::new();
    for pool in PoolTag::ALL {
        if only.is_some_and(|selected| selected != pool) {
            continue;
        }
        let mut counts: HashMap<String, usize> = HashMap::new();
        for embedding in store.embeddings(pool)? {
            *counts.entry(embedding.subject_id).or_default() += 1;
        }
        let subjects = store
            .subjects(pool)?
            .into_iter()
            .map(|record| SubjectSummary {
                embeddings: counts.get(&record.subject_id).copied().unwrap_or(0),
                subject_id: record.subject_id,
                display_name: record.display_name,
                enrolled_at: record.enrolled_at,
            })
            .collect();
        pools.push(PoolListing { pool, subjects });
    }
    Ok(ListOutcome { pools })
}
