use serde::Serialize;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::faces::store::EmbeddingStore;
use crate::faces::vector::{euclidean_distance, Embedding, PoolTag, Vector};

/// Identification accepts a candidate closer than
/// [`DEFAULT_IDENTIFICATION_TOLERANCE`]. The duplicate check during enrollment
/// uses [`DEFAULT_DUPLICATE_TOLERANCE`], which must stay >= the identification
/// tolerance so any face recognized at login is caught at enrollment first.
pub use facematch_config::{DEFAULT_DUPLICATE_TOLERANCE, DEFAULT_IDENTIFICATION_TOLERANCE};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    identification: f64,
    duplicate: f64,
}

impl Tolerances {
    pub fn new(identification: f64, duplicate: f64) -> AppResult<Self> {
        validate_tolerance(identification)?;
        validate_tolerance(duplicate)?;
        if duplicate < identification {
            return Err(AppError::Configuration(format!(
                "duplicate-check tolerance {duplicate} is stricter than identification tolerance {identification}"
            )));
        }
        Ok(Self {
            identification,
            duplicate,
        })
    }

    pub fn identification(&self) -> f64 {
        self.identification
    }

    pub fn duplicate(&self) -> f64 {
        self.duplicate
    }
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            identification: DEFAULT_IDENTIFICATION_TOLERANCE,
            duplicate: DEFAULT_DUPLICATE_TOLERANCE,
        }
    }
}

pub fn validate_tolerance(tolerance: f64) -> AppResult<()> {
    if !tolerance.is_finite() || tolerance <= 0.0 {
        return Err(AppError::Configuration(format!(
            "tolerance must be a positive finite number, got {tolerance}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum MatchDecision {
    Matched {
        embedding_id: String,
        subject_id: String,
        distance: f64,
    },
    NoMatch,
}

impl MatchDecision {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchDecision::Matched { .. })
    }

    pub fn subject_id(&self) -> Option<&str> {
        match self {
            MatchDecision::Matched { subject_id, .. } => Some(subject_id),
            MatchDecision::NoMatch => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest {
    pub index: usize,
    pub distance: f64,
}

/// Distance search over a candidate list.
pub trait NearestNeighbor {
    /// Returns the candidate closest to `unknown`, the lowest index winning
    /// ties. Implementations may report `None` when nothing lies strictly
    /// within `tolerance`.
    fn nearest(
        &self,
        unknown: &Vector,
        knowns: &[&Vector],
        tolerance: f64,
    ) -> AppResult<Option<Nearest>>;
}

impl<T: NearestNeighbor + ?Sized> NearestNeighbor for Box<T> {
    fn nearest(
        &self,
        unknown: &Vector,
        knowns: &[&Vector],
        tolerance: f64,
    ) -> AppResult<Option<Nearest>> {
        (**self).nearest(unknown, knowns, tolerance)
    }
}

/// Exhaustive in-process scan; every candidate is fully evaluated.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearScan;

impl NearestNeighbor for LinearScan {
    fn nearest(
        &self,
        unknown: &Vector,
        knowns: &[&Vector],
        _tolerance: f64,
    ) -> AppResult<Option<Nearest>> {
        let mut best: Option<Nearest> = None;
        for (index, candidate) in knowns.iter().enumerate() {
            let distance = euclidean_distance(unknown.as_slice(), candidate.as_slice());
            match best {
                Some(current) if distance >= current.distance => {}
                _ => best = Some(Nearest { index, distance }),
            }
        }
        Ok(best)
    }
}

pub struct Matcher<B> {
    backend: B,
    dimension: usize,
}

impl<B: NearestNeighbor> Matcher<B> {
    pub fn new(backend: B, dimension: usize) -> Self {
        Self { backend, dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn find_match<S>(
        &self,
        store: &S,
        pool: PoolTag,
        unknown: &Vector,
        tolerance: f64,
    ) -> AppResult<MatchDecision>
    where
        S: EmbeddingStore + ?Sized,
    {
        let candidates = store.embeddings(pool)?;
        self.match_candidates(pool, &candidates, unknown, tolerance)
    }

    /// Matches against `candidates` in order. Entries tagged with another pool
    /// are never considered.
    pub fn match_candidates(
        &self,
        pool: PoolTag,
        candidates: &[Embedding],
        unknown: &Vector,
        tolerance: f64,
    ) -> AppResult<MatchDecision> {
        validate_tolerance(tolerance)?;
        unknown.validate(self.dimension, "unknown vector")?;

        let members: Vec<&Embedding> = candidates.iter().filter(|e| e.pool == pool).collect();
        for member in &members {
            member
                .vector
                .validate(self.dimension, &format!("embedding {}", member.id))?;
        }
        if members.is_empty() {
            debug!(%pool, "pool is empty; nothing to match");
            return Ok(MatchDecision::NoMatch);
        }

        let knowns: Vec<&Vector> = members.iter().map(|member| &member.vector).collect();
        let Some(nearest) = self.backend.nearest(unknown, &knowns, tolerance)? else {
            debug!(%pool, candidates = members.len(), tolerance, "no candidate within tolerance");
            return Ok(MatchDecision::NoMatch);
        };

        let selected = members.get(nearest.index).ok_or_else(|| {
            AppError::Matcher(format!(
                "backend selected candidate {} of {}",
                nearest.index,
                members.len()
            ))
        })?;

        if nearest.distance < tolerance {
            debug!(
                %pool,
                embedding_id = %selected.id,
                subject_id = %selected.subject_id,
                distance = nearest.distance,
                tolerance,
                "matched"
            );
            Ok(MatchDecision::Matched {
                embedding_id: selected.id.clone(),
                subject_id: selected.subject_id.clone(),
                distance: nearest.distance,
            })
        } else {
            debug!(
                %pool,
                best_distance = nearest.distance,
                tolerance,
                candidates = members.len(),
                "closest candidate outside tolerance"
            );
            Ok(MatchDecision::NoMatch)
        }
    }
}
