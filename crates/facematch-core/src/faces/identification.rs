use tracing::info;

use crate::capture::CapturedImage;
use crate::errors::AppResult;
use crate::faces::encoder::{screen_and_encode, EncoderClient};
use crate::faces::matcher::{MatchDecision, Matcher, NearestNeighbor, Tolerances};
use crate::faces::quality::{FaceDetector, QualityGate};
use crate::faces::store::EmbeddingStore;
use crate::faces::vector::PoolTag;

/// Quality check, fast encode and match against one pool. `NoMatch` is an
/// ordinary result.
pub struct IdentificationService<D, E, S, B> {
    gate: QualityGate<D>,
    encoder: E,
    store: S,
    matcher: Matcher<B>,
    tolerances: Tolerances,
}

impl<D, E, S, B> IdentificationService<D, E, S, B>
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
        }
    }

    pub fn identify(
        &self,
        pool: PoolTag,
        image: &CapturedImage,
        tolerance: f64,
    ) -> AppResult<MatchDecision> {
        let (_, vector) = screen_and_encode(
            &self.gate,
            &self.encoder,
            image,
            false,
            self.matcher.dimension(),
        )?;
        let decision = self.matcher.find_match(&self.store, pool, &vector, tolerance)?;
        info!(
            %pool,
            origin = image.origin(),
            matched = decision.is_match(),
            subject_id = decision.subject_id().unwrap_or("-"),
            tolerance,
            "identification finished"
        );
        Ok(decision)
    }

    pub fn identify_default(&self, pool: PoolTag, image: &CapturedImage) -> AppResult<MatchDecision> {
        self.identify(pool, image, self.tolerances.identification())
    }
}
