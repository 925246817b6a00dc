use std::sync::Arc;

use facematch_core::capture::CapturedImage;
use facematch_core::errors::AppError;
use facematch_core::faces::encoder::{EncoderClient, EncodingOutcome};
use facematch_core::faces::enrollment::EnrollmentGuard;
use facematch_core::faces::identification::IdentificationService;
use facematch_core::faces::matcher::{LinearScan, MatchDecision, Matcher, Tolerances};
use facematch_core::faces::quality::{FaceDetector, QualityGate, QualityGateConfig};
use facematch_core::faces::store::{EmbeddingStore, FilesystemEmbeddingStore};
use facematch_core::faces::vector::{FaceRegion, PoolTag, Vector, FACE_EMBEDDING_DIM};
use image::{Rgb, RgbImage};
use tempfile::TempDir;

/// Reports a face covering the middle half of the frame.
struct HalfFrameDetector;

impl FaceDetector for HalfFrameDetector {
    fn detect(&self, image: &RgbImage) -> Vec<FaceRegion> {
        let (w, h) = (i64::from(image.width()), i64::from(image.height()));
        vec![FaceRegion {
            left: w / 4,
            top: h / 4,
            right: w * 3 / 4,
            bottom: h * 3 / 4,
        }]
    }
}

/// Places the frame's top-left red value, scaled to [0, 2.55], on axis 0.
struct ColorEncoder;

impl EncoderClient for ColorEncoder {
    fn encode(&self, image: &CapturedImage, _enrollment_mode: bool) -> EncodingOutcome {
        let mut values = vec![0.0; FACE_EMBEDDING_DIM];
        values[0] = f64::from(image.rgb().get_pixel(0, 0)[0]) / 100.0;
        EncodingOutcome::Success(Vector::new(values))
    }
}

fn frame(red: u8) -> CapturedImage {
    CapturedImage::from_rgb(
        format!("frame-{red}.png"),
        RgbImage::from_pixel(320, 240, Rgb([red, 40, 40])),
    )
    .unwrap()
}

fn gate() -> QualityGate<HalfFrameDetector> {
    QualityGate::new(HalfFrameDetector, QualityGateConfig::default())
}

fn matcher() -> Matcher<LinearScan> {
    Matcher::new(LinearScan, FACE_EMBEDDING_DIM)
}

#[test]
fn enroll_then_identify_across_restart() {
    let tmp = TempDir::new().unwrap();

    {
        let store = FilesystemEmbeddingStore::open(tmp.path(), FACE_EMBEDDING_DIM).unwrap();
        let guard = EnrollmentGuard::new(gate(), ColorEncoder, store, matcher(), Tolerances::default());
        // Signatures at 0.30, 0.60 and 0.90 from a query at 0.
        guard.enroll(PoolTag::Student, "s-030", &frame(30)).unwrap();
        guard.enroll(PoolTag::Student, "s-060", &frame(60)).unwrap();
        guard.enroll(PoolTag::Student, "s-090", &frame(90)).unwrap();
        guard.enroll(PoolTag::Staff, "t-000", &frame(0)).unwrap();
    }

    let store = FilesystemEmbeddingStore::open(tmp.path(), FACE_EMBEDDING_DIM).unwrap();
    let service =
        IdentificationService::new(gate(), ColorEncoder, store, matcher(), Tolerances::default());

    match service.identify(PoolTag::Student, &frame(0), 0.45).unwrap() {
        MatchDecision::Matched {
            subject_id,
            distance,
            ..
        } => {
            assert_eq!(subject_id, "s-030");
            assert!((distance - 0.30).abs() < 1e-9);
        }
        MatchDecision::NoMatch => panic!("expected a match"),
    }
    assert_eq!(
        service.identify(PoolTag::Student, &frame(0), 0.20).unwrap(),
        MatchDecision::NoMatch
    );

    // Staff results only ever come from the staff pool.
    assert_eq!(
        service
            .identify_default(PoolTag::Staff, &frame(0))
            .unwrap()
            .subject_id(),
        Some("t-000")
    );
    assert_eq!(
        service
            .identify_default(PoolTag::Staff, &frame(60))
            .unwrap(),
        MatchDecision::NoMatch
    );
}

#[test]
fn duplicate_enrollment_names_the_first_subject() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FilesystemEmbeddingStore::open(tmp.path(), FACE_EMBEDDING_DIM).unwrap());
    let guard = EnrollmentGuard::new(
        gate(),
        ColorEncoder,
        Arc::clone(&store),
        matcher(),
        Tolerances::default(),
    );

    guard.enroll(PoolTag::Staff, "first", &frame(120)).unwrap();
    let err = guard.enroll(PoolTag::Staff, "second", &frame(121)).unwrap_err();
    match err {
        AppError::DuplicateFace {
            existing_subject_id,
            ..
        } => assert_eq!(existing_subject_id, "first"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(store.subjects(PoolTag::Staff).unwrap().len(), 1);
    assert_eq!(store.embeddings(PoolTag::Staff).unwrap().len(), 1);
}

#[test]
fn removal_persists_and_frees_the_face() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemEmbeddingStore::open(tmp.path(), FACE_EMBEDDING_DIM).unwrap();
    let guard = EnrollmentGuard::new(gate(), ColorEncoder, store, matcher(), Tolerances::default());
    guard.enroll(PoolTag::Student, "s-1", &frame(200)).unwrap();
    guard.remove_subject(PoolTag::Student, "s-1").unwrap();

    let reopened = FilesystemEmbeddingStore::open(tmp.path(), FACE_EMBEDDING_DIM).unwrap();
    assert!(reopened.subjects(PoolTag::Student).unwrap().is_empty());
    assert!(reopened.embeddings(PoolTag::Student).unwrap().is_empty());
}
