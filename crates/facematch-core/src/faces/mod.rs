pub mod encoder;
pub mod enrollment;
pub mod identification;
pub mod matcher;
pub mod quality;
pub mod remote;
pub mod store;
pub mod vector;

pub use encoder::{
    screen_and_encode, EncoderClient, EncodingOutcome, FaceModelPaths, JitterPolicy,
    LocalEncoder, DEFAULT_ENROLLMENT_JITTERS, DEFAULT_IDENTIFICATION_JITTERS,
};

pub use enrollment::{EnrollmentGuard, EnrollmentOutcome, EnrollmentState, SubjectRemoval};

pub use identification::IdentificationService;

pub use matcher::{
    validate_tolerance, LinearScan, MatchDecision, Matcher, Nearest, NearestNeighbor, Tolerances,
    DEFAULT_DUPLICATE_TOLERANCE, DEFAULT_IDENTIFICATION_TOLERANCE,
};

pub use quality::{
    DlibFaceDetector, FaceDetector, QualityGate, QualityGateConfig, QualityVerdict,
    RejectionReason, DEFAULT_DETECTOR_UPSAMPLE, DEFAULT_MIN_FACE_RATIO,
    DEFAULT_MIN_IMAGE_DIMENSION,
};

pub use remote::{
    RemoteEncoder, RemoteMatcher, RemoteService, RemoteServiceConfig, API_KEY_HEADER,
    DEFAULT_SERVICE_TIMEOUT,
};

pub use store::{pool_path, EmbeddingStore, FilesystemEmbeddingStore, MemoryEmbeddingStore};

pub use vector::{
    euclidean_distance, validate_subject_id, Embedding, FaceRegion, ParsePoolError, PoolTag,
    SubjectRecord, Vector, FACE_EMBEDDING_DIM,
};
