use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use image::ImageError;
use thiserror::Error;

use crate::faces::quality::RejectionReason;
use crate::faces::vector::PoolTag;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("input file not found or unreadable: {path}")]
    MissingInput { path: PathBuf },

    #[error("failed to read input image {path}: {source}")]
    InputRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to decode image {origin}: {source}")]
    ImageDecode {
        origin: String,
        #[source]
        source: ImageError,
    },

    #[error("image rejected by quality gate: {0}")]
    Quality(RejectionReason),

    #[error("face encoding service unavailable")]
    EncoderUnavailable,

    #[error("face encoder failed: {0}")]
    Encoder(String),

    #[error("face matching service unavailable")]
    MatcherUnavailable,

    #[error("face matcher failed: {0}")]
    Matcher(String),

    #[error("face already enrolled in pool {pool} as subject {existing_subject_id}")]
    DuplicateFace {
        pool: PoolTag,
        existing_subject_id: String,
    },

    #[error("subject {subject_id} already has an enrolled face in pool {pool}")]
    SubjectAlreadyEnrolled { pool: PoolTag, subject_id: String },

    #[error("no subject {subject_id} enrolled in pool {pool}")]
    SubjectNotFound { pool: PoolTag, subject_id: String },

    #[error("invalid subject id '{subject_id}': {message}")]
    InvalidSubject { subject_id: String, message: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("missing {kind} model; set {setting} in the configuration file")]
    MissingModel {
        kind: &'static str,
        setting: &'static str,
    },

    #[error("failed to load model {path}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    #[error("failed to read embedding store {path}: {source}")]
    StoreRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write embedding store {path}: {source}")]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to lock embedding store {path}: {source}")]
    StoreLock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("embedding store {path} is invalid: {message}")]
    InvalidStore { path: PathBuf, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("keyring unavailable for account {account} (service {service}): {message}")]
    SecretUnavailable {
        service: String,
        account: String,
        message: String,
    },
}

impl AppError {
    /// Only transient service outages are worth retrying with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::EncoderUnavailable | AppError::MatcherUnavailable)
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            AppError::MissingInput { .. } => ExitCode::from(2),
            AppError::InputRead { .. } => ExitCode::from(2),
            AppError::ImageDecode { .. } => ExitCode::from(2),
            AppError::InvalidSubject { .. } => ExitCode::from(2),
            AppError::Configuration(_) => ExitCode::from(2),
            AppError::MissingModel { .. } => ExitCode::from(2),
            AppError::ModelLoad { .. } => ExitCode::from(2),
            AppError::InvalidStore { .. } => ExitCode::from(2),
            AppError::SecretUnavailable { .. } => ExitCode::from(2),
            AppError::Quality(_) => ExitCode::from(3),
            AppError::DuplicateFace { .. } => ExitCode::from(3),
            AppError::SubjectAlreadyEnrolled { .. } => ExitCode::from(3),
            AppError::SubjectNotFound { .. } => ExitCode::from(4),
            AppError::EncoderUnavailable => ExitCode::from(5),
            AppError::MatcherUnavailable => ExitCode::from(5),
            _ => ExitCode::from(1),
        }
    }

    /// Message safe to show to the person in front of the camera.
    pub fn human_message(&self) -> String {
        match self {
            AppError::Quality(reason) => format!("{reason}. {}", reason.guidance()),
            AppError::DuplicateFace {
                existing_subject_id,
                ..
            } => format!("this face is already enrolled as subject {existing_subject_id}"),
            AppError::EncoderUnavailable | AppError::MatcherUnavailable => {
                "service unavailable; please try again shortly".to_string()
            }
            AppError::Encoder(_) | AppError::Matcher(_) => {
                "face recognition failed; please try again with a new capture".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
