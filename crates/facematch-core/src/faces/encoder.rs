use std::path::PathBuf;

use dlib_face_recognition::{
    FaceEncoderNetwork, FaceEncoderTrait, ImageMatrix, LandmarkPredictor, LandmarkPredictorTrait,
    Rectangle,
};
use tracing::{debug, warn};

use crate::capture::CapturedImage;
use crate::errors::{AppError, AppResult};
use crate::faces::quality::{DlibFaceDetector, FaceDetector, QualityGate, RejectionReason};
use crate::faces::vector::{FaceRegion, Vector};

/// Enrollment averages the signature over many perturbed copies of the face.
pub use facematch_config::{DEFAULT_ENROLLMENT_JITTERS, DEFAULT_IDENTIFICATION_JITTERS};

#[derive(Debug, Clone, PartialEq)]
pub enum EncodingOutcome {
    Success(Vector),
    QualityRejected(RejectionReason),
    EncoderUnavailable,
    EncoderError(String),
}

impl EncodingOutcome {
    /// Converts the outcome into the vector it carries, turning every other
    /// case into the matching error. A vector of the wrong shape is a
    /// configuration fault, not an encoder failure.
    pub fn into_vector(self, dimension: usize) -> AppResult<Vector> {
        match self {
            EncodingOutcome::Success(vector) => {
                vector.validate(dimension, "encoded vector")?;
                Ok(vector)
            }
            EncodingOutcome::QualityRejected(reason) => Err(AppError::Quality(reason)),
            EncodingOutcome::EncoderUnavailable => Err(AppError::EncoderUnavailable),
            EncodingOutcome::EncoderError(detail) => Err(AppError::Encoder(detail)),
        }
    }
}

/// The opaque face encoding capability. Implementations make a single attempt
/// per call and never retry.
pub trait EncoderClient {
    fn encode(&self, image: &CapturedImage, enrollment_mode: bool) -> EncodingOutcome;

    /// Encodes the face the quality gate already accepted. Encoders that run
    /// their own detection elsewhere ignore `region`.
    fn encode_region(
        &self,
        image: &CapturedImage,
        region: FaceRegion,
        enrollment_mode: bool,
    ) -> EncodingOutcome {
        let _ = region;
        self.encode(image, enrollment_mode)
    }
}

impl<T: EncoderClient + ?Sized> EncoderClient for Box<T> {
    fn encode(&self, image: &CapturedImage, enrollment_mode: bool) -> EncodingOutcome {
        (**self).encode(image, enrollment_mode)
    }

    fn encode_region(
        &self,
        image: &CapturedImage,
        region: FaceRegion,
        enrollment_mode: bool,
    ) -> EncodingOutcome {
        (**self).encode_region(image, region, enrollment_mode)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterPolicy {
    pub enrollment: u32,
    pub identification: u32,
}

impl JitterPolicy {
    pub fn for_mode(&self, enrollment_mode: bool) -> u32 {
        if enrollment_mode {
            self.enrollment
        } else {
            self.identification
        }
    }
}

impl Default for JitterPolicy {
    fn default() -> Self {
        Self {
            enrollment: DEFAULT_ENROLLMENT_JITTERS,
            identification: DEFAULT_IDENTIFICATION_JITTERS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FaceModelPaths {
    pub landmark: PathBuf,
    pub encoder: PathBuf,
}

impl FaceModelPaths {
    pub fn from_settings(landmark: Option<PathBuf>, encoder: Option<PathBuf>) -> AppResult<Self> {
        let landmark = landmark.ok_or(AppError::MissingModel {
            kind: "landmark predictor",
            setting: "landmark_model",
        })?;
        let encoder = encoder.ok_or(AppError::MissingModel {
            kind: "face encoding network",
            setting: "encoder_model",
        })?;
        Ok(Self { landmark, encoder })
    }
}

/// In-process dlib encoder. Given a region it encodes that face directly;
/// otherwise it detects faces itself and encodes the first one.
pub struct LocalEncoder {
    detector: DlibFaceDetector,
    predictor: LandmarkPredictor,
    network: FaceEncoderNetwork,
    jitters: JitterPolicy,
}

impl LocalEncoder {
    pub fn new(models: &FaceModelPaths, upsample: u32, jitters: JitterPolicy) -> AppResult<Self> {
        debug!(path = %models.landmark.display(), "loading landmark model");
        let predictor =
            LandmarkPredictor::open(&models.landmark).map_err(|message| AppError::ModelLoad {
                path: models.landmark.clone(),
                message,
            })?;
        debug!(path = %models.encoder.display(), "loading encoder model");
        let network =
            FaceEncoderNetwork::open(&models.encoder).map_err(|message| AppError::ModelLoad {
                path: models.encoder.clone(),
                message,
            })?;

        Ok(Self {
            detector: DlibFaceDetector::new(upsample),
            predictor,
            network,
            jitters,
        })
    }
}

impl LocalEncoder {
    fn encode_at(
        &self,
        image: &CapturedImage,
        region: FaceRegion,
        enrollment_mode: bool,
    ) -> EncodingOutcome {
        let matrix = ImageMatrix::from_image(image.rgb());
        let rect = Rectangle {
            left: region.left,
            top: region.top,
            right: region.right,
            bottom: region.bottom,
        };
        let landmarks = vec![self.predictor.face_landmarks(&matrix, &rect)];
        let jitters = self.jitters.for_mode(enrollment_mode);
        let encodings = self.network.get_face_encodings(&matrix, &landmarks, jitters);

        match encodings.iter().next() {
            Some(encoding) => {
                debug!(jitters, enrollment_mode, "encoded face locally");
                EncodingOutcome::Success(Vector::new(encoding.as_ref().to_vec()))
            }
            None => {
                warn!(origin = image.origin(), "dlib produced no encoding for detected face");
                EncodingOutcome::EncoderError("encoder produced no encoding".into())
            }
        }
    }
}

impl EncoderClient for LocalEncoder {
    fn encode(&self, image: &CapturedImage, enrollment_mode: bool) -> EncodingOutcome {
        let Some(region) = self.detector.detect(image.rgb()).first().copied() else {
            return EncodingOutcome::QualityRejected(RejectionReason::NoFaceDetected);
        };
        self.encode_at(image, region, enrollment_mode)
    }

    fn encode_region(
        &self,
        image: &CapturedImage,
        region: FaceRegion,
        enrollment_mode: bool,
    ) -> EncodingOutcome {
        self.encode_at(image, region, enrollment_mode)
    }
}

/// Runs the quality gate, then the encoder, returning the accepted region and
/// a vector checked against `dimension`.
pub fn screen_and_encode<D, E>(
    gate: &QualityGate<D>,
    encoder: &E,
    image: &CapturedImage,
    enrollment_mode: bool,
    dimension: usize,
) -> AppResult<(FaceRegion, Vector)>
where
    D: FaceDetector,
    E: EncoderClient + ?Sized,
{
    let region = gate.evaluate(image.rgb()).into_result()?;
    let vector = encoder
        .encode_region(image, region, enrollment_mode)
        .into_vector(dimension)?;
    Ok((region, vector))
}
