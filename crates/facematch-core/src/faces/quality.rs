use std::fmt;

use dlib_face_recognition::{FaceDetector as DlibHogDetector, FaceDetectorTrait, ImageMatrix};
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::Serialize;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::faces::vector::FaceRegion;

pub use facematch_config::{
    DEFAULT_DETECTOR_UPSAMPLE, DEFAULT_MIN_FACE_RATIO, DEFAULT_MIN_IMAGE_DIMENSION,
    MAX_DETECTOR_UPSAMPLE,
};
/// Upsampling stops before the longer side of the scaled image passes this.
pub const MAX_UPSAMPLED_SIDE: u32 = 2560;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    LowResolution,
    NoFaceDetected,
    FaceTooSmall,
    MultipleFacesAmbiguous,
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::LowResolution => "low_resolution",
            RejectionReason::NoFaceDetected => "no_face_detected",
            RejectionReason::FaceTooSmall => "face_too_small",
            RejectionReason::MultipleFacesAmbiguous => "multiple_faces_ambiguous",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "low_resolution" => Some(RejectionReason::LowResolution),
            "no_face_detected" => Some(RejectionReason::NoFaceDetected),
            "face_too_small" => Some(RejectionReason::FaceTooSmall),
            "multiple_faces_ambiguous" => Some(RejectionReason::MultipleFacesAmbiguous),
            _ => None,
        }
    }

    pub fn guidance(&self) -> &'static str {
        match self {
            RejectionReason::LowResolution => "Use a camera resolution of at least 200x200.",
            RejectionReason::NoFaceDetected => {
                "Face the camera directly with even lighting and retry."
            }
            RejectionReason::FaceTooSmall => "Please move closer to the camera.",
            RejectionReason::MultipleFacesAmbiguous => {
                "Make sure only one person is in frame and retry."
            }
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectionReason::LowResolution => "image resolution too low",
            RejectionReason::NoFaceDetected => "no face detected",
            RejectionReason::FaceTooSmall => "face too small or too far away",
            RejectionReason::MultipleFacesAmbiguous => "multiple faces in frame",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityVerdict {
    Accepted(FaceRegion),
    Rejected(RejectionReason),
}

impl QualityVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, QualityVerdict::Accepted(_))
    }

    pub fn into_result(self) -> AppResult<FaceRegion> {
        match self {
            QualityVerdict::Accepted(region) => Ok(region),
            QualityVerdict::Rejected(reason) => Err(AppError::Quality(reason)),
        }
    }
}

/// Locates candidate face regions, in detection order.
pub trait FaceDetector {
    fn detect(&self, image: &RgbImage) -> Vec<FaceRegion>;
}

impl<T: FaceDetector + ?Sized> FaceDetector for Box<T> {
    fn detect(&self, image: &RgbImage) -> Vec<FaceRegion> {
        (**self).detect(image)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityGateConfig {
    pub min_image_dimension: u32,
    pub min_face_ratio: f64,
    pub reject_multiple_faces: bool,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            min_image_dimension: DEFAULT_MIN_IMAGE_DIMENSION,
            min_face_ratio: DEFAULT_MIN_FACE_RATIO,
            reject_multiple_faces: false,
        }
    }
}

pub struct QualityGate<D> {
    detector: D,
    config: QualityGateConfig,
}

impl<D: FaceDetector> QualityGate<D> {
    pub fn new(detector: D, config: QualityGateConfig) -> Self {
        Self { detector, config }
    }

    pub fn config(&self) -> &QualityGateConfig {
        &self.config
    }

    pub fn evaluate(&self, image: &RgbImage) -> QualityVerdict {
        let (width, height) = image.dimensions();
        if width < self.config.min_image_dimension || height < self.config.min_image_dimension {
            debug!(width, height, "rejecting low resolution image");
            return QualityVerdict::Rejected(RejectionReason::LowResolution);
        }

        let regions = self.detector.detect(image);
        // First-found wins; the detector's ordering is not a size or centrality ranking.
        let Some(first) = regions.first().copied() else {
            debug!(width, height, "no face regions detected");
            return QualityVerdict::Rejected(RejectionReason::NoFaceDetected);
        };
        if regions.len() > 1 && self.config.reject_multiple_faces {
            debug!(faces = regions.len(), "rejecting ambiguous multi-face image");
            return QualityVerdict::Rejected(RejectionReason::MultipleFacesAmbiguous);
        }

        let minor = width.min(height) as f64;
        let ratio = first.height() as f64 / minor;
        if ratio < self.config.min_face_ratio {
            debug!(ratio, min_ratio = self.config.min_face_ratio, "face region too small");
            return QualityVerdict::Rejected(RejectionReason::FaceTooSmall);
        }

        debug!(
            faces = regions.len(),
            ratio,
            left = first.left,
            top = first.top,
            right = first.right,
            bottom = first.bottom,
            "image accepted"
        );
        QualityVerdict::Accepted(first)
    }
}

/// Number of doublings actually applied to a `width` x `height` image, so the
/// scaled copy stays within [`MAX_UPSAMPLED_SIDE`].
fn effective_upsample(upsample: u32, width: u32, height: u32) -> u32 {
    let longest = width.max(height).max(1);
    let mut steps = upsample;
    while steps > 0 && longest.saturating_mul(1 << steps) > MAX_UPSAMPLED_SIDE {
        steps -= 1;
    }
    steps
}

/// dlib HOG frontal face detector. Small faces are found by scaling the image
/// up `2^upsample` times before detection and mapping the regions back. Large
/// images get fewer doublings.
pub struct DlibFaceDetector {
    detector: DlibHogDetector,
    upsample: u32,
}

impl DlibFaceDetector {
    pub fn new(upsample: u32) -> Self {
        Self {
            detector: DlibHogDetector::new(),
            upsample: upsample.min(MAX_DETECTOR_UPSAMPLE),
        }
    }
}

impl FaceDetector for DlibFaceDetector {
    fn detect(&self, image: &RgbImage) -> Vec<FaceRegion> {
        let steps = effective_upsample(self.upsample, image.width(), image.height());
        if steps < self.upsample {
            debug!(requested = self.upsample, applied = steps, "capped detector upsampling");
        }
        let scale = 1u32 << steps;
        let scaled;
        let source = if scale > 1 {
            scaled = imageops::resize(
                image,
                image.width() * scale,
                image.height() * scale,
                FilterType::Triangle,
            );
            &scaled
        } else {
            image
        };

        let matrix = ImageMatrix::from_image(source);
        let locations = self.detector.face_locations(&matrix);
        let factor = i64::from(scale);
        locations
            .iter()
            .map(|rect| FaceRegion {
                left: rect.left / factor,
                top: rect.top / factor,
                right: rect.right / factor,
                bottom: rect.bottom / factor,
            })
            .collect()
    }
}
