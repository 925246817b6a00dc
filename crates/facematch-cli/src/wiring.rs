use facematch_config::{Backend, ResolvedConfig};
use facematch_core::errors::AppError as CoreError;
use facematch_core::faces::encoder::{EncoderClient, FaceModelPaths, JitterPolicy, LocalEncoder};
use facematch_core::faces::enrollment::EnrollmentGuard;
use facematch_core::faces::identification::IdentificationService;
use facematch_core::faces::matcher::{LinearScan, Matcher, NearestNeighbor, Tolerances};
use facematch_core::faces::quality::{DlibFaceDetector, QualityGate, QualityGateConfig};
use facematch_core::faces::remote::{
    RemoteEncoder, RemoteMatcher, RemoteService, RemoteServiceConfig,
};
use facematch_core::faces::store::FilesystemEmbeddingStore;
use facematch_core::secret_service::{resolve_shared_secret, KeyringSecretStore, SharedSecret};
use tracing::debug;

use crate::errors::AppResult;

pub type DynEncoder = Box<dyn EncoderClient + Send + Sync>;
pub type DynNearest = Box<dyn NearestNeighbor + Send + Sync>;
pub type CliEnrollmentGuard =
    EnrollmentGuard<DlibFaceDetector, DynEncoder, FilesystemEmbeddingStore, DynNearest>;
pub type CliIdentificationService =
    IdentificationService<DlibFaceDetector, DynEncoder, FilesystemEmbeddingStore, DynNearest>;

/// Concrete adapters selected from the resolved configuration.
pub struct Components<'a> {
    config: &'a ResolvedConfig,
    explicit_secret: Option<&'a str>,
}

impl<'a> Components<'a> {
    pub fn new(config: &'a ResolvedConfig, explicit_secret: Option<&'a str>) -> Self {
        Self {
            config,
            explicit_secret,
        }
    }

    pub fn quality_gate(&self) -> QualityGate<DlibFaceDetector> {
        QualityGate::new(
            DlibFaceDetector::new(self.config.detector_upsample),
            QualityGateConfig {
                min_image_dimension: self.config.min_image_dimension,
                min_face_ratio: self.config.min_face_ratio,
                reject_multiple_faces: self.config.reject_multiple_faces,
            },
        )
    }

    pub fn tolerances(&self) -> AppResult<Tolerances> {
        Ok(Tolerances::new(
            self.config.identification_tolerance,
            self.config.duplicate_tolerance,
        )?)
    }

    pub fn store(&self) -> AppResult<FilesystemEmbeddingStore> {
        debug!(dir = %self.config.store_dir.display(), "opening embedding store");
        Ok(FilesystemEmbeddingStore::open(
            &self.config.store_dir,
            self.config.dimension,
        )?)
    }

    pub fn encoder(&self) -> AppResult<DynEncoder> {
        match self.config.encoder_backend {
            Backend::Local => {
                let models = FaceModelPaths::from_settings(
                    self.config.landmark_model.clone(),
                    self.config.encoder_model.clone(),
                )?;
                let jitters = JitterPolicy {
                    enrollment: self.config.enrollment_jitters,
                    identification: self.config.identification_jitters,
                };
                let encoder = LocalEncoder::new(&models, self.config.detector_upsample, jitters)?;
                debug!(backend = "local", "encoder ready");
                Ok(Box::new(encoder))
            }
            Backend::Remote => {
                let service = self.remote_service()?;
                debug!(backend = "remote", url = service.base_url(), "encoder ready");
                Ok(Box::new(RemoteEncoder::new(service)))
            }
        }
    }

    pub fn matcher(&self) -> AppResult<Matcher<DynNearest>> {
        let backend: DynNearest = match self.config.matcher_backend {
            Backend::Local => Box::new(LinearScan),
            Backend::Remote => Box::new(RemoteMatcher::new(self.remote_service()?)),
        };
        Ok(Matcher::new(backend, self.config.dimension))
    }

    pub fn enrollment_guard(&self) -> AppResult<CliEnrollmentGuard> {
        Ok(EnrollmentGuard::new(
            self.quality_gate(),
            self.encoder()?,
            self.store()?,
            self.matcher()?,
            self.tolerances()?,
        ))
    }

    pub fn identification_service(&self) -> AppResult<CliIdentificationService> {
        Ok(IdentificationService::new(
            self.quality_gate(),
            self.encoder()?,
            self.store()?,
            self.matcher()?,
            self.tolerances()?,
        ))
    }

    pub fn remote_service(&self) -> AppResult<RemoteService> {
        let base_url = self.config.service_url.clone().ok_or_else(|| {
            CoreError::Configuration("service_url is required for the remote backend".into())
        })?;
        Ok(RemoteService::new(RemoteServiceConfig {
            base_url,
            timeout: self.config.service_timeout,
            secret: self.shared_secret()?,
        })?)
    }

    pub fn shared_secret(&self) -> AppResult<Option<SharedSecret>> {
        let store = KeyringSecretStore::default();
        Ok(resolve_shared_secret(
            self.explicit_secret,
            self.config.shared_secret.as_deref(),
            self.config.keyring_account.as_deref(),
            &store,
        )?)
    }
}
