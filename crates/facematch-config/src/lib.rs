use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const PRIMARY_CONFIG_PATH: &str = "/etc/facematch/config.toml";
pub const SECONDARY_CONFIG_PATH: &str = "/usr/local/etc/facematch/config.toml";
pub const DEFAULT_DIMENSION: usize = 128;
pub const DEFAULT_IDENTIFICATION_TOLERANCE: f64 = 0.45;
pub const DEFAULT_DUPLICATE_TOLERANCE: f64 = 0.5;
pub const DEFAULT_MIN_IMAGE_DIMENSION: u32 = 200;
pub const DEFAULT_MIN_FACE_RATIO: f64 = 0.2;
pub const DEFAULT_DETECTOR_UPSAMPLE: u32 = 2;
pub const MAX_DETECTOR_UPSAMPLE: u32 = 3;
pub const DEFAULT_ENROLLMENT_JITTERS: u32 = 100;
pub const DEFAULT_IDENTIFICATION_JITTERS: u32 = 1;
pub const DEFAULT_STORE_DIR: &str = "/var/lib/facematch/store";
pub const DEFAULT_SERVICE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    pub dimension: Option<usize>,
    pub identification_tolerance: Option<f64>,
    pub duplicate_tolerance: Option<f64>,
    pub min_image_dimension: Option<u32>,
    pub min_face_ratio: Option<f64>,
    pub detector_upsample: Option<u32>,
    pub reject_multiple_faces: Option<bool>,
    pub enrollment_jitters: Option<u32>,
    pub identification_jitters: Option<u32>,
    pub store_dir: Option<PathBuf>,
    pub landmark_model: Option<PathBuf>,
    pub encoder_model: Option<PathBuf>,
    pub encoder_backend: Option<Backend>,
    pub matcher_backend: Option<Backend>,
    pub service_url: Option<String>,
    pub service_timeout_secs: Option<u64>,
    pub shared_secret: Option<String>,
    pub keyring_account: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub dimension: usize,
    pub identification_tolerance: f64,
    pub duplicate_tolerance: f64,
    pub min_image_dimension: u32,
    pub min_face_ratio: f64,
    pub detector_upsample: u32,
    pub reject_multiple_faces: bool,
    pub enrollment_jitters: u32,
    pub identification_jitters: u32,
    pub store_dir: PathBuf,
    pub landmark_model: Option<PathBuf>,
    pub encoder_model: Option<PathBuf>,
    pub encoder_backend: Backend,
    pub matcher_backend: Backend,
    pub service_url: Option<String>,
    pub service_timeout: Duration,
    pub shared_secret: Option<String>,
    pub keyring_account: Option<String>,
}

impl ResolvedConfig {
    pub fn from_raw(raw: ConfigFile) -> Self {
        Self {
            dimension: raw.dimension.unwrap_or(DEFAULT_DIMENSION),
            identification_tolerance: raw
                .identification_tolerance
                .unwrap_or(DEFAULT_IDENTIFICATION_TOLERANCE),
            duplicate_tolerance: raw
                .duplicate_tolerance
                .unwrap_or(DEFAULT_DUPLICATE_TOLERANCE),
            min_image_dimension: raw
                .min_image_dimension
                .unwrap_or(DEFAULT_MIN_IMAGE_DIMENSION),
            min_face_ratio: raw.min_face_ratio.unwrap_or(DEFAULT_MIN_FACE_RATIO),
            detector_upsample: raw
                .detector_upsample
                .unwrap_or(DEFAULT_DETECTOR_UPSAMPLE),
            reject_multiple_faces: raw.reject_multiple_faces.unwrap_or(false),
            enrollment_jitters: raw
                .enrollment_jitters
                .unwrap_or(DEFAULT_ENROLLMENT_JITTERS)
                .max(1),
            identification_jitters: raw
                .identification_jitters
                .unwrap_or(DEFAULT_IDENTIFICATION_JITTERS)
                .max(1),
            store_dir: raw
                .store_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR)),
            landmark_model: raw.landmark_model,
            encoder_model: raw.encoder_model,
            encoder_backend: raw.encoder_backend.unwrap_or_default(),
            matcher_backend: raw.matcher_backend.unwrap_or_default(),
            service_url: raw.service_url.filter(|url| !url.trim().is_empty()),
            service_timeout: Duration::from_secs(
                raw.service_timeout_secs
                    .unwrap_or(DEFAULT_SERVICE_TIMEOUT_SECS)
                    .max(1),
            ),
            shared_secret: raw.shared_secret,
            keyring_account: raw.keyring_account,
        }
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dimension == 0 {
            return Err(invalid("dimension", "must be greater than zero"));
        }
        for (field, value) in [
            ("identification_tolerance", self.identification_tolerance),
            ("duplicate_tolerance", self.duplicate_tolerance),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(field, format!("must be a positive number, got {value}")));
            }
        }
        if self.duplicate_tolerance < self.identification_tolerance {
            return Err(invalid(
                "duplicate_tolerance",
                format!(
                    "{} is stricter than identification_tolerance {}; duplicates would slip through enrollment",
                    self.duplicate_tolerance, self.identification_tolerance
                ),
            ));
        }
        if !(self.min_face_ratio > 0.0 && self.min_face_ratio <= 1.0) {
            return Err(invalid(
                "min_face_ratio",
                format!("must be in (0, 1], got {}", self.min_face_ratio),
            ));
        }
        if self.detector_upsample > MAX_DETECTOR_UPSAMPLE {
            return Err(invalid(
                "detector_upsample",
                format!("must be at most {MAX_DETECTOR_UPSAMPLE}"),
            ));
        }
        let needs_service = self.encoder_backend == Backend::Remote
            || self.matcher_backend == Backend::Remote;
        if needs_service && self.service_url.is_none() {
            return Err(invalid(
                "service_url",
                "required when encoder_backend or matcher_backend is \"remote\"",
            ));
        }
        Ok(())
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self::from_raw(ConfigFile::default())
    }
}

fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.into(),
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub contents: ConfigFile,
    pub source: PathBuf,
}

impl LoadedConfig {
    pub fn new(contents: ConfigFile, source: PathBuf) -> Self {
        Self { contents, source }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfigWithSource {
    pub resolved: ResolvedConfig,
    pub source: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid setting {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

pub fn default_search_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from(PRIMARY_CONFIG_PATH),
        PathBuf::from(SECONDARY_CONFIG_PATH),
    ]
}

/// First existing file wins; missing files are skipped.
pub fn load_from_paths(paths: &[PathBuf]) -> Result<Option<LoadedConfig>, ConfigError> {
    for path in paths {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let parsed =
                    toml::from_str::<ConfigFile>(&contents).map_err(|err| ConfigError::Parse {
                        path: path.clone(),
                        message: err.to_string(),
                    })?;
                return Ok(Some(LoadedConfig::new(parsed, path.clone())));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source: err,
                })
            }
        }
    }

    Ok(None)
}

pub fn load_resolved_from_paths(
    paths: &[PathBuf],
) -> Result<ResolvedConfigWithSource, ConfigError> {
    let (resolved, source) = match load_from_paths(paths)? {
        Some(entry) => (ResolvedConfig::from_raw(entry.contents), Some(entry.source)),
        None => (ResolvedConfig::default(), None),
    };
    resolved.validate()?;
    Ok(ResolvedConfigWithSource { resolved, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn primary_path_wins() {
        let dir = tempdir().unwrap();
        let primary = dir.path().join("primary.toml");
        let secondary = dir.path().join("secondary.toml");
        fs::write(&secondary, "enrollment_jitters = 10").unwrap();
        fs::write(&primary, "enrollment_jitters = 50").unwrap();

        let loaded = load_from_paths(&[primary.clone(), secondary.clone()])
            .unwrap()
            .expect("config expected");
        assert_eq!(loaded.source(), primary.as_path());
        assert_eq!(loaded.contents.enrollment_jitters, Some(50));
    }

    #[test]
    fn secondary_used_when_primary_missing() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let secondary = dir.path().join("secondary.toml");
        fs::write(&secondary, "encoder_backend = \"remote\"").unwrap();

        let loaded = load_from_paths(&[missing, secondary.clone()])
            .unwrap()
            .expect("config expected");
        assert_eq!(loaded.source, secondary);
        assert_eq!(loaded.contents.encoder_backend, Some(Backend::Remote));
    }

    #[test]
    fn parse_errors_are_reported() {
        let dir = tempdir().unwrap();
        let broken = dir.path().join("broken.toml");
        fs::write(&broken, "store_dir = { invalid = true }").unwrap();

        let err = load_from_paths(&[broken.clone()]).unwrap_err();
        match err {
            ConfigError::Parse { path, .. } => assert_eq!(path, broken),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn unknown_backend_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "matcher_backend = \"gpu\"").unwrap();
        assert!(matches!(
            load_from_paths(&[path]),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn io_errors_are_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dir.toml");
        fs::create_dir_all(&path).unwrap();

        let err = load_from_paths(&[path.clone()]).unwrap_err();
        match err {
            ConfigError::Read { path: err_path, .. } => assert_eq!(err_path, path),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn resolved_defaults_apply_when_missing() {
        let resolved = load_resolved_from_paths(&[]).unwrap();
        assert!(resolved.source.is_none());
        let config = resolved.resolved;
        assert_eq!(config.dimension, DEFAULT_DIMENSION);
        assert_eq!(config.identification_tolerance, DEFAULT_IDENTIFICATION_TOLERANCE);
        assert_eq!(config.duplicate_tolerance, DEFAULT_DUPLICATE_TOLERANCE);
        assert_eq!(config.min_image_dimension, DEFAULT_MIN_IMAGE_DIMENSION);
        assert_eq!(config.encoder_backend, Backend::Local);
        assert_eq!(config.service_timeout, Duration::from_secs(10));
        assert!(!config.reject_multiple_faces);
    }

    #[test]
    fn resolved_config_reports_source() {
        let dir = tempdir().unwrap();
        let primary = dir.path().join("primary.toml");
        fs::write(
            &primary,
            "service_timeout_secs = 3\nidentification_tolerance = 0.4\nreject_multiple_faces = true",
        )
        .unwrap();

        let resolved = load_resolved_from_paths(&[primary.clone()]).unwrap();
        assert_eq!(resolved.source, Some(primary));
        assert_eq!(resolved.resolved.service_timeout, Duration::from_secs(3));
        assert_eq!(resolved.resolved.identification_tolerance, 0.4);
        assert!(resolved.resolved.reject_multiple_faces);
    }

    #[test]
    fn stricter_duplicate_tolerance_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "identification_tolerance = 0.5\nduplicate_tolerance = 0.4",
        )
        .unwrap();

        let err = load_resolved_from_paths(&[path]).unwrap_err();
        match err {
            ConfigError::Invalid { field, .. } => assert_eq!(field, "duplicate_tolerance"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn remote_backend_requires_url() {
        let mut config = ResolvedConfig {
            matcher_backend: Backend::Remote,
            ..ResolvedConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "service_url",
                ..
            })
        ));
        config.service_url = Some("http://127.0.0.1:5000".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn non_positive_tolerance_is_rejected() {
        let config = ResolvedConfig {
            identification_tolerance: 0.0,
            ..ResolvedConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "identification_tolerance",
                ..
            })
        ));
    }

    #[test]
    fn out_of_range_detector_settings_are_rejected() {
        let config = ResolvedConfig {
            detector_upsample: 4,
            ..ResolvedConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ResolvedConfig {
            min_face_ratio: 1.5,
            ..ResolvedConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
