use std::fs;
use std::path::Path;

use facematch_config::{Backend, ResolvedConfig};
use serde::Serialize;

use crate::cli::DoctorArgs;
use crate::config::load_settings;
use crate::errors::AppResult;
use crate::wiring::Components;

const CHECK_CONFIG: &str = "config";
const CHECK_STORE_DIR: &str = "embedding_store_dir";
const CHECK_LANDMARK_MODEL: &str = "landmark_model";
const CHECK_ENCODER_MODEL: &str = "encoder_model";
const CHECK_REMOTE_SERVICE: &str = "remote_service";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorCheck {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl DoctorCheck {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            path: None,
            url: None,
        }
    }

    fn at(mut self, path: &Path) -> Self {
        self.path = Some(path.display().to_string());
        self
    }

    fn at_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorOutcome {
    pub ok: bool,
    pub checks: Vec<DoctorCheck>,
}

impl DoctorOutcome {
    fn from_checks(checks: Vec<DoctorCheck>) -> Self {
        let ok = checks.iter().all(|check| check.status != CheckStatus::Fail);
        Self { ok, checks }
    }
}

/// Warnings do not fail the run; a missing store directory is created on the
/// first enrollment.
pub fn run_doctor(args: &DoctorArgs) -> AppResult<DoctorOutcome> {
    let config = match load_settings(&args.settings) {
        Ok(config) => config,
        Err(err) => {
            let check = DoctorCheck::new(CHECK_CONFIG, CheckStatus::Fail, err.human_message());
            return Ok(DoctorOutcome::from_checks(vec![check]));
        }
    };

    let mut checks = vec![DoctorCheck::new(
        CHECK_CONFIG,
        CheckStatus::Pass,
        format!(
            "encoder backend {}, matcher backend {}",
            backend_name(config.encoder_backend),
            backend_name(config.matcher_backend)
        ),
    )];
    checks.push(check_store_dir(&config.store_dir));
    if config.encoder_backend == Backend::Local {
        checks.push(check_model(CHECK_LANDMARK_MODEL, config.landmark_model.as_deref()));
        checks.push(check_model(CHECK_ENCODER_MODEL, config.encoder_model.as_deref()));
    }
    if config.encoder_backend == Backend::Remote || config.matcher_backend == Backend::Remote {
        checks.push(check_remote_service(&config, args.settings.shared_secret.as_deref()));
    }

    Ok(DoctorOutcome::from_checks(checks))
}

fn backend_name(backend: Backend) -> &'static str {
    match backend {
        Backend::Local => "local",
        Backend::Remote => "remote",
    }
}

fn check_store_dir(dir: &Path) -> DoctorCheck {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() && meta.permissions().readonly() => {
            DoctorCheck::new(CHECK_STORE_DIR, CheckStatus::Fail, "directory is read-only").at(dir)
        }
        Ok(meta) if meta.is_dir() => {
            DoctorCheck::new(CHECK_STORE_DIR, CheckStatus::Pass, "directory present").at(dir)
        }
        Ok(_) => DoctorCheck::new(CHECK_STORE_DIR, CheckStatus::Fail, "path is not a directory")
            .at(dir),
        Err(_) => DoctorCheck::new(
            CHECK_STORE_DIR,
            CheckStatus::Warn,
            "directory missing; it will be created on first enrollment",
        )
        .at(dir),
    }
}

fn check_model(name: &str, path: Option<&Path>) -> DoctorCheck {
    let Some(path) = path else {
        return DoctorCheck::new(
            name,
            CheckStatus::Fail,
            format!("{name} is required for the local encoder"),
        );
    };
    if path.is_file() {
        DoctorCheck::new(name, CheckStatus::Pass, "model file present").at(path)
    } else {
        DoctorCheck::new(name, CheckStatus::Fail, "model file not found").at(path)
    }
}

fn check_remote_service(config: &ResolvedConfig, explicit_secret: Option<&str>) -> DoctorCheck {
    let service = match Components::new(config, explicit_secret).remote_service() {
        Ok(service) => service,
        Err(err) => {
            return DoctorCheck::new(CHECK_REMOTE_SERVICE, CheckStatus::Fail, err.human_message())
        }
    };
    let check = match service.health() {
        Ok(()) => DoctorCheck::new(CHECK_REMOTE_SERVICE, CheckStatus::Pass, "service healthy"),
        Err(err) => DoctorCheck::new(CHECK_REMOTE_SERVICE, CheckStatus::Fail, err.human_message()),
    };
    check.at_url(service.base_url())
}
