use std::io;
use std::path::PathBuf;

use facematch_config::{default_search_paths, load_resolved_from_paths, ConfigError, ResolvedConfig};
use tracing::{debug, info};

use crate::cli::SettingsArgs;
use crate::errors::AppResult;

/// Loads the configuration named by `--config`, or the first file on the
/// default search path, then applies command-line overrides.
pub fn load_settings(args: &SettingsArgs) -> AppResult<ResolvedConfig> {
    let sources = match &args.config {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source: io::Error::new(io::ErrorKind::NotFound, "configuration file not found"),
                }
                .into());
            }
            vec![path.clone()]
        }
        None => default_search_paths(),
    };
    load_settings_with_sources(args, &sources)
}

fn load_settings_with_sources(args: &SettingsArgs, sources: &[PathBuf]) -> AppResult<ResolvedConfig> {
    let loaded = load_resolved_from_paths(sources)?;
    match &loaded.source {
        Some(path) => debug!(path = %path.display(), "loaded configuration"),
        None => info!(
            target: "config.defaults",
            "No configuration file found; using built-in defaults"
        ),
    }

    let mut resolved = loaded.resolved;
    if let Some(dir) = &args.store_dir {
        resolved.store_dir = dir.clone();
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use facematch_config::Backend;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempdir().unwrap();
        let args = SettingsArgs {
            config: Some(dir.path().join("nope.toml")),
            ..SettingsArgs::default()
        };
        let err = load_settings(&args).unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::Read { .. })));
    }

    #[test]
    fn cli_store_dir_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "store_dir = \"/srv/facematch\"\nencoder_backend = \"remote\"\nservice_url = \"http://10.1.2.3:5000\"",
        )
        .unwrap();

        let args = SettingsArgs {
            config: Some(path.clone()),
            store_dir: Some(PathBuf::from("/tmp/override")),
            shared_secret: None,
        };
        let resolved = load_settings(&args).unwrap();
        assert_eq!(resolved.store_dir, PathBuf::from("/tmp/override"));
        assert_eq!(resolved.encoder_backend, Backend::Remote);

        let args = SettingsArgs {
            config: Some(path),
            ..SettingsArgs::default()
        };
        let resolved = load_settings(&args).unwrap();
        assert_eq!(resolved.store_dir, PathBuf::from("/srv/facematch"));
    }

    #[test]
    fn defaults_apply_without_sources() {
        let resolved = load_settings_with_sources(&SettingsArgs::default(), &[]).unwrap();
        assert_eq!(resolved.identification_tolerance, 0.45);
    }
}
