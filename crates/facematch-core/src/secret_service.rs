use std::fmt;

use keyring::{error::Error as KeyringError, Entry};
use tracing::debug;

use crate::errors::{AppError, AppResult};

pub const DEFAULT_KEYRING_SERVICE: &str = "facematch";

/// API key presented to the biometric service. `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(String);

impl SharedSecret {
    /// Returns `None` for blank input.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

pub trait SecretStore {
    fn fetch(&self, account: &str) -> AppResult<Option<SharedSecret>>;
}

#[derive(Debug, Clone)]
pub struct KeyringSecretStore {
    service: String,
}

impl KeyringSecretStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }
}

impl Default for KeyringSecretStore {
    fn default() -> Self {
        Self::new(DEFAULT_KEYRING_SERVICE)
    }
}

impl SecretStore for KeyringSecretStore {
    fn fetch(&self, account: &str) -> AppResult<Option<SharedSecret>> {
        let unavailable = |message: String| AppError::SecretUnavailable {
            service: self.service.clone(),
            account: account.to_string(),
            message,
        };
        let entry = Entry::new(&self.service, account)
            .map_err(|err| unavailable(format!("failed to create keyring entry: {err}")))?;

        match entry.get_password() {
            Ok(secret) => Ok(SharedSecret::new(secret)),
            Err(KeyringError::NoEntry) => Ok(None),
            Err(err) => Err(unavailable(describe_keyring_error(&err))),
        }
    }
}

/// Picks the first secret available from, in order: the explicit value
/// (command line or environment), the configuration file, the keyring.
/// The keyring is only consulted when an account is configured.
pub fn resolve_shared_secret<S: SecretStore + ?Sized>(
    explicit: Option<&str>,
    configured: Option<&str>,
    keyring_account: Option<&str>,
    store: &S,
) -> AppResult<Option<SharedSecret>> {
    if let Some(secret) = explicit.and_then(SharedSecret::new) {
        debug!(source = "explicit", "shared secret resolved");
        return Ok(Some(secret));
    }
    if let Some(secret) = configured.and_then(SharedSecret::new) {
        debug!(source = "config", "shared secret resolved");
        return Ok(Some(secret));
    }
    let Some(account) = keyring_account else {
        return Ok(None);
    };
    let secret = store.fetch(account)?;
    debug!(source = "keyring", found = secret.is_some(), "shared secret lookup finished");
    Ok(secret)
}

pub fn describe_keyring_error(err: &KeyringError) -> String {
    match err {
        KeyringError::NoStorageAccess(inner) => {
            format!("keyring locked or unavailable: {inner}")
        }
        KeyringError::PlatformFailure(inner) => {
            format!("keyring platform failure: {inner}")
        }
        KeyringError::TooLong(attr, limit) => {
            format!("keyring attribute '{attr}' exceeded platform limit {limit}")
        }
        KeyringError::Invalid(attr, reason) => {
            format!("keyring attribute {attr} invalid: {reason}")
        }
        KeyringError::Ambiguous(items) => format!(
            "keyring returned {} matching credentials",
            items.len()
        ),
        KeyringError::BadEncoding(_) => "keyring returned a non-UTF8 secret".into(),
        KeyringError::NoEntry => "keyring reported no entry".into(),
        _ => format!("keyring error: {err}"),
    }
}
