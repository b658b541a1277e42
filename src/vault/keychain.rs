//! Master password cache
//!
//! Optional pass-through to the OS keychain so the master password does not
//! have to be typed on every run. Any keychain problem degrades to prompting.

use keyring::Entry;
use tracing::{debug, warn};

use crate::engine::error::{EngineError, EngineResult};

const SERVICE_NAME: &str = "wakedesk";
const MASTER_PASSWORD_KEY: &str = "master_password";

/// Key/value secret source holding the master password
pub trait SecretSource: Send + Sync {
    fn get(&self) -> EngineResult<Option<String>>;
    fn set(&self, secret: &str) -> EngineResult<()>;
    /// Returns false when nothing was stored
    fn delete(&self) -> EngineResult<bool>;
}

/// OS keychain backed source (Credential Manager, Keychain, Secret Service)
pub struct KeyringSecretSource {
    service: String,
    account: String,
}

impl KeyringSecretSource {
    pub fn new() -> Self {
        Self::with_identity(SERVICE_NAME, MASTER_PASSWORD_KEY)
    }

    pub fn with_identity(service: &str, account: &str) -> Self {
        Self {
            service: service.to_string(),
            account: account.to_string(),
        }
    }

    fn entry(&self) -> EngineResult<Entry> {
        Entry::new(&self.service, &self.account)
            .map_err(|e| EngineError::secret_store(format!("Keyring error: {}", e)))
    }
}

impl Default for KeyringSecretSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretSource for KeyringSecretSource {
    fn get(&self) -> EngineResult<Option<String>> {
        match self.entry()?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(EngineError::secret_store(format!("Keyring error: {}", e))),
        }
    }

    fn set(&self, secret: &str) -> EngineResult<()> {
        self.entry()?
            .set_password(secret)
            .map_err(|e| EngineError::secret_store(format!("Failed to store master password: {}", e)))
    }

    fn delete(&self) -> EngineResult<bool> {
        match self.entry()?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(EngineError::secret_store(format!("Failed to delete: {}", e))),
        }
    }
}

/// Returns the cached master password, or asks `prompt` for it when there is
/// no source, nothing cached, or the source fails
pub fn resolve_master_password<F>(source: Option<&dyn SecretSource>, prompt: F) -> EngineResult<String>
where
    F: FnOnce() -> EngineResult<String>,
{
    if let Some(source) = source {
        match source.get() {
            Ok(Some(secret)) => {
                debug!("master password loaded from secret source");
                return Ok(secret);
            }
            Ok(None) => debug!("no cached master password"),
            Err(e) => warn!(error = %e, "secret source unavailable, prompting instead"),
        }
    }
    prompt()
}

/// Best-effort store; failures are logged, never surfaced
pub fn remember_master_password(source: Option<&dyn SecretSource>, secret: &str) -> bool {
    let Some(source) = source else {
        return false;
    };
    match source.set(secret) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "could not cache master password");
            false
        }
    }
}
