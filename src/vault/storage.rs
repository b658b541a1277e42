//! Vault Storage
//!
//! Two files under one directory: `targets.json` holds the plaintext target
//! directory and `credentials.enc` holds the encrypted name -> secrets map.
//! Listing targets never needs the master password.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};
use zeroize::Zeroizing;

use crate::engine::error::{EngineError, EngineResult};
use crate::vault::cipher::{self, EncryptedBlob, KdfParams, LegacyBlob};
use crate::vault::credentials::{
    CredentialMap, CredentialRecord, LegacyConfig, TargetDescriptor, TargetDirectory,
};

const CONFIG_FILE: &str = "targets.json";
const CREDENTIALS_FILE: &str = "credentials.enc";

/// Which vault files are present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultPresence {
    pub has_config: bool,
    pub has_credentials: bool,
}

/// A target as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetListing {
    pub name: String,
    /// False when no secrets are stored for this name
    pub usable: bool,
}

/// Descriptor paired with its secrets
#[derive(Debug, Clone, Copy)]
pub struct ResolvedTarget<'a> {
    pub descriptor: &'a TargetDescriptor,
    pub credentials: &'a CredentialRecord,
}

/// Decrypted, in-memory vault
#[derive(Debug, Clone, Default)]
pub struct Vault {
    pub targets: Vec<TargetDescriptor>,
    pub credentials: CredentialMap,
}

impl Vault {
    pub fn listing(&self) -> Vec<TargetListing> {
        self.targets
            .iter()
            .map(|t| TargetListing {
                name: t.name.clone(),
                usable: self.credentials.contains_key(&t.name),
            })
            .collect()
    }

    /// Looks up a usable target by name
    pub fn resolve(&self, name: &str) -> EngineResult<ResolvedTarget<'_>> {
        let descriptor = self
            .targets
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| EngineError::not_found(format!("target '{}'", name)))?;
        let credentials = self
            .credentials
            .get(name)
            .ok_or_else(|| EngineError::missing_credentials(name))?;
        Ok(ResolvedTarget {
            descriptor,
            credentials,
        })
    }
}

/// File-backed vault store
pub struct VaultStore {
    config_path: PathBuf,
    credentials_path: PathBuf,
    kdf: KdfParams,
}

impl VaultStore {
    /// Creates a store rooted at `dir` with default KDF cost
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self::with_kdf(dir, KdfParams::default())
    }

    /// KDF cost used for new writes; existing files keep the cost they were
    /// written with until re-saved
    pub fn with_kdf(dir: impl AsRef<Path>, kdf: KdfParams) -> Self {
        let dir = dir.as_ref();
        Self {
            config_path: dir.join(CONFIG_FILE),
            credentials_path: dir.join(CREDENTIALS_FILE),
            kdf,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn credentials_path(&self) -> &Path {
        &self.credentials_path
    }

    pub fn exists(&self) -> VaultPresence {
        VaultPresence {
            has_config: self.config_path.is_file(),
            has_credentials: self.credentials_path.is_file(),
        }
    }

    /// Reads and validates the plaintext target directory
    pub fn load_config(&self) -> EngineResult<Vec<TargetDescriptor>> {
        let raw = read_existing(&self.config_path)?;
        let directory: TargetDirectory = serde_json::from_str(&raw).map_err(|e| {
            EngineError::invalid_config(format!("{}: {}", self.config_path.display(), e))
        })?;
        directory.validate()?;
        Ok(directory.targets)
    }

    pub fn save_config(&self, targets: &[TargetDescriptor]) -> EngineResult<()> {
        let directory = TargetDirectory {
            targets: targets.to_vec(),
        };
        directory.validate()?;
        let json = serde_json::to_string_pretty(&directory)
            .map_err(|e| EngineError::internal(format!("Serialization error: {}", e)))?;
        write_atomic(&self.config_path, json.as_bytes())?;
        debug!(targets = targets.len(), "target directory saved");
        Ok(())
    }

    #[instrument(skip(self, password))]
    pub fn load_credentials(&self, password: &str) -> EngineResult<CredentialMap> {
        let blob: EncryptedBlob = self.read_envelope(&self.credentials_path)?;
        let plain = cipher::decrypt(&blob, password)?;
        // Unparseable plaintext is reported the same as a bad password.
        serde_json::from_slice(&plain).map_err(|_| EngineError::AuthFailed)
    }

    #[instrument(skip_all, fields(entries = credentials.len()))]
    pub fn save_credentials(&self, credentials: &CredentialMap, password: &str) -> EngineResult<()> {
        let json = Zeroizing::new(
            serde_json::to_vec(credentials)
                .map_err(|e| EngineError::internal(format!("Serialization error: {}", e)))?,
        );
        let blob = cipher::encrypt(&json, password, None, &self.kdf)?;
        let envelope = serde_json::to_string_pretty(&blob)
            .map_err(|e| EngineError::internal(format!("Serialization error: {}", e)))?;
        write_atomic(&self.credentials_path, envelope.as_bytes())
    }

    pub fn verify_password(&self, password: &str) -> EngineResult<bool> {
        let blob: EncryptedBlob = self.read_envelope(&self.credentials_path)?;
        Ok(cipher::verify_password(&blob, password))
    }

    /// Loads targets and secrets together
    pub fn open(&self, password: &str) -> EngineResult<Vault> {
        let targets = self.load_config()?;
        let credentials = self.load_credentials(password)?;
        Ok(Vault {
            targets,
            credentials,
        })
    }

    /// Re-encrypts the credential map under a new password. Descriptors are
    /// not touched.
    #[instrument(skip_all)]
    pub fn rotate_master_password(&self, old: &str, new: &str) -> EngineResult<()> {
        let credentials = self.load_credentials(old)?;
        self.save_credentials(&credentials, new)?;
        info!("master password rotated");
        Ok(())
    }

    /// Appends a target, creating the vault on first use
    #[instrument(skip(self, descriptor, credentials, password), fields(target = %descriptor.name))]
    pub fn add_target(
        &self,
        descriptor: TargetDescriptor,
        credentials: CredentialRecord,
        password: &str,
    ) -> EngineResult<()> {
        descriptor.validate()?;
        let presence = self.exists();

        let mut targets = if presence.has_config {
            self.load_config()?
        } else {
            Vec::new()
        };
        let mut map = if presence.has_credentials {
            self.load_credentials(password)?
        } else {
            CredentialMap::new()
        };

        if targets.iter().any(|t| t.name == descriptor.name) {
            return Err(EngineError::invalid_config(format!(
                "Target '{}' already exists",
                descriptor.name
            )));
        }

        map.insert(descriptor.name.clone(), credentials);
        targets.push(descriptor);

        // Secrets land before the descriptor that refers to them.
        self.save_credentials(&map, password)?;
        self.save_config(&targets)?;
        info!(targets = targets.len(), "target added");
        Ok(())
    }

    /// Removes a target and its secrets
    #[instrument(skip(self, password))]
    pub fn remove_target(&self, name: &str, password: &str) -> EngineResult<()> {
        let mut targets = self.load_config()?;
        let mut map = self.load_credentials(password)?;

        let before = targets.len();
        targets.retain(|t| t.name != name);
        let had_secret = map.remove(name).is_some();
        if targets.len() == before && !had_secret {
            return Err(EngineError::not_found(format!("target '{}'", name)));
        }

        // Reverse of add_target: a listed descriptor always has its secrets,
        // an unlisted secret is inert.
        self.save_config(&targets)?;
        self.save_credentials(&map, password)?;
        info!("target removed");
        Ok(())
    }

    /// One-time upgrade of a legacy all-in-one encrypted file. The legacy file
    /// is only read.
    #[instrument(skip(self, password), fields(legacy = %legacy_path.display()))]
    pub fn migrate_legacy(
        &self,
        legacy_path: &Path,
        password: &str,
        target_name: &str,
    ) -> EngineResult<Vault> {
        let presence = self.exists();
        if presence.has_config || presence.has_credentials {
            return Err(EngineError::invalid_config(
                "A vault already exists; legacy migration only runs on an empty vault",
            ));
        }

        let blob: LegacyBlob = self.read_envelope(legacy_path)?;
        let plain = cipher::decrypt_legacy(&blob, password)?;
        let legacy: LegacyConfig =
            serde_json::from_slice(&plain).map_err(|_| EngineError::AuthFailed)?;

        let (descriptor, record) = legacy.into_target(target_name);
        descriptor.validate()?;

        let mut credentials = CredentialMap::new();
        credentials.insert(descriptor.name.clone(), record);
        let targets = vec![descriptor];

        self.save_credentials(&credentials, password)?;
        self.save_config(&targets)?;
        info!(target = target_name, "legacy config migrated");

        Ok(Vault {
            targets,
            credentials,
        })
    }

    /// Removes both files; absent files are not an error
    pub fn delete_all(&self) -> EngineResult<()> {
        for path in [&self.config_path, &self.credentials_path] {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "vault file removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(EngineError::internal(format!(
                        "Failed to remove {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
        Ok(())
    }

    fn read_envelope<T: DeserializeOwned>(&self, path: &Path) -> EngineResult<T> {
        let raw = read_existing(path)?;
        // A file that is not an envelope at all is indistinguishable from a
        // corrupted one.
        serde_json::from_str(&raw).map_err(|_| EngineError::AuthFailed)
    }
}

fn read_existing(path: &Path) -> EngineResult<String> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(raw),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(EngineError::not_found(path.display().to_string()))
        }
        Err(e) => Err(EngineError::internal(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Write-new-then-rename so an interrupted write never truncates the old file
fn write_atomic(path: &Path, contents: &[u8]) -> EngineResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| {
        EngineError::internal(format!("Failed to replace {}: {}", path.display(), e.error))
    })?;
    Ok(())
}
