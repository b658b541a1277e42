//! Vault Module
//!
//! Plaintext target directory plus master-password encrypted credentials.

pub mod cipher;
pub mod credentials;
pub mod keychain;
pub mod storage;

pub use credentials::{CredentialMap, CredentialRecord, TargetDescriptor};
pub use keychain::{KeyringSecretSource, SecretSource};
pub use storage::{Vault, VaultStore};
