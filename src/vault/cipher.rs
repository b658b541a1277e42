//! Vault Cipher
//!
//! Master-password key derivation (Argon2id) and the authenticated
//! ChaCha20-Poly1305 envelope used for every encrypted vault file. Files
//! written by the legacy single-target tool (PBKDF2-SHA256 keyed Fernet
//! tokens) can be read for migration but are never written.
//!
//! Every failure on the decrypt path collapses into [`EngineError::AuthFailed`]:
//! callers cannot tell a wrong password from a damaged salt or ciphertext.

use std::fmt;

use aes::Aes128;
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE};
use base64::Engine as _;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::engine::error::{EngineError, EngineResult};

pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;

pub const LEGACY_PBKDF2_ROUNDS: u32 = 100_000;

const FERNET_VERSION: u8 = 0x80;
/// version || timestamp || iv
const FERNET_HEADER_LEN: usize = 1 + 8 + 16;
const FERNET_TAG_LEN: usize = 32;

/// Upper bounds accepted for parameters read back from a file
const MAX_M_COST_KIB: u32 = 1024 * 1024;
const MAX_T_COST: u32 = 64;
const MAX_P_COST: u32 = 16;

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub m_cost_kib: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost_kib: 19 * 1024,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

impl KdfParams {
    fn within_bounds(&self) -> bool {
        self.m_cost_kib <= MAX_M_COST_KIB
            && (1..=MAX_T_COST).contains(&self.t_cost)
            && (1..=MAX_P_COST).contains(&self.p_cost)
    }

    fn argon2(&self) -> EngineResult<Argon2<'static>> {
        let params = Params::new(self.m_cost_kib, self.t_cost, self.p_cost, Some(KEY_LEN))
            .map_err(|e| EngineError::internal(format!("Invalid KDF parameters: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Symmetric key derived from the master password. Lives only for one
/// vault operation and is wiped on drop.
pub struct MasterKey(Zeroizing<[u8; KEY_LEN]>);

impl MasterKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// Encrypted payload as stored on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    /// base64(nonce || ciphertext || tag)
    pub encrypted: String,
    /// base64 of the 16-byte salt
    pub salt: String,
    #[serde(default)]
    pub kdf: KdfParams,
}

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derives the 256-bit vault key from `password` and `salt`
pub fn derive_key(password: &str, salt: &[u8], params: &KdfParams) -> EngineResult<MasterKey> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    params
        .argon2()?
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|e| EngineError::internal(format!("Key derivation failed: {}", e)))?;
    Ok(MasterKey(key))
}

/// Encrypts `plaintext` under `password`. A fresh salt is drawn when none is
/// given; the nonce is always fresh.
pub fn encrypt(
    plaintext: &[u8],
    password: &str,
    salt: Option<[u8; SALT_LEN]>,
    params: &KdfParams,
) -> EngineResult<EncryptedBlob> {
    let salt = salt.unwrap_or_else(generate_salt);
    let key = derive_key(password, &salt, params)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| EngineError::internal("Encryption failed"))?;

    let mut payload = Vec::with_capacity(NONCE_LEN + sealed.len());
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&sealed);

    Ok(EncryptedBlob {
        encrypted: BASE64.encode(payload),
        salt: BASE64.encode(salt),
        kdf: *params,
    })
}

/// Decrypts `blob`, failing closed with `AuthFailed` on any mismatch
pub fn decrypt(blob: &EncryptedBlob, password: &str) -> EngineResult<Zeroizing<Vec<u8>>> {
    if !blob.kdf.within_bounds() {
        return Err(EngineError::AuthFailed);
    }

    let salt = BASE64
        .decode(&blob.salt)
        .map_err(|_| EngineError::AuthFailed)?;
    if salt.len() != SALT_LEN {
        return Err(EngineError::AuthFailed);
    }

    let payload = BASE64
        .decode(&blob.encrypted)
        .map_err(|_| EngineError::AuthFailed)?;
    if payload.len() <= NONCE_LEN {
        return Err(EngineError::AuthFailed);
    }
    let (nonce, sealed) = payload.split_at(NONCE_LEN);

    let key = derive_key(password, &salt, &blob.kdf).map_err(|_| EngineError::AuthFailed)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map(Zeroizing::new)
        .map_err(|_| EngineError::AuthFailed)
}

/// Decrypt-and-discard
pub fn verify_password(blob: &EncryptedBlob, password: &str) -> bool {
    decrypt(blob, password).is_ok()
}

/// Envelope of the legacy all-in-one config file: a Fernet token (itself
/// base64 text) wrapped again in standard base64, next to the PBKDF2 salt
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LegacyBlob {
    pub encrypted: String,
    pub salt: String,
}

/// Decrypts a legacy envelope. Same failure contract as [`decrypt`].
pub fn decrypt_legacy(blob: &LegacyBlob, password: &str) -> EngineResult<Zeroizing<Vec<u8>>> {
    let salt = BASE64
        .decode(&blob.salt)
        .map_err(|_| EngineError::AuthFailed)?;
    let token_text = BASE64
        .decode(&blob.encrypted)
        .map_err(|_| EngineError::AuthFailed)?;
    let token = URL_SAFE
        .decode(&token_text)
        .map_err(|_| EngineError::AuthFailed)?;
    if token.len() < FERNET_HEADER_LEN + FERNET_TAG_LEN || token[0] != FERNET_VERSION {
        return Err(EngineError::AuthFailed);
    }

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, LEGACY_PBKDF2_ROUNDS, &mut key[..]);
    let (signing_key, encryption_key) = key.split_at(KEY_LEN / 2);

    let (signed, tag) = token.split_at(token.len() - FERNET_TAG_LEN);
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(signing_key)
        .map_err(|_| EngineError::AuthFailed)?;
    mac.update(signed);
    mac.verify_slice(tag).map_err(|_| EngineError::AuthFailed)?;

    let iv = &signed[9..FERNET_HEADER_LEN];
    let mut buf = Zeroizing::new(signed[FERNET_HEADER_LEN..].to_vec());
    let plain_len = cbc::Decryptor::<Aes128>::new_from_slices(encryption_key, iv)
        .map_err(|_| EngineError::AuthFailed)?
        .decrypt_padded_mut::<Pkcs7>(&mut buf[..])
        .map_err(|_| EngineError::AuthFailed)?
        .len();
    buf.truncate(plain_len);
    Ok(buf)
}

#[cfg(test)]
pub(crate) fn fast_params() -> KdfParams {
    KdfParams {
        m_cost_kib: 8,
        t_cost: 1,
        p_cost: 1,
    }
}
