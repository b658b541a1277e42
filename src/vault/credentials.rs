//! Vault records
//!
//! Plaintext target descriptors, the per-target secrets stored behind the
//! master password, and the legacy single-target record kept for migration.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::engine::error::{EngineError, EngineResult};

pub const DEFAULT_ROUTER_TYPE: &str = "iptime";

/// Router endpoint and API dialect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouterSettings {
    /// API dialect, e.g. "iptime"
    #[serde(rename = "type")]
    pub kind: String,
    /// Base URL, e.g. http://192.168.0.1:80
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WolSettings {
    pub mac_address: String,
    /// Router LAN port the target is cabled to; 0 disables the link check
    #[serde(default)]
    pub lan_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RdpSettings {
    /// host or host:port
    pub server: String,
}

/// A named machine (no secrets)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetDescriptor {
    pub name: String,
    pub router: RouterSettings,
    pub wol: WolSettings,
    pub rdp: RdpSettings,
}

impl TargetDescriptor {
    pub fn validate(&self) -> EngineResult<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::invalid_config("Target name is required"));
        }
        if self.router.kind.trim().is_empty() {
            return Err(EngineError::invalid_config(format!(
                "Target '{}': router type is required",
                self.name
            )));
        }
        let url = self.router.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(EngineError::invalid_config(format!(
                "Target '{}': router url must start with http:// or https://",
                self.name
            )));
        }
        if !is_mac_address(&self.wol.mac_address) {
            return Err(EngineError::invalid_config(format!(
                "Target '{}': invalid MAC address '{}'",
                self.name, self.wol.mac_address
            )));
        }
        if self.rdp.server.trim().is_empty() {
            return Err(EngineError::invalid_config(format!(
                "Target '{}': RDP server is required",
                self.name
            )));
        }
        Ok(())
    }
}

/// Six hex octets separated by ':' or '-'
pub fn is_mac_address(value: &str) -> bool {
    let sep = if value.contains('-') { '-' } else { ':' };
    let octets: Vec<&str> = value.split(sep).collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Plaintext config file contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetDirectory {
    #[serde(default)]
    pub targets: Vec<TargetDescriptor>,
}

impl TargetDirectory {
    /// Checks every descriptor and name uniqueness
    pub fn validate(&self) -> EngineResult<()> {
        let mut seen = HashSet::new();
        for target in &self.targets {
            target.validate()?;
            if !seen.insert(target.name.as_str()) {
                return Err(EngineError::invalid_config(format!(
                    "Duplicate target name '{}'",
                    target.name
                )));
            }
        }
        Ok(())
    }
}

/// Login secrets for one target
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(deny_unknown_fields)]
pub struct CredentialRecord {
    pub router_id: String,
    pub router_pw: String,
    pub rdp_id: String,
    pub rdp_pw: String,
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("router_id", &self.router_id)
            .field("router_pw", &"[REDACTED]")
            .field("rdp_id", &self.rdp_id)
            .field("rdp_pw", &"[REDACTED]")
            .finish()
    }
}

/// Target name -> secrets, the plaintext of the encrypted credential file
pub type CredentialMap = BTreeMap<String, CredentialRecord>;

/// Pre-split all-in-one config (one implicit target)
#[derive(Deserialize)]
pub struct LegacyConfig {
    pub router: LegacyRouter,
    pub wol: WolSettings,
    pub rdp: LegacyRdp,
}

#[derive(Deserialize)]
pub struct LegacyRouter {
    #[serde(rename = "type", default = "default_router_type")]
    pub kind: String,
    pub url: String,
    pub id: String,
    pub pw: String,
}

#[derive(Deserialize)]
pub struct LegacyRdp {
    pub server: String,
    pub id: String,
    pub pw: String,
}

fn default_router_type() -> String {
    DEFAULT_ROUTER_TYPE.to_string()
}

impl LegacyConfig {
    /// Splits the legacy record into a descriptor and its secrets
    pub fn into_target(self, name: &str) -> (TargetDescriptor, CredentialRecord) {
        let descriptor = TargetDescriptor {
            name: name.to_string(),
            router: RouterSettings {
                kind: self.router.kind,
                url: self.router.url,
            },
            wol: self.wol,
            rdp: RdpSettings {
                server: self.rdp.server,
            },
        };
        let record = CredentialRecord {
            router_id: self.router.id,
            router_pw: self.router.pw,
            rdp_id: self.rdp.id,
            rdp_pw: self.rdp.pw,
        };
        (descriptor, record)
    }
}

#[cfg(test)]
pub(crate) fn sample_target(name: &str, lan_port: u16) -> TargetDescriptor {
    TargetDescriptor {
        name: name.to_string(),
        router: RouterSettings {
            kind: DEFAULT_ROUTER_TYPE.to_string(),
            url: "http://192.168.0.1".to_string(),
        },
        wol: WolSettings {
            mac_address: "10:FF:E0:38:F4:D5".to_string(),
            lan_port,
        },
        rdp: RdpSettings {
            server: "192.168.0.100:3389".to_string(),
        },
    }
}

#[cfg(test)]
pub(crate) fn sample_record() -> CredentialRecord {
    CredentialRecord {
        router_id: "admin".to_string(),
        router_pw: "router-secret".to_string(),
        rdp_id: "alice".to_string(),
        rdp_pw: "rdp-secret".to_string(),
    }
}
