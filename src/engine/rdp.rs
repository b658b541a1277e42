//! Remote Desktop launcher
//!
//! Writes a connection profile to the temp directory and starts the desktop
//! client on it. The client runs detached; its exit is never observed.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::DesktopLauncher;
use crate::engine::types::DesktopLogin;

pub const DEFAULT_RDP_PORT: u16 = 3389;
pub const DEFAULT_RDP_PROGRAM: &str = "mstsc";

/// Splits `host[:port]`, defaulting the port to 3389
pub fn parse_server(server: &str) -> EngineResult<(String, u16)> {
    let server = server.trim();
    if server.is_empty() {
        return Err(EngineError::invalid_config("RDP server is empty"));
    }
    match server.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| EngineError::invalid_config(format!("Invalid RDP port in '{}'", server)))?;
            if host.is_empty() {
                return Err(EngineError::invalid_config(format!("Missing RDP host in '{}'", server)));
            }
            Ok((host.to_string(), port))
        }
        None => Ok((server.to_string(), DEFAULT_RDP_PORT)),
    }
}

/// Full-screen profile with credential prompting disabled. The password is
/// never written here.
pub fn render_profile(host: &str, port: u16, username: &str) -> String {
    let mut lines: Vec<String> = [
        "screen mode id:i:2",
        "desktopwidth:i:1920",
        "desktopheight:i:1080",
        "session bpp:i:32",
        "compression:i:1",
        "keyboardhook:i:2",
        "audiocapturemode:i:0",
        "videoplaybackmode:i:1",
        "connection type:i:7",
        "networkautodetect:i:1",
        "bandwidthautodetect:i:1",
        "displayconnectionbar:i:1",
        "enableworkspacereconnect:i:0",
        "allow font smoothing:i:1",
        "allow desktop composition:i:1",
        "bitmapcachepersistenable:i:1",
        "audiomode:i:0",
        "redirectprinters:i:0",
        "redirectcomports:i:0",
        "redirectsmartcards:i:0",
        "redirectclipboard:i:1",
        "redirectposdevices:i:0",
        "autoreconnection enabled:i:1",
        "authentication level:i:0",
        "prompt for credentials:i:0",
        "negotiate security layer:i:1",
        "remoteapplicationmode:i:0",
        "gatewayusagemethod:i:0",
        "promptcredentialonce:i:0",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    lines.push(format!("full address:s:{}:{}", host, port));
    if !username.is_empty() {
        lines.push(format!("username:s:{}", username));
    }
    lines.join("\r\n")
}

/// Launches the platform desktop client (mstsc by default)
pub struct RdpLauncher {
    program: String,
    profile_dir: PathBuf,
    stage_credentials: bool,
}

impl RdpLauncher {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            profile_dir: std::env::temp_dir(),
            stage_credentials: cfg!(windows),
        }
    }

    pub fn with_profile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.profile_dir = dir.into();
        self
    }

    /// Store the password with `cmdkey` before launching (Windows only)
    pub fn with_credential_staging(mut self, enabled: bool) -> Self {
        self.stage_credentials = enabled;
        self
    }

    /// Writes the profile and returns its path
    pub async fn write_profile(&self, host: &str, port: u16, username: &str) -> EngineResult<PathBuf> {
        tokio::fs::create_dir_all(&self.profile_dir).await?;
        let path = self
            .profile_dir
            .join(format!("wakedesk-{}.rdp", Uuid::new_v4().simple()));
        tokio::fs::write(&path, render_profile(host, port, username))
            .await
            .map_err(|e| EngineError::launch(format!("Failed to write RDP profile: {}", e)))?;
        Ok(path)
    }

    async fn stage_password(&self, host: &str, login: &DesktopLogin) {
        if !self.stage_credentials || login.password.is_empty() {
            return;
        }
        let status = Command::new("cmdkey")
            .arg(format!("/generic:TERMSRV/{}", host))
            .arg(format!("/user:{}", login.username))
            .arg(format!("/pass:{}", login.password))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(s) if s.success() => info!("desktop credentials staged"),
            Ok(s) => warn!(code = ?s.code(), "cmdkey failed; the client will prompt"),
            Err(e) => warn!(error = %e, "cmdkey unavailable; the client will prompt"),
        }
    }

    fn spawn_client(&self, profile: &Path) -> EngineResult<()> {
        Command::new(&self.program)
            .arg(profile)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                EngineError::launch(format!(
                    "Failed to start '{}': {}. Is the remote desktop client installed?",
                    self.program, e
                ))
            })?;
        Ok(())
    }
}

impl Default for RdpLauncher {
    fn default() -> Self {
        Self::new(DEFAULT_RDP_PROGRAM)
    }
}

#[async_trait]
impl DesktopLauncher for RdpLauncher {
    #[instrument(skip(self, login), fields(server = %login.server, user = %login.username))]
    async fn launch(&self, login: &DesktopLogin) -> EngineResult<()> {
        let (host, port) = parse_server(&login.server)?;
        let profile = self.write_profile(&host, port, &login.username).await?;
        self.stage_password(&host, login).await;
        self.spawn_client(&profile)?;
        info!(profile = %profile.display(), "desktop client launched");
        Ok(())
    }
}
