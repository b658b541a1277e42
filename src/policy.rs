//! Runtime settings.
//!
//! Defaults are read from a per-user settings file. Environment variables
//! override any stored values so scripted runs can force behaviour.

use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::link_poll::LinkPoller;
use crate::engine::orchestrator::WakeTiming;
use crate::engine::rdp::DEFAULT_RDP_PROGRAM;
use crate::engine::traits::{Decision, FixedPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Where targets.json and credentials.enc live
    pub vault_dir: PathBuf,
    /// Answer given when a router step fails or the link wait times out
    pub continue_on_failure: bool,
    pub request_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub poll_ceiling_secs: u64,
    pub boot_delay_secs: u64,
    pub rdp_program: String,
    /// Cache the master password in the OS keychain
    pub use_keychain: bool,
}

fn env_bool_opt(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64_opt(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Per-user application directory (`%APPDATA%\WakeDesk` or `~/.wakedesk`)
pub fn app_dir() -> PathBuf {
    if cfg!(windows) {
        let appdata = std::env::var_os("APPDATA")
            .unwrap_or_else(|| std::env::var_os("USERPROFILE").unwrap_or_default());
        let mut path = PathBuf::from(appdata);
        path.push("WakeDesk");
        path
    } else {
        let home = std::env::var_os("HOME").unwrap_or_default();
        let mut path = PathBuf::from(home);
        path.push(".wakedesk");
        path
    }
}

fn settings_path() -> PathBuf {
    app_dir().join("settings.json")
}

fn load_from_file(path: &PathBuf) -> Option<AppSettings> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            vault_dir: app_dir(),
            continue_on_failure: false,
            request_timeout_secs: 10,
            poll_interval_ms: 1000,
            poll_ceiling_secs: 30,
            boot_delay_secs: 5,
            rdp_program: DEFAULT_RDP_PROGRAM.to_string(),
            use_keychain: true,
        }
    }
}

impl AppSettings {
    fn apply_env_overrides(&mut self) {
        if let Some(dir) = std::env::var_os("WAKEDESK_VAULT_DIR") {
            self.vault_dir = PathBuf::from(dir);
        }
        if let Some(value) = env_bool_opt("WAKEDESK_CONTINUE_ON_FAILURE") {
            self.continue_on_failure = value;
        }
        if let Some(value) = env_u64_opt("WAKEDESK_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = value;
        }
        if let Some(value) = env_u64_opt("WAKEDESK_POLL_INTERVAL_MS") {
            self.poll_interval_ms = value;
        }
        if let Some(value) = env_u64_opt("WAKEDESK_POLL_CEILING_SECS") {
            self.poll_ceiling_secs = value;
        }
        if let Some(value) = env_u64_opt("WAKEDESK_BOOT_DELAY_SECS") {
            self.boot_delay_secs = value;
        }
        if let Ok(program) = std::env::var("WAKEDESK_RDP_PROGRAM") {
            if !program.trim().is_empty() {
                self.rdp_program = program;
            }
        }
        if let Some(value) = env_bool_opt("WAKEDESK_USE_KEYCHAIN") {
            self.use_keychain = value;
        }
    }

    pub fn load() -> Self {
        let path = settings_path();
        let mut settings = load_from_file(&path).unwrap_or_default();
        settings.apply_env_overrides();
        settings
    }

    /// Zero values fall back to the defaults
    pub fn timing(&self) -> WakeTiming {
        let defaults = WakeTiming::default();
        let secs_or = |value: u64, fallback: Duration| {
            if value == 0 {
                fallback
            } else {
                Duration::from_secs(value)
            }
        };
        let interval = if self.poll_interval_ms == 0 {
            defaults.poll.interval
        } else {
            Duration::from_millis(self.poll_interval_ms)
        };

        WakeTiming {
            request_timeout: secs_or(self.request_timeout_secs, defaults.request_timeout),
            poll: LinkPoller::new(interval, secs_or(self.poll_ceiling_secs, defaults.poll.ceiling)),
            boot_delay: Duration::from_secs(self.boot_delay_secs),
        }
    }

    pub fn continue_policy(&self) -> FixedPolicy {
        FixedPolicy(if self.continue_on_failure {
            Decision::Continue
        } else {
            Decision::Abort
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let settings: AppSettings =
            serde_json::from_str(r#"{"continue_on_failure": true, "poll_ceiling_secs": 60}"#)
                .unwrap();
        assert!(settings.continue_on_failure);
        assert_eq!(settings.poll_ceiling_secs, 60);
        assert_eq!(settings.boot_delay_secs, 5);
        assert_eq!(settings.rdp_program, "mstsc");
    }

    #[test]
    fn default_timing_matches_engine_defaults() {
        assert_eq!(AppSettings::default().timing(), WakeTiming::default());
    }

    #[test]
    fn zero_values_fall_back() {
        let settings = AppSettings {
            request_timeout_secs: 0,
            poll_interval_ms: 0,
            poll_ceiling_secs: 0,
            boot_delay_secs: 0,
            ..AppSettings::default()
        };
        let timing = settings.timing();
        assert_eq!(timing.request_timeout, Duration::from_secs(10));
        assert_eq!(timing.poll, LinkPoller::default());
        assert_eq!(timing.boot_delay, Duration::ZERO);
    }

    #[test]
    fn env_overrides_cover_timing_knobs() {
        std::env::set_var("WAKEDESK_REQUEST_TIMEOUT_SECS", "3");
        std::env::set_var("WAKEDESK_POLL_INTERVAL_MS", " 250 ");
        std::env::set_var("WAKEDESK_POLL_CEILING_SECS", "not-a-number");

        let mut settings = AppSettings::default();
        settings.apply_env_overrides();

        std::env::remove_var("WAKEDESK_REQUEST_TIMEOUT_SECS");
        std::env::remove_var("WAKEDESK_POLL_INTERVAL_MS");
        std::env::remove_var("WAKEDESK_POLL_CEILING_SECS");

        assert_eq!(settings.request_timeout_secs, 3);
        assert_eq!(settings.poll_interval_ms, 250);
        assert_eq!(settings.poll_ceiling_secs, 30);
        let timing = settings.timing();
        assert_eq!(timing.request_timeout, Duration::from_secs(3));
        assert_eq!(timing.poll.interval, Duration::from_millis(250));
    }

    #[test]
    fn continue_policy_follows_flag() {
        let mut settings = AppSettings::default();
        assert_eq!(settings.continue_policy().0, Decision::Abort);
        settings.continue_on_failure = true;
        assert_eq!(settings.continue_policy().0, Decision::Continue);
    }
}
