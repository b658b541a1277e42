// WakeDesk - wake a LAN PC through the router and open a desktop session
// Core library

pub mod engine;
pub mod observability;
pub mod policy;
pub mod vault;

use std::sync::Arc;

use engine::{RdpLauncher, RouterRegistry, WakeOrchestrator};
use policy::AppSettings;
use vault::{KeyringSecretSource, SecretSource, VaultStore};

/// Everything a run needs, built from the user's settings
pub struct AppState {
    pub settings: AppSettings,
    pub store: VaultStore,
    pub orchestrator: WakeOrchestrator,
    pub secret_source: Option<Box<dyn SecretSource>>,
}

impl AppState {
    pub fn new(settings: AppSettings) -> Self {
        let registry = Arc::new(RouterRegistry::with_builtin());
        let launcher = Arc::new(RdpLauncher::new(&settings.rdp_program));
        let policy = Arc::new(settings.continue_policy());
        let orchestrator = WakeOrchestrator::new(registry, launcher, policy, settings.timing());

        let store = VaultStore::new(&settings.vault_dir);
        let secret_source: Option<Box<dyn SecretSource>> = if settings.use_keychain {
            Some(Box::new(KeyringSecretSource::new()))
        } else {
            None
        };

        Self {
            settings,
            store,
            orchestrator,
            secret_source,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(AppSettings::load())
    }
}
