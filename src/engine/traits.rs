//! Engine seams
//!
//! Router dialects implement [`RouterControl`]; the orchestrator only talks to
//! routers, desktop clients and the user's continuation choice through the
//! traits in this module.

use std::time::Duration;

use async_trait::async_trait;

use crate::engine::error::{EngineError, EngineResult, Step};
use crate::engine::types::{lan_port_is_up, DesktopLogin, PortLink, SessionState};

/// Session-holding client for one router control API
///
/// One instance per target run; implementations keep a single mutable
/// session and are not meant to be shared between concurrent callers.
#[async_trait]
pub trait RouterControl: Send {
    fn state(&self) -> SessionState;

    /// Authenticates and stores the session
    async fn login(&mut self, id: &str, pw: &str) -> EngineResult<()>;

    /// Asks the router to emit a Wake-on-LAN packet for `mac`
    async fn send_wake(&mut self, mac: &str) -> EngineResult<()>;

    /// Current physical link state of every switch port
    async fn port_link_status(&mut self) -> EngineResult<Vec<PortLink>>;

    /// Whether LAN port `lan_port` currently reports link up
    async fn is_lan_port_up(&mut self, lan_port: u16) -> EngineResult<bool> {
        let rows = self.port_link_status().await?;
        Ok(lan_port_is_up(&rows, lan_port))
    }
}

/// Builds router clients for one API dialect
pub trait RouterFactory: Send + Sync {
    /// Dialect name as written in `router.type`
    fn router_type(&self) -> &'static str;

    fn create(&self, url: &str, request_timeout: Duration) -> EngineResult<Box<dyn RouterControl>>;
}

/// Desktop-connection collaborator. Fire-and-forget: success means the
/// client process was started.
#[async_trait]
pub trait DesktopLauncher: Send + Sync {
    async fn launch(&self, login: &DesktopLogin) -> EngineResult<()>;
}

/// Caller decision after a degradable failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Abort,
}

/// Decides whether a run continues after a failed step
pub trait ContinuePolicy: Send + Sync {
    fn decide(&self, step: Step, error: &EngineError) -> Decision;
}

/// Policy that always gives the same answer
#[derive(Debug, Clone, Copy)]
pub struct FixedPolicy(pub Decision);

impl ContinuePolicy for FixedPolicy {
    fn decide(&self, _step: Step, _error: &EngineError) -> Decision {
        self.0
    }
}

impl<F> ContinuePolicy for F
where
    F: Fn(Step, &EngineError) -> Decision + Send + Sync,
{
    fn decide(&self, step: Step, error: &EngineError) -> Decision {
        self(step, error)
    }
}
