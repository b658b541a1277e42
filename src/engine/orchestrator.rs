//! Wake-and-Connect Orchestrator
//!
//! Drives one target run: router login and wake signal, a bounded wait for
//! the target's link, then the desktop hand-off. Router and wait failures go
//! to the caller's [`ContinuePolicy`]; only the launch step is fatal.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use crate::engine::error::{EngineError, EngineResult, Step};
use crate::engine::link_poll::LinkPoller;
use crate::engine::registry::RouterRegistry;
use crate::engine::traits::{ContinuePolicy, Decision, DesktopLauncher, RouterControl};
use crate::engine::types::{DesktopLogin, LinkWait, RunReport, SessionState, WakeOutcome};
use crate::vault::storage::{ResolvedTarget, Vault};

/// Timing knobs for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeTiming {
    pub request_timeout: Duration,
    pub poll: LinkPoller,
    /// Used when no LAN port is configured
    pub boot_delay: Duration,
}

impl Default for WakeTiming {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            poll: LinkPoller::default(),
            boot_delay: Duration::from_secs(5),
        }
    }
}

pub struct WakeOrchestrator {
    registry: Arc<RouterRegistry>,
    launcher: Arc<dyn DesktopLauncher>,
    policy: Arc<dyn ContinuePolicy>,
    timing: WakeTiming,
}

impl WakeOrchestrator {
    pub fn new(
        registry: Arc<RouterRegistry>,
        launcher: Arc<dyn DesktopLauncher>,
        policy: Arc<dyn ContinuePolicy>,
        timing: WakeTiming,
    ) -> Self {
        Self {
            registry,
            launcher,
            policy,
            timing,
        }
    }

    /// Runs the full flow for the target called `name`
    ///
    /// Fails with `NotFound`/`MissingCredentials` before touching the
    /// network, `Aborted` when the policy stops the run, and with the
    /// launcher's error if the desktop client cannot be started.
    #[instrument(skip(self, vault), fields(target = %name))]
    pub async fn wake_and_connect(&self, vault: &Vault, name: &str) -> EngineResult<RunReport> {
        let target = vault.resolve(name)?;
        let descriptor = target.descriptor;

        let mut setup_failure = None;
        let mut router = match self
            .registry
            .create(&descriptor.router, self.timing.request_timeout)
        {
            Ok(router) => Some(router),
            Err(e) => {
                setup_failure = Some(e.to_string());
                self.degrade(Step::Wake, e)?;
                None
            }
        };

        let wake = match router.as_deref_mut() {
            Some(router) => match Self::wake(router, &target).await {
                Ok(()) => WakeOutcome::Sent,
                Err(e) => {
                    let reason = e.to_string();
                    self.degrade(Step::Wake, e)?;
                    WakeOutcome::Failed { reason }
                }
            },
            None => WakeOutcome::Failed {
                reason: setup_failure.unwrap_or_default(),
            },
        };

        let lan_port = descriptor.wol.lan_port;
        let wait = match router.as_deref_mut() {
            Some(router) if lan_port > 0 && router.state() == SessionState::Authenticated => {
                self.timing.poll.wait_for_link(router, lan_port).await
            }
            _ => {
                if lan_port > 0 {
                    warn!(lan_port, "no router session, falling back to fixed boot delay");
                }
                info!(delay_ms = self.timing.boot_delay.as_millis() as u64, "waiting for boot");
                sleep(self.timing.boot_delay).await;
                LinkWait::FixedDelay(self.timing.boot_delay)
            }
        };

        if let LinkWait::TimedOut { elapsed, .. } = &wait {
            self.degrade(
                Step::LinkWait,
                EngineError::Timeout {
                    elapsed_ms: elapsed.as_millis() as u64,
                },
            )?;
        }

        let login = DesktopLogin {
            server: descriptor.rdp.server.clone(),
            username: target.credentials.rdp_id.clone(),
            password: target.credentials.rdp_pw.clone(),
        };
        if let Err(e) = self.launcher.launch(&login).await {
            error!(error = %e, "desktop launch failed");
            return Err(e);
        }

        info!("wake-and-connect finished");
        Ok(RunReport {
            target: descriptor.name.clone(),
            wake,
            wait,
        })
    }

    async fn wake(router: &mut dyn RouterControl, target: &ResolvedTarget<'_>) -> EngineResult<()> {
        router
            .login(&target.credentials.router_id, &target.credentials.router_pw)
            .await?;
        router.send_wake(&target.descriptor.wol.mac_address).await
    }

    /// Reports a failed step and asks the policy whether to go on. Failures
    /// outside the router/timeout family are returned as-is.
    fn degrade(&self, step: Step, error: EngineError) -> EngineResult<()> {
        if !error.is_degradable() {
            return Err(error);
        }
        warn!(%step, error = %error, "step failed");
        match self.policy.decide(step, &error) {
            Decision::Continue => {
                info!(%step, "continuing after failure");
                Ok(())
            }
            Decision::Abort => Err(EngineError::Aborted {
                step,
                reason: error.to_string(),
            }),
        }
    }
}
