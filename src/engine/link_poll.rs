//! Link-up polling
//!
//! Bounded wait for a router LAN port to report link. Retry contract: a
//! failed check (transport error, router busy, unparseable reply) counts as
//! "not up yet" and polling continues until the ceiling. A check that is
//! still running when the ceiling arrives is cut off and counted as failed.
//! The loop sleeps between checks, so dropping the future (outer timeout,
//! Ctrl-C) stops it.

use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::engine::traits::RouterControl;
use crate::engine::types::LinkWait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkPoller {
    pub interval: Duration,
    pub ceiling: Duration,
}

impl Default for LinkPoller {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            ceiling: Duration::from_secs(30),
        }
    }
}

impl LinkPoller {
    pub fn new(interval: Duration, ceiling: Duration) -> Self {
        Self { interval, ceiling }
    }

    /// Checks immediately, then once per interval. Never runs past the
    /// ceiling: a slow check is abandoned when it is reached.
    pub async fn wait_for_link(&self, router: &mut dyn RouterControl, lan_port: u16) -> LinkWait {
        let started = Instant::now();
        let mut checks = 0u32;
        let mut errors = 0u32;

        loop {
            checks += 1;
            let remaining = self.ceiling.saturating_sub(started.elapsed());
            match timeout(remaining, router.is_lan_port_up(lan_port)).await {
                Ok(Ok(true)) => {
                    let elapsed = started.elapsed();
                    info!(lan_port, checks, elapsed_ms = elapsed.as_millis() as u64, "link up");
                    return LinkWait::Up { elapsed, checks };
                }
                Ok(Ok(false)) => debug!(lan_port, checks, "link not up yet"),
                Ok(Err(e)) => {
                    errors += 1;
                    debug!(lan_port, checks, error = %e, "link check failed, counting as not up");
                }
                Err(_) => {
                    errors += 1;
                    debug!(lan_port, checks, "link check cut off at ceiling");
                }
            }

            let elapsed = started.elapsed().min(self.ceiling);
            if elapsed + self.interval > self.ceiling {
                warn!(lan_port, checks, errors, elapsed_ms = elapsed.as_millis() as u64, "link wait ceiling reached");
                return LinkWait::TimedOut {
                    elapsed,
                    checks,
                    errors,
                };
            }
            sleep(self.interval).await;
        }
    }
}
