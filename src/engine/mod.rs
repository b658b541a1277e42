// Wake Engine Module
// Router control, link polling and the desktop hand-off

pub mod drivers;
pub mod error;
pub mod link_poll;
pub mod orchestrator;
pub mod rdp;
pub mod registry;
pub mod traits;
pub mod types;

pub use error::{EngineError, EngineResult, Step};
pub use link_poll::LinkPoller;
pub use orchestrator::{WakeOrchestrator, WakeTiming};
pub use rdp::RdpLauncher;
pub use registry::RouterRegistry;
pub use traits::{ContinuePolicy, Decision, DesktopLauncher, FixedPolicy, RouterControl};
pub use types::*;
