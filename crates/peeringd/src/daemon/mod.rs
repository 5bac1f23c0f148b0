//! Daemon loop and the orchestration agents it drives.

mod orchdaemon;
mod peering_orch;

pub use orchdaemon::{OrchDaemon, OrchDaemonConfig};
pub use peering_orch::PeeringOrch;
