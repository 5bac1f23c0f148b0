//! JSON seed fixtures.
//!
//! A seed file registers ASes and submits policies through the service,
//! so validation and change triggers apply exactly as for API callers:
//!
//! ```json
//! {
//!   "systems": [{ "asn": 1, "account": "acme", "group": 1 }],
//!   "policies": [{
//!     "asn": 1,
//!     "selectors": [{ "kind": "accept_as", "value": 2 }],
//!     "preferences": { "bandwidth": { "min": "1G", "max": "10G" } }
//!   }]
//! }
//! ```

use crate::model::AutonomousSystem;
use crate::policy::{LinkPreferences, PolicyId, SelectorSet};
use crate::service::PeeringService;
use anyhow::{Context, Result};
use ixp_types::Asn;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedPolicy {
    pub asn: Asn,
    pub selectors: SelectorSet,
    #[serde(default)]
    pub preferences: LinkPreferences,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub systems: Vec<AutonomousSystem>,
    /// Submitted in order; a later entry for the same AS supersedes an
    /// earlier one
    #[serde(default)]
    pub policies: Vec<SeedPolicy>,
}

impl SeedFile {
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse seed JSON")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid seed file {}", path.display()))
    }
}

/// Registers the seed's systems, then submits its policies. Stops at the
/// first error.
pub async fn apply_seed(service: &PeeringService, seed: SeedFile) -> Result<Vec<PolicyId>> {
    let systems = seed.systems.len();
    for system in seed.systems {
        let asn = system.asn;
        service
            .register_system(system)
            .await
            .with_context(|| format!("Failed to register {}", asn))?;
    }

    let mut ids = Vec::with_capacity(seed.policies.len());
    for policy in seed.policies {
        let id = service
            .submit_policy(policy.asn, policy.selectors, policy.preferences)
            .await
            .with_context(|| format!("Failed to submit seed policy for {}", policy.asn))?;
        ids.push(id);
    }

    info!(systems, policies = ids.len(), "Seed applied");
    Ok(ids)
}
