//! Service instance bookkeeping (`spec.md` §3 `ServiceInstances`).

use serde::Deserialize;

/// One network endpoint belonging to a service, as reported by the registry.
#[derive(Debug, Clone, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    pub base_url: String,
    #[serde(default = "default_healthy")]
    pub healthy: bool,
}

fn default_healthy() -> bool {
    true
}

impl Instance {
    pub fn key(&self) -> String {
        format!("{}:{}", self.instance_id, self.base_url)
    }
}
