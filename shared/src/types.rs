use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of the most recent health check against an instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    /// No check has produced a verdict yet
    #[default]
    Unknown,
}

/// Per-service health check settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckConf {
    /// Check kind, e.g. "tcp" or "http". `None` disables health reporting.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl HealthCheckConf {
    pub fn is_enabled(&self) -> bool {
        self.kind.is_some()
    }
}

/// A backend onion service behind a balanced frontend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Onion address without the ".onion" suffix
    pub onion_address: String,

    /// When the instance descriptor was last fetched. `None` means offline.
    pub timestamp: Option<DateTime<Utc>>,

    /// Number of introduction points in the last descriptor
    pub introduction_points: usize,

    pub health: HealthStatus,

    /// Unix time of the last health check verdict
    pub last_check_time: i64,
}

impl Instance {
    pub fn new(onion_address: impl Into<String>) -> Self {
        Self {
            onion_address: onion_address.into(),
            timestamp: None,
            introduction_points: 0,
            health: HealthStatus::Unknown,
            last_check_time: 0,
        }
    }
}

/// A balanced frontend onion service and its backend instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Onion address without the ".onion" suffix
    pub onion_address: String,

    /// Last successful descriptor upload. `None` means never uploaded.
    pub uploaded: Option<DateTime<Utc>>,

    pub health_check_conf: HealthCheckConf,

    pub instances: Vec<Instance>,
}

impl Service {
    pub fn new(onion_address: impl Into<String>) -> Self {
        Self {
            onion_address: onion_address.into(),
            uploaded: None,
            health_check_conf: HealthCheckConf::default(),
            instances: Vec::new(),
        }
    }

    pub fn instance_mut(&mut self, onion_address: &str) -> Option<&mut Instance> {
        self.instances
            .iter_mut()
            .find(|instance| instance.onion_address == onion_address)
    }
}
