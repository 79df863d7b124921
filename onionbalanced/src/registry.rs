use std::sync::Arc;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use shared::types::{HealthStatus, Instance, Service};
use crate::config::ServiceConfig;

/// Read-only view of the managed services.
///
/// Implementations hand out an owned copy so callers never hold a lock
/// while doing I/O.
pub trait SnapshotSource: Send + Sync {
    fn snapshot(&self) -> Vec<Service>;
}

impl SnapshotSource for Vec<Service> {
    fn snapshot(&self) -> Vec<Service> {
        self.clone()
    }
}

/// Shared, continuously updated set of services and their instances.
///
/// Writers go through the `record_*` methods; readers take a
/// copy-on-read snapshot.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: Arc<RwLock<Vec<Service>>>,
}

impl ServiceRegistry {
    pub fn new(services: Vec<Service>) -> Self {
        Self {
            services: Arc::new(RwLock::new(services)),
        }
    }

    /// Build the registry from configured services, preserving file order
    pub fn from_config(configs: &[ServiceConfig]) -> Self {
        let services = configs
            .iter()
            .map(|config| Service {
                onion_address: config.address.clone(),
                uploaded: None,
                health_check_conf: config.health_check.clone(),
                instances: config.instances.iter().map(Instance::new).collect(),
            })
            .collect();

        Self::new(services)
    }

    pub fn service_count(&self) -> usize {
        self.services.read().len()
    }

    /// Record a successful descriptor upload for a service
    pub fn record_upload(&self, service: &str, at: DateTime<Utc>) -> bool {
        self.update_service(service, |s| s.uploaded = Some(at))
    }

    /// Record a freshly fetched instance descriptor
    pub fn record_descriptor(
        &self,
        service: &str,
        instance: &str,
        fetched_at: DateTime<Utc>,
        introduction_points: usize,
    ) -> bool {
        self.update_instance(service, instance, |i| {
            i.timestamp = Some(fetched_at);
            i.introduction_points = introduction_points;
        })
    }

    /// Forget the instance descriptor; the instance is reported offline
    pub fn mark_offline(&self, service: &str, instance: &str) -> bool {
        self.update_instance(service, instance, |i| {
            i.timestamp = None;
            i.introduction_points = 0;
        })
    }

    /// Store the verdict of a health check run at `checked_at` (unix seconds)
    pub fn record_health(
        &self,
        service: &str,
        instance: &str,
        status: HealthStatus,
        checked_at: i64,
    ) -> bool {
        self.update_instance(service, instance, |i| {
            i.health = status;
            i.last_check_time = checked_at;
        })
    }

    fn update_service(&self, service: &str, f: impl FnOnce(&mut Service)) -> bool {
        let mut services = self.services.write();
        match services.iter_mut().find(|s| s.onion_address == service) {
            Some(s) => {
                f(s);
                true
            }
            None => {
                tracing::debug!(service, "Update for unknown service ignored");
                false
            }
        }
    }

    fn update_instance(
        &self,
        service: &str,
        instance: &str,
        f: impl FnOnce(&mut Instance),
    ) -> bool {
        let mut found = false;
        self.update_service(service, |s| {
            if let Some(i) = s.instance_mut(instance) {
                f(i);
                found = true;
            }
        });

        if !found {
            tracing::debug!(service, instance, "Update for unknown instance ignored");
        }
        found
    }
}

impl SnapshotSource for ServiceRegistry {
    fn snapshot(&self) -> Vec<Service> {
        self.services.read().clone()
    }
}
