use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Distinguished failure: the service is known to nobody right now.
    /// The forwarder maps it to HTTP 404.
    #[error("No instance available for service: {0}")]
    NoInstance(String),
}

/// Resolves a service name to a live `host:port` address.
///
/// The discovery backend (registry watch, DNS, static file) feeds the
/// table from outside; request handling only ever reads.
pub trait ServiceRegistry: Send + Sync {
    fn resolve(&self, service: &str) -> Result<String, DiscoveryError>;
}

struct ServiceEntry {
    instances: Vec<String>,
    cursor: AtomicUsize,
}

/// In-process instance table with per-service round-robin selection.
///
/// Seeded from configuration at startup; `set_instances` / `remove_service`
/// let a discovery watcher replace entries at runtime without disturbing
/// in-flight resolutions.
#[derive(Default)]
pub struct TableRegistry {
    services: DashMap<String, ServiceEntry>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Build a table from the static configuration seed.
    pub fn from_seed(seed: &HashMap<String, Vec<String>>) -> Self {
        let table = Self::new();
        for (service, instances) in seed {
            table.set_instances(service, instances.clone());
        }
        table
    }

    /// Replace the instance list for a service. An empty list removes it.
    pub fn set_instances(&self, service: &str, instances: Vec<String>) {
        if instances.is_empty() {
            self.remove_service(service);
            return;
        }
        info!(service = %service, count = instances.len(), "Service instances updated");
        self.services.insert(
            service.to_string(),
            ServiceEntry {
                instances,
                cursor: AtomicUsize::new(0),
            },
        );
    }

    pub fn remove_service(&self, service: &str) {
        if self.services.remove(service).is_some() {
            info!(service = %service, "Service removed from table");
        }
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl ServiceRegistry for TableRegistry {
    fn resolve(&self, service: &str) -> Result<String, DiscoveryError> {
        let entry = self
            .services
            .get(service)
            .ok_or_else(|| DiscoveryError::NoInstance(service.to_string()))?;

        let i = entry.cursor.fetch_add(1, Ordering::Relaxed) % entry.instances.len();
        let addr = entry.instances[i].clone();
        debug!(service = %service, addr = %addr, "Resolved instance");
        Ok(addr)
    }
}
