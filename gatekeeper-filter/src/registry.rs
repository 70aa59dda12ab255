use crate::filter::Filter;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Process-wide ordered filter list.
///
/// Registration order is execution order. Reads take a snapshot copy, so
/// a registration that races a running pipeline can never mutate it;
/// registration is a startup activity, but the discipline holds at
/// runtime to keep hot additions safe.
#[derive(Default)]
pub struct FilterRegistry {
    filters: RwLock<Vec<Arc<dyn Filter>>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self {
            filters: RwLock::new(Vec::new()),
        }
    }

    /// Append a filter. Exclusive.
    pub fn add(&self, filter: Arc<dyn Filter>) {
        info!(filter = %filter.name(), "Registered filter");
        // Poisoned lock: keep serving with whatever state survived
        self.filters
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(filter);
    }

    /// Ordered copy of the current filters. Shared; the returned list is
    /// independent of later registrations.
    pub fn snapshot(&self) -> Vec<Arc<dyn Filter>> {
        self.filters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.filters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
