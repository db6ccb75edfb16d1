//! Time-bounded view of which registered models the backend can serve.
//!
//! Refreshes are lazy: readers that observe a stale snapshot refresh it
//! themselves. Concurrent readers may refresh redundantly; each refresh
//! swaps in a complete snapshot, so no reader sees a partial one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::backend::BackendClient;
use crate::error::BackendError;
use crate::model::ModelRegistry;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Immutable availability reading taken at `refreshed_at`.
#[derive(Debug, Clone, Default)]
pub struct AvailabilitySnapshot {
    availability: HashMap<String, bool>,
    refreshed_at: Option<Instant>,
}

impl AvailabilitySnapshot {
    /// Availability of `id`, or `None` when it has never been checked.
    pub fn get(&self, id: &str) -> Option<bool> {
        self.availability.get(id).copied()
    }

    /// Unknown identifiers count as unavailable.
    pub fn is_available(&self, id: &str) -> bool {
        self.get(id).unwrap_or(false)
    }

    pub fn available_count(&self) -> usize {
        self.availability.values().filter(|available| **available).count()
    }

    #[cfg(test)]
    pub fn refreshed_at(&self) -> Option<Instant> {
        self.refreshed_at
    }

    pub fn is_stale(&self, now: Instant, ttl: Duration) -> bool {
        match self.refreshed_at {
            Some(at) => now.saturating_duration_since(at) >= ttl,
            None => true,
        }
    }

    pub(crate) fn from_reported(registry: &ModelRegistry, reported: &[String], at: Instant) -> Self {
        let reported: HashSet<&str> = reported.iter().map(String::as_str).collect();
        let availability = registry
            .identifiers()
            .map(|id| (id.to_owned(), reported.contains(id)))
            .collect();
        Self {
            availability,
            refreshed_at: Some(at),
        }
    }
}

pub struct AvailabilityCache {
    registry: ModelRegistry,
    backend: BackendClient,
    ttl: Duration,
    current: RwLock<Arc<AvailabilitySnapshot>>,
}

impl AvailabilityCache {
    pub fn new(registry: ModelRegistry, backend: BackendClient, ttl: Duration) -> Self {
        Self {
            registry,
            backend,
            ttl,
            current: RwLock::new(Arc::new(AvailabilitySnapshot::default())),
        }
    }

    /// Current snapshot, refreshed first when older than the TTL.
    ///
    /// A failed refresh is logged and the previous snapshot is returned; its
    /// timestamp is left alone so the next call retries.
    pub async fn snapshot(&self) -> Arc<AvailabilitySnapshot> {
        let current = Arc::clone(&*self.current.read().await);
        if !current.is_stale(Instant::now(), self.ttl) {
            return current;
        }

        match self.refresh().await {
            Ok(fresh) => fresh,
            Err(err) => {
                tracing::warn!("model availability refresh failed, keeping previous view: {err}");
                Arc::clone(&*self.current.read().await)
            }
        }
    }

    /// Query the backend and replace the snapshot unconditionally of staleness.
    pub async fn refresh(&self) -> Result<Arc<AvailabilitySnapshot>, BackendError> {
        let started = Instant::now();
        let reported = self.backend.list_models().await?;
        let fresh = Arc::new(AvailabilitySnapshot::from_reported(
            &self.registry,
            &reported,
            started,
        ));

        let installed = self.install(fresh).await;

        tracing::info!(
            available = installed.available_count(),
            total = self.registry.len(),
            "refreshed model availability"
        );
        Ok(installed)
    }

    /// Swap in `fresh` unless a refresh that started later has already
    /// landed. Returns whichever snapshot is current afterwards.
    async fn install(&self, fresh: Arc<AvailabilitySnapshot>) -> Arc<AvailabilitySnapshot> {
        let mut current = self.current.write().await;
        if current.refreshed_at > fresh.refreshed_at {
            return Arc::clone(&*current);
        }
        *current = Arc::clone(&fresh);
        fresh
    }
}
