use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::cache::AvailabilitySnapshot;
use crate::model::ModelRegistry;

pub const DEFAULT_ACCELERATOR_MARKER: &str = "/usr/bin/nvidia-smi";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: OverallStatus,
    pub timestamp: u64,
    pub services: Services,
    pub models: ModelCounts,
    pub accelerator_available: bool,
    pub version: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Services {
    pub backend: ServiceStatus,
    pub api: ServiceStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelCounts {
    pub available: usize,
    pub total: usize,
    pub details: BTreeMap<String, bool>,
}

impl HealthReport {
    /// Overall status depends only on the live backend check; the cached
    /// availability is reported alongside it.
    pub fn compose(
        backend: ServiceStatus,
        registry: &ModelRegistry,
        snapshot: &AvailabilitySnapshot,
        accelerator_available: bool,
        timestamp: u64,
    ) -> Self {
        let details: BTreeMap<String, bool> = registry
            .identifiers()
            .map(|id| (id.to_owned(), snapshot.is_available(id)))
            .collect();
        let available = details.values().filter(|available| **available).count();

        Self {
            status: match backend {
                ServiceStatus::Healthy => OverallStatus::Healthy,
                ServiceStatus::Unhealthy => OverallStatus::Degraded,
            },
            timestamp,
            services: Services {
                backend,
                api: ServiceStatus::Healthy,
            },
            models: ModelCounts {
                available,
                total: registry.len(),
                details,
            },
            accelerator_available,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Accelerator presence is inferred from the existence of its tooling.
pub fn accelerator_present(marker: &Path) -> bool {
    marker.exists()
}
