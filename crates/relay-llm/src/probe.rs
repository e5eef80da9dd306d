//! Health surface
//!
//! Probes every enabled provider in parallel with a short timeout. The
//! probes use each adapter's cheap availability check and never touch
//! the circuit-breaker table, so a health poll cannot change selection.

use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;

use crate::gateway::Gateway;

/// Per-provider health status
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    /// Whether the availability probe succeeded in time
    pub available: bool,
    /// Model used when nothing more specific resolves
    pub default_model: String,
    /// Models the adapter knows about
    pub models: Vec<String>,
    /// Failure detail, when the probe did not succeed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Aggregate health across all providers
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// True when at least one provider is available
    pub healthy: bool,
    /// Status per provider
    pub providers: BTreeMap<String, ProviderStatus>,
}

impl Gateway {
    /// Probe every provider in parallel under the given timeout
    pub async fn health_check_all(&self, timeout: Duration) -> HealthReport {
        let probes = self.provider_list().into_iter().map(|provider| async move {
            let description = provider.describe();
            let (available, detail) = match tokio::time::timeout(timeout, provider.is_available()).await {
                Ok(true) => (true, None),
                Ok(false) => (false, Some("availability probe failed".to_owned())),
                Err(_) => (false, Some("availability probe timed out".to_owned())),
            };

            (
                description.name,
                ProviderStatus {
                    available,
                    default_model: description.default_model,
                    models: description.models,
                    detail,
                },
            )
        });

        let providers: BTreeMap<String, ProviderStatus> = join_all(probes).await.into_iter().collect();
        let healthy = providers.values().any(|status| status.available);

        HealthReport { healthy, providers }
    }
}
