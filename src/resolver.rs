use std::collections::HashSet;
use std::sync::Arc;

use crate::collector::{Fleet, HostReport};
use crate::config::HostConfig;
use crate::store::{HostRegistry, ReportStore};

/// Builds the merged fleet view.
///
/// A configured host shows its stored report when there is one, whatever
/// its age; otherwise it is pulled now. Pushed reports from hosts nobody
/// registered are listed after the configured hosts.
pub struct StatusResolver {
    store: Arc<ReportStore>,
    registry: Arc<HostRegistry>,
    fleet: Fleet,
}

impl StatusResolver {
    pub fn new(store: Arc<ReportStore>, registry: Arc<HostRegistry>, fleet: Fleet) -> Self {
        Self { store, registry, fleet }
    }

    pub async fn resolve(&self) -> Vec<HostReport> {
        let configured = unique_hosts(self.registry.list());

        let stored = self.store.snapshot();
        let missing: Vec<HostConfig> = configured
            .iter()
            .filter(|h| !stored.contains_key(&h.host))
            .cloned()
            .collect();

        let pulled = if missing.is_empty() {
            Vec::new()
        } else {
            tracing::debug!(hosts = missing.len(), "pulling hosts without a stored report");
            self.fleet.collect_into(&missing, &self.store).await
        };

        // Re-read: a push that landed during the pull takes precedence.
        let mut current = self.store.snapshot();
        let mut results = Vec::with_capacity(configured.len() + current.len());

        for host in &configured {
            let report = current
                .remove(&host.host)
                .or_else(|| pulled.iter().find(|r| r.host == host.host).cloned())
                .unwrap_or_else(|| {
                    HostReport::failed(&host.host, host.name.as_deref(), "no report available")
                });
            results.push(report);
        }

        let mut ad_hoc: Vec<HostReport> = current.into_values().collect();
        ad_hoc.sort_by(|a, b| a.host.cmp(&b.host));
        results.extend(ad_hoc);
        results
    }
}

fn unique_hosts(hosts: Vec<HostConfig>) -> Vec<HostConfig> {
    let mut seen = HashSet::new();
    hosts
        .into_iter()
        .filter(|h| seen.insert(h.host.clone()))
        .collect()
}
