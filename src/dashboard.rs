use std::path::Path;
use std::sync::Arc;
use chrono::Utc;

use crate::collector::ban_log::{extract_ban_events, tail_lines};
use crate::collector::expiry::enrich_report;
use crate::collector::{Fleet, HostReport, RemoteExecutor};
use crate::config::{CollectorConfig, HostConfig};
use crate::error::{StoreError, ValidationError};
use crate::resolver::StatusResolver;
use crate::store::{HostRegistry, JsonFile, ReportStore, REPORTS_FILE, SERVERS_FILE};

/// Push ingestion, registration, pull batches and the merged status view.
pub struct Dashboard {
    store: Arc<ReportStore>,
    registry: Arc<HostRegistry>,
    fleet: Fleet,
    resolver: StatusResolver,
    config: Arc<CollectorConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Dashboard {
    pub fn new(
        store: Arc<ReportStore>,
        registry: Arc<HostRegistry>,
        executor: Arc<dyn RemoteExecutor>,
        config: CollectorConfig,
    ) -> Self {
        let config = Arc::new(config);
        let fleet = Fleet::new(executor, config.clone());
        let resolver = StatusResolver::new(store.clone(), registry.clone(), fleet.clone());
        Self {
            store,
            registry,
            fleet,
            resolver,
            config,
        }
    }

    /// Opens `servers.json` and `reports.json` under `data_dir`.
    pub fn open(
        data_dir: &Path,
        executor: Arc<dyn RemoteExecutor>,
        config: CollectorConfig,
    ) -> Result<Self, StoreError> {
        let store = ReportStore::open(JsonFile::new(data_dir.join(REPORTS_FILE)))?;
        let registry = HostRegistry::open(JsonFile::new(data_dir.join(SERVERS_FILE)))?;
        Ok(Self::new(Arc::new(store), Arc::new(registry), executor, config))
    }

    pub fn store(&self) -> &Arc<ReportStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<HostRegistry> {
        &self.registry
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    /// Accepts an agent report. Entries sent with `banned_at` but no
    /// remaining time get it computed; an attached log tail fills in
    /// entries sent with neither.
    pub fn ingest_report(&self, payload: serde_json::Value) -> Result<HostReport, DashboardError> {
        let mut report = HostReport::from_submission(payload)?;

        let now = Utc::now();
        let events = match report.log_tail.take() {
            Some(log) => extract_ban_events(tail_lines(&log, self.config.log_lines), now),
            None => Vec::new(),
        };
        let filled = enrich_report(&mut report, &events, now);
        if filled > 0 {
            tracing::debug!(host = %report.host, events = events.len(), filled, "expiry completed on push");
        }

        Ok(self.store.put(report)?)
    }

    pub fn register_host(&self, payload: serde_json::Value) -> Result<HostConfig, DashboardError> {
        let config = HostConfig::from_registration(payload)?;
        self.registry.register(config.clone())?;
        tracing::info!(host = %config.host, "host registered");
        Ok(config)
    }

    pub fn hosts(&self) -> Vec<HostConfig> {
        self.registry.list()
    }

    pub async fn status(&self) -> Vec<HostReport> {
        self.resolver.resolve().await
    }

    /// Pulls every configured host now and stores what push has not covered.
    pub async fn collect(&self) -> Vec<HostReport> {
        let hosts = self.registry.list();
        self.fleet.collect_into(&hosts, &self.store).await
    }
}
