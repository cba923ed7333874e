pub mod ban_log;
pub mod expiry;
pub mod host;
pub mod parsers;
pub mod remote;
pub mod results;

use std::sync::Arc;
use tokio::sync::Semaphore;
use futures::future::join_all;
use indicatif::ProgressBar;

use crate::config::{CollectorConfig, HostConfig};
use crate::store::ReportStore;
pub use host::HostCollector;
pub use remote::{HostExecutor, LocalExecutor, RemoteExecutor, SshExecutor};
pub use results::{BanEntry, BanEvent, HostReport, JailStatus, ReportSource};

/// Pull collection across many hosts with a bounded number of workers.
///
/// Each host runs in its own task and holds one permit for its whole
/// collection, so a hung host occupies a single slot until its command
/// timeouts fire. Every host yields exactly one report.
#[derive(Clone)]
pub struct Fleet {
    collector: HostCollector,
    workers: usize,
    progress: Option<ProgressBar>,
}

impl Fleet {
    pub fn new(executor: Arc<dyn RemoteExecutor>, config: Arc<CollectorConfig>) -> Self {
        let workers = config.workers.max(1);
        Self {
            collector: HostCollector::new(executor, config),
            workers,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub async fn collect_all(&self, hosts: &[HostConfig]) -> Vec<HostReport> {
        if let Some(pb) = &self.progress {
            pb.set_length(hosts.len() as u64);
        }

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = Vec::with_capacity(hosts.len());

        for host in hosts.iter().cloned() {
            let sem = semaphore.clone();
            let collector = self.collector.clone();
            let pb = self.progress.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let report = collector.collect(&host).await;
                if let Some(pb) = pb {
                    pb.set_message(host.host.clone());
                    pb.inc(1);
                }
                report
            }));
        }

        let reports: Vec<HostReport> = join_all(tasks)
            .await
            .into_iter()
            .zip(hosts)
            .map(|(joined, host)| match joined {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(host = %host.host, error = %e, "collection task aborted");
                    HostReport::failed(&host.host, host.name.as_deref(), format!("collection task failed: {}", e))
                }
            })
            .collect();

        if let Some(pb) = &self.progress {
            pb.finish_with_message("collection complete");
        }

        let failed = reports.iter().filter(|r| r.is_error()).count();
        tracing::info!(hosts = reports.len(), failed, "pull batch complete");
        reports
    }

    /// Collects every host and offers each result to `store` as a pull
    /// report. Hosts that already have a pushed report keep it, and failed
    /// pulls are returned but not stored.
    pub async fn collect_into(&self, hosts: &[HostConfig], store: &Arc<ReportStore>) -> Vec<HostReport> {
        let reports = self.collect_all(hosts).await;

        let store = store.clone();
        let batch = reports.clone();
        let stored = tokio::task::spawn_blocking(move || {
            for report in batch {
                match store.offer_pulled(report.clone()) {
                    Ok(true) => {}
                    Ok(false) => tracing::debug!(host = %report.host, failed = report.is_error(), "pull result not stored"),
                    Err(e) => tracing::error!(host = %report.host, error = %e, "failed to persist pulled report"),
                }
            }
        })
        .await;
        if let Err(e) = stored {
            tracing::error!(error = %e, "storing pull results aborted");
        }
        reports
    }
}
