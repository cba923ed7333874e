use std::sync::Arc;
use chrono::{DateTime, Utc};

use crate::collector::ban_log::{extract_ban_events, tail_lines};
use crate::collector::expiry::reconcile;
use crate::collector::parsers::{is_safe_jail_name, parse_banned_list, parse_bantime, parse_jail_list};
use crate::collector::remote::RemoteExecutor;
use crate::collector::results::{BanEvent, HostReport, JailStatus, ReportSource};
use crate::config::{CollectorConfig, HostConfig};

/// Pulls one host's fail2ban state into a `HostReport`.
///
/// Only the jail listing is fatal. A missing log degrades to unknown expiry
/// and a failed per-jail query degrades that jail to an empty one. Nothing
/// is retried.
#[derive(Clone)]
pub struct HostCollector {
    executor: Arc<dyn RemoteExecutor>,
    config: Arc<CollectorConfig>,
}

impl HostCollector {
    pub fn new(executor: Arc<dyn RemoteExecutor>, config: Arc<CollectorConfig>) -> Self {
        Self { executor, config }
    }

    pub async fn collect(&self, host: &HostConfig) -> HostReport {
        let started = Utc::now();
        let mut report = HostReport::new(&host.host, host.name.as_deref(), ReportSource::Pull);
        report.collected_at = Some(started);

        let status = match self.executor.run(host, &self.config.status_command()).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(host = %host.host, error = %e, "jail listing failed");
                report.error = Some(e.to_string());
                return report;
            }
        };
        let jails = parse_jail_list(&status);
        tracing::debug!(host = %host.host, jails = jails.len(), "jail list");

        let log = match self.executor.run(host, &self.config.log_tail_command()).await {
            Ok(log) => log,
            Err(e) => {
                tracing::warn!(host = %host.host, error = %e, "log tail unavailable, expiry unknown");
                String::new()
            }
        };
        let now = Utc::now();
        let events = extract_ban_events(tail_lines(&log, self.config.log_lines), now);

        for jail in jails {
            let status = self.collect_jail(host, jail, &events, now).await;
            report.jails.push(status);
        }
        report.normalize();

        tracing::info!(
            host = %host.host,
            jails = report.jails.len(),
            banned = report.banned_count(),
            "collected"
        );
        report
    }

    async fn collect_jail(
        &self,
        host: &HostConfig,
        jail: String,
        events: &[BanEvent],
        now: DateTime<Utc>,
    ) -> JailStatus {
        if !is_safe_jail_name(&jail) {
            tracing::warn!(host = %host.host, jail = %jail, "refusing to query jail with unsafe name");
            return JailStatus::empty(jail);
        }

        let banned = match self.executor.run(host, &self.config.jail_status_command(&jail)).await {
            Ok(output) => parse_banned_list(&output),
            Err(e) => {
                tracing::warn!(host = %host.host, jail = %jail, error = %e, "jail status failed");
                Vec::new()
            }
        };

        let ban_time_seconds = match self.executor.run(host, &self.config.bantime_command(&jail)).await {
            Ok(output) => parse_bantime(&output),
            Err(e) => {
                tracing::warn!(host = %host.host, jail = %jail, error = %e, "bantime query failed");
                0
            }
        };

        let banned_addresses = reconcile(&jail, ban_time_seconds, &banned, events, now);
        JailStatus {
            name: jail,
            ban_time_seconds,
            banned_addresses,
        }
    }
}
