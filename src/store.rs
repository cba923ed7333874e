// Report and host persistence.
//
// Both collections live in memory behind a RwLock and, when backed by a
// file, are written out whole after every change. The file is replaced by
// rename so a crash never leaves a half-written collection behind.
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::collector::results::{HostReport, ReportSource};
use crate::config::HostConfig;
use crate::error::StoreError;

pub const REPORTS_FILE: &str = "reports.json";
pub const SERVERS_FILE: &str = "servers.json";

/// A JSON document loaded and replaced as a whole.
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file loads as the default value.
    pub fn load<T: DeserializeOwned + Default>(&self) -> Result<T, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(T::default()),
            Err(source) => return Err(self.io_error(source)),
        };
        if content.trim().is_empty() {
            return Ok(T::default());
        }
        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    pub fn replace<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(value)?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, content).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Most recent report per host.
///
/// Reports are replaced whole, never merged. A pushed report is only ever
/// replaced by another push; pull results are offered and dropped when a
/// push is already held for the host.
pub struct ReportStore {
    reports: RwLock<HashMap<String, HostReport>>,
    file: Option<JsonFile>,
}

impl ReportStore {
    pub fn in_memory() -> Self {
        Self {
            reports: RwLock::new(HashMap::new()),
            file: None,
        }
    }

    pub fn open(file: JsonFile) -> Result<Self, StoreError> {
        let saved: Vec<HostReport> = file.load()?;
        let reports = saved
            .into_iter()
            .filter(|r| !r.host.is_empty())
            .map(|r| (r.host.clone(), r))
            .collect();
        tracing::debug!(path = %file.path().display(), "report store loaded");
        Ok(Self {
            reports: RwLock::new(reports),
            file: Some(file),
        })
    }

    /// Stores a pushed report, replacing whatever the host had, and returns
    /// it as stored.
    pub fn put(&self, mut report: HostReport) -> Result<HostReport, StoreError> {
        report.source = ReportSource::Push;
        report.received_at = Some(Utc::now());
        report.log_tail = None;

        let mut reports = write(&self.reports);
        let host = report.host.clone();
        self.commit(&mut reports, &host, Some(report.clone()))?;
        tracing::info!(host = %host, jails = report.jails.len(), "report received");
        Ok(report)
    }

    /// Stores a pulled report unless the host has a pushed one. Returns
    /// whether the report was stored.
    ///
    /// Failed pulls are never stored, so the next status query retries the
    /// host; a failure drops an earlier pulled report for it.
    pub fn offer_pulled(&self, mut report: HostReport) -> Result<bool, StoreError> {
        report.source = ReportSource::Pull;

        let mut reports = write(&self.reports);
        let existing = reports.get(&report.host).map(|r| r.source);
        if existing == Some(ReportSource::Push) {
            return Ok(false);
        }
        let host = report.host.clone();
        if report.is_error() {
            if existing.is_some() {
                self.commit(&mut reports, &host, None)?;
            }
            return Ok(false);
        }
        self.commit(&mut reports, &host, Some(report))?;
        Ok(true)
    }

    pub fn get(&self, host: &str) -> Option<HostReport> {
        read(&self.reports).get(host).cloned()
    }

    /// Snapshot of every stored report, sorted by host.
    pub fn get_all(&self) -> Vec<HostReport> {
        let mut all: Vec<HostReport> = read(&self.reports).values().cloned().collect();
        all.sort_by(|a, b| a.host.cmp(&b.host));
        all
    }

    pub fn snapshot(&self) -> HashMap<String, HostReport> {
        read(&self.reports).clone()
    }

    pub fn len(&self) -> usize {
        read(&self.reports).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies one change and persists it. The map is left as it was when
    /// the write fails.
    fn commit(
        &self,
        reports: &mut HashMap<String, HostReport>,
        host: &str,
        next: Option<HostReport>,
    ) -> Result<(), StoreError> {
        let previous = match next {
            Some(report) => reports.insert(host.to_string(), report),
            None => reports.remove(host),
        };
        if let Err(e) = self.persist(reports) {
            match previous {
                Some(report) => reports.insert(host.to_string(), report),
                None => reports.remove(host),
            };
            return Err(e);
        }
        Ok(())
    }

    // Blocking file I/O under the write lock, so files land in the same
    // order as updates. HTTP handlers call in through spawn_blocking.
    fn persist(&self, reports: &HashMap<String, HostReport>) -> Result<(), StoreError> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let mut all: Vec<&HostReport> = reports.values().collect();
        all.sort_by(|a, b| a.host.cmp(&b.host));
        file.replace(&all)
    }
}

/// Operator-configured hosts, in registration order.
pub struct HostRegistry {
    hosts: RwLock<Vec<HostConfig>>,
    file: Option<JsonFile>,
}

impl HostRegistry {
    pub fn in_memory(hosts: Vec<HostConfig>) -> Self {
        Self {
            hosts: RwLock::new(hosts),
            file: None,
        }
    }

    pub fn open(file: JsonFile) -> Result<Self, StoreError> {
        let hosts: Vec<HostConfig> = file.load()?;
        tracing::debug!(path = %file.path().display(), hosts = hosts.len(), "host registry loaded");
        Ok(Self {
            hosts: RwLock::new(hosts),
            file: Some(file),
        })
    }

    /// Adds a host, replacing an existing entry for the same address. The
    /// list is unchanged when the write fails.
    pub fn register(&self, config: HostConfig) -> Result<(), StoreError> {
        let mut hosts = write(&self.hosts);
        let mut next = hosts.clone();
        match next.iter_mut().find(|h| h.host == config.host) {
            Some(existing) => *existing = config,
            None => next.push(config),
        }
        if let Some(file) = &self.file {
            file.replace(&next)?;
        }
        *hosts = next;
        Ok(())
    }

    pub fn list(&self) -> Vec<HostConfig> {
        read(&self.hosts).clone()
    }

    pub fn contains(&self, host: &str) -> bool {
        read(&self.hosts).iter().any(|h| h.host == host)
    }
}
