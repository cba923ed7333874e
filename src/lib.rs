//! JailScope: fail2ban ban-list aggregation across a fleet of hosts.
//!
//! Hosts either push reports from an on-host agent or are pulled over SSH.
//! Both paths produce the same `HostReport`; the `StatusResolver` merges
//! them with pushed reports taking precedence.

pub mod cli;
pub mod collector;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod output;
pub mod resolver;
pub mod server;
pub mod store;

pub use collector::{BanEntry, BanEvent, Fleet, HostCollector, HostReport, JailStatus, ReportSource};
pub use config::{CollectorConfig, HostConfig};
pub use dashboard::Dashboard;
pub use resolver::StatusResolver;
pub use store::{HostRegistry, ReportStore};
