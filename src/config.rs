use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LOG_LINES: usize = 2000;
pub const DEFAULT_LOG_PATH: &str = "/var/log/fail2ban.log";
pub const DEFAULT_CLIENT: &str = "fail2ban-client";

/// Connection descriptor for one monitored host, as stored in `servers.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Run commands on this machine instead of over SSH.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub local: bool,
}

fn default_ssh_port() -> u16 {
    22
}

impl HostConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_ssh_port(),
            user: None,
            key_path: None,
            name: None,
            local: false,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.host)
    }

    /// `user@host` for the ssh command line.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) if !user.is_empty() => format!("{}@{}", user, self.host),
            _ => self.host.clone(),
        }
    }

    /// Validates and converts a registration payload. Both `host` and the
    /// login principal `user` are required.
    pub fn from_registration(payload: serde_json::Value) -> Result<Self, ValidationError> {
        for field in ["host", "user"] {
            let present = payload
                .get(field)
                .and_then(|v| v.as_str())
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false);
            if !present {
                return Err(ValidationError::MissingField(field));
            }
        }

        let mut config: HostConfig = serde_json::from_value(payload)
            .map_err(|source| ValidationError::Malformed { what: "server", source })?;
        config.host = config.host.trim().to_string();
        config.user = config.user.map(|user| user.trim().to_string());
        config.validate()?;
        Ok(config)
    }

    /// `host` and `user` end up on the ssh command line, so neither may
    /// look like an option or split into several arguments.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_ssh_token("host", &self.host)?;
        if let Some(user) = &self.user {
            check_ssh_token("user", user)?;
        }
        Ok(())
    }
}

fn check_ssh_token(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.starts_with('-') {
        return Err(ValidationError::Invalid { field, reason: "must not start with '-'" });
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::Invalid { field, reason: "must not contain whitespace" });
    }
    Ok(())
}

/// Knobs for pull collection.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub workers: usize,
    pub command_timeout: Duration,
    pub connect_timeout: Duration,
    pub log_lines: usize,
    pub log_path: String,
    pub client: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            log_lines: DEFAULT_LOG_LINES,
            log_path: DEFAULT_LOG_PATH.to_string(),
            client: DEFAULT_CLIENT.to_string(),
        }
    }
}

impl CollectorConfig {
    pub fn status_command(&self) -> String {
        format!("{} status", self.client)
    }

    pub fn jail_status_command(&self, jail: &str) -> String {
        format!("{} status {}", self.client, jail)
    }

    pub fn bantime_command(&self, jail: &str) -> String {
        format!("{} get {} bantime", self.client, jail)
    }

    pub fn log_tail_command(&self) -> String {
        format!("tail -n {} {}", self.log_lines, self.log_path)
    }
}

/// Default location for `servers.json` and `reports.json`.
pub fn default_data_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("jailscope");
    path
}
