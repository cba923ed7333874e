use clap::{Args, Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{
    CollectorConfig, HostConfig, DEFAULT_CLIENT, DEFAULT_COMMAND_TIMEOUT_SECS,
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_LOG_LINES, DEFAULT_LOG_PATH, DEFAULT_WORKERS,
};

#[derive(Parser, Debug)]
#[command(name = "jailscope")]
#[command(author = "JailScope")]
#[command(version = "0.1.0")]
#[command(about = "Fleet-wide fail2ban ban-list aggregation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(long, global = true, help = "Directory holding servers.json and reports.json")]
    pub data_dir: Option<PathBuf>,

    #[command(flatten)]
    pub collector: CollectorArgs,

    #[arg(short = 'o', long, value_enum, default_value = "human", global = true, help = "Output format")]
    pub output_format: OutputFormat,

    #[arg(short = 'f', long, global = true, help = "Output file path")]
    pub output_file: Option<PathBuf>,

    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API that agents push to and the dashboard reads from
    Serve {
        #[arg(long, default_value = "0.0.0.0:8000", help = "Listen address")]
        listen: SocketAddr,
    },
    /// Pull every configured host now and store the results
    Collect,
    /// Show the merged view: pushed reports first, pulled otherwise
    Status,
    /// Register a host for pull collection
    AddHost(AddHostArgs),
    /// List registered hosts
    Hosts,
}

#[derive(Args, Debug)]
pub struct CollectorArgs {
    #[arg(long, global = true, default_value_t = DEFAULT_WORKERS, help = "Hosts collected in parallel")]
    pub workers: usize,

    #[arg(long, global = true, default_value_t = DEFAULT_COMMAND_TIMEOUT_SECS, help = "Per-command timeout in seconds")]
    pub command_timeout: u64,

    #[arg(long, global = true, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS, help = "SSH connect timeout in seconds")]
    pub connect_timeout: u64,

    #[arg(long, global = true, default_value_t = DEFAULT_LOG_LINES, help = "fail2ban log lines scanned for ban times")]
    pub log_lines: usize,

    #[arg(long, global = true, default_value = DEFAULT_LOG_PATH, help = "fail2ban log path on the hosts")]
    pub log_path: String,

    #[arg(long, global = true, default_value = DEFAULT_CLIENT, help = "fail2ban client command on the hosts")]
    pub client: String,
}

impl From<&CollectorArgs> for CollectorConfig {
    fn from(args: &CollectorArgs) -> Self {
        Self {
            workers: args.workers.max(1),
            command_timeout: Duration::from_secs(args.command_timeout.max(1)),
            connect_timeout: Duration::from_secs(args.connect_timeout.max(1)),
            log_lines: args.log_lines,
            log_path: args.log_path.clone(),
            client: args.client.clone(),
        }
    }
}

#[derive(Args, Debug)]
pub struct AddHostArgs {
    #[arg(help = "Host name or address")]
    pub host: String,

    #[arg(short, long, help = "SSH login user")]
    pub user: String,

    #[arg(short, long, default_value_t = 22, help = "SSH port")]
    pub port: u16,

    #[arg(short = 'i', long, help = "Private key file")]
    pub key_path: Option<PathBuf>,

    #[arg(short, long, help = "Display name")]
    pub name: Option<String>,

    #[arg(long, help = "Run commands locally instead of over SSH")]
    pub local: bool,
}

impl From<AddHostArgs> for HostConfig {
    fn from(args: AddHostArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            user: Some(args.user),
            key_path: args.key_path,
            name: args.name,
            local: args.local,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum OutputFormat {
    #[value(name = "human", help = "Human-readable output")]
    Human,
    #[value(name = "json", help = "JSON output")]
    Json,
    #[value(name = "csv", help = "CSV output")]
    Csv,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["jailscope", "status"]);
        let config = CollectorConfig::from(&cli.collector);
        assert_eq!(config.workers, 8);
        assert_eq!(config.command_timeout, Duration::from_secs(15));
        assert_eq!(config.log_lines, 2000);
        assert_eq!(cli.output_format, OutputFormat::Human);
    }

    #[test]
    fn test_add_host() {
        let cli = Cli::parse_from(["jailscope", "add-host", "web-1", "-u", "ops", "-p", "2222"]);
        let Command::AddHost(args) = cli.command else {
            panic!("expected add-host");
        };
        let config = HostConfig::from(args);
        assert_eq!(config.destination(), "ops@web-1");
        assert_eq!(config.port, 2222);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["jailscope", "collect", "--workers", "3", "-o", "json"]);
        assert_eq!(cli.collector.workers, 3);
        assert_eq!(cli.output_format, OutputFormat::Json);
    }
}
