use std::sync::Arc;
use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use jailscope::cli::{Cli, Command};
use jailscope::collector::HostExecutor;
use jailscope::config::{default_data_dir, CollectorConfig, HostConfig};
use jailscope::dashboard::Dashboard;
use jailscope::output::OutputWriter;
use jailscope::server;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "jailscope=debug" } else { "jailscope=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = CollectorConfig::from(&cli.collector);
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let executor = Arc::new(HostExecutor::new(config.command_timeout, config.connect_timeout));
    let dashboard = Dashboard::open(&data_dir, executor, config)
        .with_context(|| format!("failed to open data directory {}", data_dir.display()))?;

    let output_writer = OutputWriter::new(cli.output_format, cli.output_file.clone())?;

    match cli.command {
        Command::Serve { listen } => {
            tracing::info!(data_dir = %data_dir.display(), "starting dashboard");
            server::run(listen, Arc::new(dashboard))
                .await
                .with_context(|| format!("HTTP server on {} failed", listen))?;
        }
        Command::Collect => {
            let hosts = dashboard.hosts();
            if hosts.is_empty() {
                eprintln!("{}", "No hosts registered.".red());
                eprintln!("Example: jailscope add-host web-1 --user root");
                std::process::exit(1);
            }

            let pb = ProgressBar::new(hosts.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.green/black} {pos}/{len} hosts {msg}")?
                    .progress_chars("█▉▊▋▌▍▎▏ "),
            );
            let fleet = dashboard.fleet().clone().with_progress(pb);
            let reports = fleet.collect_into(&hosts, dashboard.store()).await;
            output_writer.write(&reports)?;
        }
        Command::Status => {
            let reports = dashboard.status().await;
            output_writer.write(&reports)?;
        }
        Command::AddHost(args) => {
            let config = HostConfig::from(args);
            config.validate()?;
            dashboard.registry().register(config.clone())?;
            println!("{} {}", "Registered".green().bold(), config.destination());
        }
        Command::Hosts => {
            for host in dashboard.hosts() {
                let mode = if host.local { "local".to_string() } else { format!("ssh:{}", host.port) };
                println!("{} {} {}", host.display_name().bold(), host.destination(), mode.dimmed());
            }
        }
    }

    Ok(())
}
