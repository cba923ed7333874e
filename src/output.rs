use std::fs::File;
use std::io::{self, Write, BufWriter};
use std::path::PathBuf;
use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::*;

use crate::cli::OutputFormat;
use crate::collector::results::HostReport;

pub struct OutputWriter {
    format: OutputFormat,
    file: Option<PathBuf>,
}

impl OutputWriter {
    pub fn new(format: OutputFormat, file: Option<PathBuf>) -> Result<Self> {
        Ok(Self { format, file })
    }

    pub fn write(&self, reports: &[HostReport]) -> Result<()> {
        let output = match self.format {
            OutputFormat::Human => format_human(reports),
            OutputFormat::Json => format_json(reports)?,
            OutputFormat::Csv => format_csv(reports),
        };

        match &self.file {
            Some(path) => {
                let file = File::create(path)?;
                let mut writer = BufWriter::new(file);
                writer.write_all(output.as_bytes())?;
                writer.flush()?;
            }
            None => {
                print!("{}", output);
                io::stdout().flush()?;
            }
        }

        Ok(())
    }
}

pub fn format_human(reports: &[HostReport]) -> String {
    let mut output = String::new();
    let mut total_banned = 0;
    let mut failed = 0;

    for report in reports {
        let when = report.received_at.or(report.collected_at).map(format_time).unwrap_or_default();
        output.push_str(&format!("{} {} {} {} {}\n",
            "▶".green().bold(),
            report.display_name.white().bold(),
            format!("({})", report.host).dimmed(),
            report.source.to_string().cyan(),
            when.dimmed()));

        if let Some(error) = &report.error {
            failed += 1;
            output.push_str(&format!("  {} {}\n\n", "✗".red().bold(), error.red()));
            continue;
        }

        if report.jails.is_empty() {
            output.push_str(&format!("  {}\n", "no jails".dimmed()));
        }

        for jail in &report.jails {
            total_banned += jail.banned_addresses.len();
            output.push_str(&format!("  {} {} {}\n",
                jail.name.yellow().bold(),
                format!("bantime {}", format_duration(jail.ban_time_seconds)).dimmed(),
                format!("{} banned", jail.banned_addresses.len()).bold()));

            for entry in &jail.banned_addresses {
                let remaining = match entry.remaining_seconds {
                    Some(secs) => format!("{} left", format_duration(secs)),
                    None => "expiry unknown".to_string(),
                };
                output.push_str(&format!("    {} {}\n",
                    entry.address.white(),
                    remaining.dimmed()));
            }
        }
        output.push('\n');
    }

    output.push_str(&format!("{} {} hosts • {} banned addresses • {} failed\n",
        "⚡".green().bold(),
        reports.len(),
        total_banned,
        failed));
    output
}

pub fn format_json(reports: &[HostReport]) -> Result<String> {
    Ok(serde_json::to_string_pretty(reports)?)
}

pub fn format_csv(reports: &[HostReport]) -> String {
    let mut csv = String::new();
    csv.push_str("host,name,source,jail,bantime_seconds,ip,remaining_seconds,banned_at,error\n");

    for report in reports {
        if report.is_error() || report.jails.is_empty() {
            csv.push_str(&format!("{},{},{},,,,,,{}\n",
                csv_field(&report.host),
                csv_field(&report.display_name),
                report.source,
                csv_field(report.error.as_deref().unwrap_or(""))));
            continue;
        }

        for jail in &report.jails {
            if jail.banned_addresses.is_empty() {
                csv.push_str(&format!("{},{},{},{},{},,,,\n",
                    csv_field(&report.host),
                    csv_field(&report.display_name),
                    report.source,
                    csv_field(&jail.name),
                    jail.ban_time_seconds));
            }
            for entry in &jail.banned_addresses {
                csv.push_str(&format!("{},{},{},{},{},{},{},{},\n",
                    csv_field(&report.host),
                    csv_field(&report.display_name),
                    report.source,
                    csv_field(&jail.name),
                    jail.ban_time_seconds,
                    csv_field(&entry.address),
                    entry.remaining_seconds.map(|s| s.to_string()).unwrap_or_default(),
                    entry.banned_at.map(|t| t.to_rfc3339()).unwrap_or_default()));
            }
        }
    }

    csv
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// `3725` -> `1h2m5s`.
pub fn format_duration(seconds: u64) -> String {
    if seconds == 0 {
        return "0s".to_string();
    }
    let (days, rest) = (seconds / 86_400, seconds % 86_400);
    let (hours, rest) = (rest / 3_600, rest % 3_600);
    let (minutes, secs) = (rest / 60, rest % 60);

    let mut out = String::new();
    for (value, unit) in [(days, "d"), (hours, "h"), (minutes, "m"), (secs, "s")] {
        if value > 0 {
            out.push_str(&format!("{}{}", value, unit));
        }
    }
    out
}
