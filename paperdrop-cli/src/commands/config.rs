//! `paperdrop config`: show what the daemon would run with.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use paperdrop_core::config::RedactedConfig;
use paperdrop_core::Config;

/// Arguments for `paperdrop config`.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct SettingRow {
    #[tabled(rename = "setting")]
    name: &'static str,
    #[tabled(rename = "value")]
    value: String,
}

impl ConfigArgs {
    pub fn run(self) -> Result<()> {
        let config = Config::from_env().context("invalid configuration")?;
        let redacted = config.redacted();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&redacted)
                    .context("failed to serialize configuration JSON")?
            );
            return Ok(());
        }

        println!("Paperdrop v{}", env!("CARGO_PKG_VERSION"));
        let mut table = Table::new(rows(redacted));
        table.with(Style::rounded());
        println!("{table}");

        for fallback in &config.fallbacks {
            println!(
                "{} {}={:?} is invalid, using the default",
                "warning:".yellow().bold(),
                fallback.key,
                fallback.value,
            );
        }
        Ok(())
    }
}

fn rows(config: RedactedConfig) -> Vec<SettingRow> {
    let allow_list = if config.allow_list.is_empty() {
        "(all files)".to_string()
    } else {
        config.allow_list.join(", ")
    };
    vec![
        SettingRow {
            name: "base url",
            value: config.base_url,
        },
        SettingRow {
            name: "auth token",
            value: config.auth_token,
        },
        SettingRow {
            name: "consume folder",
            value: config.watch_dir,
        },
        SettingRow {
            name: "whitelist",
            value: allow_list,
        },
        SettingRow {
            name: "stability interval",
            value: format!("{}ms", config.stability_interval_ms),
        },
        SettingRow {
            name: "stability checks",
            value: config.stability_count.to_string(),
        },
        SettingRow {
            name: "retry delay",
            value: format!("{}ms", config.retry_delay_ms),
        },
        SettingRow {
            name: "verbose",
            value: config.verbose.to_string(),
        },
        SettingRow {
            name: "metrics address",
            value: config.metrics_addr,
        },
    ]
}
