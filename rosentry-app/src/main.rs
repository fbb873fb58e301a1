use anyhow::Result;
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand, ValueEnum};
use rosentry_core::merge::TimePreset;
use rosentry_schemas::reading::Parameter;
use std::{env, io::IsTerminal, path::PathBuf, time::Duration};
use tracing_subscriber::EnvFilter;
use workflow::{OutputFormat, RangeRequest, StatsRequest};

mod config;
mod workflow;

#[derive(Debug, Parser)]
#[command(name = "rosentry", version, about = "Operational health reports for RO water-treatment sites")]
struct Cli {
    /// Pipeline YAML file describing sites, sources and thresholds.
    #[arg(long, default_value = "rosentry.yaml")]
    config: PathBuf,

    /// Keep readings at or after this time (YYYY-MM-DD[ HH:MM[:SS]]).
    #[arg(long, global = true, value_parser = workflow::parse_bound)]
    start: Option<NaiveDateTime>,

    /// Keep readings at or before this time.
    #[arg(long, global = true, value_parser = workflow::parse_bound)]
    end: Option<NaiveDateTime>,

    /// Trailing window ending at the newest reading.
    #[arg(long, global = true, value_enum, conflicts_with_all = ["start", "end"])]
    preset: Option<PresetArg>,

    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// One averaged row per site, best recovery first.
    Summary,
    /// Headline KPIs and latest-reading health for one site.
    Kpi {
        #[arg(long)]
        site: String,
    },
    /// Rolling statistics and slope per parameter for one site.
    Trends {
        #[arg(long)]
        site: String,
        #[arg(long)]
        window: Option<usize>,
    },
    /// Maintenance alerts, status and next date, for one site or all of them.
    Maintenance {
        #[arg(long)]
        site: Option<String>,
    },
    /// Per-metric statistics and correlations, optionally scored against a baseline.
    Stats {
        #[arg(long)]
        site: Option<String>,
        /// Comma-separated parameters; all of them when omitted.
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<Parameter>,
        /// Baseline for the performance of `--baseline-metric` at `--site`.
        #[arg(long, requires = "site")]
        baseline: Option<f64>,
        #[arg(long, default_value = "recovery_rate")]
        baseline_metric: Parameter,
        /// Readings per window when measuring stability.
        #[arg(long, default_value_t = 24)]
        stability_window: usize,
    },
    /// Write merged readings, site summaries and rolling series as timestamped CSVs.
    Export {
        #[arg(long, default_value = "exports")]
        out_dir: PathBuf,
    },
    /// Re-read all sources periodically and print summary and maintenance.
    Watch {
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
        /// Stop after this many refreshes.
        #[arg(long)]
        cycles: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PresetArg {
    Day,
    Week,
    Month,
    Quarter,
}

impl From<PresetArg> for TimePreset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Day => TimePreset::LastDay,
            PresetArg::Week => TimePreset::LastWeek,
            PresetArg::Month => TimePreset::LastMonth,
            PresetArg::Quarter => TimePreset::LastQuarter,
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = config::PipelineConfig::load(&cli.config)?;
    let range = RangeRequest {
        start: cli.start,
        end: cli.end,
        preset: cli.preset.map(TimePreset::from),
    };
    let now = chrono::Local::now().naive_local();

    if let Command::Watch {
        interval_secs,
        cycles,
    } = cli.command
    {
        return workflow::run_watch(&config, &range, Duration::from_secs(interval_secs), cycles);
    }

    let readings = workflow::load_readings(&config, &range)?;
    match cli.command {
        Command::Summary => workflow::run_summary(&config, &readings, cli.format),
        Command::Kpi { site } => workflow::run_kpi(&config, &readings, &site, cli.format),
        Command::Trends { site, window } => {
            workflow::run_trends(&config, &readings, &site, window, cli.format)
        }
        Command::Maintenance { site } => {
            workflow::run_maintenance(&config, &readings, site.as_deref(), now, cli.format)
        }
        Command::Stats {
            site,
            metrics,
            baseline,
            baseline_metric,
            stability_window,
        } => {
            let request = StatsRequest {
                site,
                parameters: metrics,
                baseline: baseline.map(|b| (baseline_metric, b)),
                stability_window,
            };
            workflow::run_stats(&config, &readings, &request, cli.format)
        }
        Command::Export { out_dir } => workflow::run_export(&config, &readings, &out_dir, now),
        Command::Watch { .. } => Ok(()),
    }
}

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `ROSENTRY_LOG_LEVEL` picks the level
/// (default `info`). Colors follow `FORCE_COLOR`, else TTY detection on stderr.
fn init_tracing() {
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stderr().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("ROSENTRY_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(level)
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
