//! bwbattle
//!
//! Runs the router buffer simulation and prints the report.
//!
//! - Loads an optional TOML config, then applies command-line overrides
//! - Runs one policy, or all four on identical traffic with `--compare`
//! - Writes JSON (default) or Prometheus text to stdout; logs go to stderr

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use bwbattle_core::{compare, render_prometheus, render_prometheus_all, run};
use bwbattle_core::{PolicyKind, SimulationConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Prometheus,
}

/// Router buffer congestion simulator.
#[derive(Parser, Debug)]
#[command(
    name = "bwbattle",
    about = "Compare router admission policies on a prioritized traffic mix"
)]
struct Cli {
    /// TOML configuration file. Missing keys take reference defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Admission policy: tail_drop, choke_aqm, token_bucket or wfq.
    #[arg(long)]
    policy: Option<PolicyKind>,

    /// Number of ticks to simulate.
    #[arg(long)]
    ticks: Option<u64>,

    /// RNG seed for traffic and service.
    #[arg(long)]
    seed: Option<u64>,

    /// Buffer capacity in packets.
    #[arg(long)]
    capacity: Option<usize>,

    /// Chance per tick that the server sends one packet.
    #[arg(long)]
    service_probability: Option<f64>,

    /// Run all four policies on the same traffic.
    #[arg(long, default_value_t = false)]
    compare: bool,

    /// Include per-tick series in the JSON report.
    #[arg(long, default_value_t = false)]
    series: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<SimulationConfig> {
        let mut cfg = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                SimulationConfig::from_toml_str(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => SimulationConfig::default(),
        };

        if let Some(policy) = self.policy {
            cfg.policy = policy;
        }
        if let Some(ticks) = self.ticks {
            cfg.total_ticks = ticks;
        }
        if let Some(seed) = self.seed {
            cfg.seed = seed;
        }
        if let Some(capacity) = self.capacity {
            cfg.buffer_capacity = capacity;
        }
        if let Some(p) = self.service_probability {
            cfg.service_probability = p;
        }
        if self.series {
            cfg.record_series = true;
        }

        cfg.validate().context("invalid configuration")?;
        Ok(cfg)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = cli.load_config()?;

    tracing::info!(
        policy = cfg.policy.as_str(),
        compare = cli.compare,
        ticks = cfg.total_ticks,
        seed = cfg.seed,
        "bwbattle starting"
    );

    let output = if cli.compare {
        let comparison = compare(&cfg)?;
        match cli.format {
            OutputFormat::Json => comparison.to_json()?,
            OutputFormat::Prometheus => render_prometheus_all(&comparison.reports),
        }
    } else {
        let report = run(cfg)?;
        match cli.format {
            OutputFormat::Json => report.to_json()?,
            OutputFormat::Prometheus => render_prometheus(&report),
        }
    };

    println!("{output}");
    Ok(())
}
