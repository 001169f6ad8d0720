// src/main.rs - Defrost monitor entry point
use clap::Parser;
use std::path::Path;
use std::time::Duration;

use defrost_monitor::activity::ActivityMonitor;
use defrost_monitor::config::{self, Config, ConfigError};
use defrost_monitor::meter::HttpMeter;
use defrost_monitor::replay::{ReplayScript, ReplaySource};
use defrost_monitor::sampler::{LiveSource, SampleSource, Sampler};
use defrost_monitor::sink::{ConsoleSink, RotatingFileSink, SinkSet};
use defrost_monitor::{DefrostDetector, Monitor, MonitorError};

const DEFAULT_CONFIG: &str = "defrost.toml";

/// Watch the heat pump power meters and log defrost cycles.
#[derive(Parser, Debug)]
#[command(name = "defrost-monitor", version)]
struct Cli {
    /// Path to a TOML config file (defaults to ./defrost.toml when present)
    #[arg(short, long)]
    config: Option<String>,

    /// Sample at the detail interval and print power activity
    #[arg(long)]
    detail: bool,

    /// Override the sample interval in seconds
    #[arg(long)]
    interval: Option<u64>,

    /// Replay a script file instead of polling the meters
    #[arg(long, conflicts_with = "scenario")]
    replay: Option<String>,

    /// Replay a built-in scenario instead of polling the meters
    #[arg(long)]
    scenario: Option<String>,

    /// Event log file (overrides the config)
    #[arg(long)]
    log_file: Option<String>,

    /// Do not echo events to stdout
    #[arg(long)]
    no_stdout: bool,

    /// Log filter when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,
}

fn load(cli: &Cli) -> Result<Config, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => config::load_config(DEFAULT_CONFIG)?,
        None => Config::default(),
    };

    if cli.detail {
        config.sampler.interval_secs = config.sampler.detail_interval_secs;
        config.activity.enabled = true;
    }
    if let Some(secs) = cli.interval {
        config.sampler.interval_secs = secs;
    }
    if let Some(file) = &cli.log_file {
        config.log.file = Some(file.clone());
    }
    if cli.no_stdout {
        config.log.stdout = false;
    }
    config.validate()?;
    Ok(config)
}

fn build_sinks(config: &Config) -> Result<SinkSet, Box<dyn std::error::Error + Send + Sync + 'static>> {
    let mut sinks = SinkSet::new();
    if config.log.stdout {
        sinks.push(ConsoleSink);
    }
    if let Some(path) = &config.log.file {
        sinks.push(RotatingFileSink::open(path, config.log.max_bytes, config.log.keep)?);
        tracing::info!("Logging events to {}", path);
    }
    if sinks.is_empty() {
        tracing::warn!("No event destination configured; events go to the tracing log only");
    }
    Ok(sinks)
}

fn build_source(cli: &Cli, config: &Config) -> Result<Box<dyn SampleSource>, Box<dyn std::error::Error + Send + Sync + 'static>> {
    let script = match (&cli.replay, &cli.scenario) {
        (Some(path), _) => Some(ReplayScript::load(path)?),
        (None, Some(name)) => Some(ReplayScript::builtin(name)?),
        (None, None) => None,
    };
    if let Some(script) = script {
        tracing::info!("Replaying {} scripted steps", script.steps.len());
        return Ok(Box::new(ReplaySource::new(script, chrono::Utc::now())));
    }

    let timeout = config.sampler.request_timeout();
    let condenser = HttpMeter::new(&config.devices.condenser, timeout)?;
    let evaporator = HttpMeter::new(&config.devices.evaporator, timeout)?;
    tracing::info!("Condenser meter: {}", condenser.host());
    tracing::info!("Evaporator meter: {}", evaporator.host());
    let sampler = Sampler::new(Box::new(condenser), Box::new(evaporator), config.sampler.max_fail);
    Ok(Box::new(LiveSource::new(sampler, config.sampler.interval())))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();
    let loaded = load(&cli);

    let level = cli
        .log_level
        .clone()
        .or_else(|| loaded.as_ref().ok().map(|c| c.log.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    defrost_monitor::init_tracing(&level);

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            tracing::error!("Please ensure the configuration file exists and is properly formatted");
            std::process::exit(1);
        }
    };

    tracing::info!("Starting defrost monitor");
    tracing::info!("Sample interval: {} s", config.sampler.interval_secs);

    let sinks = build_sinks(&config)?;
    let mut source = build_source(&cli, &config)?;

    let detector = DefrostDetector::new(config.defrost.reheat_timeout());
    let mut monitor = Monitor::new(detector, config.thresholds, sinks);
    if config.activity.enabled {
        let period = Duration::from_secs(config.sampler.interval_secs);
        monitor = monitor.with_activity(ActivityMonitor::new(config.activity.clone(), period));
    }
    tracing::info!("Reheat timeout: {:?}", monitor.detector().reheat_timeout());

    tokio::select! {
        result = monitor.run(source.as_mut()) => match result {
            Ok(summary) => {
                tracing::info!(
                    "Finished: {} ticks, {} skipped, {} events, {} unexpected",
                    summary.ticks, summary.skipped, summary.events, summary.unexpected
                );
            }
            Err(MonitorError::Sampler(e)) => {
                tracing::error!("{}", e);
                std::process::exit(e.exit_code());
            }
            Err(e) => {
                tracing::error!("Event sink failed: {}", e);
                std::process::exit(1);
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted; stopping");
        }
    }

    Ok(())
}
