//! CLI entry point for the replay harness: runs scripted meter activity through
//! the defrost detector and prints every step, without touching the network.

use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};

use defrost_monitor::config::{self, Config};
use defrost_monitor::replay::{ReplayScript, ReplaySource, SCENARIOS};
use defrost_monitor::sample::Sample;
use defrost_monitor::sink::{ConsoleSink, format_line};
use defrost_monitor::{DefrostDetector, Monitor};

/// Replay Harness CLI
#[derive(Parser, Debug)]
#[command(name = "replay-harness", about = "Deterministic replay of meter activity through the defrost detector.")]
pub struct Cli {
    /// Path to a TOML config file (thresholds and reheat timeout)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available built-in scenarios
    ListScenarios,
    /// Run a built-in scenario or a script file (default: field-trace)
    Run {
        #[arg(long, conflicts_with = "script")]
        scenario: Option<String>,
        #[arg(long)]
        script: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    defrost_monitor::init_tracing("warn");

    let config = match &cli.config {
        Some(path) => match config::load_config(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load config: {e}");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    let (scenario, script) = match cli.command {
        Some(Commands::ListScenarios) => {
            for name in SCENARIOS {
                println!("{name}");
            }
            return;
        }
        Some(Commands::Run { scenario, script }) => (scenario, script),
        None => (None, None),
    };

    let loaded = match (script, scenario) {
        (Some(path), _) => ReplayScript::load(&path),
        (None, name) => ReplayScript::builtin(name.as_deref().unwrap_or("field-trace")),
    };
    let script = match loaded {
        Ok(script) => script,
        Err(e) => {
            eprintln!("Failed to load replay script: {e}");
            std::process::exit(1);
        }
    };

    // fixed start keeps the printed timestamps reproducible
    let start = Utc.with_ymd_and_hms(2024, 12, 31, 9, 0, 0).unwrap();
    let mut source = ReplaySource::new(script, start);
    let detector = DefrostDetector::new(config.defrost.reheat_timeout());
    let mut monitor = Monitor::new(detector, config.thresholds, ConsoleSink);

    while let Some((readings, at)) = source.advance() {
        println!("{}", monitor.state());
        let sample = Sample::derive(&readings, &config.thresholds);
        println!("{}", format_line(at, &sample.to_string()));
        if let Err(e) = monitor.handle(&readings, at) {
            eprintln!("Failed to write event: {e}");
            std::process::exit(1);
        }
    }

    let summary = monitor.summary();
    println!(
        "End of test: {} steps, {} events, {} unexpected, final state {}",
        summary.ticks,
        summary.events,
        summary.unexpected,
        monitor.state()
    );
}
