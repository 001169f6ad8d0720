//! Heat pump defrost monitor.
//!
//! Polls the condenser and evaporator power meters, derives on/off flags from
//! their readings and feeds them to [`defrost::DefrostDetector`], which
//! reports defrost cycles and the interruptions that leave the indoor coil wet.

pub mod activity;
pub mod config;
pub mod defrost;
pub mod meter;
pub mod monitor;
pub mod replay;
pub mod sample;
pub mod sampler;
pub mod sink;

pub use defrost::{DefrostDetector, DefrostEvent, DefrostState};
pub use monitor::{Monitor, MonitorError, RunSummary};
pub use sample::{Device, MeterReading, Readings, Sample, Thresholds};
pub use sampler::{SampleSource, Tick};

/// Install the `tracing` subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
