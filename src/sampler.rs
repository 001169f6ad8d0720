// src/sampler.rs - Periodic acquisition of meter readings
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::meter::{MeterError, PowerMeter};
use crate::sample::{Device, MeterReading, Readings};

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("{device} is not responding ({failures} consecutive failures)")]
    DeviceUnresponsive { device: Device, failures: u32 },
}

impl SamplerError {
    /// Exit status identifying the failed device.
    pub fn exit_code(&self) -> i32 {
        match self {
            SamplerError::DeviceUnresponsive { device, .. } => device.exit_code(),
        }
    }
}

/// Outcome of one polling tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    Reading { readings: Readings, at: DateTime<Utc> },
    /// At least one meter failed; nothing to feed forward this tick.
    Skipped,
    /// The source has no more data (replay only).
    Finished,
}

/// Producer of ticks for the monitor loop.
#[async_trait]
pub trait SampleSource: Send {
    async fn next_tick(&mut self) -> Result<Tick, SamplerError>;
}

/// Consecutive failed reads per device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailCounters {
    pub condenser: u32,
    pub evaporator: u32,
}

impl FailCounters {
    pub fn get(&self, device: Device) -> u32 {
        match device {
            Device::Condenser => self.condenser,
            Device::Evaporator => self.evaporator,
        }
    }

    fn slot(&mut self, device: Device) -> &mut u32 {
        match device {
            Device::Condenser => &mut self.condenser,
            Device::Evaporator => &mut self.evaporator,
        }
    }
}

/// Reads both meters and tracks how long each has been failing.
pub struct Sampler {
    condenser: Box<dyn PowerMeter>,
    evaporator: Box<dyn PowerMeter>,
    fail_count: FailCounters,
    max_fail: u32,
}

impl Sampler {
    pub fn new(condenser: Box<dyn PowerMeter>, evaporator: Box<dyn PowerMeter>, max_fail: u32) -> Self {
        Self {
            condenser,
            evaporator,
            fail_count: FailCounters::default(),
            max_fail,
        }
    }

    pub fn fail_counts(&self) -> FailCounters {
        self.fail_count
    }

    /// Read both meters once.
    ///
    /// Returns `Ok(None)` when the tick has to be skipped and an error once a
    /// device has failed more than `max_fail` times in a row.
    pub async fn poll(&mut self) -> Result<Option<Readings>, SamplerError> {
        let condenser = self.read(Device::Condenser).await;
        let evaporator = self.read(Device::Evaporator).await;

        if let (Some(condenser), Some(evaporator)) = (condenser, evaporator) {
            return Ok(Some(Readings { condenser, evaporator }));
        }

        for device in Device::ALL {
            let failures = self.fail_count.get(device);
            if failures > self.max_fail {
                tracing::error!("{} is not responding", device);
                return Err(SamplerError::DeviceUnresponsive { device, failures });
            }
        }
        Ok(None)
    }

    async fn read(&mut self, device: Device) -> Option<MeterReading> {
        let meter = match device {
            Device::Condenser => &self.condenser,
            Device::Evaporator => &self.evaporator,
        };
        let result = meter.read().await;
        match result {
            Ok(reading) => {
                *self.fail_count.slot(device) = 0;
                Some(reading)
            }
            Err(e) => {
                match &e {
                    MeterError::MissingPower { .. } => tracing::warn!("Missing power value for {}", device),
                    _ => tracing::debug!("{} read failed: {}", device, e),
                }
                *self.fail_count.slot(device) += 1;
                None
            }
        }
    }
}

/// Polls the meters on a fixed interval using wall-clock time.
pub struct LiveSource {
    sampler: Sampler,
    ticker: Interval,
}

impl LiveSource {
    /// The first poll happens one `period` after construction.
    pub fn new(sampler: Sampler, period: Duration) -> Self {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { sampler, ticker }
    }
}

#[async_trait]
impl SampleSource for LiveSource {
    async fn next_tick(&mut self) -> Result<Tick, SamplerError> {
        self.ticker.tick().await;
        let at = Utc::now();
        Ok(match self.sampler.poll().await? {
            Some(readings) => Tick::Reading { readings, at },
            None => Tick::Skipped,
        })
    }
}
