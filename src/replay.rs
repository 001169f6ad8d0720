//! Scripted replay of meter activity and the simulation clock that drives it.
//!
//! A script is an ordered list of `(delta_secs, tag)` steps. Each tag flips one
//! device into a known power level, the clock advances by `delta_secs`, and
//! the resulting readings go through the same threshold derivation as live
//! data. Nothing here sleeps.
//!
//! ```toml
//! [[step]]
//! delta_secs = 10
//! tag = "comp_on"
//!
//! [[step]]
//! delta_secs = 5
//! tag = "evap_heat_strip"
//! ```

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;

use crate::sample::{MeterReading, Readings};
use crate::sampler::{SampleSource, SamplerError, Tick};

pub const COMPRESSOR_RUN_W: f64 = 1800.0;
pub const HEAT_STRIP_W: f64 = 5000.0;
pub const EVAPORATOR_FAN_W: f64 = 300.0;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unknown scenario '{0}'")]
    UnknownScenario(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayTag {
    CompOn,
    CompOff,
    EvapOff,
    EvapFan,
    EvapHeatStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReplayStep {
    pub delta_secs: u64,
    pub tag: ReplayTag,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReplayScript {
    #[serde(default, rename = "step")]
    pub steps: Vec<ReplayStep>,
}

impl ReplayScript {
    pub fn from_pairs(pairs: &[(u64, ReplayTag)]) -> Self {
        Self {
            steps: pairs
                .iter()
                .map(|&(delta_secs, tag)| ReplayStep { delta_secs, tag })
                .collect(),
        }
    }

    pub fn load(path: &str) -> Result<Self, ReplayError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Look up one of the built-in scenarios by name.
    pub fn builtin(name: &str) -> Result<Self, ReplayError> {
        match name {
            "field-trace" => Ok(field_trace()),
            "reheat-timeout" => Ok(reheat_timeout()),
            "interrupted-defrost" => Ok(interrupted_defrost()),
            other => Err(ReplayError::UnknownScenario(other.to_string())),
        }
    }
}

pub const SCENARIOS: [&str; 3] = ["field-trace", "reheat-timeout", "interrupted-defrost"];

/// A plain heating cycle followed by two defrosts, one with the heat strip
/// coming on after the compressor reverses and one with it coming on before.
fn field_trace() -> ReplayScript {
    use ReplayTag::*;
    ReplayScript::from_pairs(&[
        (10, CompOn),  // start cycle
        (5, EvapFan),
        (10, CompOff),
        (5, EvapOff),  // end cycle
        (10, CompOn),  // start cycle, heat strip after reversal
        (5, EvapFan),
        (10, CompOff), // defrost: compressor off
        (5, CompOn),   // defrost: compressor reversed
        (5, EvapHeatStrip),
        (10, CompOff),
        (5, EvapFan),  // heat strip off
        (5, CompOn),   // reheat
        (10, CompOff), // reheat complete
        (5, EvapOff),
        (10, CompOn),  // start cycle, heat strip before reversal
        (5, EvapFan),
        (10, CompOff),
        (5, EvapHeatStrip),
        (5, CompOn),
        (5, EvapFan),
        (10, CompOff),
        (5, CompOn),
        (10, CompOff),
        (5, EvapOff),
    ])
}

/// Defrost whose reheat never sees the compressor stop.
fn reheat_timeout() -> ReplayScript {
    use ReplayTag::*;
    let mut pairs = vec![
        (10, CompOn),
        (5, EvapHeatStrip),
        (10, EvapFan),
        (10, CompOff),
        (10, CompOn),
    ];
    pairs.extend(std::iter::repeat_n((10, EvapFan), 31));
    pairs.push((10, CompOff));
    pairs.push((5, EvapOff));
    ReplayScript::from_pairs(&pairs)
}

/// Indoor unit loses power in the middle of a defrost.
fn interrupted_defrost() -> ReplayScript {
    use ReplayTag::*;
    ReplayScript::from_pairs(&[
        (10, CompOn),
        (5, EvapHeatStrip),
        (10, CompOff),
        (5, EvapOff),
        (10, CompOn),
        (5, EvapFan),
        (10, CompOff),
        (5, EvapOff),
    ])
}

/// Simulation clock
#[derive(Debug, Clone)]
pub struct SimClock {
    start: DateTime<Utc>,
    elapsed: Duration,
}

impl SimClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { start, elapsed: Duration::ZERO }
    }

    pub fn advance(&mut self, dt: Duration) {
        self.elapsed += dt;
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.start + TimeDelta::from_std(self.elapsed).unwrap_or(TimeDelta::zero())
    }
}

/// Synthetic device levels the tags switch between.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SimulatedPlant {
    compressor_on: bool,
    evaporator_w: f64,
}

impl SimulatedPlant {
    fn apply(&mut self, tag: ReplayTag) {
        match tag {
            ReplayTag::CompOn => self.compressor_on = true,
            ReplayTag::CompOff => self.compressor_on = false,
            ReplayTag::EvapOff => self.evaporator_w = 0.0,
            ReplayTag::EvapFan => self.evaporator_w = EVAPORATOR_FAN_W,
            ReplayTag::EvapHeatStrip => self.evaporator_w = HEAT_STRIP_W,
        }
    }

    fn readings(&self) -> Readings {
        Readings {
            condenser: MeterReading::watts(if self.compressor_on { COMPRESSOR_RUN_W } else { 0.0 }),
            evaporator: MeterReading::watts(self.evaporator_w),
        }
    }
}

/// Source that plays a script back with synthetic timestamps.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    steps: VecDeque<ReplayStep>,
    plant: SimulatedPlant,
    clock: SimClock,
}

impl ReplaySource {
    pub fn new(script: ReplayScript, start: DateTime<Utc>) -> Self {
        Self {
            steps: script.steps.into(),
            plant: SimulatedPlant { compressor_on: false, evaporator_w: 0.0 },
            clock: SimClock::new(start),
        }
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }

    /// Apply the next step, returning its readings and timestamp.
    pub fn advance(&mut self) -> Option<(Readings, DateTime<Utc>)> {
        let step = self.steps.pop_front()?;
        self.plant.apply(step.tag);
        self.clock.advance(Duration::from_secs(step.delta_secs));
        Some((self.plant.readings(), self.clock.now()))
    }
}

#[async_trait]
impl SampleSource for ReplaySource {
    async fn next_tick(&mut self) -> Result<Tick, SamplerError> {
        Ok(match self.advance() {
            Some((readings, at)) => Tick::Reading { readings, at },
            None => Tick::Finished,
        })
    }
}
