// src/sample.rs - Meter readings and the on/off flags derived from them
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two monitored power meters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    /// Outdoor unit; its power tells whether the compressor runs.
    Condenser,
    /// Indoor unit; fan alone or fan plus heat strip.
    Evaporator,
}

impl Device {
    pub const ALL: [Device; 2] = [Device::Condenser, Device::Evaporator];

    /// Process exit status used when this device stops answering.
    pub fn exit_code(self) -> i32 {
        match self {
            Device::Condenser => 2,
            Device::Evaporator => 3,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Condenser => write!(f, "condenser"),
            Device::Evaporator => write!(f, "evaporator"),
        }
    }
}

/// One successful read of a meter.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeterReading {
    /// Instantaneous power in watts.
    pub power: f64,
    /// Cumulative energy in kWh, when the meter reports it.
    pub energy: Option<f64>,
}

impl MeterReading {
    pub fn watts(power: f64) -> Self {
        Self { power, energy: None }
    }
}

/// Readings from both meters taken on the same tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Readings {
    pub condenser: MeterReading,
    pub evaporator: MeterReading,
}

/// Power levels used to turn readings into on/off flags.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Thresholds {
    #[serde(default = "default_compressor_on_w")]
    pub compressor_on_w: f64,
    #[serde(default = "default_heat_strip_on_w")]
    pub heat_strip_on_w: f64,
    #[serde(default = "default_evaporator_off_w")]
    pub evaporator_off_w: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            compressor_on_w: default_compressor_on_w(),
            heat_strip_on_w: default_heat_strip_on_w(),
            evaporator_off_w: default_evaporator_off_w(),
        }
    }
}

fn default_compressor_on_w() -> f64 { 1000.0 }
fn default_heat_strip_on_w() -> f64 { 2000.0 }
fn default_evaporator_off_w() -> f64 { 50.0 }

/// A point-in-time observation as seen by the defrost detector.
///
/// `heat_strip_on` and `evaporator_off` come from the same evaporator reading
/// and are never both set as long as `heat_strip_on_w > evaporator_off_w`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub compressor_on: bool,
    pub heat_strip_on: bool,
    pub evaporator_off: bool,
    pub compressor_power: f64,
    pub heat_strip_power: f64,
}

impl Sample {
    pub fn derive(readings: &Readings, thresholds: &Thresholds) -> Self {
        let compressor_power = readings.condenser.power;
        let heat_strip_power = readings.evaporator.power;
        Self {
            compressor_on: compressor_power > thresholds.compressor_on_w,
            heat_strip_on: heat_strip_power > thresholds.heat_strip_on_w,
            evaporator_off: heat_strip_power < thresholds.evaporator_off_w,
            compressor_power,
            heat_strip_power,
        }
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "comp_on={}, hs_on={}, evap_off={}",
            self.compressor_on, self.heat_strip_on, self.evaporator_off
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readings(condenser: f64, evaporator: f64) -> Readings {
        Readings {
            condenser: MeterReading::watts(condenser),
            evaporator: MeterReading::watts(evaporator),
        }
    }

    #[test]
    fn test_thresholds_are_strict() {
        let t = Thresholds::default();
        let s = Sample::derive(&readings(1000.0, 2000.0), &t);
        assert!(!s.compressor_on);
        assert!(!s.heat_strip_on);
        assert!(!s.evaporator_off);

        let s = Sample::derive(&readings(1000.1, 2000.1), &t);
        assert!(s.compressor_on);
        assert!(s.heat_strip_on);
    }

    #[test]
    fn test_evaporator_off_below_threshold() {
        let s = Sample::derive(&readings(1500.0, 49.9), &Thresholds::default());
        assert!(s.evaporator_off);
        assert!(!s.heat_strip_on);
        assert_eq!(s.compressor_power, 1500.0);
        assert_eq!(s.heat_strip_power, 49.9);
    }

    #[test]
    fn test_heat_strip_and_evaporator_off_exclusive() {
        let t = Thresholds::default();
        for watts in [0.0, 10.0, 49.0, 50.0, 300.0, 1999.0, 2500.0, 8000.0] {
            let s = Sample::derive(&readings(0.0, watts), &t);
            assert!(!(s.heat_strip_on && s.evaporator_off), "both set at {watts} W");
        }
    }

    #[test]
    fn test_device_exit_codes_distinct() {
        assert_ne!(Device::Condenser.exit_code(), Device::Evaporator.exit_code());
        assert_ne!(Device::Condenser.exit_code(), 0);
        assert_eq!(Device::Evaporator.to_string(), "evaporator");
    }
}
