// src/activity.rs - Power activity report for the two meters
//
// Tracks each meter as on/off, notices load changes, and decides when a
// "timestamp,condenser W,evaporator W" line is worth printing. Also produces
// a daily energy summary when the meters report cumulative kWh.

use chrono::{DateTime, Local, NaiveDate, Utc};
use std::time::Duration;

use crate::config::ActivityConfig;
use crate::sample::{MeterReading, Readings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Startup,
    Off,
    On,
}

#[derive(Debug, Clone)]
struct DeviceActivity {
    state: PowerState,
    power: f64,
    energy: Option<f64>,
    day_start_energy: Option<f64>,
}

impl DeviceActivity {
    fn new() -> Self {
        Self { state: PowerState::Startup, power: 0.0, energy: None, day_start_energy: None }
    }

    /// Record a reading, returning true if the load changed.
    fn update(&mut self, reading: &MeterReading, cfg: &ActivityConfig) -> bool {
        let power = reading.power;
        if self.state == PowerState::Startup {
            self.day_start_energy = reading.energy;
            self.power = power;
            self.state = if power > cfg.on_w { PowerState::On } else { PowerState::Off };
        }

        let changed = match self.state {
            PowerState::Off if power > cfg.on_w => {
                self.state = PowerState::On;
                true
            }
            PowerState::On if power < cfg.off_w => {
                self.state = PowerState::Off;
                true
            }
            PowerState::On => {
                let low = self.power * (1.0 - cfg.change_ratio);
                let high = self.power * (1.0 + cfg.change_ratio);
                !(low < power && power < high)
            }
            _ => false,
        };

        self.power = power;
        self.energy = reading.energy;
        if self.day_start_energy.is_none() {
            self.day_start_energy = reading.energy;
        }
        changed
    }

    fn energy_used(&self) -> Option<f64> {
        Some(self.energy? - self.day_start_energy?)
    }

    fn start_new_day(&mut self) {
        self.day_start_energy = self.energy;
    }
}

pub struct ActivityMonitor {
    cfg: ActivityConfig,
    nominal_period: Duration,
    condenser: DeviceActivity,
    evaporator: DeviceActivity,
    day: Option<NaiveDate>,
    last_at: Option<DateTime<Utc>>,
    /// Seconds of reporting left after the last load change.
    change_timer: i64,
    run_time: Duration,
    previous_line: Option<String>,
}

impl ActivityMonitor {
    /// `nominal_period` is the expected time between observations.
    pub fn new(cfg: ActivityConfig, nominal_period: Duration) -> Self {
        Self {
            cfg,
            nominal_period,
            condenser: DeviceActivity::new(),
            evaporator: DeviceActivity::new(),
            day: None,
            last_at: None,
            change_timer: 1,
            run_time: Duration::ZERO,
            previous_line: None,
        }
    }

    pub fn condenser_state(&self) -> PowerState {
        self.condenser.state
    }

    pub fn evaporator_state(&self) -> PowerState {
        self.evaporator.state
    }

    /// Feed one pair of readings and collect the lines to print.
    pub fn observe(&mut self, readings: &Readings, at: DateTime<Utc>) -> Vec<String> {
        let mut lines = Vec::new();
        let period = match self.last_at {
            Some(last) => (at - last).to_std().unwrap_or_default(),
            None => self.nominal_period,
        };
        self.last_at = Some(at);

        let mut changed = self.condenser.update(&readings.condenser, &self.cfg);
        changed |= self.evaporator.update(&readings.evaporator, &self.cfg);

        let local = at.with_timezone(&Local);
        let today = local.date_naive();
        match self.day {
            Some(day) if day != today => {
                if let Some(line) = self.daily_summary(day) {
                    lines.push(line);
                }
                self.condenser.start_new_day();
                self.evaporator.start_new_day();
                self.day = Some(today);
            }
            None => self.day = Some(today),
            _ => {}
        }

        if changed {
            self.change_timer = self.cfg.quiet_secs as i64;
            self.run_time = Duration::ZERO;
        }
        let running = self.condenser.state == PowerState::On || self.evaporator.state == PowerState::On;
        if running {
            self.run_time += period;
        }

        let line = format!(
            "{},{:.1},{:.1}",
            local.format("%Y-%m-%d %H:%M:%S"),
            self.condenser.power,
            self.evaporator.power
        );

        if self.change_timer > 0 || self.run_time > Duration::from_secs(self.cfg.heartbeat_secs) {
            self.change_timer -= period.as_secs() as i64;
            self.run_time = Duration::ZERO;
            if let Some(previous) = self.previous_line.take() {
                lines.push(previous);
            }
            lines.push(line);
            if self.condenser.state == PowerState::Off && self.evaporator.state == PowerState::Off {
                self.change_timer = 0;
            }
        } else {
            self.previous_line = Some(line);
        }
        lines
    }

    fn daily_summary(&self, day: NaiveDate) -> Option<String> {
        let c = self.condenser.energy_used()?;
        let e = self.evaporator.energy_used()?;
        tracing::info!(condenser_kwh = c, evaporator_kwh = e, "daily energy");
        Some(format!(
            "{}      {:.1} + {:.1} = {:.1} kWh used yesterday",
            day.format("%a %b %d"),
            c,
            e,
            c + e
        ))
    }
}
