//! Defrost cycle detector.
//!
//! During a defrost the outdoor unit reverses, the indoor heat strip comes on
//! to cover for it, both shut off in either order, and the compressor then
//! resumes to reheat the indoor coil. [`DefrostDetector`] follows that
//! sequence one sample at a time and reports each step as a [`DefrostEvent`].
//!
//! Re-entries into the cycle (heat strip or compressor coming back after
//! having been seen off) are followed as ordinary transitions and reported as
//! unexpected, because interrupted defrosts are what leave the evaporator wet.

use chrono::{DateTime, Local, Utc};
use std::fmt;
use std::time::Duration;

use crate::sample::Sample;

pub const DEFAULT_REHEAT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefrostState {
    /// Waiting for compressor and heat strip to be on together.
    Idle,
    Defrost,
    /// Heat strip off, compressor still running.
    HeatStripEnded,
    /// Compressor off, heat strip still on.
    CompressorEnded,
    BothOff,
    Reheating,
}

impl fmt::Display for DefrostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefrostState::Idle => write!(f, "IDLE"),
            DefrostState::Defrost => write!(f, "DEFROST"),
            DefrostState::HeatStripEnded => write!(f, "HEAT_STRIP_ENDED"),
            DefrostState::CompressorEnded => write!(f, "COMPRESSOR_ENDED"),
            DefrostState::BothOff => write!(f, "BOTH_OFF"),
            DefrostState::Reheating => write!(f, "REHEATING"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefrostEvent {
    DefrostStarted,
    HeatStripOff { compressor_power: f64 },
    CompressorOff { heat_strip_power: f64 },
    BothOff,
    /// Heat strip seen on again after it was reported off.
    HeatStripResumed,
    /// Compressor seen on again while the heat strip was still running.
    CompressorResumed,
    ReheatStarted { at: DateTime<Utc> },
    ReheatEnded { duration: Duration },
    ReheatTimeout { duration: Duration },
    /// Evaporator lost power while a cycle was being tracked.
    EvaporatorShutOff { during: DefrostState },
}

impl DefrostEvent {
    pub fn is_unexpected(&self) -> bool {
        matches!(self, DefrostEvent::HeatStripResumed | DefrostEvent::CompressorResumed)
    }

    /// Events worth a warning rather than an informational line.
    pub fn is_warning(&self) -> bool {
        self.is_unexpected() || matches!(self, DefrostEvent::EvaporatorShutOff { .. })
    }
}

impl fmt::Display for DefrostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefrostEvent::DefrostStarted => write!(f, "defrost start"),
            DefrostEvent::HeatStripOff { compressor_power } => {
                write!(f, "heat strips off; compressor power = {compressor_power:.1}")
            }
            DefrostEvent::CompressorOff { heat_strip_power } => {
                write!(f, "compressor off; heat strip power = {heat_strip_power:.1}")
            }
            DefrostEvent::BothOff => write!(f, "compressor and heat strip off"),
            DefrostEvent::HeatStripResumed => {
                write!(f, "heat strips back on - unexpected transition")
            }
            DefrostEvent::CompressorResumed => {
                write!(f, "compressor back on - unexpected transition")
            }
            DefrostEvent::ReheatStarted { at } => {
                write!(
                    f,
                    "compressor on - reheating indoor coil since {}",
                    at.with_timezone(&Local).format("%H:%M:%S")
                )
            }
            DefrostEvent::ReheatEnded { duration } => {
                write!(f, "compressor off - indoor reheat ends after {}", minutes_seconds(*duration))
            }
            DefrostEvent::ReheatTimeout { duration } => {
                write!(f, "reheat timeout after {} - defrost ends", minutes_seconds(*duration))
            }
            DefrostEvent::EvaporatorShutOff { during } => {
                write!(f, "evaporator shut off during defrost ({during})")
            }
        }
    }
}

fn minutes_seconds(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}m {}s", secs / 60, secs % 60)
}

/// State machine fed once per polling tick.
#[derive(Debug, Clone)]
pub struct DefrostDetector {
    state: DefrostState,
    reheat_start: Option<DateTime<Utc>>,
    reheat_timeout: Duration,
}

impl Default for DefrostDetector {
    fn default() -> Self {
        Self::new(DEFAULT_REHEAT_TIMEOUT)
    }
}

impl DefrostDetector {
    pub fn new(reheat_timeout: Duration) -> Self {
        Self {
            state: DefrostState::Idle,
            reheat_start: None,
            reheat_timeout,
        }
    }

    pub fn state(&self) -> DefrostState {
        self.state
    }

    /// Start of the current reheat, if one is being timed.
    pub fn reheat_start(&self) -> Option<DateTime<Utc>> {
        self.reheat_start
    }

    pub fn reheat_timeout(&self) -> Duration {
        self.reheat_timeout
    }

    /// Advance the machine with one complete sample.
    ///
    /// `now` must not go backwards between calls. At most one event is
    /// returned; when a single tick shows both compressor and heat strip off
    /// during defrost, the compressor-off transition wins.
    pub fn step(&mut self, sample: &Sample, now: DateTime<Utc>) -> (DefrostState, Option<DefrostEvent>) {
        let (next, event) = self.transition(sample, now);
        if next == DefrostState::Idle {
            self.reheat_start = None;
        }
        self.state = next;
        (next, event)
    }

    fn transition(&mut self, s: &Sample, now: DateTime<Utc>) -> (DefrostState, Option<DefrostEvent>) {
        use DefrostState::*;

        if self.state != Idle && s.evaporator_off {
            return (Idle, Some(DefrostEvent::EvaporatorShutOff { during: self.state }));
        }

        match self.state {
            Idle => {
                if s.compressor_on && s.heat_strip_on {
                    (Defrost, Some(DefrostEvent::DefrostStarted))
                } else {
                    (Idle, None)
                }
            }
            Defrost => {
                let mut outcome = (Defrost, None);
                if !s.heat_strip_on {
                    outcome = (
                        HeatStripEnded,
                        Some(DefrostEvent::HeatStripOff { compressor_power: s.compressor_power }),
                    );
                }
                // evaluated second so it supersedes the heat strip check
                if !s.compressor_on {
                    outcome = (
                        CompressorEnded,
                        Some(DefrostEvent::CompressorOff { heat_strip_power: s.heat_strip_power }),
                    );
                }
                outcome
            }
            HeatStripEnded => {
                if !s.compressor_on {
                    (BothOff, Some(DefrostEvent::BothOff))
                } else if s.heat_strip_on {
                    (Defrost, Some(DefrostEvent::HeatStripResumed))
                } else {
                    (HeatStripEnded, None)
                }
            }
            CompressorEnded => {
                if !s.heat_strip_on {
                    (BothOff, Some(DefrostEvent::BothOff))
                } else if s.compressor_on {
                    (Defrost, Some(DefrostEvent::CompressorResumed))
                } else {
                    (CompressorEnded, None)
                }
            }
            BothOff => {
                if s.compressor_on {
                    self.reheat_start = Some(now);
                    (Reheating, Some(DefrostEvent::ReheatStarted { at: now }))
                } else if s.heat_strip_on {
                    (CompressorEnded, Some(DefrostEvent::HeatStripResumed))
                } else {
                    (BothOff, None)
                }
            }
            Reheating => {
                let start = *self.reheat_start.get_or_insert(now);
                let elapsed = (now - start).to_std().unwrap_or_default();
                if !s.compressor_on {
                    (Idle, Some(DefrostEvent::ReheatEnded { duration: elapsed }))
                } else if s.heat_strip_on {
                    (Defrost, Some(DefrostEvent::HeatStripResumed))
                } else if elapsed > self.reheat_timeout {
                    (Idle, Some(DefrostEvent::ReheatTimeout { duration: elapsed }))
                } else {
                    (Reheating, None)
                }
            }
        }
    }
}
