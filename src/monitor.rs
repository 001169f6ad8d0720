// src/monitor.rs - Drives the detector from a sample source
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::activity::ActivityMonitor;
use crate::defrost::{DefrostDetector, DefrostEvent, DefrostState};
use crate::sample::{Readings, Sample, Thresholds};
use crate::sampler::{SampleSource, SamplerError, Tick};
use crate::sink::{EventSink, SinkError};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Sampler(#[from] SamplerError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Counters returned when a finite source runs out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub skipped: u64,
    pub events: u64,
    pub unexpected: u64,
}

pub struct Monitor<S: EventSink> {
    detector: DefrostDetector,
    thresholds: Thresholds,
    activity: Option<ActivityMonitor>,
    sink: S,
    summary: RunSummary,
}

impl<S: EventSink> Monitor<S> {
    pub fn new(detector: DefrostDetector, thresholds: Thresholds, sink: S) -> Self {
        Self {
            detector,
            thresholds,
            activity: None,
            sink,
            summary: RunSummary::default(),
        }
    }

    pub fn with_activity(mut self, activity: ActivityMonitor) -> Self {
        self.activity = Some(activity);
        self
    }

    pub fn state(&self) -> DefrostState {
        self.detector.state()
    }

    pub fn detector(&self) -> &DefrostDetector {
        &self.detector
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    /// Handle one complete pair of readings.
    pub fn handle(&mut self, readings: &Readings, at: DateTime<Utc>) -> Result<Option<DefrostEvent>, SinkError> {
        self.summary.ticks += 1;

        if let Some(activity) = self.activity.as_mut() {
            for line in activity.observe(readings, at) {
                self.sink.write_line(&line)?;
            }
        }

        let sample = Sample::derive(readings, &self.thresholds);
        tracing::trace!(%sample, state = %self.detector.state(), "sample");
        let (state, event) = self.detector.step(&sample, at);

        if let Some(event) = event {
            self.summary.events += 1;
            if event.is_warning() {
                if event.is_unexpected() {
                    self.summary.unexpected += 1;
                }
                tracing::warn!(%state, "{}", event);
            } else {
                tracing::info!(%state, "{}", event);
            }
            self.sink.emit(at, &event.to_string())?;
        }
        Ok(event)
    }

    /// Pull ticks until the source finishes or fails.
    pub async fn run<Src: SampleSource + ?Sized>(&mut self, source: &mut Src) -> Result<RunSummary, MonitorError> {
        loop {
            match source.next_tick().await? {
                Tick::Reading { readings, at } => {
                    self.handle(&readings, at)?;
                }
                Tick::Skipped => {
                    self.summary.skipped += 1;
                }
                Tick::Finished => {
                    tracing::info!(summary = ?self.summary, "sample source finished");
                    return Ok(self.summary);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ActivityConfig;
    use crate::replay::{ReplayScript, ReplaySource, ReplayTag};
    use crate::sample::MeterReading;
    use crate::sink::MemorySink;
    use async_trait::async_trait;
    use chrono::{TimeDelta, TimeZone};
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Source handing out a fixed list of ticks, then `Finished`.
    struct ScriptedSource {
        ticks: VecDeque<Tick>,
    }

    #[async_trait]
    impl SampleSource for ScriptedSource {
        async fn next_tick(&mut self) -> Result<Tick, SamplerError> {
            Ok(self.ticks.pop_front().unwrap_or(Tick::Finished))
        }
    }

    fn reading(compressor_w: f64, evaporator_w: f64, secs: i64) -> Tick {
        Tick::Reading {
            readings: Readings {
                condenser: MeterReading::watts(compressor_w),
                evaporator: MeterReading::watts(evaporator_w),
            },
            at: start() + TimeDelta::seconds(secs),
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 2, 7, 30, 0).unwrap()
    }

    #[test]
    fn test_handle_writes_event_lines() {
        let mut monitor = Monitor::new(DefrostDetector::default(), Thresholds::default(), MemorySink::new());
        let both_on = Readings {
            condenser: MeterReading::watts(1800.0),
            evaporator: MeterReading::watts(5000.0),
        };
        let event = monitor.handle(&both_on, start()).unwrap();
        assert_eq!(event, Some(DefrostEvent::DefrostStarted));
        assert_eq!(monitor.state(), DefrostState::Defrost);
        assert_eq!(monitor.sink().lines().len(), 1);
        assert!(monitor.sink().lines()[0].ends_with(" defrost start"));
    }

    #[tokio::test]
    async fn test_run_counts_events() {
        use ReplayTag::*;
        let script = ReplayScript::from_pairs(&[(5, CompOn), (5, EvapHeatStrip), (5, EvapFan), (5, CompOff)]);
        let mut source = ReplaySource::new(script, start());
        let mut monitor = Monitor::new(DefrostDetector::default(), Thresholds::default(), MemorySink::new());

        let summary = monitor.run(&mut source).await.unwrap();
        assert_eq!(summary, RunSummary { ticks: 4, skipped: 0, events: 3, unexpected: 0 });
        assert_eq!(monitor.state(), DefrostState::BothOff);
    }

    #[tokio::test]
    async fn test_activity_lines_share_the_sink() {
        let script = ReplayScript::from_pairs(&[(5, ReplayTag::CompOn)]);
        let mut source = ReplaySource::new(script, start());
        let activity = ActivityMonitor::new(
            ActivityConfig { enabled: true, ..Default::default() },
            Duration::from_secs(5),
        );
        let mut monitor = Monitor::new(DefrostDetector::default(), Thresholds::default(), MemorySink::new())
            .with_activity(activity);

        monitor.run(&mut source).await.unwrap();
        let lines = monitor.sink().lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(",1800.0,0.0"));
    }

    #[tokio::test]
    async fn test_skipped_ticks_leave_reheat_untouched() {
        let mut source = ScriptedSource {
            ticks: VecDeque::from([
                reading(1800.0, 5000.0, 0),
                reading(1800.0, 300.0, 10),
                reading(0.0, 300.0, 20),
                reading(1800.0, 300.0, 30),
                Tick::Skipped,
                Tick::Skipped,
                reading(1800.0, 300.0, 60),
            ]),
        };
        let mut monitor = Monitor::new(DefrostDetector::default(), Thresholds::default(), MemorySink::new());

        let summary = monitor.run(&mut source).await.unwrap();
        assert_eq!(summary, RunSummary { ticks: 5, skipped: 2, events: 4, unexpected: 0 });
        assert_eq!(monitor.state(), DefrostState::Reheating);
        assert_eq!(monitor.detector().reheat_start(), Some(start() + TimeDelta::seconds(30)));
        assert_eq!(monitor.detector().reheat_timeout(), Duration::from_secs(300));
    }
}
