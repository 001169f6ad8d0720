// src/sink.rs - Destinations for human-readable event lines
use chrono::{DateTime, Local, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Prefix a message with the local wall-clock time of `at`.
pub fn format_line(at: DateTime<Utc>, message: &str) -> String {
    format!("{} {}", at.with_timezone(&Local).format("%H:%M:%S"), message)
}

pub trait EventSink: Send {
    /// Write one already formatted line.
    fn write_line(&mut self, line: &str) -> Result<(), SinkError>;

    fn emit(&mut self, at: DateTime<Utc>, message: &str) -> Result<(), SinkError> {
        self.write_line(&format_line(at, message))
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        (**self).write_line(line)
    }
}

#[derive(Debug, Default)]
pub struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        let mut out = io::stdout().lock();
        writeln!(out, "{line}").map_err(|source| SinkError::Io { path: "<stdout>".to_string(), source })
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Vec<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl EventSink for MemorySink {
    fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        self.lines.push(line.to_string());
        Ok(())
    }
}

/// Fan-out to several sinks.
#[derive(Default)]
pub struct SinkSet {
    sinks: Vec<Box<dyn EventSink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: impl EventSink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for SinkSet {
    fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        for sink in &mut self.sinks {
            sink.write_line(line)?;
        }
        Ok(())
    }
}

/// Append-only log file rotated by size.
///
/// When a write would push the file past `max_bytes`, `log` becomes `log.1`,
/// `log.1` becomes `log.2` and so on; anything beyond `keep` is removed.
#[derive(Debug)]
pub struct RotatingFileSink {
    path: PathBuf,
    max_bytes: u64,
    keep: usize,
    file: File,
    written: u64,
}

impl RotatingFileSink {
    pub fn open(path: impl AsRef<Path>, max_bytes: u64, keep: usize) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self { path, max_bytes, keep, file, written })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup(&self, index: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> Result<(), SinkError> {
        let io_err = |source: io::Error| SinkError::Io { path: self.path.display().to_string(), source };

        self.file.flush().map_err(io_err)?;
        if self.keep == 0 {
            fs::remove_file(&self.path).map_err(io_err)?;
        } else {
            let oldest = self.backup(self.keep);
            if oldest.exists() {
                fs::remove_file(&oldest).map_err(io_err)?;
            }
            for index in (1..self.keep).rev() {
                let from = self.backup(index);
                if from.exists() {
                    fs::rename(&from, self.backup(index + 1)).map_err(io_err)?;
                }
            }
            fs::rename(&self.path, self.backup(1)).map_err(io_err)?;
        }
        self.file = open_append(&self.path)?;
        self.written = 0;
        tracing::debug!("rotated {}", self.path.display());
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File, SinkError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SinkError::Io { path: path.display().to_string(), source })
}

impl EventSink for RotatingFileSink {
    fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        let len = line.len() as u64 + 1;
        if self.written > 0 && self.written + len > self.max_bytes {
            self.rotate()?;
        }
        writeln!(self.file, "{line}")
            .map_err(|source| SinkError::Io { path: self.path.display().to_string(), source })?;
        self.written += len;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    #[test]
    fn test_format_line_prefix() {
        let at = Utc.with_ymd_and_hms(2024, 12, 31, 9, 5, 7).unwrap();
        let line = format_line(at, "defrost start");
        let (stamp, message) = line.split_once(' ').unwrap();
        assert_eq!(message, "defrost start");
        assert_eq!(stamp.len(), 8);
        assert_eq!(&stamp[2..3], ":");
        assert_eq!(&stamp[5..], ":07");
    }

    /// Sink whose lines stay readable after it is moved into a `SinkSet`.
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<String>>>);

    impl EventSink for SharedSink {
        fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
            self.0.lock().unwrap().push(line.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_sink_set_fans_out() {
        let first = SharedSink::default();
        let second = SharedSink::default();
        let mut set = SinkSet::new();
        assert!(set.is_empty());
        set.push(first.clone());
        set.push(second.clone());
        assert_eq!(set.len(), 2);

        set.write_line("hello").unwrap();
        set.emit(Utc.with_ymd_and_hms(2024, 12, 31, 9, 5, 7).unwrap(), "defrost start").unwrap();
        for sink in [&first, &second] {
            let lines = sink.0.lock().unwrap();
            assert_eq!(lines.len(), 2);
            assert_eq!(lines[0], "hello");
            assert!(lines[1].ends_with(":07 defrost start"));
        }
    }

    #[test]
    fn test_rotating_file_rotates_and_prunes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("defrost.log");
        // each line is 10 bytes with the newline
        let mut sink = RotatingFileSink::open(&path, 25, 2).unwrap();
        for i in 0..7 {
            sink.write_line(&format!("line {i:04}")).unwrap();
        }

        let current = fs::read_to_string(&path).unwrap();
        assert_eq!(current, "line 0006\n");
        let first = fs::read_to_string(dir.path().join("defrost.log.1")).unwrap();
        assert_eq!(first, "line 0004\nline 0005\n");
        let second = fs::read_to_string(dir.path().join("defrost.log.2")).unwrap();
        assert_eq!(second, "line 0002\nline 0003\n");
        assert!(!dir.path().join("defrost.log.3").exists());
    }

    #[test]
    fn test_rotating_file_appends_to_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("defrost.log");
        fs::write(&path, "earlier\n").unwrap();
        let mut sink = RotatingFileSink::open(&path, 1024, 1).unwrap();
        sink.write_line("later").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "earlier\nlater\n");
        assert_eq!(sink.path(), path.as_path());
    }
}
