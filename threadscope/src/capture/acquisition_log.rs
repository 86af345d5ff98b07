//! Diagnostic log for the acquisition and conversion stages.
//!
//! Lines are always mirrored to the `log` facade; they are persisted next to
//! the capture only when the user asks for it (`--keep-logs`).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;

/// Suffix of the persisted log file, appended to the capture's stem.
pub const LOG_SUFFIX: &str = "threadscope.log";

/// In-memory acquisition log.
#[derive(Debug, Default)]
pub struct AcquisitionLog {
    lines: Vec<String>,
}

impl AcquisitionLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line (also emitted at info level).
    pub fn record(&mut self, line: impl Into<String>) {
        let line = line.into();
        info!("{line}");
        self.lines.push(line);
    }

    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Path the log is persisted to for `capture`.
    #[must_use]
    pub fn path_for(capture: &Path) -> PathBuf {
        let stem = capture.file_stem().map_or_else(
            || "capture".to_string(),
            |stem| stem.to_string_lossy().into_owned(),
        );
        capture.with_file_name(format!("{stem}.{LOG_SUFFIX}"))
    }

    /// Write the log next to `capture` and return the path written.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn persist(&self, capture: &Path) -> std::io::Result<PathBuf> {
        let path = Self::path_for(capture);
        let mut writer = BufWriter::new(File::create(&path)?);
        for line in &self.lines {
            writeln!(writer, "{line}")?;
        }
        writer.flush()?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_for() {
        let path = AcquisitionLog::path_for(Path::new("/tmp/traces/session.json"));
        assert_eq!(path, PathBuf::from("/tmp/traces/session.threadscope.log"));
    }

    #[test]
    fn test_persist_writes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("session.json");

        let mut log = AcquisitionLog::new();
        log.record("first");
        log.record("second");
        let written = log.persist(&capture).unwrap();

        let content = std::fs::read_to_string(written).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }
}
