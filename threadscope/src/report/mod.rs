//! # Report Formatting and Export
//!
//! Renders a [`ThreadBreakdown`] for the terminal and exports it as JSON.
//!
//! ```text
//! thread TID:17 of devenv.exe (PID:4242), span 0.000..120.000ms (120.000ms)
//!
//! events      samples 12  context switches 8  ready 4
//! skipped     samples 1  context switches 0
//!
//! running                  40.000ms   33.3%
//! ...
//! ```

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::analysis::ThreadBreakdown;
use crate::domain::{Pid, Tid};

/// Anomalies shown in the text report before the remainder is summarized.
pub const MAX_LISTED_ANOMALIES: usize = 20;

/// Result of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub capture: PathBuf,
    pub process: String,
    pub pid: Pid,
    pub target: Tid,
    #[serde(flatten)]
    pub breakdown: ThreadBreakdown,
}

impl ClassificationReport {
    /// Write the report as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn export<W: Write>(&self, mut writer: W) -> Result<()> {
        serde_json::to_writer_pretty(&mut writer, self).context("Failed to serialize report")?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Export to `path`, replacing any existing file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn export_to_file(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create report file {}", path.display()))?;
        self.export(BufWriter::new(file))
    }
}

/// Share of `total` taken by `part`, in percent.
fn percent(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        part / total * 100.0
    } else {
        0.0
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.breakdown;
        let span = b.span_ms();

        write!(f, "thread {} of {} ({})", self.target, self.process, self.pid)?;
        match b.span {
            Some((first, last)) => writeln!(f, ", span {first:.3}..{last:.3}ms ({span:.3}ms)")?,
            None => writeln!(f, ", no events")?,
        }
        writeln!(f)?;

        let c = &b.counters;
        writeln!(
            f,
            "events      samples {}  context switches {}  ready {}",
            c.samples, c.context_switches, c.ready_thread_events
        )?;
        writeln!(
            f,
            "skipped     samples {}  context switches {}",
            c.skipped_samples, c.skipped_context_switches
        )?;
        writeln!(f)?;

        let d = &b.durations;
        let buckets = [
            ("running", d.running),
            ("message pump wait", d.message_pump_wait),
            ("process message", d.process_message),
            ("idle", d.idle),
            ("blocked", d.blocked),
            ("not running", d.not_running),
            ("ready", d.ready),
        ];
        for (name, ms) in buckets {
            writeln!(f, "{name:<20} {ms:>12.3}ms {:>6.1}%", percent(ms, span))?;
        }

        if !b.anomalies.is_empty() {
            writeln!(f)?;
            writeln!(f, "anomalies ({})", b.anomalies.len())?;
            for anomaly in b.anomalies.iter().take(MAX_LISTED_ANOMALIES) {
                writeln!(f, "  {anomaly}")?;
            }
            let hidden = b.anomalies.len().saturating_sub(MAX_LISTED_ANOMALIES);
            if hidden > 0 {
                writeln!(f, "  ... and {hidden} more")?;
            }
        }
        Ok(())
    }
}

/// Render the report to a `String`.
#[must_use]
pub fn render(report: &ClassificationReport) -> String {
    report.to_string()
}
