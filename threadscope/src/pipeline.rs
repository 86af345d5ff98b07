//! End-to-end analysis of one capture.
//!
//! ```text
//! locate/unpack ─▶ load ─▶ find process ─▶ assign modules ─▶ symbolize ─▶ locate thread ─▶ classify
//! ```
//!
//! Every step records what it did in the [`AcquisitionLog`], so a failed run
//! still leaves an account of how far it got.

use std::path::{Path, PathBuf};

use log::info;

use crate::analysis::{classify, locate_target_thread, ActivityTable, WaitReasonTable};
use crate::capture::{AcquisitionLog, Capture};
use crate::config::AnalysisConfig;
use crate::domain::CaptureError;
use crate::report::ClassificationReport;
use crate::symbolization::{
    symbol_sources, ImageMap, SymbolPolicy, SymbolizationStats, Symbolizer,
};

/// Where symbols may come from for one run.
#[derive(Debug, Clone)]
pub struct SymbolOptions {
    pub policy: SymbolPolicy,
    pub symbol_path: Vec<PathBuf>,
}

impl Default for SymbolOptions {
    fn default() -> Self {
        Self { policy: SymbolPolicy::LocalCacheOnly, symbol_path: Vec::new() }
    }
}

/// Report plus the symbolization outcome it was computed from.
#[derive(Debug)]
pub struct Analysis {
    pub report: ClassificationReport,
    pub symbols: SymbolizationStats,
}

/// Run the whole analysis for the capture at `path`.
///
/// # Errors
/// Fatal [`CaptureError`]s: the capture is missing or malformed, the process
/// filter does not match exactly one instance, or the target thread is not found.
pub fn analyze_capture(
    path: &Path,
    config: &AnalysisConfig,
    symbols: &SymbolOptions,
    log: &mut AcquisitionLog,
) -> Result<Analysis, CaptureError> {
    let mut capture = Capture::load(path, log)?;
    let (pid, process) = capture.track_process(&config.process_name, log)?;
    log.record(format!("Analyzing {} ({pid})", config.process_name));

    let images = ImageMap::new(process.images);
    let assigned = images.assign_modules(capture.events_mut(), pid);
    if assigned > 0 {
        log.record(format!("Assigned modules to {assigned} frames from image mappings"));
    }

    let sources = symbol_sources(capture.path(), symbols.policy, &symbols.symbol_path);
    let mut symbolizer = Symbolizer::new(sources);
    let stats = symbolizer.symbolize_events(capture.events_mut());
    log.record(format!(
        "Symbolized {} frames, {} left unresolved",
        stats.resolved, stats.unresolved
    ));

    let target = locate_target_thread(capture.process_samples(pid), &config.entry_signature)
        .ok_or_else(|| CaptureError::TargetThreadNotFound {
            pid,
            signature: config.entry_signature.clone(),
        })?;
    log.record(format!("Target thread {target}"));

    let breakdown = classify(
        capture.events(),
        target,
        &config.anchor_signature,
        ActivityTable::from_config(&config.activities),
        WaitReasonTable::standard(),
    );
    info!("Classified {target}: {} anomalies", breakdown.anomalies.len());

    Ok(Analysis {
        report: ClassificationReport {
            capture: capture.path().to_path_buf(),
            process: config.process_name.clone(),
            pid,
            target,
            breakdown,
        },
        symbols: stats,
    })
}
