//! # threadscope - Main Entry Point
//!
//! Analyzes one capture and prints the thread state breakdown.
//! Exit status is non-zero when the capture cannot be located or unpacked,
//! when the process filter does not match exactly one instance, or when the
//! target thread cannot be found.

use anyhow::{Context, Result};
use clap::Parser;
use log::warn;

use threadscope::capture::AcquisitionLog;
use threadscope::cli::Args;
use threadscope::config::AnalysisConfig;
use threadscope::domain::ConfigError;
use threadscope::pipeline::{analyze_capture, SymbolOptions};
use threadscope::report::render;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ConfigError>().is_some() {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let config = match args.config {
        Some(ref path) => AnalysisConfig::from_file(path)?,
        None => AnalysisConfig::default(),
    };
    let symbols = SymbolOptions { policy: args.symbol_policy(), symbol_path: args.symbol_path_dirs() };

    let mut log = AcquisitionLog::new();
    let result = analyze_capture(&args.capture, &config, &symbols, &mut log);

    // The log is kept for failed runs too
    if args.keep_logs {
        match log.persist(&args.capture) {
            Ok(path) if !args.quiet => println!("log: {}", path.display()),
            Ok(_) => {}
            Err(e) => warn!("Failed to write acquisition log: {e}"),
        }
    }

    let analysis = result?;
    if !args.quiet {
        println!(
            "symbols: {:.1}% of frames named ({} resolved from caches)",
            analysis.symbols.coverage(),
            analysis.symbols.resolved
        );
    }
    print!("{}", render(&analysis.report));

    if let Some(ref export_path) = args.export {
        analysis
            .report
            .export_to_file(export_path)
            .with_context(|| format!("Failed to export report to {}", export_path.display()))?;
        if !args.quiet {
            println!("saved: {}", export_path.display());
        }
    }

    Ok(())
}
