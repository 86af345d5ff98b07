//! CLI argument definitions

use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

use crate::symbolization::SymbolPolicy;

#[derive(Parser)]
#[command(
    name = "threadscope",
    about = "Break down where a UI thread spends its time in a scheduling capture",
    after_help = "\
EXAMPLES:
    threadscope trace.json                           Analyze an unpacked capture
    threadscope trace.json --keep-logs               Also write trace.threadscope.log
    threadscope trace.json --local-symbols           Only use ./symbols next to the capture
    threadscope trace.json --export report.json      Write the breakdown as JSON"
)]
pub struct Args {
    /// Capture file (a sibling .gz archive is unpacked if the file is missing)
    #[arg(value_name = "CAPTURE")]
    pub capture: PathBuf,

    /// Keep the acquisition log next to the capture
    #[arg(long)]
    pub keep_logs: bool,

    /// Resolve symbols from the local cache only
    #[arg(long)]
    pub local_symbols: bool,

    /// Extra symbol cache directories, separated like PATH
    #[arg(long, value_name = "DIRS", env = "THREADSCOPE_SYMBOL_PATH")]
    pub symbol_path: Option<OsString>,

    /// Analysis configuration file (JSON)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Export the report to file as JSON
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    #[must_use]
    pub fn symbol_policy(&self) -> SymbolPolicy {
        if self.local_symbols {
            SymbolPolicy::LocalCacheOnly
        } else {
            SymbolPolicy::CacheAndSymbolPath
        }
    }

    /// Directories named by `--symbol-path`, in order.
    #[must_use]
    pub fn symbol_path_dirs(&self) -> Vec<PathBuf> {
        self.symbol_path
            .as_deref()
            .map(|paths| std::env::split_paths(paths).filter(|p| !p.as_os_str().is_empty()).collect())
            .unwrap_or_default()
    }
}
