//! # Symbol Resolution from Local Caches
//!
//! Captures record stacks as module + address pairs; most frames arrive
//! already resolved by the conversion step, but frames from modules whose
//! symbols were not available at conversion time keep their raw address.
//! This module resolves those leftovers from symbol cache files so that
//! anchor and activity signatures can match them.
//!
//! ## Symbol Cache Files
//!
//! One JSON file per module, named `<module>.sym.json`:
//!
//! ```json
//! { "module": "msenv", "symbols": [{ "address": 4096, "size": 512, "name": "MainMessageLoop::Run" }] }
//! ```
//!
//! ## Sources
//!
//! ```text
//! <capture dir>/symbols/         always searched (local cache)
//! --symbol-path dir1:dir2        searched unless --local-symbols
//! ```
//!
//! Directories are searched in order; the first cache file found for a
//! module wins. Missing or malformed cache files leave frames unresolved.
//!
//! Frames recorded without a module first get one from the process's image
//! mappings ([`ImageMap`]).

pub mod image_map;
pub mod symbol_cache;
pub mod symbolizer;

use std::path::{Path, PathBuf};

pub use image_map::ImageMap;
pub use symbol_cache::{ModuleSymbols, SymbolRange};
pub use symbolizer::{SymbolizationStats, Symbolizer};

/// Name of the local cache directory next to a capture.
pub const LOCAL_CACHE_DIR: &str = "symbols";

/// Which symbol sources may be consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolPolicy {
    /// Only the cache directory next to the capture
    LocalCacheOnly,
    /// Local cache, then every configured symbol path directory
    CacheAndSymbolPath,
}

/// Ordered list of directories to search for symbol cache files.
#[must_use]
pub fn symbol_sources(capture: &Path, policy: SymbolPolicy, symbol_path: &[PathBuf]) -> Vec<PathBuf> {
    let local = capture.parent().unwrap_or_else(|| Path::new(".")).join(LOCAL_CACHE_DIR);
    let mut sources = vec![local];
    if policy == SymbolPolicy::CacheAndSymbolPath {
        sources.extend(symbol_path.iter().cloned());
    }
    sources
}
