//! Per-module symbol tables loaded from cache files.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Address range covered by one symbol
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SymbolRange {
    pub address: u64,
    pub size: u64,
    pub name: String,
}

impl SymbolRange {
    /// Check if an address falls within this symbol
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.address && addr - self.address < self.size
    }
}

#[derive(Debug, Deserialize)]
struct CacheFile {
    module: String,
    #[serde(default)]
    symbols: Vec<SymbolRange>,
}

/// Sorted symbol table of one module
#[derive(Debug, Clone, Default)]
pub struct ModuleSymbols {
    module: String,
    ranges: Vec<SymbolRange>,
}

impl ModuleSymbols {
    /// Build a table from unsorted ranges.
    #[must_use]
    pub fn new(module: impl Into<String>, mut ranges: Vec<SymbolRange>) -> Self {
        ranges.sort_by_key(|r| r.address);
        Self { module: module.into(), ranges }
    }

    /// Load a `<module>.sym.json` cache file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read symbol cache {}", path.display()))?;
        let file: CacheFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse symbol cache {}", path.display()))?;
        Ok(Self::new(file.module, file.symbols))
    }

    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Name of the symbol containing `addr`.
    ///
    /// O(log n): binary search for the last symbol starting at or before `addr`.
    #[must_use]
    pub fn lookup(&self, addr: u64) -> Option<&str> {
        let after = self.ranges.partition_point(|r| r.address <= addr);
        let candidate = self.ranges.get(after.checked_sub(1)?)?;
        candidate.contains(addr).then_some(candidate.name.as_str())
    }
}

/// Cache file name for `module`.
#[must_use]
pub fn cache_file_name(module: &str) -> String {
    format!("{module}.sym.json")
}
