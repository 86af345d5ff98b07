use std::collections::HashMap;
use std::path::PathBuf;

use log::{info, warn};
use threadscope_common::{Event, FrameSymbol};

use super::symbol_cache::{cache_file_name, ModuleSymbols};

/// Outcome counts of a symbolization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymbolizationStats {
    /// Frames that already had a method name
    pub already_resolved: u64,
    /// Address frames resolved by this pass
    pub resolved: u64,
    /// Address frames left unresolved
    pub unresolved: u64,
}

impl SymbolizationStats {
    /// Percentage of frames with a method name after the pass.
    ///
    /// Returns 100.0 if no frames were seen.
    #[allow(clippy::cast_precision_loss)] // Precision loss acceptable for percentages
    #[must_use]
    pub fn coverage(&self) -> f64 {
        let named = self.already_resolved + self.resolved;
        let total = named + self.unresolved;
        if total > 0 {
            (named as f64 / total as f64) * 100.0
        } else {
            100.0
        }
    }
}

/// Resolves address frames from symbol cache files.
///
/// Module tables are loaded on first use and cached, including the fact that
/// a module has no cache file, so each module hits the filesystem once.
pub struct Symbolizer {
    sources: Vec<PathBuf>,
    modules: HashMap<String, Option<ModuleSymbols>>,
}

impl Symbolizer {
    /// Create a symbolizer searching `sources` in order.
    #[must_use]
    pub fn new(sources: Vec<PathBuf>) -> Self {
        Self { sources, modules: HashMap::new() }
    }

    /// Create a symbolizer over preloaded tables, without touching the filesystem.
    #[must_use]
    pub fn from_tables(tables: impl IntoIterator<Item = ModuleSymbols>) -> Self {
        let modules =
            tables.into_iter().map(|table| (table.module().to_string(), Some(table))).collect();
        Self { sources: Vec::new(), modules }
    }

    /// Resolve `addr` inside `module` to a method name.
    pub fn resolve(&mut self, module: &str, addr: u64) -> Option<String> {
        if !self.modules.contains_key(module) {
            let table = self.load_module(module);
            self.modules.insert(module.to_string(), table);
        }
        self.modules.get(module)?.as_ref()?.lookup(addr).map(str::to_owned)
    }

    /// Rewrite resolvable address frames of every event in place.
    pub fn symbolize_events(&mut self, events: &mut [Event]) -> SymbolizationStats {
        let mut stats = SymbolizationStats::default();
        for stack in events.iter_mut().filter_map(Event::stack_mut) {
            for frame in stack.iter_mut() {
                let FrameSymbol::Address(addr) = frame.symbol else {
                    stats.already_resolved += 1;
                    continue;
                };
                let name = frame.module.as_deref().and_then(|module| self.resolve(module, addr));
                match name {
                    Some(name) => {
                        frame.symbol = FrameSymbol::Method(name);
                        stats.resolved += 1;
                    }
                    None => stats.unresolved += 1,
                }
            }
        }
        info!(
            "Symbolization: {} resolved, {} unresolved ({:.1}% named)",
            stats.resolved,
            stats.unresolved,
            stats.coverage()
        );
        stats
    }

    fn load_module(&self, module: &str) -> Option<ModuleSymbols> {
        let file_name = cache_file_name(module);
        let path = self.sources.iter().map(|dir| dir.join(&file_name)).find(|p| p.is_file())?;
        match ModuleSymbols::from_file(&path) {
            Ok(table) => {
                info!("Loaded {} symbols for {module} from {}", table.len(), path.display());
                Some(table)
            }
            Err(e) => {
                warn!("Ignoring symbol cache: {e:#}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolization::SymbolRange;
    use threadscope_common::Frame;

    fn table() -> ModuleSymbols {
        ModuleSymbols::new(
            "msenv",
            vec![SymbolRange { address: 0x1000, size: 0x100, name: "MainMessageLoop::Run".into() }],
        )
    }

    #[test]
    fn test_symbolize_events_rewrites_frames() {
        let mut events = vec![
            Event::Sample {
                timestamp: 0.0,
                pid: 1,
                tid: 1,
                stack: vec![
                    Frame::method("user32", "GetMessageW"),
                    Frame::address(Some("msenv"), 0x1010),
                    Frame::address(Some("msenv"), 0x9000),
                    Frame::address(None, 0x1010),
                ],
            },
            Event::ReadyThread { timestamp: 1.0, awakened_tid: 1 },
        ];

        let mut symbolizer = Symbolizer::from_tables([table()]);
        let stats = symbolizer.symbolize_events(&mut events);

        assert_eq!(stats, SymbolizationStats { already_resolved: 1, resolved: 1, unresolved: 2 });
        let stack = events[0].stack().unwrap();
        assert_eq!(stack[1].signature(), "msenv!MainMessageLoop::Run");
        assert!(stack[2].is_unresolved());
        assert!((stats.coverage() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_loads_from_first_source_with_file() {
        let empty = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        std::fs::write(
            cache.path().join("msenv.sym.json"),
            r#"{ "module": "msenv", "symbols": [{ "address": 32, "size": 16, "name": "Idle" }] }"#,
        )
        .unwrap();

        let mut symbolizer =
            Symbolizer::new(vec![empty.path().to_path_buf(), cache.path().to_path_buf()]);
        assert_eq!(symbolizer.resolve("msenv", 40).as_deref(), Some("Idle"));
        assert_eq!(symbolizer.resolve("clr", 40), None);
    }

    #[test]
    fn test_coverage_with_no_frames() {
        assert!((SymbolizationStats::default().coverage() - 100.0).abs() < f64::EPSILON);
    }
}
