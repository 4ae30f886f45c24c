//! Pluggable structural parsing, keyed by file extension.
//!
//! One parser per supported language. A parse failure on a single file is
//! a finding for the caller to record, never a reason to abort a scan.

pub mod configs;
pub mod rust;

pub use configs::{JsonParser, TomlParser, YamlParser};
pub use rust::RustParser;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// A function definition discovered in a source file, with the call
/// expressions found in its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    pub line: usize,
    pub calls: Vec<String>,
}

/// Structural facts extracted from one file.
#[derive(Debug, Clone, Default)]
pub struct ParsedSource {
    /// Referenced modules, dotted (`crate.graph.builder`, `serde.Serialize`).
    pub imports: Vec<String>,
    pub functions: Vec<FunctionDef>,
}

pub trait StructuralParser: Send + Sync {
    fn language(&self) -> &'static str;

    /// Parse the structural representation of `source`. `Err` carries a
    /// human-readable reason; the file is then structurally invalid.
    fn parse(&self, source: &str) -> Result<ParsedSource, String>;
}

/// Extension-keyed parser lookup shared by the scanner, the preflight
/// validator, and post-apply verification.
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn StructuralParser>>,
}

impl ParserRegistry {
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("rs", Arc::new(RustParser));
        registry.register("json", Arc::new(JsonParser));
        registry.register("toml", Arc::new(TomlParser));
        registry.register("yaml", Arc::new(YamlParser));
        registry.register("yml", Arc::new(YamlParser));
        registry
    }

    pub fn register(&mut self, extension: &str, parser: Arc<dyn StructuralParser>) {
        self.parsers.insert(extension.to_string(), parser);
    }

    pub fn get(&self, extension: &str) -> Option<&Arc<dyn StructuralParser>> {
        self.parsers.get(extension)
    }

    pub fn for_path(&self, path: &Path) -> Option<&Arc<dyn StructuralParser>> {
        path.extension()
            .and_then(|ext| self.get(&ext.to_string_lossy()))
    }

    /// Structural validity of `source` for `path`. `None` means no parser
    /// covers the extension, so validity is not determinable.
    pub fn validate(&self, path: &Path, source: &str) -> Option<Result<(), String>> {
        self.for_path(path)
            .map(|parser| parser.parse(source).map(|_| ()))
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn registry_routes_by_extension() {
        let registry = ParserRegistry::with_defaults();
        assert!(registry.for_path(&PathBuf::from("a.rs")).is_some());
        assert!(registry.for_path(&PathBuf::from("a.toml")).is_some());
        assert!(registry.for_path(&PathBuf::from("a.unknown")).is_none());
    }

    #[test]
    fn validity_not_determinable_without_parser() {
        let registry = ParserRegistry::with_defaults();
        assert!(registry
            .validate(&PathBuf::from("notes.txt"), "anything")
            .is_none());
    }

    #[test]
    fn validity_verdicts() {
        let registry = ParserRegistry::with_defaults();
        assert!(registry
            .validate(&PathBuf::from("a.rs"), "fn main() {}")
            .unwrap()
            .is_ok());
        assert!(registry
            .validate(&PathBuf::from("a.rs"), "fn main( {")
            .unwrap()
            .is_err());
    }
}
