//! Textual usage search across the scanned tree.

use crate::config::EngineConfig;
use crate::core::EngineError;
use crate::io::FileWalker;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Every (file, 1-based line) occurrence of `name` as a whole word across
/// matching files.
pub fn find_all_usages(
    root: &Path,
    config: &EngineConfig,
    name: &str,
) -> Result<Vec<(PathBuf, usize)>, EngineError> {
    let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(name)))
        .map_err(|e| EngineError::Analysis(e.to_string()))?;
    let files = FileWalker::new(root.to_path_buf())
        .with_extensions(config.extensions.clone())
        .with_ignore_patterns(config.ignore_patterns.clone())
        .walk()
        .map_err(|e| EngineError::Analysis(e.to_string()))?;

    let mut usages = Vec::new();
    for path in files {
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("could not scan {} for usages: {}", path.display(), e);
                continue;
            }
        };
        for (idx, line) in content.lines().enumerate() {
            if pattern.is_match(line) {
                usages.push((path.clone(), idx + 1));
            }
        }
    }
    Ok(usages)
}
