//! File filtering logic for watcher operations
//!
//! This module decides which paths are worth validating based on extension
//! and ignore patterns.

use std::collections::HashSet;
use std::path::Path;

use crate::config::WatchConfig;
use crate::error::{Result, SentinelError};

/// Build set of supported file extensions
pub fn build_supported_extensions() -> HashSet<String> {
    [
        "rs", "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "java", "cs", "cpp", "cxx", "cc", "c",
        "h", "hpp", "go", "php", "rb", "swift", "kt", "lua", "sql", "html", "htm", "css", "scss",
        "vue", "sh", "bash", "dart", "r", "R",
        // Documentation and config files
        "md", "markdown", "json", "toml", "yml", "yaml", "ini", "xml",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Compile ignore patterns for files/directories to skip
pub fn build_ignore_patterns(patterns: &[String]) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p).map_err(|e| SentinelError::Pattern {
                pattern: p.clone(),
                message: e.to_string(),
            })
        })
        .collect()
}

/// Extension and ignore-pattern filter shared by the watcher and the initial scan
#[derive(Debug, Clone)]
pub struct WatchFilter {
    supported_extensions: HashSet<String>,
    ignore_patterns: Vec<glob::Pattern>,
}

impl WatchFilter {
    pub fn from_config(config: &WatchConfig) -> Result<Self> {
        let supported_extensions = if config.extensions.is_empty() {
            build_supported_extensions()
        } else {
            config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_string())
                .collect()
        };

        Ok(Self {
            supported_extensions,
            ignore_patterns: build_ignore_patterns(&config.ignore_patterns)?,
        })
    }

    /// Check whether a path has a supported extension and escapes every ignore pattern.
    ///
    /// Removed paths no longer exist on disk, so `require_file` is only set
    /// for creations and modifications.
    pub fn accepts(&self, path: &Path, require_file: bool) -> bool {
        if require_file && !path.is_file() {
            return false;
        }

        match path.extension().and_then(|s| s.to_str()) {
            Some(ext) if self.supported_extensions.contains(ext) => {}
            _ => return false,
        }

        !self.is_ignored(path)
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches(&path_str))
    }
}
