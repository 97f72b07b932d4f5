//! Priority assignment for changed paths
//!
//! Base priority 1; +2 for source roots, +1 for configuration, +1 for newly
//! added files, -1 for tests. Never below 1.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};

use crate::config::ClassifyConfig;
use crate::error::{Result, SentinelError};
use crate::watcher::ChangeKind;

pub const MIN_PRIORITY: u32 = 1;

const SOURCE_BONUS: i64 = 2;
const CONFIG_BONUS: i64 = 1;
const ADDED_BONUS: i64 = 1;
const TEST_PENALTY: i64 = 1;

fn build_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| SentinelError::Pattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| SentinelError::Pattern {
        pattern: patterns.join(", "),
        message: e.to_string(),
    })
}

/// Classifies paths relative to the watched root
#[derive(Debug, Clone)]
pub struct PathClassifier {
    root: Option<PathBuf>,
    source: GlobSet,
    config: GlobSet,
    test: GlobSet,
}

impl PathClassifier {
    pub fn new(config: &ClassifyConfig, root: Option<PathBuf>) -> Result<Self> {
        Ok(Self {
            root,
            source: build_set(&config.source_patterns)?,
            config: build_set(&config.config_patterns)?,
            test: build_set(&config.test_patterns)?,
        })
    }

    fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        match &self.root {
            Some(root) => path.strip_prefix(root).unwrap_or(path),
            None => path,
        }
    }

    pub fn is_source(&self, path: &Path) -> bool {
        self.source.is_match(self.relative(path))
    }

    pub fn is_config(&self, path: &Path) -> bool {
        self.config.is_match(self.relative(path))
    }

    pub fn is_test(&self, path: &Path) -> bool {
        self.test.is_match(self.relative(path))
    }

    pub fn priority(&self, path: &Path, kind: ChangeKind) -> u32 {
        let mut priority: i64 = 1;
        if self.is_source(path) {
            priority += SOURCE_BONUS;
        }
        if self.is_config(path) {
            priority += CONFIG_BONUS;
        }
        if kind == ChangeKind::Added {
            priority += ADDED_BONUS;
        }
        if self.is_test(path) {
            priority -= TEST_PENALTY;
        }
        priority.max(MIN_PRIORITY as i64) as u32
    }
}
