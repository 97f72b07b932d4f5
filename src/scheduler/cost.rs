//! Validation cost estimates from file extensions
//!
//! Costs are rough wall-clock guesses used only for ordering within a batch:
//! among equally important files, cheap ones go first.

use std::path::Path;

const MIB: f64 = 1024.0 * 1024.0;

/// Largest multiplier file size may contribute
pub const MAX_SIZE_FACTOR: f64 = 2.0;

/// Broad family of a file, by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    Compiled,
    Scripting,
    Markup,
    Config,
    Other,
}

impl FileClass {
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
            return FileClass::Other;
        };

        match ext {
            "rs" | "go" | "java" | "cs" | "cpp" | "cxx" | "cc" | "c" | "h" | "hpp" | "swift"
            | "kt" | "dart" => FileClass::Compiled,
            "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" | "py" | "rb" | "php" | "lua" | "sh"
            | "bash" | "r" | "R" | "sql" => FileClass::Scripting,
            "html" | "htm" | "css" | "scss" | "vue" | "md" | "markdown" | "xml" => {
                FileClass::Markup
            }
            "json" | "toml" | "yml" | "yaml" | "ini" => FileClass::Config,
            _ => FileClass::Other,
        }
    }

    /// Baseline validation cost for a typical file of this class
    pub fn baseline_ms(self) -> u64 {
        match self {
            FileClass::Compiled => 200,
            FileClass::Scripting => 120,
            FileClass::Markup => 80,
            FileClass::Config => 30,
            FileClass::Other => 100,
        }
    }
}

/// Size multiplier: `min(2.0, size / 1 MiB)`
pub fn size_factor(size_bytes: u64) -> f64 {
    (size_bytes as f64 / MIB).min(MAX_SIZE_FACTOR)
}

/// Estimated validation cost in milliseconds.
///
/// The size factor is added on top of the baseline rather than multiplied
/// alone, otherwise every small file would estimate to zero.
pub fn estimate_cost_ms(path: &Path, size_bytes: u64) -> u64 {
    let baseline = FileClass::from_path(path).baseline_ms() as f64;
    (baseline * (1.0 + size_factor(size_bytes))).round() as u64
}
