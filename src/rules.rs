//! Built-in standards rules
//!
//! A small line-oriented rule set so the binary is useful out of the box.
//! Anything implementing [`Validator`] can replace it.

use regex::Regex;
use std::path::Path;

use crate::violation::{Severity, ValidationError, Validator, Violation};

pub const DEFAULT_MAX_LINE_LENGTH: usize = 120;

pub struct StandardsValidator {
    secret: Regex,
    marker: Regex,
    trailing_whitespace: Regex,
    max_line_length: usize,
}

impl StandardsValidator {
    pub fn new() -> Result<Self, regex::Error> {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_line_length(max_line_length: usize) -> Result<Self, regex::Error> {
        Ok(Self {
            secret: Regex::new(
                r#"(?i)\b(api[_-]?key|secret|password|passwd|token)\b\s*[:=]\s*["'][^"'\s]{8,}["']"#,
            )?,
            marker: Regex::new(r"\b(TODO|FIXME|XXX)\b")?,
            trailing_whitespace: Regex::new(r"[ \t]+$")?,
            max_line_length,
        })
    }

    fn check_line(&self, number: usize, line: &str, violations: &mut Vec<Violation>) {
        if self.secret.is_match(line) {
            violations.push(
                Violation::new(
                    "hardcoded-secret",
                    Severity::Critical,
                    "Possible hardcoded credential",
                )
                .at_line(number),
            );
        }

        let length = line.chars().count();
        if length > self.max_line_length {
            violations.push(
                Violation::new(
                    "line-length",
                    Severity::Warning,
                    format!("Line is {} characters (limit {})", length, self.max_line_length),
                )
                .at_line(number),
            );
        }

        if let Some(found) = self.marker.find(line) {
            violations.push(
                Violation::new(
                    "unresolved-marker",
                    Severity::Info,
                    format!("Unresolved {} marker", found.as_str()),
                )
                .at_line(number),
            );
        }

        if self.trailing_whitespace.is_match(line) {
            violations.push(
                Violation::new(
                    "trailing-whitespace",
                    Severity::Suggestion,
                    "Trailing whitespace",
                )
                .at_line(number),
            );
        }
    }
}

impl Validator for StandardsValidator {
    fn validate(&self, path: &Path, content: &[u8]) -> Result<Vec<Violation>, ValidationError> {
        let text = std::str::from_utf8(content)
            .map_err(|_| ValidationError::Encoding(path.to_path_buf()))?;

        let mut violations = Vec::new();
        for (index, line) in text.lines().enumerate() {
            self.check_line(index + 1, line, &mut violations);
        }
        Ok(violations)
    }
}
