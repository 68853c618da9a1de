//! Glob pattern compilation: `*` matches one path segment, `**` matches any
//! suffix (including zero segments) and must be the final token.
//!
//! Grounded on `kairos-rs::utils::route_matcher`'s compile-to-regex
//! approach, generalized from `{param}` capture groups to the `*`/`**`
//! grammar `spec.md` §4.1 specifies.

use regex::Regex;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PatternError {
    #[error("'**' must be the final path segment in pattern: {0}")]
    DoubleStarNotFinal(String),
    #[error("regex compilation failed for pattern {0}: {1}")]
    RegexError(String, String),
}

/// A compiled glob pattern, cheap to clone and share.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Arc<Regex>,
}

impl Pattern {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Compiles a glob pattern into a matcher. Returns an error if `**`
/// appears anywhere but as the last segment.
pub fn compile(pattern: &str) -> Result<Pattern, PatternError> {
    let segments: Vec<&str> = pattern.split('/').collect();

    for (i, segment) in segments.iter().enumerate() {
        if *segment == "**" && i != segments.len() - 1 {
            return Err(PatternError::DoubleStarNotFinal(pattern.to_string()));
        }
    }

    let mut regex_pattern = String::with_capacity(pattern.len() * 2 + 2);
    regex_pattern.push('^');

    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            regex_pattern.push('/');
        }
        match *segment {
            "**" => {
                // Trailing "/**" matches zero or more following segments,
                // including the empty suffix (`/api/**` matches `/api`).
                if i > 0 {
                    regex_pattern.pop(); // drop the '/' we just pushed
                    regex_pattern.push_str("(?:/.*)?");
                } else {
                    regex_pattern.push_str(".*");
                }
            }
            "*" => regex_pattern.push_str("[^/]+"),
            literal => {
                for ch in literal.chars() {
                    if matches!(
                        ch,
                        '.' | '?' | '+' | '^' | '$' | '[' | ']' | '(' | ')' | '|' | '\\' | '*'
                    ) {
                        regex_pattern.push('\\');
                    }
                    regex_pattern.push(ch);
                }
            }
        }
    }

    regex_pattern.push('$');

    let regex = Regex::new(&regex_pattern)
        .map_err(|e| PatternError::RegexError(pattern.to_string(), e.to_string()))?;

    Ok(Pattern {
        source: pattern.to_string(),
        regex: Arc::new(regex),
    })
}
