//! Lookup expressions
//!
//! A key containing a colon is an expression rather than a plain setting
//! name. Alternatives are separated by `|` and tried left to right:
//!
//! ```text
//! env:DATABASE_URL|config:database.url|local.db
//! ```
//!
//! Each alternative is `method:argument` or a bare literal. The argument is
//! everything after the first colon, so `path:C:/data` resolves `C:/data`.
//! A literal therefore cannot contain a colon.

use std::fmt;

/// Whether a key must be solved instead of looked up
pub fn is_solvable(key: &str) -> bool {
    key.contains(':')
}

/// One alternative of an expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Environment-file entry
    Env(String),
    /// Path resolved against the base directory
    Path(String),
    /// Recursive configuration lookup
    Config(String),
    /// Immediate answer
    Literal(String),
    /// Method nobody understands; always undefined
    Unknown {
        /// Method name
        method: String,
        /// Argument text
        argument: String,
    },
}

impl Source {
    fn parse(alternative: &str) -> Self {
        match alternative.split_once(':') {
            Some(("env", key)) => Source::Env(key.to_string()),
            Some(("path", path)) => Source::Path(path.to_string()),
            Some(("config", key)) => Source::Config(key.to_string()),
            Some((method, argument)) => Source::Unknown {
                method: method.to_string(),
                argument: argument.to_string(),
            },
            None => Source::Literal(alternative.to_string()),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Env(key) => write!(f, "env:{key}"),
            Source::Path(path) => write!(f, "path:{path}"),
            Source::Config(key) => write!(f, "config:{key}"),
            Source::Literal(value) => f.write_str(value),
            Source::Unknown { method, argument } => write!(f, "{method}:{argument}"),
        }
    }
}

/// Parsed fallback chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    alternatives: Vec<Source>,
}

impl Expr {
    /// Parse a solvable key; `None` for plain setting names
    pub fn parse(key: &str) -> Option<Self> {
        if !is_solvable(key) {
            return None;
        }

        Some(Self {
            alternatives: key.split('|').map(Source::parse).collect(),
        })
    }

    /// Alternatives in evaluation order
    pub fn alternatives(&self) -> &[Source] {
        &self.alternatives
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, source) in self.alternatives.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{source}")?;
        }
        Ok(())
    }
}
