//! Environment file parsing
//!
//! Newline-delimited `KEY=VALUE` lines. Blank lines, `#` comments and lines
//! without `=` are skipped. Values keep everything after the first `=`,
//! with one pair of surrounding quotes removed.

use slashed_core::Result;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Parse environment-file content
pub fn parse(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), unquote(value.trim()).to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Read and parse an environment file
pub fn load<P: AsRef<Path>>(path: P) -> Result<HashMap<String, String>> {
    let content = fs::read_to_string(path)?;
    Ok(parse(&content))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_lines() {
        let vars = parse("FOO=bar\r\n\n# comment\nURL=postgres://u:p@h/db?a=b\nNOEQUALS\nQUOTED=\"hello world\"\n");

        assert_eq!(vars.get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(
            vars.get("URL").map(String::as_str),
            Some("postgres://u:p@h/db?a=b")
        );
        assert_eq!(vars.get("QUOTED").map(String::as_str), Some("hello world"));
        assert!(!vars.contains_key("NOEQUALS"));
        assert_eq!(vars.len(), 3);
    }

    #[test]
    fn test_empty_value() {
        let vars = parse("EMPTY=");
        assert_eq!(vars.get("EMPTY").map(String::as_str), Some(""));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "env=production").unwrap();

        let vars = load(file.path()).unwrap();
        assert_eq!(vars.get("env").map(String::as_str), Some("production"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path().join(".env")).is_err());
    }
}
