//! Environment capture and client-env harvesting.
//!
//! The process environment is snapshotted once at startup, merged over the
//! project's `.env` files, and passed around as a read-only value. Only
//! variables with an allowed prefix (plus a fixed set of well-known keys)
//! are exposed to client code.

use std::collections::BTreeMap;
use std::path::Path;

/// Prefixes that mark a variable as safe to inject into client code.
/// Matched case-insensitively.
const CLIENT_ENV_PREFIXES: [&str; 2] = ["REACT_APP_", "BAILY_APP_"];

/// Immutable snapshot of the environment, captured once per invocation.
///
/// Resolution logic only ever reads this snapshot; nothing in the core
/// crate touches `std::env` after capture.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvironmentSnapshot {
    /// Capture the live process environment merged over the project's
    /// `.env` files. Variables already set in the process always win.
    #[must_use]
    pub fn capture(root: &Path, mode: &str) -> Self {
        let mut vars = load_env_files(root, mode);
        vars.extend(
            std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
        );
        Self { vars }
    }

    /// Build a snapshot from explicit key-value pairs.
    #[must_use]
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            vars: vars.into_iter().collect(),
        }
    }

    /// Override a single variable.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// `true` when the variable is set to the literal string `"true"`.
    #[must_use]
    pub fn is_true(&self, key: &str) -> bool {
        self.get(key) == Some("true")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A value destined for injection into client code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvValue {
    Str(String),
    Bool(bool),
    /// The variable was not set; injected code sees the bare `undefined`
    /// token rather than a string.
    Undefined,
}

impl EnvValue {
    /// JSON-serialized form used for textual substitution into generated
    /// code: strings quoted and escaped, booleans bare, absent values as
    /// the `undefined` token.
    #[must_use]
    pub fn stringified(&self) -> String {
        match self {
            Self::Str(s) => serde_json::Value::String(s.clone()).to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Undefined => "undefined".to_string(),
        }
    }

    /// Plain display form used for `%KEY%` interpolation in the HTML shell.
    #[must_use]
    pub fn interpolated(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::Undefined => "undefined".to_string(),
        }
    }
}

/// The harvested set of variables exposed to client code.
///
/// Harvesting is pure: the same snapshot and public URL always produce the
/// same mappings, and the ordering is deterministic.
#[derive(Debug, Clone)]
pub struct ClientEnv {
    raw: BTreeMap<String, EnvValue>,
}

impl ClientEnv {
    /// Filter the snapshot down to prefix-matched variables and merge in
    /// the well-known keys with their defaults.
    #[must_use]
    pub fn harvest(snapshot: &EnvironmentSnapshot, public_url: &str) -> Self {
        let mut raw: BTreeMap<String, EnvValue> = BTreeMap::new();

        for (key, value) in snapshot.iter() {
            if has_client_prefix(key) {
                raw.insert(key.to_string(), EnvValue::Str(value.to_string()));
            }
        }

        raw.insert(
            "NODE_ENV".to_string(),
            EnvValue::Str(snapshot.get_or("NODE_ENV", "development").to_string()),
        );
        raw.insert(
            "PUBLIC_URL".to_string(),
            EnvValue::Str(public_url.to_string()),
        );
        for key in ["WDS_SOCKET_HOST", "WDS_SOCKET_PATH", "WDS_SOCKET_PORT"] {
            let value = snapshot
                .get(key)
                .map_or(EnvValue::Undefined, |v| EnvValue::Str(v.to_string()));
            raw.insert(key.to_string(), value);
        }
        // Hot refresh is on unless explicitly set to the literal "false".
        raw.insert(
            "FAST_REFRESH".to_string(),
            EnvValue::Bool(snapshot.get("FAST_REFRESH") != Some("false")),
        );

        Self { raw }
    }

    #[must_use]
    pub fn raw(&self) -> &BTreeMap<String, EnvValue> {
        &self.raw
    }

    /// `process.env.<KEY>` replacement targets mapped to JSON-serialized
    /// values, for textual substitution into generated code.
    #[must_use]
    pub fn stringified(&self) -> BTreeMap<String, String> {
        self.raw
            .iter()
            .map(|(key, value)| (format!("process.env.{key}"), value.stringified()))
            .collect()
    }

    /// `%KEY%` interpolation values for the served HTML shell.
    #[must_use]
    pub fn interpolations(&self) -> BTreeMap<String, String> {
        self.raw
            .iter()
            .map(|(key, value)| (key.clone(), value.interpolated()))
            .collect()
    }

    #[must_use]
    pub fn fast_refresh(&self) -> bool {
        matches!(self.raw.get("FAST_REFRESH"), Some(EnvValue::Bool(true)))
    }
}

fn has_client_prefix(key: &str) -> bool {
    CLIENT_ENV_PREFIXES.iter().any(|prefix| {
        key.get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    })
}

/// Parse a `.env` file's contents into key-value pairs.
///
/// Supports:
/// - `KEY=value` (unquoted)
/// - `KEY="value"` (double-quoted, with escape sequences)
/// - `KEY='value'` (single-quoted, literal)
/// - Comments (`#`) and blank lines are skipped
/// - Inline comments after unquoted values
#[must_use]
pub fn parse_env_file(content: &str) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();

    for line in content.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Split on first '='
        let Some(eq_pos) = line.find('=') else {
            continue;
        };

        let key = line[..eq_pos].trim();
        if key.is_empty() {
            continue;
        }

        // Skip `export ` prefix (common in .env files)
        let key = key.strip_prefix("export ").unwrap_or(key).trim();

        let raw_value = line[eq_pos + 1..].trim();

        let value = if raw_value.starts_with('"') {
            // Double-quoted: parse escape sequences
            parse_double_quoted(raw_value)
        } else if raw_value.starts_with('\'') {
            // Single-quoted: literal value
            parse_single_quoted(raw_value)
        } else {
            // Unquoted: trim inline comments
            parse_unquoted(raw_value)
        };

        env.insert(key.to_string(), value);
    }

    env
}

fn parse_double_quoted(raw: &str) -> String {
    // Strip leading quote
    let inner = &raw[1..];

    let mut result = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => {
                if let Some(escaped) = chars.next() {
                    match escaped {
                        'n' => result.push('\n'),
                        'r' => result.push('\r'),
                        't' => result.push('\t'),
                        '\\' => result.push('\\'),
                        '"' => result.push('"'),
                        other => {
                            result.push('\\');
                            result.push(other);
                        }
                    }
                }
            }
            _ => result.push(c),
        }
    }

    result
}

fn parse_single_quoted(raw: &str) -> String {
    // Strip leading quote, find closing quote
    let inner = &raw[1..];
    if let Some(end) = inner.find('\'') {
        inner[..end].to_string()
    } else {
        // No closing quote — take the rest
        inner.to_string()
    }
}

fn parse_unquoted(raw: &str) -> String {
    // Strip inline comments (` #` with preceding space)
    if let Some(comment_pos) = raw.find(" #") {
        raw[..comment_pos].trim_end().to_string()
    } else {
        raw.to_string()
    }
}

/// Load `.env` files from the project root for the given mode.
///
/// Files are loaded in order, later files overriding earlier ones:
/// 1. `.env`
/// 2. `.env.[mode]`
/// 3. `.env.local` (skipped when mode is `test`)
/// 4. `.env.[mode].local`
///
/// Missing files are not errors. Variables already set in the process
/// environment are layered on top by [`EnvironmentSnapshot::capture`].
#[must_use]
pub fn load_env_files(root: &Path, mode: &str) -> BTreeMap<String, String> {
    let mut files = vec![root.join(".env"), root.join(format!(".env.{mode}"))];
    if mode != "test" {
        files.push(root.join(".env.local"));
    }
    files.push(root.join(format!(".env.{mode}.local")));

    let mut env = BTreeMap::new();

    for file in &files {
        if let Ok(content) = std::fs::read_to_string(file) {
            env.extend(parse_env_file(&content));
        }
    }

    env
}
