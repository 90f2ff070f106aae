use std::path::PathBuf;
use thiserror::Error;

/// Core error type for configuration resolution.
///
/// Every variant is a fatal startup condition: callers report the message
/// and abort, nothing is retried.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTPS=true requires {var} to be set in your environment")]
    MissingVariable { var: &'static str },

    #[error("You specified {var} in your env, but the file \"{path}\" can't be found")]
    FileNotFound { var: &'static str, path: PathBuf },

    #[error("The certificate \"{path}\" is invalid: {reason}")]
    InvalidCertificate { path: PathBuf, reason: String },

    #[error("The certificate key \"{path}\" is invalid: {reason}")]
    InvalidKey { path: PathBuf, reason: String },

    #[error("Failed to read {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{reason}")]
    InvalidProxy { reason: String },

    #[error("Something is already running on port {port}")]
    PortUnavailable { host: String, port: u16 },

    #[error("PORT must be a number between 1 and 65535, but it is set to \"{value}\"")]
    InvalidPort { value: String },

    #[error("Could not find a required file: {path}")]
    MissingRequiredFile { path: PathBuf },
}

impl ConfigError {
    /// `true` when the error names a missing environment variable rather
    /// than a bad file or artifact.
    #[must_use]
    pub fn is_missing_variable(&self) -> bool {
        matches!(self, Self::MissingVariable { .. })
    }
}
