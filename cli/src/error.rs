//! Centralized error types for artifact-mirror
//!
//! Uses thiserror for typed errors that can be matched on,
//! while still being compatible with anyhow for propagation.

use std::time::Duration;
use thiserror::Error;

use crate::domain::replication::TransferStep;
use crate::infrastructure::ecr::LoginKind;

/// Configuration errors. Always fatal for the run.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Required configuration missing: {field}")]
    MissingField { field: String },

    #[error("Input file not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to read {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("Error fetching secret {secret}, check the name and make sure you have permissions: {message}")]
    SecretUnavailable { secret: String, message: String },

    #[error("Secret {secret} has no key {key}")]
    SecretKeyMissing { secret: String, key: String },
}

/// Locator evaluation errors. Recovered locally: the field is left alone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Invalid value path: {path:?}")]
    InvalidPath { path: String },

    #[error("Locator for {role} has no path")]
    MissingPath { role: String },

    #[error("Path {path} not found")]
    PathNotFound { path: String },

    #[error("Path {path} does not hold a scalar")]
    NotScalar { path: String },

    #[error("Subchart {subchart} was not fetched")]
    UnknownSubchart { subchart: String },
}

/// External command errors. Command text is always masked.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to run `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}: {stderr}", exit_status(.code))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` timed out after {}", format_timeout(.timeout))]
    TimedOut { command: String, timeout: Duration },

    #[error("Unexpected output from `{command}`: {message}")]
    InvalidOutput { command: String, message: String },
}

fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "signal".to_string(),
    }
}

fn format_timeout(timeout: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*timeout)
}

impl CommandError {
    /// True when the command ran and its stderr mentions `needle`
    pub fn stderr_contains(&self, needle: &str) -> bool {
        matches!(self, Self::Failed { stderr, .. } if stderr.contains(needle))
    }
}

/// Target registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Repository {name} already exists")]
    AlreadyExists { name: String },

    #[error("Repository {name} not found")]
    RepositoryNotFound { name: String },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Unexpected {operation} response: {message}")]
    UnexpectedResponse { operation: String, message: String },
}

/// Target registry login errors. Fatal for the whole batch.
#[derive(Error, Debug)]
pub enum LoginError {
    #[error("Could not obtain a registry password: {source}")]
    PasswordUnavailable {
        #[source]
        source: CommandError,
    },

    #[error("{kind} login to {registry} failed: {source}")]
    Rejected {
        kind: LoginKind,
        registry: String,
        #[source]
        source: CommandError,
    },
}

/// Per-task transfer errors. Recorded as a failed outcome, never raised.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("{step} failed: {source}")]
    Command {
        step: TransferStep,
        #[source]
        source: CommandError,
    },

    #[error("{step} failed: {source}")]
    Registry {
        step: TransferStep,
        #[source]
        source: RegistryError,
    },

    #[error("Failed to prepare a working directory: {0}")]
    Workspace(#[source] std::io::Error),
}

impl TransferError {
    pub fn command(step: TransferStep, source: CommandError) -> Self {
        Self::Command { step, source }
    }

    pub fn registry(step: TransferStep, source: RegistryError) -> Self {
        Self::Registry { step, source }
    }
}
