//! Core types for mediago-release-sdk.
//!
//! This module defines the types shared by every stage of the pipeline:
//!
//! - [`ReleaseError`] - Error type for build, packaging and install operations
//! - [`CommandFailure`] - Why a spawned command did not succeed
//! - [`PublishRequest`] - Validated opt-in for publishing to the npm registry

use std::fmt;
use std::path::PathBuf;

/// Default version used when `VERSION` is not set.
pub const DEFAULT_VERSION: &str = "0.0.0";

/// Error types for mediago-release-sdk operations.
///
/// Every variant carries enough context (command line, expected path or
/// missing variable) to diagnose the failure without reading the source.
///
/// # Example
///
/// ```ignore
/// use mediago_release_sdk::{HostPlatform, ReleaseError, detect_platform, platform_targets};
///
/// let targets = platform_targets();
/// match detect_platform(&HostPlatform::new("freebsd", "x64"), &targets) {
///     Err(ReleaseError::UnsupportedPlatform(os)) => eprintln!("no build for {os}"),
///     Err(e) => eprintln!("{e}"),
///     Ok(target) => println!("using {}", target.platform),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    /// A spawned process exited non-zero, was killed by a signal, or could
    /// not be started at all.
    #[error("Command \"{command}\" failed with {failure}")]
    CommandFailed {
        /// The full command line, program followed by its arguments.
        command: String,
        /// Exit code, terminating signal or spawn error.
        failure: CommandFailure,
    },

    /// A directory that an operation reads from does not exist.
    #[error("Source directory \"{}\" does not exist{}", .path.display(), format_hint(.hint))]
    SourceMissing {
        path: PathBuf,
        hint: Option<String>,
    },

    /// An expected binary is absent.
    #[error("Binary not found at {}{}", .path.display(), format_hint(.hint))]
    BinaryNotFound {
        path: PathBuf,
        hint: Option<String>,
    },

    /// The optional dependency for the host platform was not installed.
    #[error(
        "Could not find {package}. This package is required for {platform}.\n\
         Please run 'npm install' again to ensure all dependencies are installed."
    )]
    PlatformPackageMissing { package: String, platform: String },

    /// The host operating system has no entry in the platform registry.
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// The host operating system is known but its CPU architecture is not.
    #[error("Unsupported architecture: {arch} on {os}")]
    UnsupportedArchitecture { os: String, arch: String },

    /// A required environment variable or setting is absent.
    #[error("{name} is required ({hint})")]
    ConfigurationMissing { name: String, hint: String },

    /// Rendered template output still contains placeholders.
    #[error("Template {template} has unreplaced placeholders: {placeholders:?}")]
    Template {
        template: String,
        placeholders: Vec<String>,
    },

    /// A branch of a parallel task composition panicked.
    #[error("Task '{0}' panicked")]
    TaskPanicked(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}. Check file paths and permissions")]
    Io(#[from] std::io::Error),

    /// Generated JSON could not be parsed or written.
    #[error("serialization error: {0}. Check the package.json templates")]
    Serialization(#[from] serde_json::Error),
}

fn format_hint(hint: &Option<String>) -> String {
    match hint {
        Some(hint) => format!(". {hint}"),
        None => String::new(),
    }
}

impl ReleaseError {
    /// Shorthand for a `ConfigurationMissing` error.
    pub fn missing(name: impl Into<String>, hint: impl Into<String>) -> Self {
        ReleaseError::ConfigurationMissing {
            name: name.into(),
            hint: hint.into(),
        }
    }
}

/// Reason a spawned command did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandFailure {
    /// The process exited with a non-zero status code.
    ExitCode(i32),
    /// The process was terminated by a signal (Unix only).
    Signal(i32),
    /// The process could not be started, e.g. the executable was not found.
    Spawn(String),
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandFailure::ExitCode(code) => write!(f, "code {code}"),
            CommandFailure::Signal(signal) => write!(f, "signal {signal}"),
            CommandFailure::Spawn(reason) => write!(
                f,
                "spawn error: {reason}. Ensure the tool is installed and available on PATH"
            ),
        }
    }
}

/// A publish request that passed the opt-in guard.
///
/// Publishing needs both `PUBLISH=true` and an explicit `VERSION`. Anything
/// else is rejected so an assemble run can never publish by accident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub version: String,
}

impl PublishRequest {
    /// Validates the raw `VERSION` and `PUBLISH` values.
    pub fn from_values(version: Option<&str>, publish: Option<&str>) -> Result<Self, ReleaseError> {
        let version = match version.map(str::trim) {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => {
                return Err(ReleaseError::missing(
                    "VERSION",
                    "set VERSION to the release version, e.g. VERSION=1.2.3",
                ));
            }
        };
        if publish != Some("true") {
            return Err(ReleaseError::missing(
                "PUBLISH=true",
                "set PUBLISH=true to publish to the npm registry",
            ));
        }
        Ok(Self { version })
    }
}
