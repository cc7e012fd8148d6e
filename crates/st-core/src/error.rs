//! Error types for st-core

use thiserror::Error;

/// Core error type for Stratum
#[derive(Error, Debug)]
pub enum CoreError {
    /// S001: Failed to parse configuration file
    #[error("[S001] Failed to parse config {path}: {message}")]
    ConfigParseError { path: String, message: String },

    /// S002: Invalid configuration value
    #[error("[S002] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// S003: Migrations directory not found
    #[error("[S003] Migrations directory not found: {path}")]
    MigrationsDirNotFound { path: String },

    /// S004: Unit name does not follow `<timestamp>_<label>`
    #[error("[S004] Invalid migration name '{name}': {reason}")]
    InvalidUnitName { name: String, reason: String },

    /// S005: Migration file could not be read as UTF-8 text
    #[error("[S005] Migration file {path} is not valid UTF-8")]
    NonUtf8Unit { path: String },

    /// S006: Migration file is missing a required section marker
    #[error("[S006] Migration '{name}' is missing the '{marker}' section")]
    MissingSection { name: String, marker: &'static str },

    /// S007: Migration file has sections in the wrong order or repeated
    #[error("[S007] Migration '{name}' is malformed: {reason}")]
    MalformedUnit { name: String, reason: String },

    /// S008: Unknown run direction
    #[error("[S008] Invalid direction '{value}'. Use \"up\" or \"down\"")]
    InvalidDirection { value: String },

    /// IO error with file path context
    #[error("IO error at {path}: {source}")]
    IoWithPath {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
