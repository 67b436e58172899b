//! CLI-specific error types
//!
//! All CLI errors are fatal: the process prints the error and exits
//! non-zero.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::errors::MutationError;
use crate::store::StoreError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdout, sockets)
    IoError,
    /// Journal already exists
    AlreadyInitialized,
    /// Journal missing
    NotInitialized,
    /// Store failed to open or replay
    StoreError,
    /// Lookup or mutation failed
    CommandFailed,
    /// One or more chains violate their invariants
    VerificationFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "REVCHAIN_CLI_CONFIG_ERROR",
            Self::IoError => "REVCHAIN_CLI_IO_ERROR",
            Self::AlreadyInitialized => "REVCHAIN_CLI_ALREADY_INITIALIZED",
            Self::NotInitialized => "REVCHAIN_CLI_NOT_INITIALIZED",
            Self::StoreError => "REVCHAIN_CLI_STORE_ERROR",
            Self::CommandFailed => "REVCHAIN_CLI_COMMAND_FAILED",
            Self::VerificationFailed => "REVCHAIN_CLI_VERIFICATION_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn already_initialized() -> Self {
        Self::new(
            CliErrorCode::AlreadyInitialized,
            "Journal already exists in data directory",
        )
    }

    pub fn not_initialized() -> Self {
        Self::new(
            CliErrorCode::NotInitialized,
            "Journal not found. Run 'revchain init' first.",
        )
    }

    pub fn verification_failed(violations: usize) -> Self {
        Self::new(
            CliErrorCode::VerificationFailed,
            format!("{} invariant violation(s) found", violations),
        )
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        Self::new(CliErrorCode::StoreError, e.to_string())
    }
}

impl From<MutationError> for CliError {
    fn from(e: MutationError) -> Self {
        Self::new(CliErrorCode::CommandFailed, format!("{}: {}", e.code(), e))
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
