/// Unified error handling for the statsink write path
///
/// This module provides the error type system covering discovery of cluster
/// nodes, connection management, batched writes, and configuration loading.
use std::fmt;
use thiserror::Error;

use crate::config::ConfigError;
use crate::sql::SqlError;

/// Main error type for statsink operations
#[derive(Debug, Error)]
pub enum SinkError {
    /// Coordinator unreachable or the node listing query failed
    #[error("discovery error: {message}")]
    Discovery { message: String },

    /// A specific node connection failed to open or died mid-use
    #[error("connection error: {message}")]
    Connection { message: String },

    /// A batch insert failed on an otherwise healthy connection
    #[error("write error: {message}")]
    Write { message: String },

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Raw transport errors surfaced without further classification
    #[error("sql error: {0}")]
    Sql(#[from] SqlError),

    /// Internal errors (should not happen in normal operation)
    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Result type alias for statsink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Convenience methods for creating specific error types
impl SinkError {
    /// Create a discovery error
    pub fn discovery<S: Into<String>>(message: S) -> Self {
        SinkError::Discovery {
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        SinkError::Connection {
            message: message.into(),
        }
    }

    /// Create a write error
    pub fn write<S: Into<String>>(message: S) -> Self {
        SinkError::Write {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        SinkError::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (future cycles may succeed)
    pub fn is_recoverable(&self) -> bool {
        match self {
            SinkError::Discovery { .. } => true,
            SinkError::Connection { .. } => true,
            SinkError::Write { .. } => true,
            SinkError::Sql(_) => true,
            SinkError::Config(_) => false,
            SinkError::Internal { .. } => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SinkError::Config(_) => ErrorSeverity::Critical,
            SinkError::Internal { .. } => ErrorSeverity::Critical,
            SinkError::Write { .. } => ErrorSeverity::Error,
            SinkError::Sql(_) => ErrorSeverity::Error,
            SinkError::Discovery { .. } => ErrorSeverity::Warning,
            SinkError::Connection { .. } => ErrorSeverity::Warning,
        }
    }
}

/// Error severity levels for logging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that require immediate attention
    Critical,
    /// Errors that affect functionality but don't crash the system
    Error,
    /// Warnings about potential issues
    Warning,
    /// Informational messages about recoverable issues
    Info,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Warning => write!(f, "WARNING"),
            ErrorSeverity::Info => write!(f, "INFO"),
        }
    }
}
