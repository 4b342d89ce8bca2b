//! Error types for PharmaSentinel
//!
//! ## Table of Contents
//! - **SentinelError**: Main error enum covering all failure modes
//! - **Result**: Type alias for `Result<T, SentinelError>`

use thiserror::Error;

/// Result type alias for PharmaSentinel operations
pub type Result<T> = std::result::Result<T, SentinelError>;

/// Main error type for PharmaSentinel operations
#[derive(Error, Debug)]
pub enum SentinelError {
    /// Configuration error during builder setup
    #[error("configuration error: {0}")]
    Config(String),

    /// Evidence store failure
    #[error("store error: {0}")]
    Store(String),

    /// Transient external failure (network, rate limit, upstream 5xx)
    #[error("external error: {0}")]
    External(String),

    /// LLM returned output that could not be parsed as the expected JSON
    #[error("malformed llm output: {0}")]
    LlmMalformed(String),

    /// A single record is unprocessable (unknown drug id, bad reference)
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    /// Compare-and-set failure or duplicate in-flight trigger
    #[error("conflict: {0}")]
    Conflict(String),

    /// Agent-level failure contained at the agent boundary
    #[error("agent error: {0}")]
    Agent(String),

    /// Runtime not initialized or already stopped
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Generic IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SentinelError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a transient external error
    pub fn external(msg: impl Into<String>) -> Self {
        Self::External(msg.into())
    }

    /// Create a malformed-LLM-output error
    pub fn llm_malformed(msg: impl Into<String>) -> Self {
        Self::LlmMalformed(msg.into())
    }

    /// Create a data integrity error
    pub fn data_integrity(msg: impl Into<String>) -> Self {
        Self::DataIntegrity(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an agent error
    pub fn agent(msg: impl Into<String>) -> Self {
        Self::Agent(msg.into())
    }

    /// Create a runtime error
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Whether this failure is worth retrying.
    ///
    /// Only external-call failures qualify; a malformed LLM payload is
    /// handled by falling back to the deterministic path instead, and a
    /// `Conflict` must surface to the caller unretried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::External(_))
    }
}

impl From<reqwest::Error> for SentinelError {
    fn from(err: reqwest::Error) -> Self {
        Self::External(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SentinelError::external("timeout").is_transient());
        assert!(!SentinelError::llm_malformed("not json").is_transient());
        assert!(!SentinelError::conflict("already processing").is_transient());
        assert!(!SentinelError::data_integrity("unknown drug").is_transient());
    }
}
