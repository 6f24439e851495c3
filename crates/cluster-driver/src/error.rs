//! Cluster driver error types
//!
//! [`ClusterDriverError`] covers every failure of a remote call or of
//! preparing one. `From<ClusterDriverError> for MeshProbeError` lets upper
//! layers propagate it with `?`.

use meshprobe_core::error::{ClusterError, MeshProbeError};

/// Maximum number of output bytes kept in an error message
const MAX_OUTPUT_IN_ERROR: usize = 1024;

/// Cluster driver domain error
#[derive(Debug, thiserror::Error)]
pub enum ClusterDriverError {
    /// The command ran and exited unsuccessfully
    #[error("command failed: {command}: {reason}: {output}")]
    CommandFailed {
        /// Command line as executed
        command: String,
        /// Exit status description
        reason: String,
        /// Combined stdout/stderr (truncated)
        output: String,
    },

    /// The command could not be started
    #[error("failed to spawn '{command}': {reason}")]
    Spawn {
        /// Command line
        command: String,
        /// OS error
        reason: String,
    },

    /// The command did not finish within the per-call timeout
    #[error("command timed out after {timeout_secs}s: {command}")]
    Timeout {
        /// Command line
        command: String,
        /// Timeout that elapsed
        timeout_secs: u64,
    },

    /// A resource name failed validation
    #[error("invalid {field} '{value}': {reason}")]
    InvalidName {
        /// Which name (namespace, instance, container, object)
        field: String,
        /// Offending value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// Driver output could not be decoded
    #[error("failed to decode driver output: {0}")]
    Decode(String),

    /// Policy document file could not be read
    #[error("policy load error: {path}: {reason}")]
    PolicyLoad {
        /// File path
        path: String,
        /// Failure reason
        reason: String,
    },

    /// Policy document is not a valid structured object
    #[error("policy '{name}' is invalid: {reason}")]
    PolicyParse {
        /// Object name
        name: String,
        /// Failure reason
        reason: String,
    },
}

impl ClusterDriverError {
    /// Builds a `CommandFailed` error, truncating oversized output.
    pub fn command_failed(
        command: impl Into<String>,
        reason: impl Into<String>,
        output: &str,
    ) -> Self {
        let output = output.trim();
        let output = if output.len() > MAX_OUTPUT_IN_ERROR {
            let mut end = MAX_OUTPUT_IN_ERROR;
            while !output.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &output[..end])
        } else {
            output.to_owned()
        };
        Self::CommandFailed {
            command: command.into(),
            reason: reason.into(),
            output,
        }
    }
}

impl From<ClusterDriverError> for MeshProbeError {
    fn from(err: ClusterDriverError) -> Self {
        match &err {
            ClusterDriverError::CommandFailed { .. }
            | ClusterDriverError::Spawn { .. }
            | ClusterDriverError::Decode(_) => {
                MeshProbeError::Cluster(ClusterError::CommandFailed(err.to_string()))
            }
            ClusterDriverError::Timeout { .. } => {
                MeshProbeError::Cluster(ClusterError::Timeout(err.to_string()))
            }
            ClusterDriverError::InvalidName { .. }
            | ClusterDriverError::PolicyLoad { .. }
            | ClusterDriverError::PolicyParse { .. } => {
                MeshProbeError::Cluster(ClusterError::InvalidInput(err.to_string()))
            }
        }
    }
}
