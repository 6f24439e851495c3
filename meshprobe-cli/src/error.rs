//! CLI-specific error types and exit code mapping

use meshprobe_core::error::MeshProbeError;
use meshprobe_verifier::VerifierError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// A verification check failed or could not complete.
    #[error("verification failed: {0}")]
    Verification(VerifierError),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from meshprobe-core.
    #[error("{0}")]
    Core(#[from] MeshProbeError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                    |
    /// |------|----------------------------|
    /// | 0    | Success                    |
    /// | 1    | Check failed / command error |
    /// | 2    | Configuration error        |
    /// | 10   | IO error                   |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Io(_) => 10,
            Self::Core(MeshProbeError::Config(_)) => 2,
            Self::Core(MeshProbeError::Io(_)) => 10,
            Self::Command(_) | Self::Verification(_) | Self::JsonSerialize(_) | Self::Core(_) => 1,
        }
    }
}

impl From<VerifierError> for CliError {
    fn from(e: VerifierError) -> Self {
        match e {
            VerifierError::Config(reason) => Self::Config(reason),
            other => Self::Verification(other),
        }
    }
}
