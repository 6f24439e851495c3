//! Error types -- per-domain error definitions

/// meshprobe top-level error type
#[derive(Debug, thiserror::Error)]
pub enum MeshProbeError {
    /// Configuration error
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Cluster driver error
    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Traffic verification failure
    #[error("verification failed: {0}")]
    Verification(#[from] VerificationError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// Config could not be parsed
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// Invalid config value
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Cluster driver errors
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// A remote command failed or could not be spawned
    #[error("command failed: {0}")]
    CommandFailed(String),

    /// A remote command did not finish in time
    #[error("command timed out: {0}")]
    Timeout(String),

    /// Input rejected before reaching the cluster
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Traffic verification failures
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    /// A bounded poll exhausted its attempts
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    /// A remote probe or log fetch failed
    #[error("probe execution failed: {0}")]
    ProbeExecution(String),

    /// Observed traffic split outside tolerance
    #[error("distribution mismatch: {0}")]
    DistributionMismatch(String),

    /// Fault-injection latency or status mismatch
    #[error("fault assertion mismatch: {0}")]
    FaultAssertionMismatch(String),

    /// Expected marker absent from a response
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Run aborted (cancellation, unknown workload, invalid suite)
    #[error("aborted: {0}")]
    Aborted(String),
}
