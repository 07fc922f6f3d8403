use thiserror::Error;

/// Main error type for the steward core
#[derive(Error, Debug)]
pub enum StewardError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Feature disabled: {0}")]
    FeatureDisabled(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC timeout after {elapsed_ms}ms: {context}")]
    RpcTimeout { context: String, elapsed_ms: u64 },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Session errors
    #[error("No active session for {0}")]
    NoSession(String),

    #[error("Session expired for {0}")]
    SessionExpired(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Address parsing error: {0}")]
    AddressParsing(String),

    // Capability dispatch errors
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error("Capability {capability} failed: {reason}")]
    CapabilityFailure { capability: String, reason: String },

    // Submission errors
    #[error("Operation submission failed: {0}")]
    Submission(String),

    #[error("Bundler rejected operation: code {code}: {message}")]
    BundlerRejected { code: i64, message: String },

    // Crypto/signing errors
    #[error("Signer error: {0}")]
    Signer(String),

    #[error("Signature error: {0}")]
    Signature(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl StewardError {
    /// Whether a failed network call is worth retrying on a later cycle.
    ///
    /// Timeouts and transient server-side failures are retryable; quota,
    /// validation and not-found style rejections are not. The scheduler never
    /// retries within a cycle either way; the next tick simply tries again.
    pub fn is_retryable(&self) -> bool {
        match self {
            StewardError::RpcTimeout { .. } => true,
            StewardError::Rpc { code, .. } => is_transient_rpc_code(*code),
            StewardError::BundlerRejected { code, .. } => is_transient_rpc_code(*code),
            StewardError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Transient server-side JSON-RPC codes. `-32603` is "internal error" and
/// `-32000..=-32099` the server reserved range; parse, invalid-request and
/// invalid-params codes signal a malformed payload that will fail again.
fn is_transient_rpc_code(code: i64) -> bool {
    matches!(code, -32603 | -32099..=-32000)
}

/// Result type alias for StewardError
pub type Result<T> = std::result::Result<T, StewardError>;
