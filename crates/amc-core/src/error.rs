use thiserror::Error;

/// Caller-visible error taxonomy shared by every CORE component.
///
/// Transport layers (HTTP/CLI framing) map these onto their own status
/// codes; the CORE itself never encodes a wire format.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("integrity error: {0}")]
    IntegrityError(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error (trace_id={trace_id}): {message}")]
    Internal { trace_id: String, message: String },
}

impl CoreError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            trace_id: uuid::Uuid::new_v4().to_string(),
            message: message.into(),
        }
    }

    /// Stable kind string for logging/metrics, never leaking `Internal`'s message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::PermissionDenied(_) => "permission_denied",
            Self::Conflict(_) => "conflict",
            Self::IntegrityError(_) => "integrity_error",
            Self::ResourceExhausted(_) => "resource_exhausted",
            Self::Unavailable(_) => "unavailable",
            Self::Internal { .. } => "internal",
        }
    }
}
