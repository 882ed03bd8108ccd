//! Error types for the Mimir domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum, and every variant carries a
//! stable machine-readable [`code`](Error::code) for the web layer.

use thiserror::Error;

/// The top-level error type for all Mimir operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Face service errors ---
    #[error("Face service error: {0}")]
    FaceService(#[from] FaceServiceError),

    // --- Storage errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Authentication errors ---
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    // --- Session errors ---
    #[error("Session rejected: {0}")]
    Session(#[from] SessionError),

    // --- Knowledge source errors ---
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    // --- Chat errors ---
    #[error("Chat failed: {0}")]
    Chat(#[from] ChatError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable reason code for the surrounding interface.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Provider(e) => e.code(),
            Self::FaceService(e) => e.code(),
            Self::Store(e) => e.code(),
            Self::Auth(e) => e.code(),
            Self::Session(e) => e.code(),
            Self::Source(e) => e.code(),
            Self::Chat(e) => e.code(),
            Self::Config { .. } => "configuration_error",
            Self::Serialization(_) => "serialization_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ApiError { .. } => "provider_api_error",
            Self::RateLimited { .. } => "provider_rate_limited",
            Self::AuthenticationFailed(_) => "provider_auth_failed",
            Self::ModelNotFound(_) => "provider_model_not_found",
            Self::NotConfigured(_) => "provider_not_configured",
            Self::Timeout(_) => "provider_timeout",
            Self::Network(_) => "provider_network_error",
            Self::InvalidResponse(_) => "provider_invalid_response",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum FaceServiceError {
    #[error("Face service unreachable: {0}")]
    Unreachable(String),

    #[error("Face service returned {status_code}: {message}")]
    BadResponse { status_code: u16, message: String },

    #[error("Image could not be decoded: {0}")]
    InvalidImage(String),
}

impl FaceServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "face_service_unreachable",
            Self::BadResponse { .. } => "face_service_error",
            Self::InvalidImage(_) => "invalid_image",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Storage(_) => "storage_error",
            Self::QueryFailed(_) => "query_failed",
            Self::MigrationFailed(_) => "migration_failed",
            Self::InvalidRecord(_) => "invalid_record",
        }
    }
}

/// Reasons a photo did not yield an authenticated identity, plus the
/// administrative registration failures.
///
/// Matching rejections are terminal: the caller must submit a new photo.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No usable face detected in the submitted image")]
    NoFaceDetected,

    #[error("Face did not match any registered identity")]
    NoMatch,

    #[error("Face matched more than one registered identity")]
    AmbiguousMatch,

    #[error("Role is not configured: {0}")]
    UnknownRole(String),

    #[error("Identity field must not be empty: {0}")]
    EmptyIdentity(&'static str),

    #[error(transparent)]
    FaceService(#[from] FaceServiceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The credential could not be minted
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoFaceDetected => "no_face_detected",
            Self::NoMatch => "no_match",
            Self::AmbiguousMatch => "ambiguous_match",
            Self::UnknownRole(_) => "unknown_role",
            Self::EmptyIdentity(_) => "empty_identity",
            Self::FaceService(e) => e.code(),
            Self::Store(e) => e.code(),
            Self::Session(e) => e.code(),
        }
    }

    /// True for the three matching outcomes that require a new photo.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::NoFaceDetected | Self::NoMatch | Self::AmbiguousMatch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Session has expired")]
    Expired,

    #[error("Session credential is invalid: {0}")]
    Invalid(String),

    #[error("Session has been logged out")]
    Revoked,
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Expired => "session_expired",
            Self::Invalid(_) => "session_invalid",
            Self::Revoked => "session_revoked",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("Source '{collection}' unavailable: {reason}")]
    SourceUnavailable { collection: String, reason: String },
}

impl SourceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "source_unavailable",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ChatError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Completion service unavailable: {reason}")]
    UpstreamUnavailable { reason: String, retryable: bool },
}

impl ChatError {
    pub fn upstream(reason: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            reason: reason.into(),
            retryable: true,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Session(e) => e.code(),
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Session(_) => false,
            Self::UpstreamUnavailable { retryable, .. } => *retryable,
        }
    }
}
