use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while turning a definition into an in-memory policy.
///
/// None of these are produced at request time: a definition that fails
/// here is never published.
#[derive(Debug, Error)]
pub enum Error {
    #[error("An error occurred deserializing policy definition: {0}.")]
    Deserializing(#[from] serde_json::Error),

    #[error("An error occurred validating policy definition: {0}.")]
    Validation(String),

    #[error("Invalid matcher pattern {pattern:?}: {reason}.")]
    InvalidPattern { pattern: String, reason: String },
}

/// Reasons a bearer token failed verification.
///
/// Every variant maps to a top-level deny.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("key set is empty")]
    EmptyKeySet,

    #[error("no verification key with kid {0}")]
    UnknownKey(String),

    #[error("no key in the set verifies the token")]
    NoMatchingKey,

    #[error("issuer mismatch: expected {expected}, got {actual:?}")]
    IssuerMismatch {
        expected: String,
        actual: Option<String>,
    },

    #[error("none of the token audiences is accepted")]
    AudienceMismatch,

    #[error("malformed claim: {0}")]
    MalformedClaim(String),
}
