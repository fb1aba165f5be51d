use thiserror::Error;

/// Errors surfaced by the API client. The type is `Clone` because a single
/// token refresh result is fanned out to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("invalid response from server")]
    InvalidResponse,
    #[error("authorisation rejected (http 401)")]
    HttpUnauthorised,
    #[error("server returned http {0}")]
    HttpError(u16),
    #[error("failed to decode payload: {0}")]
    Decoding(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("secure storage error: {0}")]
    Credential(String),
    #[error("preferences storage error: {0}")]
    Storage(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}
