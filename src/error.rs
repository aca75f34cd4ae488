use thiserror::Error;

/// Errors raised by a [`Store`](crate::cache::Store) implementation.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache value could not be (de)serialized: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unexpected shape for {key}: {reason}")]
    Shape { key: String, reason: String },
}

impl CacheError {
    pub fn shape(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Shape {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by the remote inbox API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server responded with HTTP {0}")]
    Status(u16),
    #[error("graphql error: {0}")]
    Graphql(String),
    #[error("response is missing `{0}`")]
    MissingData(&'static str),
    #[error("response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A subscription transport failure. Reconnection is owned by the transport.
#[derive(Debug, Clone, Error)]
#[error("subscription transport error: {0}")]
pub struct TransportError(pub String);

/// Umbrella error for operations that touch both the cache and the API.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("no user is signed in")]
    NotSignedIn,
}
