use thiserror::Error;

pub type Result<T> = std::result::Result<T, MapboxError>;

#[derive(Debug, Error)]
pub enum MapboxError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited by Mapbox")]
    RateLimited,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for MapboxError {
    fn from(err: reqwest::Error) -> Self {
        MapboxError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for MapboxError {
    fn from(err: serde_json::Error) -> Self {
        MapboxError::Parse(err.to_string())
    }
}
