use thiserror::Error;

/// Anything that can go wrong between issuing a request to the tile server or
/// GeoServer and having a usable value on the UI thread.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered with status {0}")]
    Status(reqwest::StatusCode),
    #[error("invalid JSON response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("could not decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("no WMS layer given for overlay {0}")]
    MissingLayer(usize),
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{key} must be a number, got {value:?}")]
    InvalidNumber { key: String, value: String },
}
