pub mod geoserver;
pub mod tile_retriever;
pub mod wms;

use crate::error::FetchError;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client. OpenStreetMap rejects requests without a user agent.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|e| {
            log::warn!("Falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        })
}

/// GET `url` and return the body, treating any non-2xx status as an error.
pub(crate) async fn fetch_bytes(client: &reqwest::Client, url: url::Url) -> Result<Vec<u8>, FetchError> {
    log::debug!("GET {}", url);
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(FetchError::Status(response.status()));
    }

    Ok(response.bytes().await?.to_vec())
}
