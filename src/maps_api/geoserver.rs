use crate::error::FetchError;
use crate::map::feature::FeatureCollection;
use crate::map::layers::WmsLayer;
use crate::map::map_tile::Raster;
use crate::maps_api::wms::{self, FeatureInfoRequest};
use crate::maps_api::fetch_bytes;

/// Client for the attribute, feature-info and legend requests against GeoServer.
#[derive(Debug, Clone)]
pub struct GeoServerClient {
    client: reqwest::Client,
}

impl GeoServerClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Every feature of `layer` through WFS `GetFeature`.
    pub async fn fetch_features(&self, layer: &WmsLayer) -> Result<FeatureCollection, FetchError> {
        let url = wms::get_feature_url(layer)?;
        let bytes = fetch_bytes(&self.client, url).await?;
        Ok(FeatureCollection::from_slice(&bytes)?)
    }

    pub async fn fetch_feature_info(&self, request: &FeatureInfoRequest) -> Result<FeatureCollection, FetchError> {
        let url = request.url()?;
        let bytes = fetch_bytes(&self.client, url).await?;
        Ok(FeatureCollection::from_slice(&bytes)?)
    }

    pub async fn fetch_legend(&self, layer: &WmsLayer) -> Result<Raster, FetchError> {
        let url = wms::legend_url(layer)?;
        let bytes = fetch_bytes(&self.client, url).await?;
        Raster::decode(&bytes)
    }
}
