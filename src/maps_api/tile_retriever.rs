use crate::error::FetchError;
use crate::map::layers::WmsLayer;
use crate::map::map_tile::{MapTile, MercatorBounds, Raster, TileKey, TileSource};
use crate::maps_api::{fetch_bytes, wms};

/// Fetches and decodes base map tiles and WMS overlay tiles.
#[derive(Debug, Clone)]
pub struct TileRetriever {
    client: reqwest::Client,
    url_template: String,
    subdomains: Vec<String>,
    tile_size: u32,
}

impl TileRetriever {
    pub fn new(client: reqwest::Client, url_template: String, subdomains: Vec<String>, tile_size: u32) -> Self {
        Self {
            client,
            url_template,
            subdomains,
            tile_size,
        }
    }

    /// Base map URL, picking the subdomain from the tile position so the same
    /// tile always hits the same host.
    pub fn base_tile_url(&self, zoom: u32, x: u32, y: u32) -> String {
        let subdomain = if self.subdomains.is_empty() {
            ""
        } else {
            let index = ((x as usize) + (y as usize)) % self.subdomains.len();
            self.subdomains[index].as_str()
        };

        self.url_template
            .replace("{s}", subdomain)
            .replace("{z}", &zoom.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
    }

    /// Asynchronously fetches a tile and converts it into a MapTile.
    /// Overlay keys need their `layer`; base keys ignore it.
    pub async fn fetch_tile(&self, key: TileKey, layer: Option<&WmsLayer>) -> Result<MapTile, FetchError> {
        let url = match (key.source, layer) {
            (TileSource::Overlay(_), Some(layer)) => {
                let bounds = MercatorBounds::from_x_y_zoom(key.x, key.y, key.zoom);
                wms::get_map_url(layer, &bounds, self.tile_size)?
            }
            (TileSource::Overlay(index), None) => return Err(FetchError::MissingLayer(index)),
            (TileSource::Base, _) => url::Url::parse(&self.base_tile_url(key.zoom, key.x, key.y))?,
        };

        let bytes = fetch_bytes(&self.client, url).await?;
        let raster = Raster::decode(&bytes)?;

        Ok(MapTile::new(key, raster))
    }
}
