use crate::error::ConfigError;
use crate::map::layers::WmsLayer;
use crate::map::map_tile::Coordinate;

pub const DEFAULT_GEOSERVER_URL: &str = "https://geoserver.scrd.gov.co/geoserver/Arcgis_online_DOGCC/wms";
pub const DEFAULT_BASE_TILE_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";
pub const DEFAULT_EXCLUDED_QUERY_LAYER: &str = "Arcgis_online_DOGCC:Localidades";

const WORKSPACE: &str = "Arcgis_online_DOGCC";
const LAYER_TITLES: [&str; 4] = [
    "Barrios por prioridad",
    "Barrios por tipo de programa",
    "Barrios total",
    "Localidades de Bogotá - Urbano",
];

/// Everything the viewer needs to know about where to fetch from and what to show
/// first. Defaults are the Bogotá GeoServer; individual values can be overridden
/// through the environment or a `.env` file.
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub geoserver_url: String,
    pub base_tile_url: String,
    pub tile_subdomains: Vec<String>,
    pub initial_center: Coordinate,
    pub initial_zoom: f32,
    pub max_zoom: f32,
    pub excluded_query_layer: String,
    pub layers: Vec<WmsLayer>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            geoserver_url: DEFAULT_GEOSERVER_URL.to_string(),
            base_tile_url: DEFAULT_BASE_TILE_URL.to_string(),
            tile_subdomains: vec!["a".into(), "b".into(), "c".into()],
            initial_center: Coordinate::new(4.664628, -74.064095),
            initial_zoom: 18.0,
            max_zoom: 21.0,
            excluded_query_layer: DEFAULT_EXCLUDED_QUERY_LAYER.to_string(),
            layers: default_layers(DEFAULT_GEOSERVER_URL),
        }
    }
}

fn default_layers(url: &str) -> Vec<WmsLayer> {
    LAYER_TITLES
        .iter()
        .map(|title| WmsLayer::new(url, format!("{}:{}", WORKSPACE, title), *title))
        .collect()
}

impl ViewerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup("GEOSERVER_WMS_URL") {
            config.layers = default_layers(&url);
            config.geoserver_url = url;
        }
        if let Some(url) = lookup("BASE_TILE_URL") {
            config.base_tile_url = url;
        }
        if let Some(layer) = lookup("EXCLUDED_QUERY_LAYER") {
            config.excluded_query_layer = layer;
        }

        let latitude = parse_number(&lookup, "INITIAL_LAT")?.unwrap_or(config.initial_center.latitude());
        let longitude = parse_number(&lookup, "INITIAL_LON")?.unwrap_or(config.initial_center.longitude());
        config.initial_center = Coordinate::new(latitude, longitude);

        if let Some(zoom) = parse_number(&lookup, "INITIAL_ZOOM")? {
            config.initial_zoom = (zoom as f32).clamp(0.0, config.max_zoom);
        }

        Ok(config)
    }
}

fn parse_number(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<f64>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber {
                key: key.to_string(),
                value,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_point_at_bogota() {
        let config = ViewerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.initial_zoom, 18.0);
        assert_eq!(config.initial_center, Coordinate::new(4.664628, -74.064095));
        assert_eq!(config.layers.len(), 4);
        assert_eq!(config.layers[3].layer_name, "Arcgis_online_DOGCC:Localidades de Bogotá - Urbano");
        assert_eq!(config.layers[3].display_name, "Localidades de Bogotá - Urbano");
    }

    #[test]
    fn overrides_apply_to_layers_and_view() {
        let config = ViewerConfig::from_lookup(lookup(&[
            ("GEOSERVER_WMS_URL", "http://localhost:8080/geoserver/wms"),
            ("INITIAL_LAT", "10.5"),
            ("INITIAL_ZOOM", "40"),
        ]))
        .unwrap();

        assert!(config.layers.iter().all(|l| l.url == "http://localhost:8080/geoserver/wms"));
        assert_eq!(config.initial_center, Coordinate::new(10.5, -74.064095));
        assert_eq!(config.initial_zoom, 21.0);
    }

    #[test]
    fn rejects_non_numeric_zoom() {
        let err = ViewerConfig::from_lookup(lookup(&[("INITIAL_ZOOM", "close")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                key: "INITIAL_ZOOM".into(),
                value: "close".into()
            }
        );
    }
}
