//! Request URLs for the OGC services GeoServer exposes. Nothing here touches the
//! network, so every builder is a plain function of its inputs.

use url::Url;

use crate::map::layers::WmsLayer;
use crate::map::map_tile::{GeoBounds, MercatorBounds};

/// WMS `GetMap` for one overlay tile in EPSG:3857.
pub fn get_map_url(layer: &WmsLayer, bounds: &MercatorBounds, tile_size: u32) -> Result<Url, url::ParseError> {
    let size = tile_size.to_string();
    Url::parse_with_params(
        &layer.url,
        &[
            ("service", "WMS"),
            ("request", "GetMap"),
            ("version", "1.1.1"),
            ("layers", layer.layer_name.as_str()),
            ("styles", ""),
            ("format", "image/png"),
            ("transparent", "true"),
            ("srs", "EPSG:3857"),
            ("width", size.as_str()),
            ("height", size.as_str()),
            ("bbox", bounds.to_bbox_string().as_str()),
        ],
    )
}

pub fn legend_url(layer: &WmsLayer) -> Result<Url, url::ParseError> {
    Url::parse_with_params(
        &layer.url,
        &[
            ("REQUEST", "GetLegendGraphic"),
            ("VERSION", "1.0.0"),
            ("FORMAT", "image/png"),
            ("LAYER", layer.layer_name.as_str()),
        ],
    )
}

/// WFS `GetFeature` for every feature of the layer, as GeoJSON.
pub fn get_feature_url(layer: &WmsLayer) -> Result<Url, url::ParseError> {
    Url::parse_with_params(
        &layer.url,
        &[
            ("service", "WFS"),
            ("version", "1.1.0"),
            ("request", "GetFeature"),
            ("typeName", layer.layer_name.as_str()),
            ("outputFormat", "application/json"),
        ],
    )
}

/// What the answer to a feature-info query is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPurpose {
    /// Single click: show the attributes in a popup.
    Popup,
    /// Double click: highlight the geometry and the table row.
    Highlight,
}

impl QueryPurpose {
    fn format(self) -> &'static str {
        match self {
            QueryPurpose::Popup => "image/png",
            QueryPurpose::Highlight => "application/json",
        }
    }
}

/// WMS 1.1.1 `GetFeatureInfo` at a pixel of the current map view.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureInfoRequest {
    pub service_url: String,
    pub query_layers: String,
    pub bbox: GeoBounds,
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
    pub purpose: QueryPurpose,
}

impl FeatureInfoRequest {
    pub fn url(&self) -> Result<Url, url::ParseError> {
        let (width, height) = (self.width.to_string(), self.height.to_string());
        let (x, y) = (self.x.to_string(), self.y.to_string());

        Url::parse_with_params(
            &self.service_url,
            &[
                ("request", "GetFeatureInfo"),
                ("service", "WMS"),
                ("srs", "EPSG:4326"),
                ("styles", ""),
                ("version", "1.1.1"),
                ("format", self.purpose.format()),
                ("transparent", "true"),
                ("bbox", self.bbox.to_bbox_string().as_str()),
                ("height", height.as_str()),
                ("width", width.as_str()),
                ("layers", self.query_layers.as_str()),
                ("query_layers", self.query_layers.as_str()),
                ("info_format", "application/json"),
                ("x", x.as_str()),
                ("y", y.as_str()),
            ],
        )
    }
}
