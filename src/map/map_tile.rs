use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Edge length of a slippy map tile, in pixels.
pub const TILE_SIZE: f64 = 256.0;

/// Latitude at which the Web Mercator square ends.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

const EARTH_RADIUS: f64 = 6_378_137.0;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Default for Coordinate {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// A position in the Web Mercator pixel plane of a given zoom level.
/// (0, 0) is the north-west corner of the world.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PixelCoordinate {
    pub x: f64,
    pub y: f64,
}

impl PixelCoordinate {
    pub fn from_coordinate(coordinate: Coordinate, zoom: f64) -> Self {
        let scale = world_size(zoom);
        let lat = coordinate.latitude.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        let sin_lat = lat.to_radians().sin();

        Self {
            x: (coordinate.longitude + 180.0) / 360.0 * scale,
            y: (0.5 - ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() / (4.0 * PI)) * scale,
        }
    }

    pub fn to_coordinate(self, zoom: f64) -> Coordinate {
        let scale = world_size(zoom);
        let n = PI - 2.0 * PI * self.y / scale;

        Coordinate {
            latitude: n.sinh().atan().to_degrees(),
            longitude: self.x / scale * 360.0 - 180.0,
        }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Side of the whole world in pixels at `zoom`.
pub fn world_size(zoom: f64) -> f64 {
    TILE_SIZE * 2.0_f64.powf(zoom)
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    south: f64, // minimum latitude
    west: f64,  // minimum longitude
    north: f64, // maximum latitude
    east: f64,  // maximum longitude
}

impl GeoBounds {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    /// Smallest bounds holding every coordinate, `None` for an empty iterator.
    pub fn from_coordinates(coordinates: impl IntoIterator<Item = Coordinate>) -> Option<Self> {
        let mut coordinates = coordinates.into_iter();
        let first = coordinates.next()?;
        let mut bounds = Self::new(first.latitude, first.longitude, first.latitude, first.longitude);
        for coordinate in coordinates {
            bounds.extend(coordinate);
        }
        Some(bounds)
    }

    #[cfg(test)]
    pub fn south(&self) -> f64 {
        self.south
    }

    #[cfg(test)]
    pub fn west(&self) -> f64 {
        self.west
    }

    #[cfg(test)]
    pub fn north(&self) -> f64 {
        self.north
    }

    #[cfg(test)]
    pub fn east(&self) -> f64 {
        self.east
    }

    pub fn center(&self) -> Coordinate {
        Coordinate {
            latitude: (self.south + self.north) / 2.0,
            longitude: (self.west + self.east) / 2.0,
        }
    }

    pub fn extend(&mut self, coordinate: Coordinate) {
        self.south = self.south.min(coordinate.latitude);
        self.north = self.north.max(coordinate.latitude);
        self.west = self.west.min(coordinate.longitude);
        self.east = self.east.max(coordinate.longitude);
    }

    pub fn contains(&self, coordinate: Coordinate) -> bool {
        self.south <= coordinate.latitude
            && coordinate.latitude <= self.north
            && self.west <= coordinate.longitude
            && coordinate.longitude <= self.east
    }

    /// `west,south,east,north`, the order WMS 1.1.1 expects for EPSG:4326.
    pub fn to_bbox_string(&self) -> String {
        format!("{},{},{},{}", self.west, self.south, self.east, self.north)
    }

    /// Highest integer zoom at which these bounds fit inside `viewport` pixels.
    pub fn fit_zoom(&self, viewport: egui::Vec2, max_zoom: f32) -> f32 {
        let north_west = Coordinate::new(self.north, self.west);
        let south_east = Coordinate::new(self.south, self.east);
        let mut zoom = max_zoom.floor().max(0.0);

        while zoom > 0.0 {
            let nw = PixelCoordinate::from_coordinate(north_west, zoom as f64);
            let se = PixelCoordinate::from_coordinate(south_east, zoom as f64);
            if (se.x - nw.x).abs() <= viewport.x as f64 && (se.y - nw.y).abs() <= viewport.y as f64 {
                break;
            }
            zoom -= 1.0;
        }

        zoom
    }
}

/// Bounds in EPSG:3857 metres, used for WMS `GetMap` tiles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MercatorBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl MercatorBounds {
    pub fn from_x_y_zoom(x: u32, y: u32, zoom: u32) -> Self {
        let half_world = PI * EARTH_RADIUS;
        let tile_span = 2.0 * half_world / 2.0_f64.powi(zoom as i32);
        let min_x = -half_world + x as f64 * tile_span;
        let max_y = half_world - y as f64 * tile_span;

        Self {
            min_x,
            min_y: max_y - tile_span,
            max_x: min_x + tile_span,
            max_y,
        }
    }

    pub fn to_bbox_string(&self) -> String {
        format!("{},{},{},{}", self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

/// Where a tile image comes from: the base map or one of the WMS overlays,
/// identified by its index in the layer registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileSource {
    Base,
    Overlay(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub source: TileSource,
    pub zoom: u32,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn new(source: TileSource, zoom: u32, x: u32, y: u32) -> Self {
        Self { source, zoom, x, y }
    }
}

/// Decoded RGBA pixels with a lazily created GPU texture.
pub struct Raster {
    size: [usize; 2],
    pixels: Vec<u8>,
    texture: Option<egui::TextureHandle>, // Lazy, so it can be built off the UI thread without a context
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raster").field("size", &self.size).finish_non_exhaustive()
    }
}

impl Raster {
    pub fn decode(bytes: &[u8]) -> Result<Self, FetchError> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = image.dimensions();

        Ok(Self {
            size: [width as usize, height as usize],
            pixels: image.into_raw(),
            texture: None,
        })
    }

    pub fn size(&self) -> egui::Vec2 {
        egui::vec2(self.size[0] as f32, self.size[1] as f32)
    }

    pub fn texture(&mut self, ctx: &egui::Context, name: impl Into<String>) -> &egui::TextureHandle {
        let (size, pixels) = (self.size, &self.pixels);
        self.texture.get_or_insert_with(|| {
            let color_image = egui::ColorImage::from_rgba_unmultiplied(size, pixels);
            ctx.load_texture(name, color_image, egui::TextureOptions::default())
        })
    }
}

#[derive(Debug)]
pub struct MapTile {
    pub key: TileKey,
    raster: Raster,
}

impl MapTile {
    pub fn new(key: TileKey, raster: Raster) -> Self {
        Self { key, raster }
    }

    pub fn texture(&mut self, ctx: &egui::Context) -> &egui::TextureHandle {
        let name = match self.key.source {
            TileSource::Base => format!("tile_{}_{}_zoom{}", self.key.x, self.key.y, self.key.zoom),
            TileSource::Overlay(layer) => format!(
                "overlay{}_{}_{}_zoom{}",
                layer, self.key.x, self.key.y, self.key.zoom
            ),
        };
        self.raster.texture(ctx, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pixel_coordinate_round_trips_through_mercator() {
        let bogota = Coordinate::new(4.664628, -74.064095);
        let pixel = PixelCoordinate::from_coordinate(bogota, 18.0);
        let back = pixel.to_coordinate(18.0);

        assert_relative_eq!(back.latitude(), bogota.latitude(), epsilon = 1e-9);
        assert_relative_eq!(back.longitude(), bogota.longitude(), epsilon = 1e-9);
    }

    #[test]
    fn world_origin_is_north_west_corner() {
        let pixel = PixelCoordinate::from_coordinate(Coordinate::new(MAX_LATITUDE, -180.0), 0.0);
        assert_relative_eq!(pixel.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(pixel.y, 0.0, epsilon = 1e-6);

        let center = PixelCoordinate::from_coordinate(Coordinate::default(), 1.0);
        assert_relative_eq!(center.x, 256.0, epsilon = 1e-9);
        assert_relative_eq!(center.y, 256.0, epsilon = 1e-9);
    }

    #[test]
    fn latitude_is_clamped_to_the_mercator_square() {
        let north = PixelCoordinate::from_coordinate(Coordinate::new(89.9, 0.0), 2.0);
        let south = PixelCoordinate::from_coordinate(Coordinate::new(-89.9, 0.0), 2.0);
        assert_relative_eq!(north.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(south.y, world_size(2.0), epsilon = 1e-6);
    }

    #[test]
    fn contains_includes_the_edges() {
        let bounds = GeoBounds::new(4.5, -74.2, 4.8, -73.9);
        assert!(bounds.contains(Coordinate::new(4.664628, -74.064095)));
        assert!(bounds.contains(Coordinate::new(4.5, -73.9)));
        assert!(!bounds.contains(Coordinate::new(4.9, -74.0)));
        assert!(!bounds.contains(Coordinate::new(4.6, -73.8)));
    }

    #[test]
    fn mercator_bounds_of_root_tile_cover_the_world() {
        let bounds = MercatorBounds::from_x_y_zoom(0, 0, 0);
        assert_relative_eq!(bounds.min_x, -20_037_508.342_789_244, epsilon = 1e-6);
        assert_relative_eq!(bounds.max_y, 20_037_508.342_789_244, epsilon = 1e-6);

        let quarter = MercatorBounds::from_x_y_zoom(1, 1, 1);
        assert_relative_eq!(quarter.min_x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(quarter.max_y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn bbox_string_is_west_south_east_north() {
        let bounds = GeoBounds::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(bounds.to_bbox_string(), "2,1,4,3");
    }

    #[test]
    fn fit_zoom_uses_max_zoom_for_a_single_point() {
        let bounds = GeoBounds::from_coordinates([Coordinate::new(4.6, -74.0)]).unwrap();
        assert_eq!(bounds.fit_zoom(egui::vec2(800.0, 600.0), 21.0), 21.0);
    }

    #[test]
    fn fit_zoom_shrinks_until_bounds_fit() {
        let bounds = GeoBounds::new(4.5, -74.2, 4.8, -73.9);
        let zoom = bounds.fit_zoom(egui::vec2(800.0, 600.0), 21.0);
        assert_eq!(zoom, 11.0);
    }
}
