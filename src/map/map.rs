use egui::epaint::{Color32, PathShape, Pos2, Rect, Shape, Stroke};
use egui::{pos2, vec2, Response, Sense, Ui, Vec2, Widget};
use lru::LruCache;

use super::feature::{Feature, Shape as FeatureShape};
use super::map_tile::{Coordinate, GeoBounds, MapTile, PixelCoordinate, TileKey, TileSource, TILE_SIZE};

pub const HIGHLIGHT_COLOR: Color32 = Color32::from_rgb(0, 255, 255);

/// View of the map: where it is centred and how far it is zoomed. Lives in egui
/// temporary memory under the widget id.
#[derive(Default, Clone, Debug)]
pub struct MapState {
    center: Coordinate,
    zoom: f32,
    max_zoom: f32,
}

impl MapState {
    pub fn new(center: Coordinate, zoom: f32, max_zoom: f32) -> Self {
        Self {
            center,
            zoom: zoom.clamp(0.0, max_zoom),
            max_zoom,
        }
    }

    pub fn load(ctx: &egui::Context, id: egui::Id) -> Self {
        ctx.data_mut(|d| d.get_temp::<Self>(id).unwrap_or_default())
    }

    pub fn store(self, ctx: &egui::Context, id: egui::Id) {
        ctx.data_mut(|d| d.insert_temp(id, self));
    }

    pub fn set_view(ctx: &egui::Context, id: egui::Id, center: Coordinate, zoom: f32) {
        let mut state = Self::load(ctx, id);
        state.center = center;
        state.zoom = zoom.clamp(0.0, state.max_zoom);
        state.store(ctx, id);
    }

    #[cfg(test)]
    pub fn center(&self) -> Coordinate {
        self.center
    }

    #[cfg(test)]
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    fn world_center(&self) -> PixelCoordinate {
        PixelCoordinate::from_coordinate(self.center, self.zoom as f64)
    }

    pub fn screen_to_coordinate(&self, pos: Pos2, rect: Rect) -> Coordinate {
        let offset = pos - rect.center();
        self.world_center()
            .offset(offset.x as f64, offset.y as f64)
            .to_coordinate(self.zoom as f64)
    }

    pub fn coordinate_to_screen(&self, coordinate: Coordinate, rect: Rect) -> Pos2 {
        let center = self.world_center();
        let point = PixelCoordinate::from_coordinate(coordinate, self.zoom as f64);
        rect.center() + vec2((point.x - center.x) as f32, (point.y - center.y) as f32)
    }

    /// Geographic bounds of the area shown in `rect`.
    pub fn bounds(&self, rect: Rect) -> GeoBounds {
        let north_west = self.screen_to_coordinate(rect.left_top(), rect);
        let south_east = self.screen_to_coordinate(rect.right_bottom(), rect);
        GeoBounds::new(
            south_east.latitude(),
            north_west.longitude(),
            north_west.latitude(),
            south_east.longitude(),
        )
    }

    fn pan(&mut self, delta: Vec2) {
        let moved = self.world_center().offset(-delta.x as f64, -delta.y as f64);
        self.center = moved.to_coordinate(self.zoom as f64);
    }

    /// Tiles covering `rect` at the integer zoom below the current one, with
    /// the screen rectangle each one is drawn into.
    pub fn visible_tiles(&self, rect: Rect) -> Vec<(u32, u32, u32, Rect)> {
        let z = self.zoom.floor().clamp(0.0, self.max_zoom.max(0.0)) as u32;
        let scale = 2.0_f64.powf(self.zoom as f64 - z as f64);
        let n = 2i64.pow(z);

        let center = PixelCoordinate::from_coordinate(self.center, z as f64);
        let left = center.x - rect.width() as f64 / 2.0 / scale;
        let top = center.y - rect.height() as f64 / 2.0 / scale;
        let right = left + rect.width() as f64 / scale;
        let bottom = top + rect.height() as f64 / scale;

        let tile_screen_size = (TILE_SIZE * scale) as f32;
        let mut tiles = Vec::new();

        for ty in (top / TILE_SIZE).floor() as i64..=(bottom / TILE_SIZE).floor() as i64 {
            if ty < 0 || ty >= n {
                continue;
            }
            for tx in (left / TILE_SIZE).floor() as i64..=(right / TILE_SIZE).floor() as i64 {
                let min = pos2(
                    rect.min.x + ((tx as f64 * TILE_SIZE - left) * scale) as f32,
                    rect.min.y + ((ty as f64 * TILE_SIZE - top) * scale) as f32,
                );
                let tile_rect = Rect::from_min_size(min, vec2(tile_screen_size, tile_screen_size));
                tiles.push((z, tx.rem_euclid(n) as u32, ty as u32, tile_rect));
            }
        }

        tiles
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapEventKind {
    Click,
    DoubleClick,
}

/// A pointer event on the map with what a feature-info query needs to know
/// about the view at that moment.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEvent {
    pub kind: MapEventKind,
    /// Relative to the top-left corner of the map.
    pub point: Pos2,
    pub coordinate: Coordinate,
    pub bounds: GeoBounds,
    pub size: Vec2,
}

pub struct Map<'a> {
    id: egui::Id,
    tile_cache: &'a mut LruCache<TileKey, MapTile>,
    overlays: &'a [usize],
    highlight: Option<&'a Feature>,
    missing_tiles: &'a mut Vec<TileKey>,
    events: &'a mut Vec<MapEvent>,
}

impl<'a> Widget for Map<'a> {
    fn ui(self, ui: &mut Ui) -> Response {
        let mut state = MapState::load(ui.ctx(), self.id);

        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());

        let map_painter = ui.painter().with_clip_rect(rect);
        map_painter.rect_filled(rect, 0.0, Color32::from_gray(48));

        // Handle interactions
        if response.dragged() {
            state.pan(response.drag_delta());
        }

        if response.hovered() {
            let mut zoomed = false;
            // Handle zoom for pinch / touch
            let zoom_delta = ui.input(|i| i.zoom_delta()) - 1.0;
            if zoom_delta.abs() > f32::EPSILON {
                state.zoom = (state.zoom + zoom_delta.clamp(-1.0, 1.0)).clamp(0.0, state.max_zoom);
                zoomed = true;
            }

            // Handle zoom for scroll
            let scroll = ui.input(|i| i.smooth_scroll_delta).y;
            if scroll.abs() > f32::EPSILON && !zoomed {
                // Normalize scroll further using tanh
                state.zoom = (state.zoom + (scroll / 10.0).tanh()).clamp(0.0, state.max_zoom);
            }
        }

        let kind = if response.double_clicked() {
            Some(MapEventKind::DoubleClick)
        } else if response.clicked() {
            Some(MapEventKind::Click)
        } else {
            None
        };
        if let (Some(kind), Some(pos)) = (kind, response.interact_pointer_pos()) {
            self.events.push(MapEvent {
                kind,
                point: pos2((pos.x - rect.min.x).floor(), (pos.y - rect.min.y).floor()),
                coordinate: state.screen_to_coordinate(pos, rect),
                bounds: state.bounds(rect),
                size: rect.size(),
            });
        }

        // Base layer first, then overlays in registry order
        let visible_tiles = state.visible_tiles(rect);
        let sources = std::iter::once(TileSource::Base).chain(self.overlays.iter().map(|&i| TileSource::Overlay(i)));

        for source in sources {
            for &(z, x, y, tile_rect) in &visible_tiles {
                let key = TileKey::new(source, z, x, y);
                if let Some(tile) = self.tile_cache.get_mut(&key) {
                    let texture = tile.texture(ui.ctx());
                    map_painter.image(
                        texture.id(),
                        tile_rect,
                        Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                        Color32::WHITE,
                    );
                } else {
                    self.missing_tiles.push(key);
                    if source == TileSource::Base {
                        map_painter.rect_filled(tile_rect, 0.0, Color32::GRAY);
                    }
                }
            }
        }

        if let Some(feature) = self.highlight {
            for shape in highlight_shapes(feature, &state, rect) {
                map_painter.add(shape);
            }
        }

        // Store updated state
        state.store(ui.ctx(), self.id);

        response
    }
}

impl<'a> Map<'a> {
    pub fn new(
        id_source: impl std::hash::Hash,
        tile_cache: &'a mut LruCache<TileKey, MapTile>,
        missing_tiles: &'a mut Vec<TileKey>,
        events: &'a mut Vec<MapEvent>,
    ) -> Self {
        Self {
            id: egui::Id::new(id_source),
            tile_cache,
            overlays: &[],
            highlight: None,
            missing_tiles,
            events,
        }
    }

    /// Registry indices of the overlays to draw above the base map.
    pub fn overlays(mut self, overlays: &'a [usize]) -> Self {
        self.overlays = overlays;
        self
    }

    pub fn highlight(mut self, feature: Option<&'a Feature>) -> Self {
        self.highlight = feature;
        self
    }
}

/// Cyan outline for lines and rings, a pin for points.
fn highlight_shapes(feature: &Feature, state: &MapState, rect: Rect) -> Vec<Shape> {
    let stroke = Stroke::new(3.0, HIGHLIGHT_COLOR);
    let to_screen = |coordinates: &[Coordinate]| -> Vec<Pos2> {
        coordinates
            .iter()
            .map(|c| state.coordinate_to_screen(*c, rect))
            .collect()
    };

    let mut shapes = Vec::new();
    for shape in feature.shapes() {
        match shape {
            FeatureShape::Marker(coordinate) => {
                shapes.extend(pin(state.coordinate_to_screen(coordinate, rect)));
            }
            FeatureShape::Line(coordinates) => {
                shapes.push(Shape::line(to_screen(&coordinates), stroke));
            }
            FeatureShape::Ring(coordinates) => {
                // egui only fills convex paths, so rings get the outline only
                shapes.push(Shape::Path(PathShape::closed_line(to_screen(&coordinates), stroke)));
            }
        }
    }
    shapes
}

/// 32x32 marker whose bottom centre sits on `tip`.
fn pin(tip: Pos2) -> [Shape; 3] {
    let head = tip - vec2(0.0, 22.0);
    let fill = HIGHLIGHT_COLOR;
    let outline = Stroke::new(1.5, Color32::from_rgb(0, 90, 90));

    [
        Shape::convex_polygon(vec![head + vec2(-7.0, 5.0), head + vec2(7.0, 5.0), tip], fill, outline),
        Shape::circle_filled(head, 10.0, fill),
        Shape::circle_filled(head, 4.0, Color32::WHITE),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rect() -> Rect {
        Rect::from_min_size(pos2(100.0, 50.0), vec2(800.0, 600.0))
    }

    #[test]
    fn center_of_rect_is_center_coordinate() {
        let state = MapState::new(Coordinate::new(4.664628, -74.064095), 18.0, 21.0);
        let coordinate = state.screen_to_coordinate(rect().center(), rect());

        assert_relative_eq!(coordinate.latitude(), 4.664628, epsilon = 1e-9);
        assert_relative_eq!(coordinate.longitude(), -74.064095, epsilon = 1e-9);
    }

    #[test]
    fn screen_and_coordinate_conversions_agree() {
        let state = MapState::new(Coordinate::new(4.664628, -74.064095), 15.5, 21.0);
        let pos = pos2(180.0, 420.0);
        let back = state.coordinate_to_screen(state.screen_to_coordinate(pos, rect()), rect());

        assert_relative_eq!(back.x, pos.x, epsilon = 1e-3);
        assert_relative_eq!(back.y, pos.y, epsilon = 1e-3);
    }

    #[test]
    fn bounds_contain_the_center() {
        let state = MapState::new(Coordinate::new(4.664628, -74.064095), 18.0, 21.0);
        let bounds = state.bounds(rect());

        assert!(bounds.contains(state.center()));
        assert!(bounds.west() < bounds.east());
        assert!(bounds.south() < bounds.north());
    }

    #[test]
    fn visible_tiles_cover_the_viewport() {
        let state = MapState::new(Coordinate::new(4.664628, -74.064095), 18.0, 21.0);
        let tiles = state.visible_tiles(rect());

        assert!(tiles.iter().all(|(z, ..)| *z == 18));
        let covered = tiles.iter().fold(Rect::NOTHING, |acc, (.., r)| acc.union(*r));
        assert!(covered.contains_rect(rect()));

        let pixel = PixelCoordinate::from_coordinate(state.center(), 18.0);
        let (x, y) = ((pixel.x / TILE_SIZE) as u32, (pixel.y / TILE_SIZE) as u32);
        let center_tile = tiles.iter().find(|(z, tx, ty, _)| (*z, *tx, *ty) == (18, x, y)).unwrap();
        assert!(center_tile.3.contains(rect().center()));
    }

    #[test]
    fn zoom_zero_wraps_horizontally_and_skips_outside_rows() {
        let state = MapState::new(Coordinate::default(), 0.0, 21.0);
        let tiles = state.visible_tiles(rect());

        assert!(tiles.iter().all(|(_, x, y, _)| *x == 0 && *y == 0));
        assert!(tiles.len() >= 3);
    }

    #[test]
    fn zoom_is_clamped_to_max() {
        let state = MapState::new(Coordinate::default(), 30.0, 21.0);
        assert_eq!(state.zoom(), 21.0);
    }
}
