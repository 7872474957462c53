use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use eframe::egui;
use egui::{Align2, Color32, RichText, Style};
use lru::LruCache;
use tokio::sync::mpsc;

use crate::config::ViewerConfig;
use crate::error::FetchError;
use crate::map::map::{Map, MapEvent, MapState};
use crate::map::map_tile::{MapTile, TileKey, TileSource};
use crate::maps_api::geoserver::GeoServerClient;
use crate::maps_api::tile_retriever::TileRetriever;
use crate::ui::coordinator::{Command, Coordinator, PopupContent, Reply, NO_INFORMATION};

pub const MAP_ID: &str = "map";

const TILE_CACHE_SIZE: usize = 1024;
const FAILED_TILES_SIZE: usize = 512;
const TILE_RETRY_AFTER: Duration = Duration::from_secs(15);

type TileResult = (TileKey, Result<MapTile, FetchError>);

pub struct MyApp {
    coordinator: Coordinator,
    map_id: egui::Id,
    memory: LruCache<TileKey, MapTile>,
    pending_tiles: HashSet<TileKey>,
    failed_tiles: FailedTiles,
    tile_retriever: TileRetriever,
    geoserver: GeoServerClient,
    tile_receiver: mpsc::UnboundedReceiver<TileResult>,
    tile_sender: mpsc::UnboundedSender<TileResult>,
    reply_receiver: mpsc::UnboundedReceiver<Reply>,
    reply_sender: mpsc::UnboundedSender<Reply>,
    runtime: tokio::runtime::Runtime,
    /// Map rect of the last frame, for placing the popup.
    map_rect: egui::Rect,
}

impl eframe::App for MyApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Test for f11 key, to toggle fullscreen
        if let Some(new_fullscreen) = ctx.input(|i| {
            if i.key_pressed(egui::Key::F11) { Some(!i.viewport().fullscreen.unwrap_or(false)) }
            else                             { None                                            }
        }) {
            ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(  new_fullscreen));
            ctx.send_viewport_cmd(egui::ViewportCommand::Decorations(!new_fullscreen));
            ctx.send_viewport_cmd(egui::ViewportCommand::Maximized(  !new_fullscreen));
            ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
        }

        self.process_completed(ctx);

        let mut commands = Vec::new();

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("GeoServer Viewer");
                ui.separator();
                let reset = ui.push_id("resetButton", |ui| {
                    ui.add(egui::Button::new("Reset view")).on_hover_text("Back to the initial view")
                });
                if reset.inner.clicked() {
                    self.failed_tiles.clear();
                    commands.extend(self.coordinator.reset());
                }
            });
        });

        egui::SidePanel::right("legend")
            .resizable(true)
            .default_width(280.0)
            .show(ctx, |ui| {
                ui.heading("Layers");
                let toggles: Vec<(usize, bool)> = self
                    .coordinator
                    .registry()
                    .iter()
                    .filter_map(|(index, layer)| {
                        let mut active = self.coordinator.registry().is_active(index);
                        ui.checkbox(&mut active, &layer.display_name)
                            .changed()
                            .then_some((index, active))
                    })
                    .collect();
                for (index, active) in toggles {
                    commands.extend(self.coordinator.toggle_layer(index, active));
                }

                ui.separator();
                ui.horizontal(|ui| {
                    ui.heading("Legend");
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        let toggle = ui.push_id("toggle-legend", |ui| ui.button(self.coordinator.legend.toggle_label()));
                        if toggle.inner.clicked() {
                            self.coordinator.legend.toggle();
                        }
                    });
                });
                if !self.coordinator.legend.minimized {
                    egui::ScrollArea::vertical().id_salt("legend-content").show(ui, |ui| {
                        self.coordinator.legend.show(ui);
                    });
                }
            });

        egui::TopBottomPanel::bottom("attributes-panel")
            .resizable(!self.coordinator.attributes.minimized)
            .default_height(260.0)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("Attributes");
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        let toggle =
                            ui.push_id("toggle-attributes", |ui| ui.button(self.coordinator.attributes.toggle_label()));
                        if toggle.inner.clicked() {
                            self.coordinator.attributes.minimized = !self.coordinator.attributes.minimized;
                        }
                    });
                });
                if !self.coordinator.attributes.minimized {
                    let picked = ui.push_id("attributes-content", |ui| self.coordinator.attributes.show(ui));
                    if let Some(layer) = picked.inner {
                        commands.extend(self.coordinator.switch_to_tab(layer));
                    }
                }
            });

        let mut missing_tiles = Vec::new();
        let mut events = Vec::new();
        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                // Hide debug info
                ui.style_mut().debug.debug_on_hover = false;

                let overlays = self.coordinator.registry().active_indices();
                let map = Map::new(MAP_ID, &mut self.memory, &mut missing_tiles, &mut events)
                    .overlays(&overlays)
                    .highlight(self.coordinator.highlight());
                self.map_rect = ui.add(map).rect;
            });

        for event in &events {
            commands.extend(self.coordinator.on_map_event(event));
        }

        self.show_popup(ctx);
        self.execute(ctx, commands, &events);
        self.request_tiles(ctx, missing_tiles);
    }
}

impl MyApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        config: ViewerConfig,
        tile_retriever: TileRetriever,
        geoserver: GeoServerClient,
    ) -> std::io::Result<Self> {
        cc.egui_ctx.set_style(Self::get_dark_theme_style(&cc.egui_ctx));
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(8) // Set max number of worker threads
            .thread_name("map-fetcher")
            .thread_stack_size(3 * 1024 * 1024) // 3MB stack size
            .enable_all()
            .build()?;
        let (tile_sender, tile_receiver) = mpsc::unbounded_channel();
        let (reply_sender, reply_receiver) = mpsc::unbounded_channel();

        let mut app = Self {
            coordinator: Coordinator::new(config),
            map_id: egui::Id::new(MAP_ID),
            memory: LruCache::new(NonZeroUsize::new(TILE_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN)),
            pending_tiles: HashSet::new(),
            failed_tiles: FailedTiles::new(FAILED_TILES_SIZE, TILE_RETRY_AFTER),
            tile_retriever,
            geoserver,
            tile_receiver,
            tile_sender,
            reply_receiver,
            reply_sender,
            runtime,
            map_rect: egui::Rect::NOTHING,
        };

        let commands = app.coordinator.start();
        app.execute(&cc.egui_ctx, commands, &[]);
        Ok(app)
    }

    /// Drains finished tile fetches and GeoServer replies.
    fn process_completed(&mut self, ctx: &egui::Context) {
        while let Ok((key, result)) = self.tile_receiver.try_recv() {
            self.pending_tiles.remove(&key);
            match result {
                Ok(tile) => {
                    self.memory.put(key, tile);
                }
                Err(e) => {
                    log::warn!("Error fetching tile {:?}: {}", key, e);
                    self.failed_tiles.record(key, Instant::now());
                    // Nothing else may trigger a frame once the delay is over
                    ctx.request_repaint_after(TILE_RETRY_AFTER);
                }
            }
        }

        let mut commands = Vec::new();
        while let Ok(reply) = self.reply_receiver.try_recv() {
            commands.extend(self.coordinator.apply(reply));
        }
        self.execute(ctx, commands, &[]);
    }

    fn execute(&mut self, ctx: &egui::Context, commands: Vec<Command>, events: &[MapEvent]) {
        let viewport = events.last().map(|e| e.size).unwrap_or_else(|| self.map_rect.size());

        for command in commands {
            match command {
                Command::SetView { center, zoom } => {
                    MapState::set_view(ctx, self.map_id, center, zoom);
                    ctx.request_repaint();
                }
                Command::FetchLegend { layer, source } => {
                    let geoserver = self.geoserver.clone();
                    self.spawn_reply(ctx, async move {
                        Reply::Legend {
                            layer,
                            result: geoserver.fetch_legend(&source).await,
                        }
                    });
                }
                Command::FetchAttributes {
                    layer,
                    generation,
                    source,
                } => {
                    let geoserver = self.geoserver.clone();
                    self.spawn_reply(ctx, async move {
                        Reply::Attributes {
                            layer,
                            generation,
                            result: geoserver.fetch_features(&source).await,
                        }
                    });
                }
                Command::QueryFeatureInfo { request, at } => {
                    let geoserver = self.geoserver.clone();
                    self.spawn_reply(ctx, async move {
                        Reply::FeatureInfo {
                            purpose: request.purpose,
                            at,
                            viewport,
                            result: geoserver.fetch_feature_info(&request).await,
                        }
                    });
                }
            }
        }
    }

    fn spawn_reply(&self, ctx: &egui::Context, task: impl std::future::Future<Output = Reply> + Send + 'static) {
        let sender = self.reply_sender.clone();
        let requester = ctx.clone(); // Uses ARC so can be cloned to a new thread cheaply
        self.runtime.spawn(async move {
            if sender.send(task.await).is_err() {
                log::warn!("Reply dropped, the viewer is shutting down");
            }
            requester.request_repaint();
        });
    }

    fn request_tiles(&mut self, ctx: &egui::Context, missing_tiles: Vec<TileKey>) {
        let now = Instant::now();
        for key in missing_tiles {
            // Check if we need to fetch the tile, or are waiting for it
            if self.pending_tiles.contains(&key) || self.failed_tiles.is_waiting(&key, now) {
                continue;
            }

            let layer = match key.source {
                TileSource::Base => None,
                TileSource::Overlay(index) => match self.coordinator.registry().get(index) {
                    Some(layer) => Some(layer.clone()),
                    None => continue,
                },
            };

            let sender = self.tile_sender.clone();
            let tile_retriever = self.tile_retriever.clone();
            let requester = ctx.clone();

            self.runtime.spawn(async move {
                let result = tile_retriever.fetch_tile(key, layer.as_ref()).await;
                if sender.send((key, result)).is_err() {
                    log::warn!("Tile {:?} dropped, the viewer is shutting down", key);
                }
                requester.request_repaint();
            });

            self.pending_tiles.insert(key);
        }
    }

    fn show_popup(&mut self, ctx: &egui::Context) {
        let Some(popup) = self.coordinator.popup() else {
            return;
        };
        let state = MapState::load(ctx, self.map_id);
        if !state.bounds(self.map_rect).contains(popup.at) {
            return;
        }
        let anchor = state.coordinate_to_screen(popup.at, self.map_rect);

        let mut close = false;
        egui::Area::new(egui::Id::new("feature-popup"))
            .fixed_pos(anchor)
            .pivot(Align2::CENTER_BOTTOM)
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.set_max_width(320.0);
                    ui.horizontal(|ui| {
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Min), |ui| {
                            close = ui.small_button("×").clicked();
                        });
                    });
                    match &popup.content {
                        PopupContent::Properties(properties) => {
                            egui::Grid::new("feature-popup-grid").num_columns(2).show(ui, |ui| {
                                for (key, value) in properties {
                                    ui.label(RichText::new(key).strong());
                                    ui.label(value);
                                    ui.end_row();
                                }
                            });
                        }
                        PopupContent::NoInformation => {
                            ui.label(NO_INFORMATION);
                        }
                    }
                });
            });

        if close {
            self.coordinator.close_popup();
        }
    }

    pub fn get_dark_theme_style(ctx: &egui::Context) -> Style {
        use egui::{
            style::{Selection, Visuals, Widgets},
            FontFamily, FontId, Rounding, Stroke, TextStyle,
        };

        let mut style = (*ctx.style()).clone();

        style.text_styles = [
            (TextStyle::Heading, FontId::new(20.0, FontFamily::Proportional)),
            (TextStyle::Body, FontId::new(15.0, FontFamily::Proportional)),
            (TextStyle::Monospace, FontId::new(14.0, FontFamily::Monospace)),
            (TextStyle::Button, FontId::new(15.0, FontFamily::Proportional)),
            (TextStyle::Small, FontId::new(12.0, FontFamily::Proportional)),
        ]
        .into();

        let primary_bg_color = Color32::from_rgb(32, 33, 36);
        let widget = |bg_fill: Color32, stroke: Color32, expansion: f32| egui::style::WidgetVisuals {
            bg_fill,
            bg_stroke: Stroke::new(1.0, stroke),
            fg_stroke: Stroke::new(1.0, if stroke == Color32::WHITE { Color32::WHITE } else { Color32::LIGHT_GRAY }),
            rounding: Rounding::same(4.0),
            weak_bg_fill: Color32::from_gray(32),
            expansion,
        };

        style.visuals = Visuals::dark();
        style.visuals.override_text_color = Some(Color32::LIGHT_GRAY);
        style.visuals.widgets = Widgets {
            noninteractive: widget(primary_bg_color, Color32::from_gray(60), 0.0),
            inactive: widget(primary_bg_color, Color32::from_gray(75), 0.0),
            hovered: widget(Color32::from_rgb(50, 50, 50), Color32::WHITE, 0.5),
            active: widget(Color32::from_rgb(60, 60, 60), Color32::WHITE, 2.0),
            open: widget(Color32::from_rgb(40, 40, 40), Color32::WHITE, 0.0),
        };

        // Selected table rows use the highlight colour of the map
        style.visuals.selection = Selection {
            bg_fill: Color32::from_rgb(0, 110, 110),
            stroke: Stroke::new(1.0, Color32::WHITE),
        };

        style.visuals.window_rounding = Rounding::same(6.0);
        style.visuals.window_shadow = egui::Shadow {
            offset: egui::vec2(0.0, 1.0),
            blur: 3.0,
            spread: 0.0,
            color: Color32::from_black_alpha(128),
        };
        style.visuals.window_fill = primary_bg_color;
        style.visuals.window_stroke = Stroke::new(1.0, Color32::from_gray(60));
        style.visuals.panel_fill = primary_bg_color;

        style.spacing.window_margin = egui::Margin::same(4.0);
        style.spacing.button_padding = egui::vec2(4.0, 2.0);

        style
    }
}

/// Tiles whose last fetch failed, each with the instant from which it may be
/// requested again. Bounded so a long outage cannot grow it without limit.
struct FailedTiles {
    retry_at: LruCache<TileKey, Instant>,
    retry_after: Duration,
}

impl FailedTiles {
    fn new(capacity: usize, retry_after: Duration) -> Self {
        Self {
            retry_at: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            retry_after,
        }
    }

    fn record(&mut self, key: TileKey, now: Instant) {
        self.retry_at.put(key, now + self.retry_after);
    }

    /// True while `key` failed recently. Expired entries are forgotten.
    fn is_waiting(&mut self, key: &TileKey, now: Instant) -> bool {
        match self.retry_at.peek(key) {
            Some(&retry_at) if now < retry_at => true,
            Some(_) => {
                self.retry_at.pop(key);
                false
            }
            None => false,
        }
    }

    fn clear(&mut self) {
        self.retry_at.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(x: u32) -> TileKey {
        TileKey::new(TileSource::Base, 18, x, 0)
    }

    #[test]
    fn failed_tile_is_retried_after_the_delay() {
        let mut failed = FailedTiles::new(8, Duration::from_secs(15));
        let start = Instant::now();
        failed.record(key(1), start);

        assert!(failed.is_waiting(&key(1), start + Duration::from_secs(14)));
        assert!(!failed.is_waiting(&key(1), start + Duration::from_secs(15)));
        // Forgotten once expired, even if the clock is asked about an earlier instant
        assert!(!failed.is_waiting(&key(1), start));
        assert!(!failed.is_waiting(&key(2), start));
    }

    #[test]
    fn failed_tiles_are_bounded() {
        let mut failed = FailedTiles::new(2, Duration::from_secs(15));
        let start = Instant::now();
        for x in 0..3 {
            failed.record(key(x), start);
        }

        assert!(!failed.is_waiting(&key(0), start));
        assert!(failed.is_waiting(&key(1), start));
        assert!(failed.is_waiting(&key(2), start));
    }

    #[test]
    fn clearing_makes_every_tile_requestable() {
        let mut failed = FailedTiles::new(8, Duration::from_secs(15));
        let start = Instant::now();
        failed.record(key(1), start);
        failed.record(TileKey::new(TileSource::Overlay(2), 18, 1, 0), start);
        failed.clear();

        assert!(!failed.is_waiting(&key(1), start));
        assert!(!failed.is_waiting(&TileKey::new(TileSource::Overlay(2), 18, 1, 0), start));
    }
}
