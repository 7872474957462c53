#![warn(clippy::all, rust_2018_idioms)]
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod config;
mod error;
mod map;
mod maps_api;
mod ui;

use config::ViewerConfig;
use map::map::MapState;
use map::map_tile::TILE_SIZE;
use maps_api::{geoserver::GeoServerClient, tile_retriever::TileRetriever};

#[cfg(not(target_arch = "wasm32"))]
fn main() -> eframe::Result<()> {
    env_logger::init();

    let config = ViewerConfig::from_env().unwrap_or_else(|e| {
        log::error!("Invalid configuration, using defaults: {}", e);
        ViewerConfig::default()
    });
    log::info!("Using GeoServer at {}", config.geoserver_url);

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(egui::vec2(1600.0, 1000.0))
            .with_min_inner_size(egui::vec2(640.0, 480.0))
            .with_title("GeoServer Viewer")
            .with_resizable(true)
            .with_decorations(true),
        ..Default::default()
    };

    // Start from the configured view
    let map_state = MapState::new(config.initial_center, config.initial_zoom, config.max_zoom);

    eframe::run_native(
        "GeoServer Viewer",
        native_options,
        Box::new(move |cc| {
            map_state.store(&cc.egui_ctx, egui::Id::new(ui::my_app::MAP_ID));

            let client = maps_api::http_client();
            let tile_retriever = TileRetriever::new(
                client.clone(),
                config.base_tile_url.clone(),
                config.tile_subdomains.clone(),
                TILE_SIZE as u32,
            );
            let geoserver = GeoServerClient::new(client);

            Ok(Box::new(ui::my_app::MyApp::new(cc, config, tile_retriever, geoserver)?))
        }),
    )
}
