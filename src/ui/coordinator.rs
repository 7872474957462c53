//! Keeps the legend, the attribute tabs, the popup and the highlight in step
//! with the layers shown on the map.
//!
//! The coordinator never does I/O. Every user action returns the [`Command`]s
//! the app has to carry out, and every finished request comes back as a
//! [`Reply`]. Requests are neither deduplicated nor cancelled: two quick clicks
//! produce two queries and whichever answers last decides the popup.

use crate::config::ViewerConfig;
use crate::error::FetchError;
use crate::map::feature::{Feature, FeatureCollection};
use crate::map::layers::{LayerRegistry, WmsLayer};
use crate::map::map::{MapEvent, MapEventKind};
use crate::map::map_tile::{Coordinate, Raster};
use crate::maps_api::wms::{FeatureInfoRequest, QueryPurpose};
use crate::ui::attributes::AttributesPanel;
use crate::ui::legend::Legend;

pub const NO_INFORMATION: &str = "No information available at this point.";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    FetchLegend { layer: usize, source: WmsLayer },
    FetchAttributes { layer: usize, generation: u64, source: WmsLayer },
    QueryFeatureInfo { request: FeatureInfoRequest, at: Coordinate },
    SetView { center: Coordinate, zoom: f32 },
}

#[derive(Debug)]
pub enum Reply {
    Legend {
        layer: usize,
        result: Result<Raster, FetchError>,
    },
    Attributes {
        layer: usize,
        generation: u64,
        result: Result<FeatureCollection, FetchError>,
    },
    FeatureInfo {
        purpose: QueryPurpose,
        at: Coordinate,
        /// Viewport size when the query was made, for fitting the highlight.
        viewport: egui::Vec2,
        result: Result<FeatureCollection, FetchError>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PopupContent {
    Properties(Vec<(String, String)>),
    NoInformation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub at: Coordinate,
    pub content: PopupContent,
}

pub struct Coordinator {
    config: ViewerConfig,
    registry: LayerRegistry,
    pub legend: Legend,
    pub attributes: AttributesPanel,
    highlight: Option<Feature>,
    popup: Option<Popup>,
}

impl Coordinator {
    pub fn new(config: ViewerConfig) -> Self {
        let registry = LayerRegistry::new(config.layers.clone());
        Self {
            config,
            registry,
            legend: Legend::default(),
            attributes: AttributesPanel::default(),
            highlight: None,
            popup: None,
        }
    }

    pub fn registry(&self) -> &LayerRegistry {
        &self.registry
    }

    pub fn highlight(&self) -> Option<&Feature> {
        self.highlight.as_ref()
    }

    pub fn popup(&self) -> Option<&Popup> {
        self.popup.as_ref()
    }

    pub fn close_popup(&mut self) {
        self.popup = None;
    }

    /// Initial sync after the overlays have been put on the map.
    pub fn start(&mut self) -> Vec<Command> {
        self.sync_active_layers()
    }

    /// Shows or hides an overlay. Nothing happens when the state is unchanged.
    pub fn toggle_layer(&mut self, layer: usize, active: bool) -> Vec<Command> {
        if self.registry.set_active(layer, active) {
            log::info!(
                "Layer {} {}",
                self.registry.get(layer).map(|l| l.display_name.as_str()).unwrap_or("?"),
                if active { "added" } else { "removed" }
            );
            self.sync_active_layers()
        } else {
            Vec::new()
        }
    }

    /// Rebuilds the legend and the attribute tabs from the active layers.
    pub fn sync_active_layers(&mut self) -> Vec<Command> {
        let active = self.registry.active_layers();
        let mut commands: Vec<Command> = self
            .legend
            .rebuild(&active)
            .into_iter()
            .filter_map(|layer| {
                let source = self.registry.get(layer)?.clone();
                Some(Command::FetchLegend { layer, source })
            })
            .collect();

        let tabs = active
            .iter()
            .map(|(index, layer)| (*index, layer.display_name.clone()))
            .collect();
        if let Some((layer, generation)) = self.attributes.rebuild_tabs(tabs) {
            commands.extend(self.fetch_attributes(layer, generation));
        }

        commands
    }

    pub fn switch_to_tab(&mut self, layer: usize) -> Vec<Command> {
        let (layer, generation) = self.attributes.switch_to(layer);
        self.fetch_attributes(layer, generation).into_iter().collect()
    }

    fn fetch_attributes(&self, layer: usize, generation: u64) -> Option<Command> {
        let source = self.registry.get(layer)?.clone();
        Some(Command::FetchAttributes {
            layer,
            generation,
            source,
        })
    }

    /// Click and double-click both query feature info at the pointer; the
    /// reply decides between popup and highlight.
    pub fn on_map_event(&mut self, event: &MapEvent) -> Vec<Command> {
        let Some(query_layers) = self.registry.query_layers(&self.config.excluded_query_layer) else {
            log::debug!("No layers to query at {:?}", event.coordinate);
            return Vec::new();
        };

        let purpose = match event.kind {
            MapEventKind::Click => QueryPurpose::Popup,
            MapEventKind::DoubleClick => QueryPurpose::Highlight,
        };

        let request = FeatureInfoRequest {
            service_url: self.config.geoserver_url.clone(),
            query_layers,
            bbox: event.bounds,
            width: event.size.x.round().max(0.0) as u32,
            height: event.size.y.round().max(0.0) as u32,
            x: event.point.x.floor().max(0.0) as u32,
            y: event.point.y.floor().max(0.0) as u32,
            purpose,
        };

        vec![Command::QueryFeatureInfo {
            request,
            at: event.coordinate,
        }]
    }

    pub fn apply(&mut self, reply: Reply) -> Vec<Command> {
        match reply {
            Reply::Legend { layer, result } => {
                self.legend.apply_image(layer, result);
                Vec::new()
            }
            Reply::Attributes {
                layer,
                generation,
                result,
            } => {
                self.attributes.apply(layer, generation, result);
                Vec::new()
            }
            Reply::FeatureInfo {
                purpose,
                at,
                viewport,
                result,
            } => match result {
                Ok(collection) => match purpose {
                    QueryPurpose::Popup => {
                        self.show_popup(at, &collection);
                        Vec::new()
                    }
                    QueryPurpose::Highlight => self.select(collection, viewport),
                },
                Err(e) => {
                    log::error!("Error retrieving feature info: {}", e);
                    Vec::new()
                }
            },
        }
    }

    fn show_popup(&mut self, at: Coordinate, collection: &FeatureCollection) {
        let content = match collection.first() {
            Some(feature) => PopupContent::Properties(feature.display_properties()),
            None => PopupContent::NoInformation,
        };
        self.popup = Some(Popup { at, content });
    }

    /// Highlights the first feature on the map and in the current table, or
    /// clears both when the query found nothing.
    fn select(&mut self, collection: FeatureCollection, viewport: egui::Vec2) -> Vec<Command> {
        if let Some(table) = self.attributes.table_mut() {
            table.clear_selection();
        }

        let Some(feature) = collection.features.into_iter().next() else {
            self.highlight = None;
            return Vec::new();
        };

        if let Some(table) = self.attributes.table_mut() {
            match table.select_matching(&feature.properties) {
                Some(row) => log::debug!("Selected row {} of layer {}", row, table.layer),
                None => log::debug!("No row of layer {} matches the selection", table.layer),
            }
        }

        let fit = feature.bounds().map(|bounds| Command::SetView {
            center: bounds.center(),
            zoom: bounds.fit_zoom(viewport, self.config.max_zoom),
        });
        self.highlight = Some(feature);

        fit.into_iter().collect()
    }

    /// Back to the initial view with every layer on and nothing selected.
    pub fn reset(&mut self) -> Vec<Command> {
        self.highlight = None;
        self.popup = None;
        if let Some(table) = self.attributes.table_mut() {
            table.clear_selection();
        }
        self.attributes.minimized = true;
        self.registry.activate_all();

        let mut commands = vec![Command::SetView {
            center: self.config.initial_center,
            zoom: self.config.initial_zoom,
        }];
        commands.extend(self.sync_active_layers());
        commands
    }
}
