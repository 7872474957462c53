use egui::{Align, RichText, ScrollArea, Ui};

use crate::error::FetchError;
use crate::map::feature::{display_value, Feature, FeatureCollection, Properties};

pub const NO_ACTIVE_LAYERS: &str = "No active layers to show attributes for.";
pub const NO_DATA: &str = "No data available for this layer.";
pub const FETCH_FAILED: &str = "Error retrieving layer data.";

/// Attributes of every feature of one layer, rendered as text.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeTable {
    pub layer: usize,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    selected: Option<usize>,
    scroll_to_selected: bool,
}

impl AttributeTable {
    /// Columns come from the first feature's property keys. `None` when there
    /// are no features at all.
    pub fn from_features(layer: usize, features: &[Feature]) -> Option<Self> {
        let headers: Vec<String> = features.first()?.properties.keys().cloned().collect();
        let rows = features
            .iter()
            .map(|feature| {
                headers
                    .iter()
                    .map(|header| feature.property(header).map(display_value).unwrap_or_default())
                    .collect()
            })
            .collect();

        Some(Self {
            layer,
            headers,
            rows,
            selected: None,
            scroll_to_selected: false,
        })
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
        self.scroll_to_selected = false;
    }

    /// First row, in table order, whose every cell equals the display text of
    /// the property named by its column. Absent and null properties match
    /// anything.
    pub fn find_matching_row(&self, properties: &Properties) -> Option<usize> {
        self.rows.iter().position(|row| {
            row.iter().zip(&self.headers).all(|(cell, header)| match properties.get(header) {
                Some(value) if !value.is_null() => *cell == display_value(value),
                _ => true,
            })
        })
    }

    /// Replaces the selection with the row matching `properties`, if any.
    pub fn select_matching(&mut self, properties: &Properties) -> Option<usize> {
        self.selected = self.find_matching_row(properties);
        self.scroll_to_selected = self.selected.is_some();
        self.selected
    }

    fn show(&mut self, ui: &mut Ui) {
        let scroll = std::mem::take(&mut self.scroll_to_selected);

        ScrollArea::both().auto_shrink([false, false]).show(ui, |ui| {
            egui::Grid::new(("attributes-table", self.layer))
                .striped(true)
                .show(ui, |ui| {
                    for header in &self.headers {
                        ui.label(RichText::new(header).strong());
                    }
                    ui.end_row();

                    for (index, row) in self.rows.iter().enumerate() {
                        let is_selected = self.selected == Some(index);
                        for (column, cell) in row.iter().enumerate() {
                            let response = ui.selectable_label(is_selected, cell);
                            if is_selected && scroll && column == 0 {
                                response.scroll_to_me(Some(Align::Center));
                            }
                        }
                        ui.end_row();
                    }
                });
        });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableState {
    NoActiveLayers,
    Loading,
    Loaded(AttributeTable),
    Empty,
    Failed,
}

/// The bottom panel: one tab per active layer, the table of the current tab
/// fetched lazily.
#[derive(Debug)]
pub struct AttributesPanel {
    tabs: Vec<(usize, String)>,
    current: Option<usize>,
    generation: u64,
    table: TableState,
    pub minimized: bool,
}

impl Default for AttributesPanel {
    fn default() -> Self {
        Self {
            tabs: Vec::new(),
            current: None,
            generation: 0,
            table: TableState::NoActiveLayers,
            minimized: false,
        }
    }
}

impl AttributesPanel {
    #[cfg(test)]
    pub fn tabs(&self) -> impl Iterator<Item = usize> + '_ {
        self.tabs.iter().map(|(layer, _)| *layer)
    }

    #[cfg(test)]
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[cfg(test)]
    pub fn table_state(&self) -> &TableState {
        &self.table
    }

    pub fn table_mut(&mut self) -> Option<&mut AttributeTable> {
        match &mut self.table {
            TableState::Loaded(table) => Some(table),
            _ => None,
        }
    }

    /// One tab per `(layer, title)`. Shows the first tab, returning the
    /// attribute fetch to issue for it.
    pub fn rebuild_tabs(&mut self, tabs: Vec<(usize, String)>) -> Option<(usize, u64)> {
        self.tabs = tabs;
        match self.tabs.first().map(|(layer, _)| *layer) {
            Some(first) => Some(self.switch_to(first)),
            None => {
                self.current = None;
                self.generation += 1;
                self.table = TableState::NoActiveLayers;
                None
            }
        }
    }

    /// Drops the current table and starts loading the one for `layer`.
    pub fn switch_to(&mut self, layer: usize) -> (usize, u64) {
        self.generation += 1;
        self.current = Some(layer);
        self.table = TableState::Loading;
        (layer, self.generation)
    }

    /// Applies an attribute fetch result. Results for a replaced tab are ignored.
    pub fn apply(&mut self, layer: usize, generation: u64, result: Result<FeatureCollection, FetchError>) {
        if generation != self.generation || self.current != Some(layer) {
            log::debug!("Dropping stale attributes for layer {} (generation {})", layer, generation);
            return;
        }

        self.table = match result {
            Ok(collection) => match AttributeTable::from_features(layer, &collection.features) {
                Some(table) => TableState::Loaded(table),
                None => TableState::Empty,
            },
            Err(e) => {
                log::error!("Error retrieving attributes for layer {}: {}", layer, e);
                TableState::Failed
            }
        };
    }

    pub fn toggle_label(&self) -> &'static str {
        if self.minimized {
            "Show attributes"
        } else {
            "Minimize"
        }
    }

    /// Draws the tab row and the current table. Returns the tab the user picked.
    pub fn show(&mut self, ui: &mut Ui) -> Option<usize> {
        let mut picked = None;

        if self.tabs.is_empty() {
            ui.label(NO_ACTIVE_LAYERS);
            return None;
        }

        ui.horizontal_wrapped(|ui| {
            for (layer, title) in &self.tabs {
                if ui.selectable_label(self.current == Some(*layer), title).clicked() {
                    picked = Some(*layer);
                }
            }
        });
        ui.separator();

        if let Some((_, title)) = self.tabs.iter().find(|(layer, _)| Some(*layer) == self.current) {
            ui.label(RichText::new(format!("Layer attributes: {}", title)).strong());
        }

        match &mut self.table {
            TableState::NoActiveLayers => {
                ui.label(NO_ACTIVE_LAYERS);
            }
            TableState::Loading => {
                ui.spinner();
            }
            TableState::Loaded(table) => table.show(ui),
            TableState::Empty => {
                ui.label(NO_DATA);
            }
            TableState::Failed => {
                ui.label(FETCH_FAILED);
            }
        }

        picked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature(properties: serde_json::Value) -> Feature {
        Feature {
            geometry: None,
            properties: properties.as_object().cloned().unwrap_or_default(),
        }
    }

    fn table() -> AttributeTable {
        AttributeTable::from_features(
            0,
            &[
                feature(json!({"NOMBRE": "Chapinero", "CODIGO": 2, "AREA": 3.5})),
                feature(json!({"NOMBRE": "Suba", "CODIGO": 11, "AREA": 100.0})),
                feature(json!({"NOMBRE": "Suba", "CODIGO": 11, "AREA": 7.25})),
                feature(json!({"CODIGO": 19})),
            ],
        )
        .unwrap()
    }

    fn props(value: serde_json::Value) -> Properties {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn columns_follow_first_feature() {
        let table = table();
        assert_eq!(table.headers, ["NOMBRE", "CODIGO", "AREA"]);
        assert_eq!(table.rows[1], ["Suba", "11", "100"]);
        assert_eq!(table.rows[3], ["", "19", ""]);
    }

    #[test]
    fn no_features_means_no_table() {
        assert!(AttributeTable::from_features(0, &[]).is_none());
    }

    #[test]
    fn match_requires_every_present_property() {
        let table = table();
        assert_eq!(table.find_matching_row(&props(json!({"NOMBRE": "Suba", "CODIGO": 11, "AREA": 7.25}))), Some(2));
        assert_eq!(table.find_matching_row(&props(json!({"NOMBRE": "Suba", "CODIGO": 12}))), None);
    }

    #[test]
    fn absent_and_null_properties_are_wildcards() {
        let table = table();
        assert_eq!(table.find_matching_row(&props(json!({"CODIGO": 2}))), Some(0));
        assert_eq!(table.find_matching_row(&props(json!({"CODIGO": 19, "NOMBRE": null}))), Some(3));
        assert_eq!(table.find_matching_row(&props(json!({"OTHER": "x"}))), Some(0));
    }

    #[test]
    fn first_match_wins_on_ties() {
        let mut table = table();
        assert_eq!(table.select_matching(&props(json!({"NOMBRE": "Suba"}))), Some(1));
        assert_eq!(table.selected(), Some(1));

        assert_eq!(table.select_matching(&props(json!({"NOMBRE": "Bosa"}))), None);
        assert_eq!(table.selected(), None);
    }

    #[test]
    fn stale_replies_are_dropped() {
        let mut panel = AttributesPanel::default();
        let (layer, first) = panel.rebuild_tabs(vec![(0, "A".into()), (1, "B".into())]).unwrap();
        assert_eq!(layer, 0);

        let (_, second) = panel.switch_to(1);
        panel.apply(0, first, Ok(FeatureCollection { features: vec![feature(json!({"a": 1}))] }));
        assert_eq!(panel.table_state(), &TableState::Loading);

        panel.apply(1, second, Ok(FeatureCollection::default()));
        assert_eq!(panel.table_state(), &TableState::Empty);
    }

    #[test]
    fn failures_show_error_state() {
        let mut panel = AttributesPanel::default();
        let (layer, generation) = panel.rebuild_tabs(vec![(2, "C".into())]).unwrap();
        panel.apply(layer, generation, Err(FetchError::Status(reqwest::StatusCode::BAD_GATEWAY)));
        assert_eq!(panel.table_state(), &TableState::Failed);
    }

    #[test]
    fn no_tabs_means_no_active_layers() {
        let mut panel = AttributesPanel::default();
        panel.rebuild_tabs(vec![(0, "A".into())]);
        assert_eq!(panel.rebuild_tabs(Vec::new()), None);
        assert_eq!(panel.table_state(), &TableState::NoActiveLayers);
        assert_eq!(panel.current(), None);
    }
}
