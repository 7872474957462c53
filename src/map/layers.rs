use serde::{Deserialize, Serialize};

/// A WMS layer published by GeoServer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WmsLayer {
    pub url: String,
    pub layer_name: String,
    pub display_name: String,
}

impl WmsLayer {
    pub fn new(url: impl Into<String>, layer_name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            layer_name: layer_name.into(),
            display_name: display_name.into(),
        }
    }
}

/// The fixed set of overlays and which of them are currently on the map.
/// Indices are stable for the lifetime of the registry.
#[derive(Debug, Clone)]
pub struct LayerRegistry {
    layers: Vec<WmsLayer>,
    active: Vec<bool>,
}

impl LayerRegistry {
    pub fn new(layers: Vec<WmsLayer>) -> Self {
        let active = vec![true; layers.len()];
        Self { layers, active }
    }

    pub fn get(&self, index: usize) -> Option<&WmsLayer> {
        self.layers.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &WmsLayer)> {
        self.layers.iter().enumerate()
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.active.get(index).copied().unwrap_or(false)
    }

    /// Returns true when the flag actually changed.
    pub fn set_active(&mut self, index: usize, active: bool) -> bool {
        match self.active.get_mut(index) {
            Some(flag) if *flag != active => {
                *flag = active;
                true
            }
            _ => false,
        }
    }

    pub fn activate_all(&mut self) {
        self.active.iter_mut().for_each(|flag| *flag = true);
    }

    pub fn active_layers(&self) -> Vec<(usize, &WmsLayer)> {
        self.iter().filter(|(index, _)| self.active[*index]).collect()
    }

    pub fn active_indices(&self) -> Vec<usize> {
        self.active_layers().into_iter().map(|(index, _)| index).collect()
    }

    /// Comma separated names of the active layers, minus `excluded`, or `None`
    /// when nothing is left to query.
    pub fn query_layers(&self, excluded: &str) -> Option<String> {
        let names: Vec<&str> = self
            .active_layers()
            .into_iter()
            .map(|(_, layer)| layer.layer_name.as_str())
            .filter(|name| *name != excluded)
            .collect();

        if names.is_empty() {
            None
        } else {
            Some(names.join(","))
        }
    }
}
