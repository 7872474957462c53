use egui::{RichText, Ui};

use crate::error::FetchError;
use crate::map::layers::WmsLayer;
use crate::map::map_tile::Raster;

#[derive(Debug)]
pub enum LegendImage {
    Loading,
    Loaded(Raster),
    Failed,
}

#[derive(Debug)]
pub struct LegendEntry {
    pub layer: usize,
    pub title: String,
    pub image: LegendImage,
}

/// Legend items for the active overlays, in registry order.
#[derive(Debug, Default)]
pub struct Legend {
    entries: Vec<LegendEntry>,
    pub minimized: bool,
}

impl Legend {
    #[cfg(test)]
    pub fn entries(&self) -> &[LegendEntry] {
        &self.entries
    }

    #[cfg(test)]
    pub fn layers(&self) -> Vec<usize> {
        self.entries.iter().map(|entry| entry.layer).collect()
    }

    /// Replaces the entries with one per active layer. Images already loaded
    /// for a layer that stays active are kept; the returned layers need a
    /// legend fetch.
    pub fn rebuild(&mut self, active: &[(usize, &WmsLayer)]) -> Vec<usize> {
        let mut previous = std::mem::take(&mut self.entries);
        let mut to_fetch = Vec::new();

        for (index, layer) in active {
            let kept = previous
                .iter()
                .position(|entry| entry.layer == *index)
                .map(|position| previous.swap_remove(position).image)
                .filter(|image| matches!(image, LegendImage::Loaded(_)));

            let image = kept.unwrap_or_else(|| {
                to_fetch.push(*index);
                LegendImage::Loading
            });

            self.entries.push(LegendEntry {
                layer: *index,
                title: layer.display_name.clone(),
                image,
            });
        }

        to_fetch
    }

    pub fn apply_image(&mut self, layer: usize, result: Result<Raster, FetchError>) {
        let Some(entry) = self.entries.iter_mut().find(|entry| entry.layer == layer) else {
            return;
        };

        entry.image = match result {
            Ok(raster) => LegendImage::Loaded(raster),
            Err(e) => {
                log::warn!("Legend for {} unavailable: {}", entry.title, e);
                LegendImage::Failed
            }
        };
    }

    pub fn toggle(&mut self) {
        self.minimized = !self.minimized;
    }

    pub fn toggle_label(&self) -> &'static str {
        if self.minimized {
            "Expand"
        } else {
            "Minimize"
        }
    }

    pub fn show(&mut self, ui: &mut Ui) {
        for entry in &mut self.entries {
            ui.label(RichText::new(&entry.title).strong());
            match &mut entry.image {
                LegendImage::Loading => {
                    ui.spinner();
                }
                LegendImage::Loaded(raster) => {
                    let size = raster.size();
                    let texture = raster.texture(ui.ctx(), format!("legend_{}", entry.layer));
                    ui.image((texture.id(), size));
                }
                LegendImage::Failed => {
                    ui.weak(format!("Legend of {}", entry.title));
                }
            }
            ui.add_space(6.0);
        }
    }
}
