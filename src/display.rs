use dashmap::DashMap;
use image::RgbaImage;

use crate::{CastError, Display, Result, ScalePolicy};

/// Owns every Display record. Cross-references stay id-based: sessions and
/// shows hold display ids, never the records themselves.
pub struct DisplayRegistry {
    displays: DashMap<String, Display>,
}

impl DisplayRegistry {
    pub fn new() -> Self {
        Self {
            displays: DashMap::new(),
        }
    }

    pub fn insert(&self, display: Display) -> Result<()> {
        if display.surfaces.len() != display.tile_count() {
            return Err(CastError::Display(format!(
                "display {} declares a {}x{} grid but carries {} surfaces",
                display.id,
                display.grid_width,
                display.grid_height,
                display.surfaces.len()
            )));
        }
        self.displays.insert(display.id.clone(), display);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Option<Display> {
        self.displays.remove(id).map(|(_, d)| d)
    }

    pub fn get(&self, id: &str) -> Option<Display> {
        self.displays.get(id).map(|d| d.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.displays.contains_key(id)
    }

    pub fn list(&self) -> Vec<Display> {
        let mut all: Vec<Display> = self.displays.iter().map(|d| d.clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn set_scale_policy(&self, id: &str, policy: ScalePolicy) -> Result<()> {
        match self.displays.get_mut(id) {
            Some(mut d) => {
                d.scale_policy = policy;
                Ok(())
            }
            None => Err(CastError::Display(format!("no such display: {}", id))),
        }
    }

    pub fn set_idle_thumbnail(&self, id: &str, thumbnail: Option<RgbaImage>) -> Result<()> {
        match self.displays.get_mut(id) {
            Some(mut d) => {
                d.idle_thumbnail = thumbnail;
                Ok(())
            }
            None => Err(CastError::Display(format!("no such display: {}", id))),
        }
    }
}

impl Default for DisplayRegistry {
    fn default() -> Self {
        Self::new()
    }
}
