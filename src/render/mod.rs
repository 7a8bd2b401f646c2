use bytes::Bytes;
use image::DynamicImage;

use crate::{Result, ScalePolicy};

pub mod palette;
pub mod scale;
pub mod tile;

/// Composes scale -> split -> quantize into per-tile palette buffers.
/// Pure CPU work; the engine runs it on the blocking pool.
#[derive(Debug, Clone, Copy)]
pub struct RenderPipeline {
    unit: u32,
}

impl RenderPipeline {
    pub fn new(unit: u32) -> Self {
        Self { unit }
    }

    pub fn unit(&self) -> u32 {
        self.unit
    }

    /// Render one frame for a grid, returning `grid_w * grid_h` quantized
    /// tile buffers in row-major order, each `unit * unit` bytes.
    pub fn render_frame(
        &self,
        frame: &DynamicImage,
        grid_w: u32,
        grid_h: u32,
        policy: ScalePolicy,
    ) -> Result<Vec<Bytes>> {
        let scaled = scale::scale(frame, grid_w * self.unit, grid_h * self.unit, policy);
        let tiles = tile::split(&scaled, grid_w, grid_h, self.unit)?;
        Ok(tiles
            .iter()
            .map(|t| Bytes::from(palette::quantize(t)))
            .collect())
    }
}
