use image::{imageops, RgbaImage};

use crate::{CastError, Result};

/// Partition a scaled frame into `grid_w * grid_h` unit-sized tiles,
/// row-major. The input must measure exactly grid * unit in each axis.
pub fn split(img: &RgbaImage, grid_w: u32, grid_h: u32, unit: u32) -> Result<Vec<RgbaImage>> {
    if img.width() != grid_w * unit || img.height() != grid_h * unit {
        return Err(CastError::Render(format!(
            "tile split expects {}x{}, got {}x{}",
            grid_w * unit,
            grid_h * unit,
            img.width(),
            img.height()
        )));
    }

    let mut tiles = Vec::with_capacity((grid_w * grid_h) as usize);
    for row in 0..grid_h {
        for col in 0..grid_w {
            let tile = imageops::crop_imm(img, col * unit, row * unit, unit, unit).to_image();
            tiles.push(tile);
        }
    }
    Ok(tiles)
}
