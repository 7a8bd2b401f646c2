use image::RgbaImage;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Entries in the display medium's native color table.
pub const PALETTE_LEN: usize = 232;

/// Fixed palette: a 6x6x6 color cube followed by a 16-step grayscale ramp.
/// Index order matters for tie-breaking and must never change.
pub static PALETTE: Lazy<[[u8; 3]; PALETTE_LEN]> = Lazy::new(build_palette);

fn build_palette() -> [[u8; 3]; PALETTE_LEN] {
    let mut table = [[0u8; 3]; PALETTE_LEN];
    let steps = [0u8, 51, 102, 153, 204, 255];
    let mut i = 0;
    for r in steps {
        for g in steps {
            for b in steps {
                table[i] = [r, g, b];
                i += 1;
            }
        }
    }
    for k in 0..16u32 {
        let v = (k * 255 / 15) as u8;
        table[i] = [v, v, v];
        i += 1;
    }
    table
}

/// Nearest palette index by squared Euclidean RGB distance.
/// Ties resolve to the lowest index (strict `<` while scanning in order).
pub fn nearest_index(r: u8, g: u8, b: u8) -> u8 {
    let mut best = 0usize;
    let mut best_dist = u32::MAX;
    for (i, [pr, pg, pb]) in PALETTE.iter().enumerate() {
        let dr = r as i32 - *pr as i32;
        let dg = g as i32 - *pg as i32;
        let db = b as i32 - *pb as i32;
        let dist = (dr * dr + dg * dg + db * db) as u32;
        if dist < best_dist {
            best_dist = dist;
            best = i;
            if dist == 0 {
                break;
            }
        }
    }
    best as u8
}

/// Map every pixel to its nearest palette index. Pure and deterministic:
/// identical input bytes produce a byte-identical buffer. Pixels with
/// alpha < 128 map to index 0 (black).
pub fn quantize(img: &RgbaImage) -> Vec<u8> {
    let mut out = Vec::with_capacity((img.width() * img.height()) as usize);
    // Memo on exact RGB keys; frames repeat colors heavily across a tile.
    let mut memo: HashMap<[u8; 3], u8> = HashMap::new();
    for px in img.pixels() {
        let [r, g, b, a] = px.0;
        if a < 128 {
            out.push(0);
            continue;
        }
        let idx = *memo
            .entry([r, g, b])
            .or_insert_with(|| nearest_index(r, g, b));
        out.push(idx);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use rand::{Rng, SeedableRng};

    #[test]
    fn palette_shape() {
        assert_eq!(PALETTE.len(), PALETTE_LEN);
        assert_eq!(PALETTE[0], [0, 0, 0]);
        assert_eq!(PALETTE[215], [255, 255, 255]);
        assert_eq!(PALETTE[216], [0, 0, 0]);
        assert_eq!(PALETTE[231], [255, 255, 255]);
    }

    #[test]
    fn exact_colors_map_to_themselves() {
        for (i, [r, g, b]) in PALETTE.iter().enumerate().take(216) {
            let idx = nearest_index(*r, *g, *b) as usize;
            assert_eq!(PALETTE[idx], [*r, *g, *b], "entry {}", i);
        }
    }

    #[test]
    fn ties_break_to_lowest_index() {
        // Grays at multiples of 51 exist in both the cube and the ramp;
        // the cube entry has the lower index and must win.
        assert_eq!(nearest_index(0, 0, 0), 0);
        let idx = nearest_index(102, 102, 102);
        assert_eq!(PALETTE[idx as usize], [102, 102, 102]);
        assert!(idx < 216, "cube entry expected, got ramp index {}", idx);
    }

    #[test]
    fn transparent_pixels_are_black() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 10]));
        assert!(quantize(&img).iter().all(|&i| i == 0));
    }

    #[test]
    fn solid_color_is_uniform() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([200, 60, 10, 255]));
        let buf = quantize(&img);
        assert_eq!(buf.len(), 64);
        assert!(buf.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn quantize_is_deterministic() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x7117_ca57);
        for _ in 0..100 {
            let img = RgbaImage::from_fn(16, 16, |_, _| {
                Rgba([rng.gen(), rng.gen(), rng.gen(), rng.gen()])
            });
            assert_eq!(quantize(&img), quantize(&img));
        }
    }

    #[test]
    fn boundary_colors_are_stable() {
        // Straddles two cube steps; repeated runs must agree byte for byte.
        let img = RgbaImage::from_fn(6, 1, |x, _| {
            Rgba([25 + x as u8, 25, 25, 255])
        });
        assert_eq!(quantize(&img), quantize(&img));
    }
}
