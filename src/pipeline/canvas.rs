//! Canvas assembly: stack all page bitmaps into one tall bitmap.
//!
//! Used when the caller wants the whole document presented as a single
//! continuous image (canvas layout). The canvas is `max(page widths)` wide
//! and `Σ page heights` tall; page `i` sits at vertical offset
//! `Σ_{j<i} height_j`. Narrower pages are left-aligned and the slack is
//! filled with white, which reads as blank paper to a vision model.

use crate::error::PlanVisionError;
use image::{DynamicImage, Rgba, RgbaImage};
use tracing::debug;

/// Stack page bitmaps vertically into one canvas, preserving page order.
pub fn stack_pages(pages: &[DynamicImage]) -> Result<DynamicImage, PlanVisionError> {
    if pages.is_empty() {
        return Err(PlanVisionError::Internal(
            "canvas assembly called with zero pages".into(),
        ));
    }

    let width = pages.iter().map(|p| p.width()).max().unwrap_or(0);
    let height: u32 = pages.iter().map(|p| p.height()).sum();

    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));

    let mut offset: i64 = 0;
    for page in pages {
        image::imageops::overlay(&mut canvas, &page.to_rgba8(), 0, offset);
        offset += page.height() as i64;
    }

    debug!("Assembled canvas: {}x{} from {} pages", width, height, pages.len());

    Ok(DynamicImage::ImageRgba8(canvas))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            w,
            h,
            Rgba([rgb[0], rgb[1], rgb[2], 255]),
        ))
    }

    #[test]
    fn canvas_dimensions_are_max_width_sum_height() {
        let pages = vec![solid(100, 50, [0, 0, 0]), solid(80, 70, [0, 0, 0])];
        let canvas = stack_pages(&pages).unwrap();
        assert_eq!(canvas.width(), 100);
        assert_eq!(canvas.height(), 120);
    }

    #[test]
    fn pages_sit_at_cumulative_offsets() {
        let pages = vec![
            solid(10, 10, [255, 0, 0]),
            solid(10, 20, [0, 255, 0]),
            solid(10, 5, [0, 0, 255]),
        ];
        let canvas = stack_pages(&pages).unwrap().to_rgba8();

        assert_eq!(canvas.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(0, 10), &Rgba([0, 255, 0, 255]));
        assert_eq!(canvas.get_pixel(0, 29), &Rgba([0, 255, 0, 255]));
        assert_eq!(canvas.get_pixel(0, 30), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn narrow_pages_padded_with_white() {
        let pages = vec![solid(20, 10, [0, 0, 0]), solid(10, 10, [0, 0, 0])];
        let canvas = stack_pages(&pages).unwrap().to_rgba8();

        // Right half of the second page's band is padding.
        assert_eq!(canvas.get_pixel(15, 15), &Rgba([255, 255, 255, 255]));
        // The page's own pixels are intact.
        assert_eq!(canvas.get_pixel(5, 15), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(stack_pages(&[]).is_err());
    }
}
