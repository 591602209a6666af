//! Tiling: partition an oversized bitmap into a row-major grid of bounded tiles.
//!
//! The grid is the contract, not an implementation detail. Cell `(r, c)`
//! covers rows `[r·T, min((r+1)·T, H))` and columns `[c·T, min((c+1)·T, W))`
//! for tile cap `T`: trailing tiles are smaller than `T` whenever the bitmap
//! dimension is not a multiple of `T` — never truncated, never padded. The
//! tiles of a bitmap exactly partition its pixel area, so a downstream
//! consumer can reconstruct the original by pasting each tile back at its
//! recorded rectangle.
//!
//! A bitmap no larger than `T` in both dimensions yields exactly one tile
//! equal to the whole bitmap; the grid only exists to respect the provider's
//! input-size ceiling.

use crate::output::{Provenance, TileRect};
use image::DynamicImage;
use tracing::debug;

/// Compute the row-major tile grid for a `width`×`height` bitmap with tile
/// cap `cap`. Pure geometry; yields `ceil(height/cap) · ceil(width/cap)`
/// rectangles in row-major order (top row left-to-right, then the next row).
pub fn tile_grid(width: u32, height: u32, cap: u32) -> Vec<TileRect> {
    let grid_rows = height.div_ceil(cap);
    let grid_cols = width.div_ceil(cap);

    let mut rects = Vec::with_capacity((grid_rows * grid_cols) as usize);
    for r in 0..grid_rows {
        for c in 0..grid_cols {
            rects.push(TileRect {
                left: c * cap,
                top: r * cap,
                right: ((c + 1) * cap).min(width),
                bottom: ((r + 1) * cap).min(height),
            });
        }
    }
    rects
}

/// Cut a page (or canvas) bitmap into tiles, each tagged with its provenance.
///
/// `page` is the owning page index recorded in each tile's [`Provenance`]
/// (0 for a canvas). Crops are taken with `crop_imm`, so the source bitmap
/// is only copied tile-by-tile and peak extra memory per tile is bounded by
/// `cap²` pixels.
pub fn tile_page(img: &DynamicImage, page: usize, cap: u32) -> Vec<(Provenance, DynamicImage)> {
    let (width, height) = (img.width(), img.height());
    let grid_cols = width.div_ceil(cap);

    let tiles: Vec<(Provenance, DynamicImage)> = tile_grid(width, height, cap)
        .into_iter()
        .enumerate()
        .map(|(i, rect)| {
            let provenance = Provenance {
                page,
                rect,
                row: i as u32 / grid_cols,
                col: i as u32 % grid_cols,
            };
            let crop = img.crop_imm(rect.left, rect.top, rect.width(), rect.height());
            (provenance, crop)
        })
        .collect();

    debug!(
        "Tiled page {} ({}x{}) into {} tiles (cap {})",
        page,
        width,
        height,
        tiles.len(),
        cap
    );

    tiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn small_bitmap_yields_one_whole_tile() {
        let rects = tile_grid(800, 600, 2000);
        assert_eq!(rects.len(), 1);
        assert_eq!(
            rects[0],
            TileRect {
                left: 0,
                top: 0,
                right: 800,
                bottom: 600
            }
        );
    }

    #[test]
    fn tile_count_matches_ceil_formula() {
        // 5000x3000 with cap 2000: 3 columns x 2 rows = 6 tiles.
        let rects = tile_grid(5000, 3000, 2000);
        assert_eq!(rects.len(), 6);
    }

    #[test]
    fn trailing_tiles_are_remainders() {
        let rects = tile_grid(5000, 3000, 2000);
        // Last column is 1000 wide, last row is 1000 tall.
        let last = rects.last().unwrap();
        assert_eq!(last.width(), 1000);
        assert_eq!(last.height(), 1000);
        assert_eq!(last.right, 5000);
        assert_eq!(last.bottom, 3000);
    }

    #[test]
    fn grid_exactly_partitions_area() {
        for (w, h, cap) in [(5000u32, 3000u32, 2000u32), (1999, 2001, 1000), (1, 1, 2000)] {
            let rects = tile_grid(w, h, cap);
            let total: u64 = rects.iter().map(|r| r.area()).sum();
            assert_eq!(total, w as u64 * h as u64, "area for {w}x{h} cap {cap}");

            // No overlaps: each pixel's covering tile is unique by construction;
            // spot-check pairwise disjointness.
            for (i, a) in rects.iter().enumerate() {
                for b in rects.iter().skip(i + 1) {
                    let disjoint = a.right <= b.left
                        || b.right <= a.left
                        || a.bottom <= b.top
                        || b.bottom <= a.top;
                    assert!(disjoint, "tiles overlap: {a:?} vs {b:?}");
                }
            }
        }
    }

    #[test]
    fn grid_is_row_major() {
        let rects = tile_grid(3000, 3000, 2000);
        // 2x2 grid: (0,0), (0,2000), (2000,0), (2000,2000) in (top,left) terms.
        assert_eq!((rects[0].top, rects[0].left), (0, 0));
        assert_eq!((rects[1].top, rects[1].left), (0, 2000));
        assert_eq!((rects[2].top, rects[2].left), (2000, 0));
        assert_eq!((rects[3].top, rects[3].left), (2000, 2000));
    }

    #[test]
    fn tiling_is_deterministic() {
        let a = tile_grid(5120, 3333, 1024);
        let b = tile_grid(5120, 3333, 1024);
        assert_eq!(a, b);
    }

    #[test]
    fn tile_page_records_grid_position() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            30,
            20,
            Rgba([255, 255, 255, 255]),
        ));
        let tiles = tile_page(&img, 4, 10);
        assert_eq!(tiles.len(), 6); // 3 cols x 2 rows

        let (prov, crop) = &tiles[4]; // row 1, col 1
        assert_eq!(prov.page, 4);
        assert_eq!((prov.row, prov.col), (1, 1));
        assert_eq!(prov.rect.left, 10);
        assert_eq!(prov.rect.top, 10);
        assert_eq!((crop.width(), crop.height()), (10, 10));
    }

    #[test]
    fn reconstruction_reproduces_original() {
        // A gradient image so every pixel is distinguishable.
        let mut src = RgbaImage::new(25, 17);
        for (x, y, px) in src.enumerate_pixels_mut() {
            *px = Rgba([x as u8 * 7, y as u8 * 11, (x + y) as u8, 255]);
        }
        let img = DynamicImage::ImageRgba8(src.clone());

        let mut rebuilt = RgbaImage::new(25, 17);
        for (prov, tile) in tile_page(&img, 0, 8) {
            for (x, y, px) in tile.to_rgba8().enumerate_pixels() {
                rebuilt.put_pixel(prov.rect.left + x, prov.rect.top + y, *px);
            }
        }

        assert_eq!(src, rebuilt);
    }

    #[test]
    fn one_tile_per_page_when_under_cap() {
        // Scenario: 1000x1000 page, cap 2000 — exactly one tile, whole page.
        let img =
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(1000, 1000, Rgba([0, 0, 0, 255])));
        let tiles = tile_page(&img, 0, 2000);
        assert_eq!(tiles.len(), 1);
        let (prov, crop) = &tiles[0];
        assert_eq!(prov.rect.area(), 1_000_000);
        assert_eq!((crop.width(), crop.height()), (1000, 1000));
    }
}
