//! Rasterisation: render selected pages to `DynamicImage` via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. `tokio::task::spawn_blocking` moves the work onto a dedicated
//! blocking-pool thread so the async workers never stall during CPU-heavy
//! rendering.
//!
//! ## Why cap pixels, not DPI?
//!
//! Sheet sizes vary wildly: an A0 plan at 150 DPI is a 7 000 × 9 900 px
//! image, and at 300 DPI it would exhaust memory. Pages are rendered at the
//! requested density and then downsampled (Lanczos3) so the longest edge
//! equals `max_page_pixels`, preserving aspect ratio. An absolute area guard
//! remains behind the cap for configurations that raise it recklessly.

use crate::config::ConversionConfig;
use crate::error::PlanVisionError;
use crate::output::DocumentMetadata;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// Hard ceiling on post-downsample page area, in pixels.
/// 2^28 ≈ a 16384×16384 RGBA page, ~1 GiB of pixel data.
const MAX_PAGE_AREA: u64 = 268_435_456;

/// Rasterise selected pages of a document into bitmaps.
///
/// Runs inside `spawn_blocking` since pdfium operations are CPU-bound.
/// Fails with [`PlanVisionError::NoPages`] when the document yields no
/// pages, and with [`PlanVisionError::PageTooLarge`] when a page exceeds
/// [`MAX_PAGE_AREA`] even after downsampling.
///
/// # Returns
/// A vector of `(page_index_0based, DynamicImage)` tuples in page order.
pub async fn render_pages(
    doc_path: &Path,
    config: &ConversionConfig,
    page_indices: &[usize],
) -> Result<Vec<(usize, DynamicImage)>, PlanVisionError> {
    let path = doc_path.to_path_buf();
    let dpi = config.dpi;
    let max_pixels = config.max_page_pixels;
    let password = config.password.clone();
    let indices = page_indices.to_vec();

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&path, dpi, max_pixels, password.as_deref(), &indices)
    })
    .await
    .map_err(|e| PlanVisionError::Internal(format!("Render task panicked: {}", e)))?
}

/// Blocking implementation of page rendering.
fn render_pages_blocking(
    doc_path: &Path,
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
    page_indices: &[usize],
) -> Result<Vec<(usize, DynamicImage)>, PlanVisionError> {
    let pdfium = Pdfium::default();

    let document = pdfium.load_pdf_from_file(doc_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                PlanVisionError::WrongPassword {
                    path: doc_path.to_path_buf(),
                }
            } else {
                PlanVisionError::PasswordRequired {
                    path: doc_path.to_path_buf(),
                }
            }
        } else {
            PlanVisionError::CorruptDocument {
                path: doc_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if total_pages == 0 {
        return Err(PlanVisionError::NoPages {
            path: doc_path.to_path_buf(),
        });
    }
    info!("Document loaded: {} pages", total_pages);

    // Pages are laid out in points (1/72 inch); render at the requested
    // density and let `cap_page` bound the pixel dimensions afterwards.
    let scale = dpi as f32 / 72.0;
    let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);

    let mut results = Vec::with_capacity(page_indices.len());

    for &idx in page_indices {
        if idx >= total_pages {
            warn!(
                "Skipping page {} (out of range, total={})",
                idx + 1,
                total_pages
            );
            continue;
        }

        let page = pages
            .get(idx as u16)
            .map_err(|e| PlanVisionError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            PlanVisionError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = cap_page(bitmap.as_image(), idx + 1, max_pixels)?;
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        results.push((idx, image));
    }

    Ok(results)
}

/// Downsample a page so its longest edge is at most `max_pixels`, then check
/// the absolute area guard.
///
/// `DynamicImage::resize` fits within the given bounds while preserving
/// aspect ratio, so after resizing `max(new_w, new_h) == max_pixels` (to
/// within one pixel of rounding) for any page that was over the cap.
fn cap_page(
    image: DynamicImage,
    page_num: usize,
    max_pixels: u32,
) -> Result<DynamicImage, PlanVisionError> {
    let (w, h) = (image.width(), image.height());

    let image = if w.max(h) > max_pixels {
        debug!(
            "Downsampling page {}: {}x{} → longest edge {}",
            page_num, w, h, max_pixels
        );
        image.resize(max_pixels, max_pixels, image::imageops::FilterType::Lanczos3)
    } else {
        image
    };

    check_page_area(image.width(), image.height(), page_num)?;

    Ok(image)
}

/// The absolute area guard behind the downsample cap.
fn check_page_area(width: u32, height: u32, page_num: usize) -> Result<(), PlanVisionError> {
    if width as u64 * height as u64 > MAX_PAGE_AREA {
        return Err(PlanVisionError::PageTooLarge {
            page: page_num,
            width,
            height,
            limit: MAX_PAGE_AREA,
        });
    }
    Ok(())
}

/// Extract document metadata without dispatching anything.
pub async fn extract_metadata(
    doc_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, PlanVisionError> {
    let path = doc_path.to_path_buf();
    let pwd = password.map(|s| s.to_string());

    tokio::task::spawn_blocking(move || extract_metadata_blocking(&path, pwd.as_deref()))
        .await
        .map_err(|e| PlanVisionError::Internal(format!("Metadata task panicked: {}", e)))?
}

/// Blocking implementation of metadata extraction.
fn extract_metadata_blocking(
    doc_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, PlanVisionError> {
    let pdfium = Pdfium::default();

    let document =
        pdfium
            .load_pdf_from_file(doc_path, password)
            .map_err(|e| PlanVisionError::CorruptDocument {
                path: doc_path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;

    let metadata = document.metadata();
    let pages = document.pages();

    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    Ok(DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
        page_count: pages.len() as usize,
        pdf_version: format!("{:?}", document.version()),
    })
}
