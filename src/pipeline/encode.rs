//! Encoding: tile bitmap → base64 asset wrapped in `ImageData`.
//!
//! Vision APIs accept images as base64 data embedded in the request body.
//! PNG is the default format because it is lossless: compression artefacts
//! on fine line-art are exactly the kind of noise that makes a vision model
//! misread a dimension string. JPEG halves payload size at the cost of
//! fidelity and is an explicit opt-in, with quality clamped to 1–95.
//!
//! `detail: "high"` instructs GPT-4-class models to use the full image tile
//! budget; without it fine print and hatching are lost.

use crate::config::EncodeFormat;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a tile under the given format policy, ready for dispatch.
pub fn encode_tile(
    img: &DynamicImage,
    format: EncodeFormat,
) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    match format.clamped() {
        EncodeFormat::Png => {
            img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
        }
        EncodeFormat::Jpeg { quality } => {
            // JPEG has no alpha channel; flatten first.
            let rgb = img.to_rgb8();
            let mut cursor = Cursor::new(&mut buf);
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality);
            rgb.write_with_encoder(encoder)?;
        }
    }

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} tile as {} → {} bytes base64",
        img.width(),
        img.height(),
        format.mime_type(),
        b64.len()
    );

    Ok(ImageData::new(b64, format.mime_type()).with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn encode_png_default() {
        let data = encode_tile(&sample(), EncodeFormat::Png).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        // PNG magic bytes.
        assert_eq!(&decoded[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn encode_jpeg_with_quality() {
        let data = encode_tile(&sample(), EncodeFormat::Jpeg { quality: 85 })
            .expect("encode should succeed");
        assert_eq!(data.mime_type, "image/jpeg");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        // JPEG SOI marker.
        assert_eq!(&decoded[..2], &[0xFF, 0xD8]);

        // The payload must be a complete, decodable JPEG, not a truncated
        // buffer.
        let img = image::load_from_memory(&decoded).expect("decodable JPEG");
        assert_eq!((img.width(), img.height()), (10, 10));
    }

    #[test]
    fn out_of_range_jpeg_quality_is_clamped() {
        // quality 255 clamps to 95 rather than erroring.
        let data = encode_tile(&sample(), EncodeFormat::Jpeg { quality: 255 })
            .expect("encode should succeed");
        assert_eq!(data.mime_type, "image/jpeg");
    }
}
