//! Media compression: re-encode fetched images as JPEG at a target quality.
//!
//! Runs over the media cache *before* the renderer embeds anything, so the
//! PDF only ever contains the compressed bytes. Anki decks accumulate
//! screenshots and phone photos that dwarf the text content; re-encoding at
//! quality 80–90 routinely shrinks the output by an order of magnitude with
//! no visible loss at print size.
//!
//! The stage is strictly best-effort: a payload that fails to decode or
//! re-encode passes through untouched and the caller records a warning.
//! Alpha channels are flattened to RGB because baseline JPEG has no
//! transparency.

use image::codecs::jpeg::JpegEncoder;
use tracing::debug;

/// Re-encode an image payload as RGB JPEG at the given quality (1–95).
///
/// Returns the new bytes, or an error if the payload is not a decodable
/// image — the caller is expected to keep the original bytes in that case.
pub fn compress_image(data: &[u8], quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory(data)?;
    let rgb = img.to_rgb8();

    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode_image(&rgb)?;

    debug!(
        "Re-encoded image: {} → {} bytes at quality {}",
        data.len(),
        buf.len(),
        quality
    );
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_fixture(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([10, 200, 30, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .expect("encode fixture");
        buf
    }

    #[test]
    fn output_is_jpeg() {
        let png = png_fixture(32, 32);
        let jpeg = compress_image(&png, 80).expect("compress should succeed");
        // JPEG SOI marker
        assert_eq!(&jpeg[..3], &[0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn output_decodes_with_same_dimensions() {
        let png = png_fixture(48, 16);
        let jpeg = compress_image(&png, 60).expect("compress should succeed");
        let back = image::load_from_memory(&jpeg).expect("re-decode");
        assert_eq!(back.width(), 48);
        assert_eq!(back.height(), 16);
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let err = compress_image(b"definitely not an image", 80);
        assert!(err.is_err());
    }
}
