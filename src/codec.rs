//! Image codec seam — the only place that decodes or encodes JPEG bytes.
//!
//! The store never interprets blob contents itself; it asks an
//! [`ImageCodec`] for original dimensions at insert time and for a rendered
//! variant at lazy-resize time.  [`JpegCodec`] is the production
//! implementation; tests substitute their own to observe or fail codec
//! calls.

use image::imageops::FilterType;
use image::ImageFormat;
use std::io::Cursor;

use crate::error::ImgFsError;

/// JPEG re-encode quality for derived variants.
pub const JPEG_QUALITY: u8 = 85;

pub trait ImageCodec: Send + Sync {
    /// Decoded (width, height) of a JPEG byte sequence.
    fn dimensions(&self, jpeg: &[u8]) -> Result<(u32, u32), ImgFsError>;

    /// Render `jpeg` as a new JPEG fitting within `width` × `height`,
    /// preserving aspect ratio.
    fn resize(&self, jpeg: &[u8], width: u16, height: u16) -> Result<Vec<u8>, ImgFsError>;
}

/// Production codec backed by the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegCodec;

impl ImageCodec for JpegCodec {
    fn dimensions(&self, jpeg: &[u8]) -> Result<(u32, u32), ImgFsError> {
        let img = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)
            .map_err(|e| ImgFsError::Codec(e.to_string()))?;
        Ok((img.width(), img.height()))
    }

    fn resize(&self, jpeg: &[u8], width: u16, height: u16) -> Result<Vec<u8>, ImgFsError> {
        let img = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)
            .map_err(|e| ImgFsError::Codec(e.to_string()))?;

        let resized = img.resize(width as u32, height as u32, FilterType::Triangle);

        let mut out = Vec::new();
        resized
            .write_to(
                &mut Cursor::new(&mut out),
                image::ImageOutputFormat::Jpeg(JPEG_QUALITY),
            )
            .map_err(|e| ImgFsError::Codec(e.to_string()))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn sample_jpeg(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(w, h, |x, y| Rgb([x as u8, y as u8, 128]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageOutputFormat::Jpeg(90))
            .unwrap();
        buf
    }

    #[test]
    fn dimensions_of_sample() {
        let jpeg = sample_jpeg(320, 200);
        assert_eq!(JpegCodec.dimensions(&jpeg).unwrap(), (320, 200));
    }

    #[test]
    fn resize_fits_within_bounds() {
        let jpeg = sample_jpeg(320, 200);
        let out = JpegCodec.resize(&jpeg, 64, 64).unwrap();
        let (w, h) = JpegCodec.dimensions(&out).unwrap();
        assert!(w <= 64 && h <= 64);
        // Aspect ratio preserved: 320:200 → the width axis saturates.
        assert_eq!(w, 64);
    }

    #[test]
    fn garbage_is_a_codec_error() {
        let err = JpegCodec.dimensions(b"not a jpeg").unwrap_err();
        assert!(matches!(err, ImgFsError::Codec(_)));
    }
}
