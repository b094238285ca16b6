//! Thumbnail derivation for image attachments.

use std::io::Cursor;

use anyhow::{Context, Result};
use image::ImageFormat;

use tidesync_core::attachments::{Thumbnailer, THUMBNAIL_MAX_EDGE};

/// Decodes PNG, JPEG, GIF, and WebP payloads and re-encodes a preview as
/// PNG whose longest edge is at most `max_edge`. Smaller images keep
/// their size.
pub struct ImageThumbnailer {
    max_edge: u32,
}

impl ImageThumbnailer {
    pub fn new(max_edge: u32) -> Self {
        Self { max_edge }
    }
}

impl Default for ImageThumbnailer {
    fn default() -> Self {
        Self::new(THUMBNAIL_MAX_EDGE)
    }
}

impl Thumbnailer for ImageThumbnailer {
    fn thumbnail(&self, bytes: &[u8], mime_type: &str) -> Result<Vec<u8>> {
        let img = image::load_from_memory(bytes)
            .with_context(|| format!("failed to decode {} payload", mime_type))?;

        let img = if img.width().max(img.height()) > self.max_edge {
            img.thumbnail(self.max_edge, self.max_edge)
        } else {
            img
        };

        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png)
            .context("failed to encode thumbnail")?;
        Ok(out.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 20, 30])));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_large_image_is_bounded() {
        let thumb = ImageThumbnailer::default()
            .thumbnail(&png(400, 300), "image/png")
            .unwrap();
        let decoded = image::load_from_memory(&thumb).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 150));
    }

    #[test]
    fn test_small_image_keeps_size() {
        let thumb = ImageThumbnailer::default()
            .thumbnail(&png(40, 20), "image/png")
            .unwrap();
        let decoded = image::load_from_memory(&thumb).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 20));
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(ImageThumbnailer::default()
            .thumbnail(b"not an image", "image/png")
            .is_err());
    }
}
