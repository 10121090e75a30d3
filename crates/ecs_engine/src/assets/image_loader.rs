//! Image decoding for fetched image assets
//!
//! Provides PNG, JPEG, GIF, BMP and WebP decoding into a uniform RGBA8 layout.

use crate::assets::AssetError;

/// Decoded image pixels
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Raw RGBA pixel data
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Number of color channels (always 4 for RGBA)
    pub channels: u8,
}

impl ImageData {
    /// Decode an image from encoded bytes, converting to RGBA8
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| AssetError::Decode(format!("Failed to decode image: {}", e)))?;

        let rgba_img = img.to_rgba8();
        let (width, height) = rgba_img.dimensions();

        log::debug!("Decoded image {}x{}", width, height);

        Ok(Self {
            data: rgba_img.into_raw(),
            width,
            height,
            channels: 4,
        })
    }

    /// Get the size of the image data in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn pixel(img: &ImageData, x: u32, y: u32) -> [u8; 4] {
        let offset = ((y * img.width + x) * 4) as usize;
        img.data[offset..offset + 4].try_into().unwrap()
    }

    #[test]
    fn test_decode_png_keeps_pixels() {
        let mut source = RgbaImage::from_pixel(3, 2, Rgba([0, 0, 255, 255]));
        source.put_pixel(2, 1, Rgba([10, 20, 30, 40]));
        let mut encoded = Cursor::new(Vec::new());
        source.write_to(&mut encoded, ImageFormat::Png).unwrap();

        let img = ImageData::from_bytes(encoded.get_ref()).unwrap();
        assert_eq!((img.width, img.height), (3, 2));
        assert_eq!(img.channels, 4);
        assert_eq!(pixel(&img, 0, 0), [0, 0, 255, 255]);
        assert_eq!(pixel(&img, 2, 1), [10, 20, 30, 40]);
    }

    #[test]
    fn test_decode_jpeg_expands_to_rgba() {
        let source = RgbImage::from_pixel(8, 8, Rgb([200, 200, 200]));
        let mut encoded = Cursor::new(Vec::new());
        source.write_to(&mut encoded, ImageFormat::Jpeg).unwrap();

        let img = ImageData::from_bytes(encoded.get_ref()).unwrap();
        assert_eq!(img.size_bytes(), 8 * 8 * 4);
        assert_eq!(pixel(&img, 0, 0)[3], 255);
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        assert!(matches!(
            ImageData::from_bytes(b"definitely not an image"),
            Err(AssetError::Decode(_))
        ));
    }
}
