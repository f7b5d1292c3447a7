//! RGBA rasters held in memory.

use meridian_types::cartesian::Size;

use crate::error::MeridianError;

/// An image decoded into memory as RGBA8 pixels, row by row from the top left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    bytes: Vec<u8>,
    size: Size<u32>,
}

impl DecodedImage {
    /// Decodes an image from a byte slice.
    ///
    /// The format is guessed from the data. Non-RGBA images are converted to RGBA.
    pub fn new(bytes: &[u8]) -> Result<Self, MeridianError> {
        let decoded = image::load_from_memory(bytes)?.to_rgba8();
        let size = Size::new(decoded.width(), decoded.height());

        Ok(Self {
            bytes: decoded.into_raw(),
            size,
        })
    }

    /// Wraps raw RGBA bytes. Fails if the length of the buffer does not match the size.
    pub fn from_raw(bytes: impl Into<Vec<u8>>, size: Size<u32>) -> Result<Self, MeridianError> {
        let bytes = bytes.into();
        let expected = size.width() as usize * size.height() as usize * 4;
        if bytes.len() != expected {
            return Err(MeridianError::Generic(format!(
                "invalid image buffer: expected {expected} bytes for {}x{} image, got {}",
                size.width(),
                size.height(),
                bytes.len()
            )));
        }

        Ok(Self { bytes, size })
    }

    /// Fully transparent image of the given size.
    pub fn blank(size: Size<u32>) -> Self {
        Self {
            bytes: vec![0; size.width() as usize * size.height() as usize * 4],
            size,
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.size.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.size.height()
    }

    /// Size in pixels.
    pub fn size(&self) -> Size<u32> {
        self.size
    }

    /// Raw RGBA bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Color of the pixel, or `None` if the coordinates are outside of the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let offset = self.offset(x, y)?;
        let mut color = [0; 4];
        color.copy_from_slice(&self.bytes[offset..offset + 4]);
        Some(color)
    }

    pub(crate) fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 4]) {
        if let Some(offset) = self.offset(x, y) {
            self.bytes[offset..offset + 4].copy_from_slice(&color);
        }
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width() || y >= self.height() {
            return None;
        }

        Some((y as usize * self.width() as usize + x as usize) * 4)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn decode_png() {
        let source = image::RgbImage::from_fn(3, 2, |x, y| image::Rgb([x as u8 * 10, y as u8, 7]));
        let mut encoded = Vec::new();
        image::DynamicImage::ImageRgb8(source)
            .write_to(&mut Cursor::new(&mut encoded), image::ImageOutputFormat::Png)
            .expect("encoding to memory");

        let decoded = DecodedImage::new(&encoded).expect("valid png");
        assert_eq!(decoded.size(), Size::new(3, 2));
        assert_eq!(decoded.pixel(2, 1), Some([20, 1, 7, 255]));
        assert_eq!(decoded.pixel(3, 1), None);
    }

    #[test]
    fn invalid_data() {
        assert_matches!(
            DecodedImage::new(&[1, 2, 3]),
            Err(MeridianError::ImageDecode(_))
        );
        assert_matches!(
            DecodedImage::from_raw(vec![0; 15], Size::new(2, 2)),
            Err(MeridianError::Generic(_))
        );
    }

    #[test]
    fn set_pixels() {
        let mut image = DecodedImage::blank(Size::new(2, 2));
        assert_eq!(image.pixel(1, 1), Some([0; 4]));
        image.set_pixel(1, 1, [1, 2, 3, 4]);
        image.set_pixel(5, 5, [1, 2, 3, 4]);
        assert_eq!(image.pixel(1, 1), Some([1, 2, 3, 4]));
        assert_eq!(&image.bytes()[12..], &[1, 2, 3, 4]);
    }
}
