use crate::error::DecodeError;
use image::{ImageReader, RgbImage};
use std::io::Cursor;

/// Decoded RGB8 pixels, independent of the encoding they came from.
#[derive(Debug, Clone)]
pub struct CanonicalImage {
    pixels: RgbImage,
}

impl CanonicalImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }
}

/// Sniffs the format from `raw_bytes`, decodes it and forces 3-channel color.
///
/// Alpha is dropped and grayscale is expanded. No resizing happens here, the
/// model host owns the input geometry.
pub fn decode(raw_bytes: &[u8]) -> Result<CanonicalImage, DecodeError> {
    if raw_bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let img = ImageReader::new(Cursor::new(raw_bytes))
        .with_guessed_format()?
        .decode()?;

    Ok(CanonicalImage {
        pixels: img.to_rgb8(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, Rgba, RgbaImage};

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(vec![]);
        img.write_to(&mut buf, format).expect("encode test image");
        buf.into_inner()
    }

    #[test_log::test]
    fn decode_png_with_alpha_drops_alpha() {
        let rgba = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 128]));
        let bytes = encode(DynamicImage::ImageRgba8(rgba), ImageFormat::Png);

        let image = decode(&bytes).expect("png should decode");
        assert_eq!((image.width(), image.height()), (4, 3));
        assert_eq!(image.pixels().get_pixel(0, 0), &Rgb([10, 20, 30]));
        assert_eq!(image.pixels().as_raw().len(), 4 * 3 * 3);
    }

    #[test_log::test]
    fn decode_grayscale_expands_to_rgb() {
        let gray = GrayImage::from_pixel(2, 2, Luma([77]));
        let bytes = encode(DynamicImage::ImageLuma8(gray), ImageFormat::Png);

        let image = decode(&bytes).expect("grayscale png should decode");
        assert_eq!(image.pixels().get_pixel(1, 1), &Rgb([77, 77, 77]));
    }

    #[test_log::test]
    fn decode_jpeg() {
        let rgb = image::RgbImage::from_pixel(16, 16, Rgb([200, 100, 50]));
        let bytes = encode(DynamicImage::ImageRgb8(rgb), ImageFormat::Jpeg);

        let image = decode(&bytes).expect("jpeg should decode");
        assert_eq!((image.width(), image.height()), (16, 16));
    }

    #[test_log::test]
    fn decode_rejects_empty_buffer() {
        assert!(matches!(decode(&[]), Err(DecodeError::Empty)));
    }

    #[test_log::test]
    fn decode_rejects_text_bytes() {
        let result = decode(b"this is definitely not an image");
        assert!(matches!(result, Err(DecodeError::Image(_))));
    }

    #[test_log::test]
    fn decode_rejects_truncated_png() {
        let rgb = image::RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]));
        let bytes = encode(DynamicImage::ImageRgb8(rgb), ImageFormat::Png);

        assert!(decode(&bytes[..bytes.len() / 2]).is_err());
    }
}
