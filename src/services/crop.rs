use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

use crate::models::object::BoundingBox;

#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("invalid crop dimensions ({width:.0}x{height:.0} after clamping)")]
    Degenerate { width: f32, height: f32 },

    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
}

/// Integer pixel rectangle after padding and clamping, ready for cropping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Expand `bbox` by `padding` pixels on every side, then clamp the result
/// to `[0, image_width] × [0, image_height]`. A box that collapses to a
/// non-positive extent after clamping (including a box entirely outside
/// the image) is an error, not a crash.
pub fn padded_crop_rect(
    bbox: &BoundingBox,
    padding: u32,
    image_width: u32,
    image_height: u32,
) -> Result<CropRect, CropError> {
    let pad = padding as f32;
    let left = (bbox.x - pad).max(0.0);
    let top = (bbox.y - pad).max(0.0);
    let right = (bbox.x + bbox.width + pad).min(image_width as f32);
    let bottom = (bbox.y + bbox.height + pad).min(image_height as f32);

    let width = right - left;
    let height = bottom - top;
    if width < 1.0 || height < 1.0 {
        return Err(CropError::Degenerate { width, height });
    }

    Ok(CropRect {
        x: left as u32,
        y: top as u32,
        width: width as u32,
        height: height as u32,
    })
}

/// Crop `image` to `bbox` plus padding and encode the region as JPEG.
pub fn crop_to_jpeg(
    image: &DynamicImage,
    bbox: &BoundingBox,
    padding: u32,
) -> Result<Vec<u8>, CropError> {
    let rect = padded_crop_rect(bbox, padding, image.width(), image.height())?;
    let cropped = image.crop_imm(rect.x, rect.y, rect.width, rect.height);
    encode_jpeg(&cropped)
}

/// Encode as JPEG, flattening any alpha channel first.
pub fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, CropError> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut bytes = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)?;
    Ok(bytes)
}

/// Scale `image` down so neither dimension exceeds `max_dim`, preserving
/// aspect ratio. Images already within bounds are returned untouched.
pub fn resize_within(image: DynamicImage, max_dim: u32) -> DynamicImage {
    if image.width() <= max_dim && image.height() <= max_dim {
        image
    } else {
        image.resize(max_dim, max_dim, image::imageops::FilterType::Lanczos3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([120, 90, 60, 255]),
        ))
    }

    #[test]
    fn test_interior_box_gets_full_padding() {
        let bbox = BoundingBox {
            x: 100.0,
            y: 100.0,
            width: 50.0,
            height: 40.0,
        };
        let rect = padded_crop_rect(&bbox, 20, 400, 400).unwrap();
        assert_eq!(
            rect,
            CropRect {
                x: 80,
                y: 80,
                width: 90,
                height: 80
            }
        );
    }

    #[test]
    fn test_box_near_origin_clamps_to_zero() {
        let bbox = BoundingBox {
            x: 5.0,
            y: 8.0,
            width: 30.0,
            height: 30.0,
        };
        let rect = padded_crop_rect(&bbox, 20, 400, 400).unwrap();
        assert_eq!(rect.x, 0);
        assert_eq!(rect.y, 0);
        // Right/bottom edges keep their padding: 5+30+20=55, 8+30+20=58.
        assert_eq!(rect.width, 55);
        assert_eq!(rect.height, 58);
    }

    #[test]
    fn test_box_overflowing_right_edge_clamps() {
        let bbox = BoundingBox {
            x: 380.0,
            y: 100.0,
            width: 50.0,
            height: 50.0,
        };
        let rect = padded_crop_rect(&bbox, 20, 400, 400).unwrap();
        assert_eq!(rect.x, 360);
        assert_eq!(rect.width, 40); // 400 - 360
        assert!(rect.width > 0 && rect.height > 0);
    }

    #[test]
    fn test_box_entirely_outside_is_error() {
        let bbox = BoundingBox {
            x: 500.0,
            y: 500.0,
            width: 50.0,
            height: 50.0,
        };
        let err = padded_crop_rect(&bbox, 20, 400, 400).unwrap_err();
        assert!(matches!(err, CropError::Degenerate { .. }));
        assert!(err.to_string().contains("invalid crop dimensions"));
    }

    #[test]
    fn test_box_with_negative_origin_clamps() {
        let bbox = BoundingBox {
            x: -60.0,
            y: -60.0,
            width: 100.0,
            height: 100.0,
        };
        let rect = padded_crop_rect(&bbox, 20, 400, 400).unwrap();
        assert_eq!((rect.x, rect.y), (0, 0));
        assert_eq!(rect.width, 60); // -60+100+20 clamped from the left
        assert_eq!(rect.height, 60);
    }

    #[test]
    fn test_crop_to_jpeg_produces_decodable_image() {
        let img = test_image(200, 200);
        let bbox = BoundingBox {
            x: 50.0,
            y: 50.0,
            width: 60.0,
            height: 60.0,
        };
        let jpeg = crop_to_jpeg(&img, &bbox, 20).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 100);
        assert_eq!(decoded.height(), 100);
    }

    #[test]
    fn test_encode_jpeg_flattens_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            10,
            10,
            Rgba([0, 255, 0, 128]),
        ));
        let jpeg = encode_jpeg(&img).unwrap();
        assert!(!jpeg.is_empty());
        image::load_from_memory(&jpeg).unwrap();
    }

    #[test]
    fn test_resize_within_shrinks_large_images() {
        let img = test_image(1024, 768);
        let resized = resize_within(img, 512);
        assert!(resized.width() <= 512 && resized.height() <= 512);
        // Aspect ratio preserved: 1024x768 -> 512x384.
        assert_eq!((resized.width(), resized.height()), (512, 384));
    }

    #[test]
    fn test_resize_within_keeps_small_images() {
        let img = test_image(300, 200);
        let resized = resize_within(img, 512);
        assert_eq!((resized.width(), resized.height()), (300, 200));
    }
}
