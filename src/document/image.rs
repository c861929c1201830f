//! Floating image records and their binary assets

use crate::Rect;
use serde::{Deserialize, Serialize};

/// Stable identifier for a floating image
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub u64);

/// An image positioned over a page independently of the text flow.
///
/// `x`, `y`, `width` and `height` are offsets within the owning page's
/// content box, so they survive changes to margins or output resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloatingImage {
    pub id: ImageId,
    /// Key into the document's asset table
    pub image_ref: String,
    /// Section-local page slot the image is pinned to
    pub page: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Width over height, captured when the image was attached
    pub aspect_ratio: f32,
}

impl FloatingImage {
    /// Bounding rectangle in content-box coordinates
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn set_rect(&mut self, rect: Rect) {
        self.x = rect.x;
        self.y = rect.y;
        self.width = rect.width;
        self.height = rect.height;
    }

    /// Rescale into a container of a different resolution
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
            ..self.clone()
        }
    }
}

/// Binary payload behind an image reference
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAsset {
    pub mime: String,
    pub natural_width: u32,
    pub natural_height: u32,
    pub bytes: Vec<u8>,
}

impl ImageAsset {
    /// Decode just enough of an encoded image to learn its dimensions
    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        let format = image::guess_format(&bytes).ok()?;
        let decoded = image::load_from_memory_with_format(&bytes, format).ok()?;
        let mime = format.to_mime_type().to_string();
        Some(Self {
            mime,
            natural_width: decoded.width(),
            natural_height: decoded.height(),
            bytes,
        })
    }

    /// Natural aspect ratio (width over height)
    pub fn aspect_ratio(&self) -> f32 {
        if self.natural_height == 0 {
            1.0
        } else {
            self.natural_width as f32 / self.natural_height as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FloatingImage {
        FloatingImage {
            id: ImageId(1),
            image_ref: "cover".into(),
            page: 0,
            x: 10.0,
            y: 20.0,
            width: 100.0,
            height: 50.0,
            aspect_ratio: 2.0,
        }
    }

    #[test]
    fn test_scaled_is_linear() {
        let img = sample().scaled(2.0, 3.0);
        assert_eq!(img.rect(), Rect::new(20.0, 60.0, 200.0, 150.0));
        assert_eq!(img.aspect_ratio, 2.0);
    }

    #[test]
    fn test_asset_from_png() {
        let mut png = Vec::new();
        let img = image::RgbaImage::from_pixel(4, 2, image::Rgba([255, 0, 0, 255]));
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let asset = ImageAsset::from_bytes(png).unwrap();
        assert_eq!((asset.natural_width, asset.natural_height), (4, 2));
        assert_eq!(asset.aspect_ratio(), 2.0);
        assert_eq!(asset.mime, "image/png");
    }

    #[test]
    fn test_asset_rejects_garbage() {
        assert!(ImageAsset::from_bytes(vec![1, 2, 3]).is_none());
    }
}
