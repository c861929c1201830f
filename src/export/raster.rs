//! Rasterizing export pages
//!
//! Text is greeked: every typeset line becomes one bar of its measured
//! width. That keeps the raster faithful to line positions, which is what
//! slicing guarantees, without shipping a glyph renderer.

use crate::document::ImageAsset;
use crate::error::ExportError;
use crate::Rect;
use tiny_skia::{
    Color, FillRule, FilterQuality, Mask, Paint, PathBuilder, Pixmap, PixmapPaint, Transform,
};
use tracing::debug;

const TEXT_GREY: u8 = 64;
const HEADING_GREY: u8 = 16;
const PLACEHOLDER_GREY: u8 = 220;

/// How heavy a greeked line is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Body,
    Heading,
}

/// One typeset line, in content-box coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasLine {
    pub rect: Rect,
    pub style: LineStyle,
}

/// An image to draw, in content-box coordinates
#[derive(Debug, Clone, Copy)]
pub struct CanvasImage<'a> {
    pub rect: Rect,
    /// `None` when the asset is missing; a placeholder is drawn instead
    pub asset: Option<&'a ImageAsset>,
}

/// Everything needed to paint one export page
#[derive(Debug, Clone)]
pub struct SliceCanvas<'a> {
    /// Page size in logical pixels
    pub width: f32,
    pub height: f32,
    pub padding: f32,
    /// Device pixels per logical pixel
    pub scale: f32,
    /// Visible height of the content box; images are clipped to it
    pub visible_height: f32,
    /// Strip at the top of the content box repeated from the previous page
    pub seam: f32,
    pub lines: Vec<CanvasLine>,
    pub images: Vec<CanvasImage<'a>>,
}

impl<'a> SliceCanvas<'a> {
    pub fn new(width: f32, height: f32, padding: f32, scale: f32) -> Self {
        Self {
            width,
            height,
            padding,
            scale,
            visible_height: height - 2.0 * padding,
            seam: 0.0,
            lines: Vec::new(),
            images: Vec::new(),
        }
    }

    /// Pixel dimensions of the rendered page
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            (self.width * self.scale).ceil().max(1.0) as u32,
            (self.height * self.scale).ceil().max(1.0) as u32,
        )
    }

    fn content_width(&self) -> f32 {
        (self.width - 2.0 * self.padding).max(0.0)
    }
}

/// Paints a canvas into pixels
pub trait RasterBackend {
    fn render(&self, canvas: &SliceCanvas<'_>) -> Result<Pixmap, ExportError>;
}

/// tiny-skia backend
#[derive(Debug, Default, Clone, Copy)]
pub struct SkiaBackend;

impl SkiaBackend {
    pub fn new() -> Self {
        Self
    }
}

impl RasterBackend for SkiaBackend {
    fn render(&self, canvas: &SliceCanvas<'_>) -> Result<Pixmap, ExportError> {
        let (width, height) = canvas.pixel_size();
        let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
            ExportError::Raster(format!("cannot allocate a {width}x{height} page"))
        })?;
        pixmap.fill(Color::from_rgba8(255, 255, 255, 255));

        // Content-box coordinates to device pixels
        let transform = Transform::from_row(
            canvas.scale,
            0.0,
            0.0,
            canvas.scale,
            canvas.padding * canvas.scale,
            canvas.padding * canvas.scale,
        );
        let clip = content_mask(canvas, width, height, transform);

        for line in &canvas.lines {
            let grey = match line.style {
                LineStyle::Body => TEXT_GREY,
                LineStyle::Heading => HEADING_GREY,
            };
            fill(&mut pixmap, line.rect, grey, transform, clip.as_ref());
        }

        for image in &canvas.images {
            draw_image(&mut pixmap, image, transform, clip.as_ref());
        }

        if canvas.seam > 0.0 {
            let strip = Rect::new(0.0, 0.0, canvas.content_width(), canvas.seam);
            fill(&mut pixmap, strip, 255, transform, None);
        }

        Ok(pixmap)
    }
}

fn content_mask(canvas: &SliceCanvas<'_>, width: u32, height: u32, transform: Transform) -> Option<Mask> {
    let rect = tiny_skia::Rect::from_xywh(
        0.0,
        0.0,
        canvas.content_width().max(1.0),
        canvas.visible_height.max(1.0),
    )?;
    let mut mask = Mask::new(width, height)?;
    mask.fill_path(&PathBuilder::from_rect(rect), FillRule::Winding, false, transform);
    Some(mask)
}

fn fill(pixmap: &mut Pixmap, rect: Rect, grey: u8, transform: Transform, clip: Option<&Mask>) {
    let Some(rect) = tiny_skia::Rect::from_xywh(rect.x, rect.y, rect.width, rect.height) else {
        return;
    };
    let mut paint = Paint::default();
    paint.set_color(Color::from_rgba8(grey, grey, grey, 255));
    paint.anti_alias = false;
    pixmap.fill_rect(rect, &paint, transform, clip);
}

fn draw_image(pixmap: &mut Pixmap, image: &CanvasImage<'_>, transform: Transform, clip: Option<&Mask>) {
    let decoded = image
        .asset
        .and_then(|asset| decode_image_to_pixmap(&asset.bytes, &asset.mime));
    let Some(source) = decoded else {
        debug!(width = image.rect.width, height = image.rect.height, "drawing image placeholder");
        fill(pixmap, image.rect, PLACEHOLDER_GREY, transform, clip);
        return;
    };

    let sx = image.rect.width / source.width() as f32;
    let sy = image.rect.height / source.height() as f32;
    let placement = transform.pre_concat(Transform::from_row(sx, 0.0, 0.0, sy, image.rect.x, image.rect.y));
    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    pixmap.draw_pixmap(0, 0, source.as_ref(), &paint, placement, clip);
}

/// Decode an asset into a premultiplied pixmap
fn decode_image_to_pixmap(data: &[u8], mime: &str) -> Option<Pixmap> {
    let format = image::ImageFormat::from_mime_type(mime).or_else(|| image::guess_format(data).ok());
    let decoded = match format {
        Some(format) => image::load_from_memory_with_format(data, format).ok()?,
        None => image::load_from_memory(data).ok()?,
    };
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height)?;
    for (src, dst) in rgba.as_raw().chunks_exact(4).zip(pixmap.data_mut().chunks_exact_mut(4)) {
        let a = src[3];
        dst[0] = premul_u8(src[0], a);
        dst[1] = premul_u8(src[1], a);
        dst[2] = premul_u8(src[2], a);
        dst[3] = a;
    }
    Some(pixmap)
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use std::io::Cursor;

    fn pixel(pixmap: &Pixmap, x: u32, y: u32) -> (u8, u8, u8) {
        let c = pixmap.pixel(x, y).unwrap().demultiply();
        (c.red(), c.green(), c.blue())
    }

    fn red_png(w: u32, h: u32) -> ImageAsset {
        let buffer: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_pixel(w, h, Rgba([255, 0, 0, 255]));
        let mut bytes = Vec::new();
        buffer
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        ImageAsset::from_bytes(bytes).unwrap()
    }

    fn canvas<'a>() -> SliceCanvas<'a> {
        SliceCanvas::new(100.0, 100.0, 10.0, 1.0)
    }

    #[test]
    fn test_blank_canvas_is_white() {
        let pixmap = SkiaBackend::new().render(&canvas()).unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (100, 100));
        assert_eq!(pixel(&pixmap, 50, 50), (255, 255, 255));
    }

    #[test]
    fn test_scale_multiplies_pixels() {
        let mut c = canvas();
        c.scale = 2.0;
        assert_eq!(c.pixel_size(), (200, 200));
    }

    #[test]
    fn test_lines_are_drawn_inside_padding() {
        let mut c = canvas();
        c.lines.push(CanvasLine {
            rect: Rect::new(0.0, 0.0, 40.0, 10.0),
            style: LineStyle::Body,
        });
        let pixmap = SkiaBackend::new().render(&c).unwrap();
        assert_eq!(pixel(&pixmap, 15, 15), (TEXT_GREY, TEXT_GREY, TEXT_GREY));
        assert_eq!(pixel(&pixmap, 5, 5), (255, 255, 255));
        assert_eq!(pixel(&pixmap, 60, 15), (255, 255, 255));
    }

    #[test]
    fn test_seam_strip_hides_repeated_row() {
        let mut c = canvas();
        c.seam = 4.0;
        c.lines.push(CanvasLine {
            rect: Rect::new(0.0, 0.0, 40.0, 10.0),
            style: LineStyle::Body,
        });
        let pixmap = SkiaBackend::new().render(&c).unwrap();
        assert_eq!(pixel(&pixmap, 15, 11), (255, 255, 255));
        assert_eq!(pixel(&pixmap, 15, 17), (TEXT_GREY, TEXT_GREY, TEXT_GREY));
    }

    #[test]
    fn test_image_is_decoded_and_clipped() {
        let asset = red_png(4, 4);
        let mut c = canvas();
        c.visible_height = 30.0;
        c.images.push(CanvasImage {
            rect: Rect::new(0.0, 20.0, 20.0, 20.0),
            asset: Some(&asset),
        });
        let pixmap = SkiaBackend::new().render(&c).unwrap();
        assert_eq!(pixel(&pixmap, 15, 35), (255, 0, 0));
        // Below the visible content box
        assert_eq!(pixel(&pixmap, 15, 45), (255, 255, 255));
    }

    #[test]
    fn test_missing_asset_draws_placeholder() {
        let mut c = canvas();
        c.images.push(CanvasImage {
            rect: Rect::new(0.0, 0.0, 20.0, 20.0),
            asset: None,
        });
        let pixmap = SkiaBackend::new().render(&c).unwrap();
        assert_eq!(
            pixel(&pixmap, 15, 15),
            (PLACEHOLDER_GREY, PLACEHOLDER_GREY, PLACEHOLDER_GREY)
        );
    }

    #[test]
    fn test_premultiply() {
        assert_eq!(premul_u8(255, 255), 255);
        assert_eq!(premul_u8(255, 0), 0);
        assert_eq!(premul_u8(200, 128), 100);
    }
}
