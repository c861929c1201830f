//! Line-accurate export slicing
//!
//! The export pass lays a whole section out once at export width and
//! slides a window of the inner page height over it. Windows end on
//! paragraph bottoms, so a line of text is never cut.

use crate::config::ExportConfig;
use crate::layout::ParagraphBox;
use std::ops::Range;
use tracing::warn;

/// Window geometry for slicing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceWindow {
    pub inner_height: f32,
    pub safety_margin: f32,
    pub seam_overlap: f32,
}

impl SliceWindow {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            inner_height: config.inner_height(),
            safety_margin: config.safety_margin,
            seam_overlap: config.seam_overlap,
        }
    }
}

/// One export page cut from a section's block layout
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSlice {
    /// Window top in section block coordinates
    pub top: f32,
    /// Bottom of the last paragraph drawn (or the window bottom when forced)
    pub bottom: f32,
    /// Paragraphs that end inside this slice, or the cut paragraph when forced
    pub paragraphs: Range<usize>,
    /// No paragraph fit, so the window advanced mid-paragraph
    pub forced: bool,
    /// Height of the strip at the top repeated from the previous slice
    pub seam: f32,
}

impl ExportSlice {
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn contains_y(&self, y: f32) -> bool {
        y >= self.top && y < self.bottom
    }
}

/// Cut a laid-out section into export pages.
///
/// Each window ends at the last paragraph whose bottom sits within
/// `top + inner_height - safety_margin`; the next starts `seam_overlap`
/// above that bottom. When nothing fits the window advances by its full
/// height and the cut paragraph appears on two slices.
pub fn slice_section(boxes: &[ParagraphBox], window: &SliceWindow) -> Vec<ExportSlice> {
    let mut slices = Vec::new();
    if boxes.is_empty() {
        slices.push(ExportSlice {
            top: 0.0,
            bottom: 0.0,
            paragraphs: 0..0,
            forced: false,
            seam: 0.0,
        });
        return slices;
    }

    let advance = window.inner_height.max(1.0);
    let mut top = 0.0f32;
    let mut seam = 0.0f32;
    let mut first = 0;
    while first < boxes.len() {
        let limit = top + window.inner_height - window.safety_margin;
        let fitting = boxes[first..]
            .iter()
            .take_while(|b| b.bottom() <= limit)
            .count();

        if fitting > 0 {
            let last = first + fitting - 1;
            let bottom = boxes[last].bottom();
            slices.push(ExportSlice {
                top,
                bottom,
                paragraphs: first..last + 1,
                forced: false,
                seam,
            });
            seam = window.seam_overlap.min(bottom - top).max(0.0);
            top = bottom - seam;
            first = last + 1;
        } else {
            warn!(
                paragraph = first,
                height = boxes[first].height,
                window = window.inner_height,
                "paragraph taller than an export page; cutting it"
            );
            slices.push(ExportSlice {
                top,
                bottom: top + advance,
                paragraphs: first..first + 1,
                forced: true,
                seam,
            });
            top += advance;
            seam = 0.0;
        }
    }
    slices
}

/// Index of the slice whose window holds `y`; points past the end land on
/// the last slice
pub fn slice_for_y(slices: &[ExportSlice], y: f32) -> usize {
    slices
        .iter()
        .position(|s| s.contains_y(y))
        .or_else(|| slices.iter().rposition(|s| s.top <= y))
        .unwrap_or(0)
}

/// Last slice that draws the given paragraph
pub fn slice_for_paragraph(slices: &[ExportSlice], paragraph: usize) -> Option<usize> {
    slices.iter().rposition(|s| s.paragraphs.contains(&paragraph))
}
