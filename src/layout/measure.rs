//! Measurement oracle: rendered heights of candidate content blocks
//!
//! Pagination never computes heights itself. It asks an oracle how tall a
//! block of paragraphs would be at a fixed width and typography. The
//! built-in [`TextMeasurer`] approximates this with a width table; hosts
//! with a real rendering surface plug in their own implementation.

use crate::config::Typography;
use crate::error::LayoutError;
use crate::layout::font::FontMetrics;
use crate::layout::line_break::{LineBox, LineBreaker};
use std::cell::{Cell, RefCell, RefMut};
use std::ops::{Deref, DerefMut};
use tracing::warn;
use unicode_segmentation::UnicodeSegmentation;

/// Vertical placement of one paragraph inside a measured block
#[derive(Debug, Clone, PartialEq)]
pub struct ParagraphBox {
    /// Offset of the paragraph's top edge from the block's top edge
    pub top: f32,
    pub height: f32,
    /// Width of each typeset line, when the oracle knows it
    pub line_widths: Vec<f32>,
}

impl ParagraphBox {
    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }
}

/// Reports rendered heights at the oracle's configured width and typography
pub trait MeasurementOracle {
    /// Height of the paragraphs stacked as one block
    fn measure_block(&self, paragraphs: &[&str]) -> Result<f32, LayoutError>;

    /// Top offset and height of every paragraph in the block.
    ///
    /// The default derives boxes from prefix measurements, so each box
    /// absorbs the gap above it.
    fn layout_block(&self, paragraphs: &[&str]) -> Result<Vec<ParagraphBox>, LayoutError> {
        let mut boxes = Vec::with_capacity(paragraphs.len());
        let mut top = 0.0;
        for end in 1..=paragraphs.len() {
            let bottom = self.measure_block(&paragraphs[..end])?;
            boxes.push(ParagraphBox {
                top,
                height: (bottom - top).max(0.0),
                line_widths: Vec::new(),
            });
            top = bottom;
        }
        Ok(boxes)
    }

    /// Height of one typeset line, used when drawing previews
    fn line_height(&self) -> Option<f32> {
        None
    }
}

/// Reusable line buffer, cleared between measurements
#[derive(Debug, Default)]
struct ScratchSurface {
    lines: RefCell<Vec<LineBox>>,
}

impl ScratchSurface {
    fn acquire(&self) -> Result<ScratchGuard<'_>, LayoutError> {
        self.lines
            .try_borrow_mut()
            .map(ScratchGuard)
            .map_err(|_| LayoutError::MeasurementUnavailable("scratch surface busy".to_string()))
    }
}

/// Exclusive use of the scratch surface; clears it on release
struct ScratchGuard<'a>(RefMut<'a, Vec<LineBox>>);

impl Deref for ScratchGuard<'_> {
    type Target = Vec<LineBox>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for ScratchGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Drop for ScratchGuard<'_> {
    fn drop(&mut self) {
        self.0.clear();
    }
}

/// Width-table oracle built on the line breaker
#[derive(Debug)]
pub struct TextMeasurer {
    metrics: FontMetrics,
    width: f32,
    paragraph_spacing: f32,
    breaker: LineBreaker,
    scratch: ScratchSurface,
}

impl TextMeasurer {
    pub fn new(typography: &Typography, width: f32) -> Self {
        Self {
            metrics: FontMetrics::from_typography(typography),
            width,
            paragraph_spacing: typography.paragraph_spacing,
            breaker: LineBreaker::new(),
            scratch: ScratchSurface::default(),
        }
    }

    pub fn with_metrics(metrics: FontMetrics, width: f32, paragraph_spacing: f32) -> Self {
        Self {
            metrics,
            width,
            paragraph_spacing,
            breaker: LineBreaker::new(),
            scratch: ScratchSurface::default(),
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    fn typeset(&self, surface: &mut ScratchGuard<'_>, paragraph: &str) -> (f32, Vec<f32>) {
        surface.clear();
        self.breaker
            .break_lines(paragraph, self.width, &self.metrics, surface);
        let widths: Vec<f32> = surface.iter().map(|l| l.width).collect();
        (widths.len() as f32 * self.metrics.line_height, widths)
    }
}

impl MeasurementOracle for TextMeasurer {
    fn measure_block(&self, paragraphs: &[&str]) -> Result<f32, LayoutError> {
        let mut surface = self.scratch.acquire()?;
        let mut height = 0.0;
        for (i, paragraph) in paragraphs.iter().enumerate() {
            if i > 0 {
                height += self.paragraph_spacing;
            }
            height += self.typeset(&mut surface, paragraph).0;
        }
        Ok(height)
    }

    fn layout_block(&self, paragraphs: &[&str]) -> Result<Vec<ParagraphBox>, LayoutError> {
        let mut surface = self.scratch.acquire()?;
        let mut boxes = Vec::with_capacity(paragraphs.len());
        let mut top = 0.0;
        for paragraph in paragraphs {
            let (height, line_widths) = self.typeset(&mut surface, paragraph);
            boxes.push(ParagraphBox {
                top,
                height,
                line_widths,
            });
            top += height + self.paragraph_spacing;
        }
        Ok(boxes)
    }

    fn line_height(&self) -> Option<f32> {
        Some(self.metrics.line_height)
    }
}

/// Height of a candidate block against the capacity it must fit in.
///
/// Both values share a unit: pixels when measured, characters in the
/// degraded heuristic mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub height: f32,
    pub capacity: f32,
}

impl Fill {
    /// Inclusive: a block exactly at capacity still fits
    pub fn overflows(&self) -> bool {
        self.height > self.capacity
    }

    pub fn has_room(&self) -> bool {
        self.height < self.capacity
    }
}

/// Measures page candidates, degrading to a character count when the
/// oracle is missing or fails
pub(crate) struct Gauge<'a> {
    oracle: Option<&'a dyn MeasurementOracle>,
    capacity: f32,
    chars_per_page: usize,
    /// Height reserved at the top of the first page (e.g. a chapter title)
    first_page_reserve: f32,
    first_page_reserve_chars: usize,
    degraded: Cell<bool>,
}

impl<'a> Gauge<'a> {
    pub(crate) fn new(
        oracle: Option<&'a dyn MeasurementOracle>,
        capacity: f32,
        chars_per_page: usize,
    ) -> Self {
        Self {
            oracle,
            capacity,
            chars_per_page: chars_per_page.max(1),
            first_page_reserve: 0.0,
            first_page_reserve_chars: 0,
            degraded: Cell::new(oracle.is_none()),
        }
    }

    /// Reserve room on the first page, e.g. for a chapter heading
    pub(crate) fn with_first_page_reserve(mut self, reserve: f32) -> Self {
        let reserve = reserve.clamp(0.0, self.capacity.max(0.0));
        self.first_page_reserve = reserve;
        if self.capacity > 0.0 {
            let share = reserve / self.capacity;
            self.first_page_reserve_chars = (share * self.chars_per_page as f32).round() as usize;
        }
        self
    }

    pub(crate) fn is_degraded(&self) -> bool {
        self.degraded.get()
    }

    fn degrade(&self, err: &LayoutError) {
        if !self.degraded.replace(true) {
            warn!(error = %err, "measurement unavailable; falling back to characters per page");
        }
    }

    /// Measure paragraph bodies as they would sit on one page
    pub(crate) fn measure(&self, bodies: &[&str], first_page: bool) -> Fill {
        if !self.degraded.get() {
            if let Some(oracle) = self.oracle {
                match oracle.measure_block(bodies) {
                    Ok(height) => {
                        let reserve = if first_page { self.first_page_reserve } else { 0.0 };
                        return Fill {
                            height,
                            capacity: self.capacity - reserve,
                        };
                    }
                    Err(err) => self.degrade(&err),
                }
            }
        }

        let chars: usize = bodies.iter().map(|b| b.graphemes(true).count()).sum();
        let reserve = if first_page { self.first_page_reserve_chars } else { 0 };
        Fill {
            height: chars as f32,
            capacity: self.chars_per_page.saturating_sub(reserve).max(1) as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FailingOracle, FixedOracle};

    fn mono_measurer(width: f32) -> TextMeasurer {
        let widths = (0u8..128)
            .map(|b| if (b as char).is_control() { 0.0 } else { 10.0 })
            .collect();
        TextMeasurer::with_metrics(FontMetrics::new(20.0, widths, 10.0), width, 5.0)
    }

    #[test]
    fn test_measure_block_adds_spacing() {
        let m = mono_measurer(100.0);
        // "aaaa bbbb cccc" wraps onto two lines
        assert_eq!(m.measure_block(&["short"]).unwrap(), 20.0);
        assert_eq!(m.measure_block(&["aaaa bbbb cccc"]).unwrap(), 40.0);
        assert_eq!(m.measure_block(&["short", "aaaa bbbb cccc"]).unwrap(), 65.0);
        assert_eq!(m.measure_block(&[]).unwrap(), 0.0);
    }

    #[test]
    fn test_layout_block_matches_measure() {
        let m = mono_measurer(100.0);
        let paragraphs = ["one", "aaaa bbbb cccc", "three"];
        let boxes = m.layout_block(&paragraphs).unwrap();
        assert_eq!(boxes.len(), 3);
        assert_eq!(boxes[1].top, 25.0);
        assert_eq!(boxes[1].line_widths.len(), 2);
        assert_eq!(boxes[2].bottom(), m.measure_block(&paragraphs).unwrap());
    }

    #[test]
    fn test_scratch_is_released_between_calls() {
        let m = mono_measurer(100.0);
        for _ in 0..3 {
            assert_eq!(m.measure_block(&["x"]).unwrap(), 20.0);
        }
        assert!(m.scratch.lines.borrow().is_empty());
    }

    #[test]
    fn test_reentrant_acquire_is_reported() {
        let m = mono_measurer(100.0);
        let _held = m.scratch.acquire().unwrap();
        assert!(matches!(
            m.measure_block(&["x"]),
            Err(LayoutError::MeasurementUnavailable(_))
        ));
    }

    #[test]
    fn test_default_layout_block_from_prefixes() {
        let oracle = FixedOracle::default();
        let boxes = oracle.layout_block(&["a:400", "b:500", "c:300"]).unwrap();
        let tops: Vec<f32> = boxes.iter().map(|b| b.top).collect();
        assert_eq!(tops, vec![0.0, 400.0, 900.0]);
        assert_eq!(boxes[2].bottom(), 1200.0);
    }

    #[test]
    fn test_gauge_falls_back_to_characters() {
        let oracle = FailingOracle;
        let gauge = Gauge::new(Some(&oracle), 250.0, 10);
        let fill = gauge.measure(&["abcdef", "ghij"], false);
        assert!(gauge.is_degraded());
        assert_eq!(fill, Fill { height: 10.0, capacity: 10.0 });
        assert!(!fill.overflows());
    }

    #[test]
    fn test_gauge_reserves_first_page_room() {
        let oracle = FixedOracle::default();
        let gauge = Gauge::new(Some(&oracle), 250.0, 100).with_first_page_reserve(50.0);
        assert_eq!(gauge.measure(&["p:100"], true).capacity, 200.0);
        assert_eq!(gauge.measure(&["p:100"], false).capacity, 250.0);

        let degraded = Gauge::new(None, 250.0, 100).with_first_page_reserve(50.0);
        assert_eq!(degraded.measure(&["abc"], true).capacity, 80.0);
    }
}
