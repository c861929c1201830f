//! Line breaking algorithm

use crate::layout::font::FontMetrics;
use std::ops::Range;
use unicode_linebreak::{linebreaks, BreakOpportunity};
use unicode_segmentation::UnicodeSegmentation;

/// One typeset line
#[derive(Debug, Clone, PartialEq)]
pub struct LineBox {
    /// Byte range within the paragraph this line covers
    pub range: Range<usize>,
    /// Advance width excluding trailing whitespace
    pub width: f32,
}

/// Greedy line breaker over Unicode break opportunities
#[derive(Debug, Default, Clone, Copy)]
pub struct LineBreaker;

impl LineBreaker {
    pub fn new() -> Self {
        Self
    }

    /// Break a paragraph into lines no wider than `max_width`, appending to `out`.
    ///
    /// Words wider than the line are split at grapheme boundaries. Empty
    /// text still yields one empty line.
    pub fn break_lines(&self, text: &str, max_width: f32, metrics: &FontMetrics, out: &mut Vec<LineBox>) {
        if text.is_empty() {
            out.push(LineBox {
                range: 0..0,
                width: 0.0,
            });
            return;
        }

        let mut line_start = 0;
        let mut line_width = 0.0f32;
        let mut seg_start = 0;

        for (idx, opportunity) in linebreaks(text) {
            let segment = &text[seg_start..idx];
            let full = text_width(segment, metrics);
            let trimmed = text_width(segment.trim_end(), metrics);

            if line_width + trimmed > max_width && seg_start > line_start {
                out.push(LineBox {
                    range: line_start..seg_start,
                    width: text_width(text[line_start..seg_start].trim_end(), metrics),
                });
                line_start = seg_start;
                line_width = 0.0;
            }

            if trimmed > max_width {
                // Emergency break inside an over-long word
                line_width = self.split_long(text, seg_start, idx, max_width, metrics, &mut line_start, out);
            } else {
                line_width += full;
            }

            if opportunity == BreakOpportunity::Mandatory {
                out.push(LineBox {
                    range: line_start..idx,
                    width: text_width(text[line_start..idx].trim_end(), metrics),
                });
                line_start = idx;
                line_width = 0.0;
            }
            seg_start = idx;
        }

        if line_start < text.len() {
            out.push(LineBox {
                range: line_start..text.len(),
                width: text_width(text[line_start..].trim_end(), metrics),
            });
        }
    }

    fn split_long(
        &self,
        text: &str,
        start: usize,
        end: usize,
        max_width: f32,
        metrics: &FontMetrics,
        line_start: &mut usize,
        out: &mut Vec<LineBox>,
    ) -> f32 {
        let mut width = 0.0f32;
        for (offset, grapheme) in text[start..end].grapheme_indices(true) {
            let at = start + offset;
            let w = grapheme_width(grapheme, metrics);
            if width + w > max_width && at > *line_start {
                out.push(LineBox {
                    range: *line_start..at,
                    width,
                });
                *line_start = at;
                width = 0.0;
            }
            width += w;
        }
        width
    }
}

/// Width of a run of text
pub fn text_width(text: &str, metrics: &FontMetrics) -> f32 {
    text.graphemes(true).map(|g| grapheme_width(g, metrics)).sum()
}

fn grapheme_width(grapheme: &str, metrics: &FontMetrics) -> f32 {
    if grapheme == "\t" {
        metrics.default_width * 4.0
    } else if grapheme.chars().all(|c| c.is_control()) {
        0.0
    } else {
        grapheme.chars().map(|c| metrics.width(c)).sum()
    }
}
