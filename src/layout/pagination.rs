//! Pagination for a flowing section
//!
//! Pages are runs of whole paragraphs. A fresh layout packs paragraphs
//! greedily; after an edit only the pages touching the changed region are
//! rebuilt, then an overflow pass pushes trailing paragraphs forward and an
//! underflow pass pulls leading paragraphs back.

use crate::document::{paragraph_at, spans_range, split_paragraphs, ParagraphSpan};
use crate::layout::measure::{Fill, Gauge, MeasurementOracle};
use crate::layout::LayoutConstraints;
use std::ops::Range;
use tracing::{debug, warn};

/// One live page: a contiguous run of paragraphs
#[derive(Debug, Clone, PartialEq)]
pub struct PageSlice {
    /// Paragraph indices on this page
    pub paragraphs: Range<usize>,
    /// Measured content height (characters when degraded)
    pub height: f32,
    /// A single paragraph taller than the page, placed alone
    pub oversized: bool,
}

impl PageSlice {
    fn empty(at: usize) -> Self {
        Self::unmeasured(at..at)
    }

    fn unmeasured(paragraphs: Range<usize>) -> Self {
        Self {
            paragraphs,
            height: 0.0,
            oversized: false,
        }
    }

    fn measured(paragraphs: Range<usize>, fill: Fill) -> Self {
        let oversized = paragraphs.len() == 1 && fill.overflows();
        Self {
            paragraphs,
            height: fill.height,
            oversized,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paragraphs.len()
    }
}

/// Pagination rules
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationRules {
    /// Content height available on every page
    pub capacity: f32,
    /// Characters per page when measurement is unavailable
    pub fallback_chars_per_page: usize,
    /// Height taken from the first page by the section heading
    pub first_page_reserve: f32,
}

impl Default for PaginationRules {
    fn default() -> Self {
        Self {
            capacity: LayoutConstraints::default().content_height(),
            fallback_chars_per_page: 1800,
            first_page_reserve: 0.0,
        }
    }
}

impl PaginationRules {
    pub fn new(capacity: f32, fallback_chars_per_page: usize) -> Self {
        Self {
            capacity,
            fallback_chars_per_page,
            first_page_reserve: 0.0,
        }
    }

    pub fn with_first_page_reserve(mut self, reserve: f32) -> Self {
        self.first_page_reserve = reserve;
        self
    }

    fn gauge<'a>(&self, oracle: Option<&'a dyn MeasurementOracle>) -> Gauge<'a> {
        Gauge::new(oracle, self.capacity, self.fallback_chars_per_page)
            .with_first_page_reserve(self.first_page_reserve)
    }
}

/// Split section text into pages.
///
/// Always returns at least one page; text without paragraphs yields a
/// single empty page.
pub fn paginate(text: &str, rules: &PaginationRules, oracle: Option<&dyn MeasurementOracle>) -> Vec<PageSlice> {
    SectionPages::new(text, rules, oracle).pages
}

/// Page layout of one section, kept in sync with its text
#[derive(Debug, Clone)]
pub struct SectionPages {
    text: String,
    spans: Vec<ParagraphSpan>,
    pages: Vec<PageSlice>,
    degraded: bool,
}

impl SectionPages {
    pub fn new(text: &str, rules: &PaginationRules, oracle: Option<&dyn MeasurementOracle>) -> Self {
        let spans = split_paragraphs(text);
        let gauge = rules.gauge(oracle);
        let pages = {
            let bodies = bodies(text, &spans);
            greedy(&bodies, &gauge)
        };
        Self {
            text: text.to_string(),
            spans,
            pages,
            degraded: gauge.is_degraded(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn spans(&self) -> &[ParagraphSpan] {
        &self.spans
    }

    pub fn pages(&self) -> &[PageSlice] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Whether the last pass fell back to the character heuristic
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Paragraph indices shown on a page
    pub fn page_paragraphs(&self, page: usize) -> Option<Range<usize>> {
        self.pages.get(page).map(|slice| slice.paragraphs.clone())
    }

    /// Byte range of the section text shown on a page
    pub fn page_range(&self, page: usize) -> Option<Range<usize>> {
        let slice = self.pages.get(page)?;
        if self.spans.is_empty() {
            return Some(0..self.text.len());
        }
        Some(spans_range(&self.spans, slice.paragraphs.clone()))
    }

    pub fn page_text(&self, page: usize) -> Option<&str> {
        self.page_range(page).map(|r| &self.text[r])
    }

    pub fn page_of_paragraph(&self, paragraph: usize) -> Option<usize> {
        self.pages
            .iter()
            .position(|p| p.paragraphs.contains(&paragraph))
    }

    /// Page showing the given byte offset; the end of text maps to the last page
    pub fn page_containing_offset(&self, offset: usize) -> usize {
        paragraph_at(&self.spans, offset)
            .and_then(|p| self.page_of_paragraph(p))
            .unwrap_or(0)
    }

    /// Rerun the full greedy pass, e.g. after the page geometry changed
    pub fn repaginate(&mut self, rules: &PaginationRules, oracle: Option<&dyn MeasurementOracle>) {
        let gauge = rules.gauge(oracle);
        let bodies = bodies(&self.text, &self.spans);
        self.pages = greedy(&bodies, &gauge);
        self.degraded = gauge.is_degraded();
    }

    /// Bring the layout up to date with new section text.
    ///
    /// Returns false when the text is unchanged, in which case page
    /// membership is left exactly as it was.
    pub fn reflow(&mut self, text: &str, rules: &PaginationRules, oracle: Option<&dyn MeasurementOracle>) -> bool {
        if text == self.text {
            return false;
        }

        let new_spans = split_paragraphs(text);
        let gauge = rules.gauge(oracle);
        let started_degraded = gauge.is_degraded();
        let new_bodies = bodies(text, &new_spans);

        let pages = if self.spans.is_empty() || new_spans.is_empty() {
            greedy(&new_bodies, &gauge)
        } else {
            let region = changed_region(&self.text, &self.spans, text, new_spans.len());
            let (mut pages, edited) = merge_edited(&self.pages, &region);
            let last_touched = overflow_pass(&mut pages, edited, &new_bodies, &gauge);
            underflow_pass(&mut pages, edited, last_touched, &new_bodies, &gauge);
            if pages.is_empty() {
                pages.push(PageSlice::empty(0));
            }
            pages
        };

        // Heights from the two units must not mix
        let degraded = gauge.is_degraded();
        self.pages = if degraded != started_degraded || degraded != self.degraded {
            greedy(&new_bodies, &gauge)
        } else {
            pages
        };
        debug!(
            pages = self.pages.len(),
            paragraphs = new_spans.len(),
            "section reflowed"
        );
        self.text = text.to_string();
        self.spans = new_spans;
        self.degraded = degraded;
        true
    }
}

fn bodies<'t>(text: &'t str, spans: &[ParagraphSpan]) -> Vec<&'t str> {
    spans.iter().map(|s| s.body_text(text)).collect()
}

fn measure(pages: &[PageSlice], idx: usize, bodies: &[&str], gauge: &Gauge<'_>) -> Fill {
    gauge.measure(&bodies[pages[idx].paragraphs.clone()], idx == 0)
}

fn greedy(bodies: &[&str], gauge: &Gauge<'_>) -> Vec<PageSlice> {
    let mut pages = Vec::new();
    if bodies.is_empty() {
        pages.push(PageSlice::empty(0));
        return pages;
    }

    let mut start = 0;
    let mut fill = gauge.measure(&bodies[0..1], true);
    for next in 1..bodies.len() {
        let first = pages.is_empty();
        let candidate = gauge.measure(&bodies[start..=next], first);
        if candidate.overflows() {
            close_page(&mut pages, start..next, fill);
            start = next;
            fill = gauge.measure(&bodies[next..=next], false);
        } else {
            fill = candidate;
        }
    }
    close_page(&mut pages, start..bodies.len(), fill);
    pages
}

fn close_page(pages: &mut Vec<PageSlice>, paragraphs: Range<usize>, fill: Fill) {
    let page = PageSlice::measured(paragraphs, fill);
    if page.oversized {
        warn!(
            paragraph = page.paragraphs.start,
            height = page.height,
            capacity = fill.capacity,
            "paragraph taller than a page; placed alone"
        );
    }
    pages.push(page);
}

/// Paragraphs that differ between the old and new text
#[derive(Debug, Clone, PartialEq)]
struct ChangedRegion {
    /// Old paragraph indices whose content may have changed
    old: Range<usize>,
    /// Where those paragraphs now live
    new: Range<usize>,
}

/// Locate the changed paragraphs from the common prefix and suffix of the
/// two texts.
///
/// A paragraph is unchanged in the prefix when its span, including the
/// first character of the following paragraph, precedes the first
/// difference. It is unchanged in the suffix when the previous body's last
/// character follows the last difference, which pins its separator too.
fn changed_region(old: &str, old_spans: &[ParagraphSpan], new: &str, new_count: usize) -> ChangedRegion {
    let (old_b, new_b) = (old.as_bytes(), new.as_bytes());
    let prefix = old_b.iter().zip(new_b).take_while(|(a, b)| a == b).count();
    let max_suffix = old_b.len().min(new_b.len()) - prefix;
    let suffix = old_b
        .iter()
        .rev()
        .zip(new_b.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();
    let old_end = old_b.len() - suffix;

    let old_count = old_spans.len();
    let kept_front = old_spans
        .iter()
        .take_while(|s| s.range.end < prefix)
        .count();
    let kept_back_start = (1..old_count)
        .find(|&k| old_spans[k - 1].body.end > old_end)
        .unwrap_or(old_count)
        .max(kept_front);
    let kept_back = old_count - kept_back_start;

    ChangedRegion {
        old: kept_front..kept_back_start,
        new: kept_front..new_count.saturating_sub(kept_back).max(kept_front),
    }
}

/// Carry page membership across the edit. Pages touching the changed
/// region collapse into one; returns the pages and that page's index.
fn merge_edited(old_pages: &[PageSlice], region: &ChangedRegion) -> (Vec<PageSlice>, usize) {
    let (start, old_end, new_end) = (region.old.start, region.old.end, region.new.end);
    let remap = |i: usize| if i >= old_end { i - old_end + new_end } else { new_end };
    let mut pages = Vec::with_capacity(old_pages.len() + 1);
    let mut edited: Option<usize> = None;

    for page in old_pages {
        let range = &page.paragraphs;
        if range.end <= start {
            pages.push(page.clone());
        } else if range.start >= old_end {
            if edited.is_none() {
                edited = Some(pages.len());
                pages.push(PageSlice::unmeasured(region.new.clone()));
            }
            pages.push(PageSlice {
                paragraphs: remap(range.start)..remap(range.end),
                ..page.clone()
            });
        } else if let Some(idx) = edited {
            pages[idx].paragraphs.end = remap(range.end);
        } else {
            edited = Some(pages.len());
            pages.push(PageSlice::unmeasured(range.start..remap(range.end)));
        }
    }

    let edited = edited.unwrap_or_else(|| {
        pages.push(PageSlice::unmeasured(region.new.clone()));
        pages.len() - 1
    });
    (pages, edited)
}

/// Push trailing paragraphs of an overfull page onto the next page,
/// cascading while pages keep receiving content. Returns the last page
/// that changed.
fn overflow_pass(pages: &mut Vec<PageSlice>, edited: usize, bodies: &[&str], gauge: &Gauge<'_>) -> usize {
    let mut idx = edited;
    while idx < pages.len() {
        let mut peeled = false;
        let mut fill = measure(pages, idx, bodies, gauge);
        while fill.overflows() && pages[idx].len() > 1 {
            if idx + 1 == pages.len() {
                pages.push(PageSlice::empty(pages[idx].paragraphs.end));
            }
            pages[idx].paragraphs.end -= 1;
            pages[idx + 1].paragraphs.start -= 1;
            peeled = true;
            fill = measure(pages, idx, bodies, gauge);
        }
        pages[idx] = PageSlice::measured(pages[idx].paragraphs.clone(), fill);
        if pages[idx].oversized {
            warn!(page = idx, height = fill.height, "paragraph taller than a page; placed alone");
        }
        if !peeled {
            return idx;
        }
        idx += 1;
    }
    pages.len().saturating_sub(1)
}

/// Pull leading paragraphs back onto pages with spare room, starting at
/// the page before the edited one. Emptied pages are removed.
fn underflow_pass(
    pages: &mut Vec<PageSlice>,
    edited: usize,
    last_touched: usize,
    bodies: &[&str],
    gauge: &Gauge<'_>,
) {
    if pages.len() > 1 && pages[edited.min(pages.len() - 1)].is_empty() {
        pages.remove(edited.min(pages.len() - 1));
    }

    let mut dirty_until = last_touched;
    let mut idx = edited.saturating_sub(1);
    while idx + 1 < pages.len() {
        let mut pulled = false;
        let mut fill = measure(pages, idx, bodies, gauge);
        while idx + 1 < pages.len() && fill.has_room() {
            if pages[idx + 1].is_empty() {
                pages.remove(idx + 1);
                continue;
            }
            let candidate = pages[idx].paragraphs.start..pages[idx].paragraphs.end + 1;
            let grown = gauge.measure(&bodies[candidate.clone()], idx == 0);
            if grown.overflows() {
                break;
            }
            pages[idx].paragraphs = candidate;
            pages[idx + 1].paragraphs.start += 1;
            fill = grown;
            pulled = true;
            if pages[idx + 1].is_empty() {
                pages.remove(idx + 1);
            }
        }
        pages[idx] = PageSlice::measured(pages[idx].paragraphs.clone(), fill);

        if pulled {
            dirty_until = dirty_until.max(idx + 1);
        } else if idx >= dirty_until {
            break;
        }
        idx += 1;
    }

    // The page after the last pull may have shrunk without being visited
    if idx < pages.len() {
        let fill = measure(pages, idx, bodies, gauge);
        pages[idx] = PageSlice::measured(pages[idx].paragraphs.clone(), fill);
    }
}
