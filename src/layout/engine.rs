//! Book layout with incremental per-section updates

use crate::document::{BlankPageId, Document, SectionId};
use crate::editing::EditResult;
use crate::error::LayoutError;
use crate::layout::measure::MeasurementOracle;
use crate::layout::pagination::{PaginationRules, SectionPages};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Live page geometry in logical pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutConstraints {
    pub page_width: f32,
    pub page_height: f32,
    pub margin_top: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub margin_right: f32,
}

impl Default for LayoutConstraints {
    fn default() -> Self {
        Self {
            page_width: 612.0,  // US Letter
            page_height: 792.0,
            margin_top: 72.0,   // 1 inch
            margin_bottom: 72.0,
            margin_left: 72.0,
            margin_right: 72.0,
        }
    }
}

impl LayoutConstraints {
    /// Get usable content width
    pub fn content_width(&self) -> f32 {
        self.page_width - self.margin_left - self.margin_right
    }

    /// Get usable content height per page
    pub fn content_height(&self) -> f32 {
        self.page_height - self.margin_top - self.margin_bottom
    }

    /// Reject geometry whose content box is empty or not a number
    pub fn validate(&self) -> Result<(), LayoutError> {
        let (width, height) = (self.content_width(), self.content_height());
        if width.is_nan() || height.is_nan() || width <= 0.0 || height <= 0.0 {
            return Err(LayoutError::InvalidMetrics(format!(
                "content box is {width}x{height}"
            )));
        }
        Ok(())
    }
}

/// One page of the assembled book, in reading order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookPage {
    Title,
    Content {
        section: SectionId,
        /// Page index within the section
        page: usize,
        /// Book-wide index among content pages only
        content_index: usize,
    },
    Blank {
        id: BlankPageId,
    },
}

/// What a relayout changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutDiff {
    /// Sections whose pages were rebuilt or reflowed
    pub reflowed: Vec<SectionId>,
    /// Sections that no longer exist
    pub removed: Vec<SectionId>,
    /// Content pages after the relayout
    pub content_pages: usize,
    /// Some section fell back to the character heuristic
    pub degraded: bool,
}

impl LayoutDiff {
    pub fn is_empty(&self) -> bool {
        self.reflowed.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone)]
struct SectionLayout {
    rules: PaginationRules,
    pages: SectionPages,
}

/// Incremental layout state for the whole book
#[derive(Debug)]
pub struct LayoutState {
    constraints: LayoutConstraints,
    fallback_chars_per_page: usize,
    sections: FxHashMap<SectionId, SectionLayout>,
    dirty: FxHashSet<SectionId>,
    all_dirty: bool,
    layout_version: u64,
}

impl LayoutState {
    pub fn new(constraints: LayoutConstraints, fallback_chars_per_page: usize) -> Self {
        Self {
            constraints,
            fallback_chars_per_page,
            sections: FxHashMap::default(),
            dirty: FxHashSet::default(),
            all_dirty: true,
            layout_version: 0,
        }
    }

    /// Get constraints
    pub fn constraints(&self) -> &LayoutConstraints {
        &self.constraints
    }

    /// Change page geometry; every section is repaginated on next relayout
    pub fn set_constraints(&mut self, constraints: LayoutConstraints) -> Result<(), LayoutError> {
        constraints.validate()?;
        if self.constraints != constraints {
            self.constraints = constraints;
            self.invalidate_all();
        }
        Ok(())
    }

    /// Mark the edited section as needing reflow
    pub fn invalidate(&mut self, edit_result: &EditResult) {
        self.dirty.insert(edit_result.section);
    }

    pub fn invalidate_section(&mut self, section: SectionId) {
        self.dirty.insert(section);
    }

    /// Mark all sections as dirty (for full relayout)
    pub fn invalidate_all(&mut self) {
        self.all_dirty = true;
    }

    pub fn needs_relayout(&self) -> bool {
        self.all_dirty || !self.dirty.is_empty()
    }

    pub fn layout_version(&self) -> u64 {
        self.layout_version
    }

    /// Bring every dirty section up to date with the document
    pub fn relayout(&mut self, document: &Document, oracle: Option<&dyn MeasurementOracle>) -> LayoutDiff {
        let mut diff = LayoutDiff::default();
        let ids = document.section_ids();

        let stale: Vec<SectionId> = self
            .sections
            .keys()
            .filter(|id| !ids.contains(id))
            .copied()
            .collect();
        for id in stale {
            self.sections.remove(&id);
            diff.removed.push(id);
        }

        for id in ids {
            let known = self.sections.contains_key(&id);
            if known && !self.all_dirty && !self.dirty.contains(&id) {
                continue;
            }
            let Some(section) = document.section(id) else {
                continue;
            };
            let text = section.rich_text.as_str();
            let reserve = heading_reserve(document.heading(id), oracle);
            let rules = PaginationRules::new(self.constraints.content_height(), self.fallback_chars_per_page)
                .with_first_page_reserve(reserve);

            let (same_rules, same_text) = self
                .sections
                .get(&id)
                .map_or((false, false), |l| (l.rules == rules, l.pages.text() == text));
            match self.sections.get_mut(&id) {
                Some(layout) if same_rules => {
                    if layout.pages.reflow(text, &rules, oracle) {
                        diff.reflowed.push(id);
                    }
                }
                // Geometry or heading changed under the same text
                Some(layout) if same_text => {
                    layout.pages.repaginate(&rules, oracle);
                    layout.rules = rules;
                    diff.reflowed.push(id);
                }
                _ => {
                    let pages = SectionPages::new(text, &rules, oracle);
                    self.sections.insert(id, SectionLayout { rules, pages });
                    diff.reflowed.push(id);
                }
            }
        }

        self.dirty.clear();
        self.all_dirty = false;
        self.layout_version = document.version();

        diff.content_pages = self.content_page_count(document);
        diff.degraded = self.is_degraded();
        debug!(
            reflowed = diff.reflowed.len(),
            content_pages = diff.content_pages,
            "relayout complete"
        );
        diff
    }

    pub fn section_pages(&self, section: SectionId) -> Option<&SectionPages> {
        self.sections.get(&section).map(|l| &l.pages)
    }

    /// Whether any section is paginated with the fallback heuristic
    pub fn is_degraded(&self) -> bool {
        self.sections.values().any(|l| l.pages.is_degraded())
    }

    /// Content pages across the book; sections not yet laid out count as one
    pub fn content_page_count(&self, document: &Document) -> usize {
        document
            .section_ids()
            .iter()
            .map(|id| self.section_pages(*id).map_or(1, |p| p.page_count()))
            .sum()
    }

    /// Map a book-wide content page index to its section page
    pub fn locate_content_page(&self, document: &Document, content_index: usize) -> Option<(SectionId, usize)> {
        let mut remaining = content_index;
        for id in document.section_ids() {
            let count = self.section_pages(id).map_or(1, |p| p.page_count());
            if remaining < count {
                return Some((id, remaining));
            }
            remaining -= count;
        }
        None
    }

    pub fn content_index_of(&self, document: &Document, section: SectionId, page: usize) -> Option<usize> {
        let mut base = 0;
        for id in document.section_ids() {
            let count = self.section_pages(id).map_or(1, |p| p.page_count());
            if id == section {
                return (page < count).then_some(base + page);
            }
            base += count;
        }
        None
    }

    /// Every page of the book in reading order.
    ///
    /// A title page leads when the book has a title. Blank pages follow
    /// the content page they are anchored to; anchors past the end attach
    /// after the last content page.
    pub fn book_pages(&self, document: &Document) -> Vec<BookPage> {
        let total = self.content_page_count(document);
        let mut pages = Vec::with_capacity(total + document.blank_pages().len() + 1);
        if !document.title.trim().is_empty() {
            pages.push(BookPage::Title);
        }

        let mut content_index = 0;
        for section in document.section_ids() {
            let count = self.section_pages(section).map_or(1, |p| p.page_count());
            for page in 0..count {
                pages.push(BookPage::Content {
                    section,
                    page,
                    content_index,
                });
                for blank in document.blank_pages() {
                    if blank.anchor_page_index.min(total.saturating_sub(1)) == content_index {
                        pages.push(BookPage::Blank { id: blank.id });
                    }
                }
                content_index += 1;
            }
        }
        pages
    }
}

/// Room a section heading takes from the first page, spacing included
pub(crate) fn heading_reserve(heading: Option<&str>, oracle: Option<&dyn MeasurementOracle>) -> f32 {
    let (Some(heading), Some(oracle)) = (heading.filter(|h| !h.trim().is_empty()), oracle) else {
        return 0.0;
    };
    match (oracle.measure_block(&[heading, ""]), oracle.measure_block(&[""])) {
        (Ok(with_heading), Ok(bare)) => (with_heading - bare).max(0.0),
        _ => 0.0,
    }
}
