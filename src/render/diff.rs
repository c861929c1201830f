//! Page-level diff protocol for incremental repaint

use crate::render::{BookView, DisplayPage};
use serde::Serialize;

/// A single patch operation for the renderer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum RenderPatch {
    /// Append a page at the end of the strip
    InsertPage { page: DisplayPage },
    /// Replace a page whose content changed
    UpdatePage { page: DisplayPage },
    /// Drop a trailing page
    #[serde(rename_all = "camelCase")]
    RemovePage { page_index: usize },
}

/// Patches that turn one view into the next
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderDiff {
    pub version: u64,
    pub patches: Vec<RenderPatch>,
}

impl RenderDiff {
    /// Compare two views page by page.
    ///
    /// Removals are emitted last-page first so indices stay valid while
    /// they are applied in order.
    pub fn between(previous: &BookView, current: &BookView) -> Self {
        let mut patches = Vec::new();
        let shared = previous.pages.len().min(current.pages.len());

        for (old, new) in previous.pages.iter().zip(&current.pages) {
            if old != new {
                patches.push(RenderPatch::UpdatePage { page: new.clone() });
            }
        }
        for page in &current.pages[shared..] {
            patches.push(RenderPatch::InsertPage { page: page.clone() });
        }
        for page_index in (shared..previous.pages.len()).rev() {
            patches.push(RenderPatch::RemovePage { page_index });
        }

        Self {
            version: current.version,
            patches,
        }
    }

    /// Everything is new
    pub fn full(current: &BookView) -> Self {
        Self::between(
            &BookView {
                version: 0,
                pages: Vec::new(),
            },
            current,
        )
    }

    pub fn has_patches(&self) -> bool {
        !self.patches.is_empty()
    }

    pub fn patch_count(&self) -> usize {
        self.patches.len()
    }
}
