//! Bookpress: pagination and export layout engine for books
//!
//! This crate provides:
//! - Live pagination that splits and merges pages around each edit
//! - Floating images pinned to pages, independent of text flow
//! - A bounded, debounced snapshot history
//! - Line-accurate export slicing, rasterization and PDF assembly

pub mod config;
pub mod document;
pub mod editing;
pub mod error;
pub mod export;
pub mod history;
pub mod layout;
pub mod render;
pub mod wasm;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export WASM types for direct use
pub use wasm::WasmBook;

// Re-export primary types
pub use config::{BookConfig, ExportConfig, HistoryConfig, ReflowConfig, Typography};
pub use document::{
    BlankPageId, Chapter, ChapterDraft, ChapterId, Document, FloatingImage, ImageAsset, ImageId, Manuscript,
    SectionId,
};
pub use editing::{EditOp, EditResult};
pub use error::{BookError, EditError, ExportError, LayoutError, StoreError};
pub use export::{CancelToken, ExportArtifact, ExportReport, Exporter};
pub use history::{HistoryManager, HistorySnapshot, KeyValueStore, MemoryStore};
pub use layout::{DragMode, LayoutConstraints, LayoutDiff, LayoutState, MeasurementOracle, TextMeasurer};
pub use render::{BookView, DisplayPage, PageKind, RenderDiff, RenderPatch};

use editing::Debouncer;
use layout::{FloatingLayer, Interaction};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, info};

/// Page coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Page rectangle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }
}

/// Width and height
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// What a tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    /// Set when a debounced reflow ran
    pub reflow: Option<LayoutDiff>,
    /// Set when a snapshot was taken
    pub snapshot: Option<u64>,
}

/// The main editor state combining all components.
///
/// The editor does not read the clock. Hosts drive it with [`tick`], and
/// mutations are stamped with the time of the latest tick.
///
/// [`tick`]: BookEditor::tick
pub struct BookEditor {
    config: BookConfig,
    document: Document,
    layout: LayoutState,
    oracle: Box<dyn MeasurementOracle>,
    export_oracle: Box<dyn MeasurementOracle>,
    history: HistoryManager,
    reflow: Debouncer,
    images: FloatingLayer,
    interaction: Interaction,
    exporter: Exporter,
    last_tick_ms: u64,
}

impl BookEditor {
    /// Seed an editor with the built-in measurers
    pub fn from_manuscript(manuscript: &Manuscript, config: BookConfig) -> Result<Self, BookError> {
        config.validate()?;
        let live = TextMeasurer::new(&config.typography, config.page.content_width());
        let export = TextMeasurer::new(&config.typography, config.export.inner_width());
        Self::with_oracles(manuscript, config, Box::new(live), Box::new(export))
    }

    /// Seed an editor with host-provided measurers for the live page width
    /// and the export width
    pub fn with_oracles(
        manuscript: &Manuscript,
        config: BookConfig,
        oracle: Box<dyn MeasurementOracle>,
        export_oracle: Box<dyn MeasurementOracle>,
    ) -> Result<Self, BookError> {
        config.validate()?;
        let document = Document::from_manuscript(manuscript);
        let mut layout = LayoutState::new(config.page, config.reflow.fallback_chars_per_page);
        let diff = layout.relayout(&document, Some(oracle.as_ref()));
        let mut history = HistoryManager::new(&config.history);
        history.record(&document, 0);
        info!(
            chapters = document.chapters().len(),
            content_pages = diff.content_pages,
            "book opened"
        );

        Ok(Self {
            images: FloatingLayer::new(Size::new(config.page.content_width(), config.page.content_height())),
            reflow: Debouncer::new(config.reflow.debounce_ms),
            exporter: Exporter::new(config.export.clone(), config.typography.clone()),
            config,
            document,
            layout,
            oracle,
            export_oracle,
            history,
            interaction: Interaction::default(),
            last_tick_ms: 0,
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn layout(&self) -> &LayoutState {
        &self.layout
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn config(&self) -> &BookConfig {
        &self.config
    }

    /// Whether an edit is waiting for the reflow quiet period
    pub fn reflow_pending(&self) -> bool {
        self.reflow.is_pending()
    }

    fn mutated(&mut self) {
        self.reflow.poke(self.last_tick_ms);
        self.history.note_mutation(self.last_tick_ms);
    }

    fn edited(&mut self, section: SectionId, op: EditOp) -> Result<EditResult, BookError> {
        let result = self.document.apply_edit(section, &op)?;
        if result.has_changes() {
            self.layout.invalidate(&result);
            self.mutated();
        }
        Ok(result)
    }

    pub fn insert_text(&mut self, section: SectionId, offset: usize, text: &str) -> Result<EditResult, BookError> {
        self.edited(section, EditOp::insert(offset, text))
    }

    pub fn delete(&mut self, section: SectionId, range: Range<usize>) -> Result<EditResult, BookError> {
        self.edited(section, EditOp::delete(range.start, range.end))
    }

    /// Replace what a live page shows; the separator before the next page
    /// is kept
    pub fn replace_page_text(&mut self, section: SectionId, page: usize, text: &str) -> Result<EditResult, BookError> {
        self.flush();
        let range = self
            .layout
            .section_pages(section)
            .and_then(|pages| {
                let range = pages.page_range(page)?;
                let shown = pages.page_text(page)?;
                Some(range.start..range.start + shown.trim_end().len())
            })
            .ok_or_else(|| EditError::UnknownSection(format!("{section} page {page}")))?;
        self.edited(section, EditOp::replace(range, text))
    }

    pub fn add_chapter(&mut self, title: &str, body: &str) -> ChapterId {
        let id = self.document.add_chapter(title, body);
        self.layout.invalidate_section(SectionId::Chapter(id));
        self.mutated();
        id
    }

    pub fn rename_chapter(&mut self, id: ChapterId, title: &str) -> Result<(), BookError> {
        self.document.set_chapter_title(id, title)?;
        // The heading reserve depends on the title
        self.layout.invalidate_section(SectionId::Chapter(id));
        self.mutated();
        Ok(())
    }

    pub fn remove_chapter(&mut self, id: ChapterId) -> Result<Chapter, BookError> {
        let chapter = self.document.remove_chapter(id)?;
        self.layout.invalidate_all();
        self.mutated();
        Ok(chapter)
    }

    pub fn add_blank_page(&mut self, anchor_page_index: usize) -> BlankPageId {
        let id = self.document.add_blank_page(anchor_page_index);
        self.history.note_mutation(self.last_tick_ms);
        id
    }

    pub fn remove_blank_page(&mut self, id: BlankPageId) -> Result<(), BookError> {
        self.document.remove_blank_page(id)?;
        self.history.note_mutation(self.last_tick_ms);
        Ok(())
    }

    /// Re-anchor a blank page after another content page
    pub fn move_blank_page(&mut self, id: BlankPageId, anchor_page_index: usize) -> Result<(), BookError> {
        self.document.move_blank_page(id, anchor_page_index)?;
        self.history.note_mutation(self.last_tick_ms);
        Ok(())
    }

    /// Register an image binary under a reference
    pub fn add_asset(&mut self, image_ref: &str, asset: ImageAsset) {
        self.document.add_asset(image_ref, asset);
    }

    /// Pin a registered asset to a live page at its natural size, shrunk to fit
    pub fn attach_image(
        &mut self,
        section: SectionId,
        page: usize,
        image_ref: &str,
        position: Option<Point>,
    ) -> Result<FloatingImage, BookError> {
        let natural = self
            .document
            .asset(image_ref)
            .map(|a| Size::new(a.natural_width as f32, a.natural_height as f32))
            .ok_or_else(|| EditError::UnknownAsset(image_ref.to_string()))?;
        let image = self
            .images
            .attach(&mut self.document, section, page, image_ref, natural, position)?;
        self.history.note_mutation(self.last_tick_ms);
        Ok(image)
    }

    pub fn move_image(&mut self, id: ImageId, dx: f32, dy: f32) -> Result<Rect, BookError> {
        let rect = self.images.move_image(&mut self.document, id, dx, dy)?;
        self.history.note_mutation(self.last_tick_ms);
        Ok(rect)
    }

    pub fn resize_image(&mut self, id: ImageId, delta: f32) -> Result<Rect, BookError> {
        let rect = self.images.resize_image(&mut self.document, id, delta)?;
        self.history.note_mutation(self.last_tick_ms);
        Ok(rect)
    }

    pub fn delete_image(&mut self, id: ImageId) -> Result<FloatingImage, BookError> {
        if matches!(self.interaction, Interaction::Dragging { image, .. } if image == id) {
            self.interaction.cancel();
        }
        let image = self.images.delete_image(&mut self.document, id)?;
        self.history.note_mutation(self.last_tick_ms);
        Ok(image)
    }

    /// Start dragging or resizing an image
    pub fn begin_drag(&mut self, id: ImageId, mode: DragMode, pointer: Point) -> Result<(), BookError> {
        let (_, image) = self.document.find_image(id).ok_or(EditError::UnknownImage(id.0))?;
        self.interaction.begin(image, mode, pointer);
        Ok(())
    }

    /// Where the image would land with the pointer here; nothing is committed
    pub fn drag_to(&self, pointer: Point) -> Result<Rect, BookError> {
        self.interaction
            .preview(pointer, self.images.container())
            .map(|(_, rect)| rect)
            .ok_or_else(|| EditError::NoGesture.into())
    }

    /// Commit the gesture
    pub fn end_drag(&mut self, pointer: Point) -> Result<Rect, BookError> {
        let (id, rect) = self
            .interaction
            .release(pointer, self.images.container())
            .ok_or(EditError::NoGesture)?;
        let rect = self.images.set_rect(&mut self.document, id, rect)?;
        self.history.note_mutation(self.last_tick_ms);
        Ok(rect)
    }

    pub fn cancel_drag(&mut self) {
        self.interaction.cancel();
    }

    /// Run whatever the quiet periods have released
    pub fn tick(&mut self, now_ms: u64) -> TickOutcome {
        self.last_tick_ms = self.last_tick_ms.max(now_ms);
        let reflow = self.reflow.take_ready(now_ms).then(|| self.relayout());
        let snapshot = self.history.tick(&self.document, now_ms);
        if let Some(id) = snapshot {
            debug!(snapshot = id, "snapshot taken");
        }
        TickOutcome { reflow, snapshot }
    }

    /// Reflow now, skipping the quiet period
    pub fn flush(&mut self) -> LayoutDiff {
        self.reflow.clear();
        self.relayout()
    }

    /// Change the live page geometry and repaginate at once.
    ///
    /// `oracle` measures at the new content width; `None` switches to the
    /// built-in measurer. Images are pulled inside the new content box.
    pub fn set_page_geometry(
        &mut self,
        page: LayoutConstraints,
        oracle: Option<Box<dyn MeasurementOracle>>,
    ) -> Result<LayoutDiff, BookError> {
        self.layout.set_constraints(page)?;
        self.oracle = match oracle {
            Some(oracle) => oracle,
            None => Box::new(TextMeasurer::new(&self.config.typography, page.content_width())),
        };
        self.config.page = page;
        self.interaction.cancel();
        self.images = FloatingLayer::new(Size::new(page.content_width(), page.content_height()));
        let refit = self.images.refit(&mut self.document);
        if refit > 0 {
            debug!(images = refit, "images refit to the new page");
            self.history.note_mutation(self.last_tick_ms);
        }
        Ok(self.flush())
    }

    fn relayout(&mut self) -> LayoutDiff {
        self.layout.relayout(&self.document, Some(self.oracle.as_ref()))
    }

    /// Return the document to a snapshot
    pub fn restore(&mut self, snapshot: u64) -> Result<usize, BookError> {
        self.interaction.cancel();
        let dropped = self.history.restore(snapshot, &mut self.document)?;
        self.layout.invalidate_all();
        self.flush();
        Ok(dropped)
    }

    /// Write the snapshot ring to a store; returns how many were kept
    pub fn persist_history(&self, store: &mut dyn KeyValueStore) -> usize {
        self.history.persist(store)
    }

    pub fn load_history(&mut self, store: &dyn KeyValueStore) -> usize {
        self.history.load(store)
    }

    /// The book as display pages, after any pending reflow
    pub fn pages(&mut self) -> BookView {
        if self.layout.needs_relayout() || self.reflow.is_pending() {
            self.flush();
        }
        BookView::build(&self.document, &self.layout)
    }

    /// Export the book as a PDF
    pub fn export(&mut self, cancel: &CancelToken) -> Result<ExportArtifact, BookError> {
        if self.layout.needs_relayout() || self.reflow.is_pending() {
            self.flush();
        }
        let artifact = self
            .exporter
            .export_with(&self.document, &self.layout, self.export_oracle.as_ref(), cancel)?;
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FixedOracle;

    fn config() -> BookConfig {
        let mut config = BookConfig::default();
        config.page.page_height = 250.0 + 144.0;
        config.reflow.debounce_ms = 100;
        config.history.snapshot_interval_ms = 500;
        config.export.page_height = 250.0 + 96.0;
        config.export.raster_scale = 0.1;
        config.export.safety_margin = 0.0;
        config.export.seam_overlap = 0.0;
        config
    }

    fn editor(front: &str) -> BookEditor {
        let manuscript = Manuscript {
            title: "Book".to_string(),
            front_matter: front.to_string(),
            chapters: vec![ChapterDraft {
                title: "One".to_string(),
                body: "c:100".to_string(),
            }],
            ..Manuscript::default()
        };
        BookEditor::with_oracles(
            &manuscript,
            config(),
            Box::new(FixedOracle::default()),
            Box::new(FixedOracle::default()),
        )
        .unwrap()
    }

    fn front_pages(editor: &BookEditor) -> usize {
        editor
            .layout()
            .section_pages(SectionId::FrontMatter)
            .unwrap()
            .page_count()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = config();
        config.history.depth = 0;
        let result = BookEditor::from_manuscript(&Manuscript::default(), config);
        assert!(matches!(result, Err(BookError::Config(_))));
    }

    #[test]
    fn test_reflow_waits_for_quiet_period() {
        let mut editor = editor("a:100");
        editor.tick(1000);
        editor
            .insert_text(SectionId::FrontMatter, 5, "\n\nb:200")
            .unwrap();
        assert_eq!(front_pages(&editor), 1);

        assert_eq!(editor.tick(1050).reflow, None);
        let outcome = editor.tick(1100);
        let diff = outcome.reflow.unwrap();
        assert_eq!(diff.reflowed, vec![SectionId::FrontMatter]);
        assert_eq!(front_pages(&editor), 2);
        assert!(!editor.reflow_pending());
    }

    #[test]
    fn test_snapshot_after_edits_settle() {
        let mut editor = editor("a:100");
        assert_eq!(editor.history().len(), 1);
        editor.insert_text(SectionId::FrontMatter, 0, "x").unwrap();
        assert_eq!(editor.tick(400).snapshot, None);
        assert!(editor.tick(500).snapshot.is_some());
        assert_eq!(editor.history().len(), 2);
    }

    #[test]
    fn test_no_op_edit_schedules_nothing() {
        let mut editor = editor("a:100");
        editor.insert_text(SectionId::FrontMatter, 2, "").unwrap();
        editor.delete(SectionId::FrontMatter, 3..3).unwrap();
        assert!(!editor.reflow_pending());
        assert!(!editor.layout().needs_relayout());
        assert_eq!(editor.tick(5000), TickOutcome::default());
        assert_eq!(editor.history().len(), 1);
    }

    #[test]
    fn test_restore_brings_back_text_and_pages() {
        let mut editor = editor("a:100");
        let first = editor.history().latest().unwrap().id;
        editor
            .insert_text(SectionId::FrontMatter, 5, "\n\nb:200")
            .unwrap();
        editor.flush();
        assert_eq!(front_pages(&editor), 2);

        editor.restore(first).unwrap();
        assert_eq!(
            editor.document().section(SectionId::FrontMatter).unwrap().rich_text,
            "a:100"
        );
        assert_eq!(front_pages(&editor), 1);
        assert!(matches!(editor.restore(99), Err(BookError::UnknownSnapshot(99))));
    }

    #[test]
    fn test_replace_page_text_keeps_next_page() {
        let mut editor = editor("a:200\n\nb:200");
        editor.flush();
        assert_eq!(front_pages(&editor), 2);
        editor
            .replace_page_text(SectionId::FrontMatter, 0, "z:10")
            .unwrap();
        editor.flush();
        assert_eq!(
            editor.document().section(SectionId::FrontMatter).unwrap().rich_text,
            "z:10\n\nb:200"
        );
        assert_eq!(front_pages(&editor), 1);
        assert!(editor
            .replace_page_text(SectionId::FrontMatter, 9, "nope")
            .is_err());
    }

    #[test]
    fn test_chapters_and_blank_pages() {
        let mut editor = editor("a:100");
        let id = editor.add_chapter("Two", "d:100");
        let before = editor.pages().pages.len();
        let blank = editor.add_blank_page(0);
        assert_eq!(editor.pages().pages.len(), before + 1);
        editor.move_blank_page(blank, 99).unwrap();
        let view = editor.pages();
        assert_eq!(view.pages.last().map(|p| &p.kind), Some(&PageKind::Blank { id: blank }));
        editor.remove_blank_page(blank).unwrap();
        editor.remove_chapter(id).unwrap();
        assert_eq!(editor.pages().pages.len(), before - 1);
        assert!(editor.remove_chapter(id).is_err());
    }

    /// Position of the only page showing `blank`, checked to be empty
    fn sole_blank(editor: &mut BookEditor, blank: BlankPageId) -> (usize, usize) {
        let view = editor.pages();
        let positions: Vec<usize> = view
            .pages
            .iter()
            .enumerate()
            .filter(|(_, p)| p.kind == PageKind::Blank { id: blank })
            .map(|(i, _)| i)
            .collect();
        assert_eq!(positions.len(), 1);
        let at = positions[0];
        let page = &view.pages[at];
        assert!(page.paragraphs.is_empty() && page.text.is_empty() && page.images.is_empty());
        let PageKind::Content { content_index, .. } = &view.pages[at - 1].kind else {
            panic!("blank page does not follow a content page");
        };
        let content_index = *content_index;
        let last = view
            .pages
            .iter()
            .filter(|p| matches!(p.kind, PageKind::Content { .. }))
            .count()
            - 1;
        (content_index, last)
    }

    fn planned_blanks(editor: &BookEditor, blank: BlankPageId) -> usize {
        let plan = export::ExportPlan::build(
            editor.document(),
            editor.layout(),
            &FixedOracle,
            &editor.config().export,
        )
        .unwrap();
        plan.pages()
            .iter()
            .filter(|p| **p == export::PlannedPage::Blank { id: blank })
            .count()
    }

    #[test]
    fn test_blank_page_survives_reflow() {
        let mut editor = editor("a:200\n\nb:200\n\nc:200");
        // front 0..=2, chapter 3, conclusion 4
        let blank = editor.add_blank_page(3);
        assert_eq!(sole_blank(&mut editor, blank), (3, 4));

        // Pages ahead of the anchor split
        editor.insert_text(SectionId::FrontMatter, 0, "x:200\n\n").unwrap();
        editor.flush();
        assert_eq!(sole_blank(&mut editor, blank), (3, 5));
        assert_eq!(planned_blanks(&editor, blank), 1);

        // Pages ahead of the anchor merge until the anchor runs past the end
        let len = editor.document().section(SectionId::FrontMatter).unwrap().rich_text.len();
        editor.delete(SectionId::FrontMatter, 0..len).unwrap();
        editor.insert_text(SectionId::FrontMatter, 0, "z:10").unwrap();
        editor.flush();
        let (after, last) = sole_blank(&mut editor, blank);
        assert_eq!(last, 2);
        assert_eq!(after, 3.min(last));
        assert_eq!(planned_blanks(&editor, blank), 1);
        assert_eq!(editor.document().blank_pages()[0].anchor_page_index, 3);
    }

    #[test]
    fn test_rename_chapter_moves_heading_reserve() {
        let mut editor = editor("a:100");
        let id = editor.document().chapters()[0].id;
        let section = SectionId::Chapter(id);
        editor.insert_text(section, 5, "\n\nd:100").unwrap();
        editor.flush();
        assert_eq!(editor.layout().section_pages(section).unwrap().page_count(), 1);

        editor.rename_chapter(id, "Long:200").unwrap();
        editor.flush();
        // The 200-tall heading pushes the second paragraph to a new page
        assert_eq!(editor.layout().section_pages(section).unwrap().page_count(), 2);
    }

    fn with_image() -> (BookEditor, ImageId) {
        let mut editor = editor("a:100");
        editor.add_asset(
            "pic",
            ImageAsset {
                mime: "image/png".to_string(),
                natural_width: 240,
                natural_height: 160,
                bytes: Vec::new(),
            },
        );
        let image = editor
            .attach_image(SectionId::FrontMatter, 0, "pic", Some(Point { x: 10.0, y: 10.0 }))
            .unwrap();
        (editor, image.id)
    }

    #[test]
    fn test_page_geometry_repaginates_and_refits_images() {
        let mut editor = editor("a:100\n\nb:100");
        editor.add_asset(
            "pic",
            ImageAsset {
                mime: "image/png".to_string(),
                natural_width: 240,
                natural_height: 160,
                bytes: Vec::new(),
            },
        );
        let image = editor
            .attach_image(SectionId::FrontMatter, 0, "pic", Some(Point { x: 10.0, y: 10.0 }))
            .unwrap();
        let front_pages = |editor: &BookEditor| {
            editor
                .layout()
                .section_pages(SectionId::FrontMatter)
                .map(|p| p.page_count())
        };
        assert_eq!(front_pages(&editor), Some(1));

        let narrow = LayoutConstraints {
            page_width: 200.0 + 144.0,
            page_height: 150.0 + 144.0,
            ..LayoutConstraints::default()
        };
        let diff = editor
            .set_page_geometry(narrow, Some(Box::new(FixedOracle)))
            .unwrap();
        assert!(diff.reflowed.contains(&SectionId::FrontMatter));
        assert_eq!(front_pages(&editor), Some(2));
        assert_eq!(editor.config().page, narrow);

        let rect = editor.document().find_image(image.id).unwrap().1.rect();
        assert!(rect.x >= 0.0 && rect.x + rect.width <= 200.0);
        assert!(rect.y >= 0.0 && rect.y + rect.height <= 150.0);

        let squashed = LayoutConstraints {
            margin_top: 400.0,
            ..narrow
        };
        let err = editor.set_page_geometry(squashed, None).unwrap_err();
        assert!(matches!(err, BookError::Layout(LayoutError::InvalidMetrics(_))));
        assert_eq!(editor.config().page, narrow);
    }

    #[test]
    fn test_drag_gesture_commits_on_release() {
        let (mut editor, id) = with_image();
        assert!(matches!(editor.drag_to(Point::default()), Err(BookError::Edit(EditError::NoGesture))));

        editor.begin_drag(id, DragMode::Move, Point { x: 0.0, y: 0.0 }).unwrap();
        let preview = editor.drag_to(Point { x: 5000.0, y: 0.0 }).unwrap();
        assert_eq!(preview.x, 468.0 - 234.0);
        assert_eq!(editor.document().find_image(id).unwrap().1.x, 10.0);

        let committed = editor.end_drag(Point { x: 5000.0, y: 0.0 }).unwrap();
        assert_eq!(committed, preview);
        assert_eq!(editor.document().find_image(id).unwrap().1.x, committed.x);
    }

    #[test]
    fn test_image_edits_leave_text_alone() {
        let (mut editor, id) = with_image();
        let version = editor.layout().layout_version();
        editor.move_image(id, 5.0, 5.0).unwrap();
        editor.resize_image(id, -50.0).unwrap();
        assert!(!editor.layout().needs_relayout());
        assert_eq!(editor.layout().layout_version(), version);

        editor.begin_drag(id, DragMode::Resize, Point::default()).unwrap();
        editor.delete_image(id).unwrap();
        assert!(editor.end_drag(Point::default()).is_err());
        assert!(editor.attach_image(SectionId::FrontMatter, 0, "missing", None).is_err());
    }

    #[test]
    fn test_export_flushes_pending_edits() {
        let mut editor = editor("a:100");
        editor
            .insert_text(SectionId::FrontMatter, 5, "\n\nb:200")
            .unwrap();
        let artifact = editor.export(&CancelToken::new()).unwrap();
        // title, front x2, chapter, conclusion
        assert_eq!(artifact.pages, 5);
        assert_eq!(artifact.report.live_pages, 5);
    }

    #[test]
    fn test_history_persists_through_store() {
        let mut editor = editor("a:100");
        let mut store = MemoryStore::new();
        assert_eq!(editor.persist_history(&mut store), 1);
        assert_eq!(editor.load_history(&store), 1);
    }
}
