//! On-demand export
//!
//! Export is a second pagination pass, independent of the live one. Each
//! section is laid out once at export width, cut into slices that never
//! split a line, rasterized and assembled into a PDF. The live layout is
//! consulted only to anchor images and blank pages.

pub mod pdf;
pub mod raster;
pub mod slicer;

pub use pdf::PdfAssembler;
pub use raster::{CanvasImage, CanvasLine, LineStyle, RasterBackend, SkiaBackend, SliceCanvas};
pub use slicer::{slice_for_paragraph, slice_for_y, slice_section, ExportSlice, SliceWindow};

use crate::config::{ExportConfig, Typography};
use crate::document::{split_paragraphs, BlankPageId, Document, SectionId};
use crate::error::ExportError;
use crate::layout::{heading_reserve, LayoutState, MeasurementOracle, ParagraphBox, TextMeasurer};
use crate::Rect;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cooperative cancellation, checked between pages
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What an export produced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    /// Pages in the output document
    pub pages: usize,
    /// Pages in the live layout at export time
    pub live_pages: usize,
    /// Slices that had to cut through a paragraph
    pub forced_slices: usize,
    /// Images that crossed their slice bottom and were clipped
    pub clipped_images: usize,
    /// Images drawn as placeholders because their asset is gone
    pub missing_assets: usize,
}

/// A finished export
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub bytes: Vec<u8>,
    pub pages: usize,
    pub report: ExportReport,
}

impl ExportArtifact {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        std::fs::write(path.as_ref(), &self.bytes)?;
        info!(path = %path.as_ref().display(), pages = self.pages, "export written");
        Ok(())
    }
}

/// One output page, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedPage {
    Title,
    Slice {
        /// Index into the plan's sections
        section: usize,
        slice: usize,
    },
    Blank {
        id: BlankPageId,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct PlannedImage {
    /// Content-box coordinates on the export page
    rect: Rect,
    image_ref: String,
}

#[derive(Debug, Clone)]
struct SectionPlan {
    id: SectionId,
    heading: Option<ParagraphBox>,
    boxes: Vec<ParagraphBox>,
    slices: Vec<ExportSlice>,
    /// Images per slice
    images: Vec<Vec<PlannedImage>>,
}

#[derive(Debug, Clone, Default)]
struct TitleBlock {
    title: Option<ParagraphBox>,
    author: Option<ParagraphBox>,
}

/// The full page sequence of an export, before rasterization
#[derive(Debug, Clone)]
pub struct ExportPlan {
    window: SliceWindow,
    inner_width: f32,
    title: TitleBlock,
    sections: Vec<SectionPlan>,
    pages: Vec<PlannedPage>,
    report: ExportReport,
}

impl ExportPlan {
    /// Lay out and slice every section with `oracle` at export width
    pub fn build(
        document: &Document,
        layout: &LayoutState,
        oracle: &dyn MeasurementOracle,
        config: &ExportConfig,
    ) -> Result<Self, ExportError> {
        let window = SliceWindow::from_config(config);
        let inner_width = config.inner_width();
        let live_width = layout.constraints().content_width();
        let scale = if live_width > 0.0 { inner_width / live_width } else { 1.0 };

        let mut report = ExportReport {
            live_pages: layout.book_pages(document).len(),
            ..ExportReport::default()
        };

        let mut sections = Vec::new();
        for id in document.section_ids() {
            let Some(section) = document.section(id) else {
                continue;
            };
            let text = &section.rich_text;
            let spans = split_paragraphs(text);
            let bodies: Vec<&str> = spans.iter().map(|s| s.body_text(text)).collect();

            let heading_text = document.heading(id).filter(|h| !h.trim().is_empty());
            let reserve = heading_reserve(heading_text, Some(oracle));
            let heading = match heading_text {
                Some(h) => oracle.layout_block(&[h])?.into_iter().next(),
                None => None,
            };

            let mut boxes = oracle.layout_block(&bodies)?;
            for b in &mut boxes {
                b.top += reserve;
            }
            let slices = slice_section(&boxes, &window);
            report.forced_slices += slices.iter().filter(|s| s.forced).count();

            let mut images = vec![Vec::new(); slices.len()];
            for image in &section.floating_images {
                // Live page 0 starts at the heading; later pages at their first paragraph
                let anchor = layout.section_pages(id).map_or(0.0, |pages| {
                    let page = image.page.min(pages.page_count().saturating_sub(1));
                    match pages.page_paragraphs(page) {
                        Some(range) if page > 0 => boxes.get(range.start).map_or(0.0, |b| b.top),
                        _ => 0.0,
                    }
                });
                let scaled = image.scaled(scale, scale);
                let y = anchor + scaled.y;
                let index = slice_for_y(&slices, y);
                let local_y = y - slices[index].top;
                if local_y + scaled.height > visible_height(&slices, index, &window) + 0.5 {
                    warn!(image = image.id.0, section = %id, "image crosses the export page bottom; clipping it");
                    report.clipped_images += 1;
                }
                if document.asset(&image.image_ref).is_none() {
                    report.missing_assets += 1;
                }
                images[index].push(PlannedImage {
                    rect: Rect::new(scaled.x, local_y, scaled.width, scaled.height),
                    image_ref: image.image_ref.clone(),
                });
            }

            sections.push(SectionPlan {
                id,
                heading,
                boxes,
                slices,
                images,
            });
        }

        let pages = order_pages(document, layout, &sections);
        let title = if document.title.trim().is_empty() {
            TitleBlock::default()
        } else {
            TitleBlock {
                title: oracle.layout_block(&[document.title.as_str()])?.into_iter().next(),
                author: match document.author.as_deref().filter(|a| !a.trim().is_empty()) {
                    Some(author) => oracle.layout_block(&[author])?.into_iter().next(),
                    None => None,
                },
            }
        };

        Ok(Self {
            window,
            inner_width,
            title,
            sections,
            pages,
            report,
        })
    }

    pub fn pages(&self) -> &[PlannedPage] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Report with everything known before rasterizing
    pub fn report(&self) -> &ExportReport {
        &self.report
    }

    /// Slices of one section, in order
    pub fn section_slices(&self, section: SectionId) -> Option<&[ExportSlice]> {
        self.sections
            .iter()
            .find(|s| s.id == section)
            .map(|s| s.slices.as_slice())
    }

    /// Paint instructions for one planned page
    pub fn canvas<'a>(&self, index: usize, document: &'a Document, config: &ExportConfig) -> Option<SliceCanvas<'a>> {
        let page = *self.pages.get(index)?;
        let mut canvas = SliceCanvas::new(config.page_width, config.page_height, config.inner_padding, config.raster_scale);
        match page {
            PlannedPage::Blank { .. } => {}
            PlannedPage::Title => {
                let mut y = self.window.inner_height / 3.0;
                for (block, style) in [(&self.title.title, LineStyle::Heading), (&self.title.author, LineStyle::Body)] {
                    if let Some(b) = block {
                        canvas.lines.extend(centered_lines(b, y, self.inner_width, style));
                        y += b.height * 2.0;
                    }
                }
            }
            PlannedPage::Slice { section, slice } => {
                let plan = self.sections.get(section)?;
                let cut = plan.slices.get(slice)?;
                canvas.visible_height = visible_height(&plan.slices, slice, &self.window);
                canvas.seam = cut.seam;
                if slice == 0 {
                    if let Some(heading) = &plan.heading {
                        canvas.lines.extend(line_rects(heading, 0.0, LineStyle::Heading));
                    }
                }
                for b in &plan.boxes[cut.paragraphs.clone()] {
                    canvas.lines.extend(line_rects(b, cut.top, LineStyle::Body));
                }
                canvas.images = plan.images[slice]
                    .iter()
                    .map(|image| CanvasImage {
                        rect: image.rect,
                        asset: document.asset(&image.image_ref),
                    })
                    .collect();
            }
        }
        Some(canvas)
    }
}

/// The final slice of a section owns the rest of its page
fn visible_height(slices: &[ExportSlice], index: usize, window: &SliceWindow) -> f32 {
    if index + 1 == slices.len() {
        window.inner_height
    } else {
        slices[index].height()
    }
}

fn line_rects(b: &ParagraphBox, offset: f32, style: LineStyle) -> impl Iterator<Item = CanvasLine> + '_ {
    let line_height = b.height / b.line_widths.len().max(1) as f32;
    b.line_widths.iter().enumerate().map(move |(i, width)| {
        let y = b.top - offset + i as f32 * line_height;
        CanvasLine {
            rect: Rect::new(0.0, y + line_height * 0.25, *width, line_height * 0.5),
            style,
        }
    })
}

fn centered_lines(b: &ParagraphBox, top: f32, width: f32, style: LineStyle) -> Vec<CanvasLine> {
    line_rects(b, b.top - top, style)
        .map(|mut line| {
            line.rect.x = ((width - line.rect.width) / 2.0).max(0.0);
            line
        })
        .collect()
}

/// Title page, then each section's slices with blank pages after the
/// slice holding the last paragraph of their anchor live page
fn order_pages(document: &Document, layout: &LayoutState, sections: &[SectionPlan]) -> Vec<PlannedPage> {
    let total = layout.content_page_count(document);
    let mut anchored: Vec<(usize, usize, BlankPageId)> = Vec::new();
    for blank in document.blank_pages() {
        let anchor = blank.anchor_page_index.min(total.saturating_sub(1));
        let Some((section, page)) = layout.locate_content_page(document, anchor) else {
            continue;
        };
        let Some(index) = sections.iter().position(|s| s.id == section) else {
            continue;
        };
        let slices = &sections[index].slices;
        let last_slice = slices.len().saturating_sub(1);
        let slice = layout
            .section_pages(section)
            .and_then(|p| p.page_paragraphs(page))
            .filter(|r| !r.is_empty())
            .and_then(|r| slice_for_paragraph(slices, r.end - 1))
            .unwrap_or(last_slice);
        anchored.push((index, slice, blank.id));
    }

    let mut pages = Vec::new();
    if !document.title.trim().is_empty() {
        pages.push(PlannedPage::Title);
    }
    for (section, plan) in sections.iter().enumerate() {
        for slice in 0..plan.slices.len() {
            pages.push(PlannedPage::Slice { section, slice });
            pages.extend(
                anchored
                    .iter()
                    .filter(|(s, i, _)| *s == section && *i == slice)
                    .map(|(_, _, id)| PlannedPage::Blank { id: *id }),
            );
        }
    }
    pages
}

/// Clears the in-flight flag when an export ends, however it ends
struct ExportSession<'a>(&'a AtomicBool);

impl Drop for ExportSession<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs exports one at a time
pub struct Exporter {
    config: ExportConfig,
    typography: Typography,
    backend: Box<dyn RasterBackend + Send + Sync>,
    in_flight: AtomicBool,
}

impl Exporter {
    pub fn new(config: ExportConfig, typography: Typography) -> Self {
        Self::with_backend(config, typography, Box::new(SkiaBackend::new()))
    }

    pub fn with_backend(config: ExportConfig, typography: Typography, backend: Box<dyn RasterBackend + Send + Sync>) -> Self {
        Self {
            config,
            typography,
            backend,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn is_exporting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn begin(&self) -> Result<ExportSession<'_>, ExportError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                warn!("export requested while another is running");
                ExportError::ConcurrentExport
            })?;
        Ok(ExportSession(&self.in_flight))
    }

    /// Export with the built-in measurer at export width
    pub fn export(&self, document: &Document, layout: &LayoutState, cancel: &CancelToken) -> Result<ExportArtifact, ExportError> {
        let measurer = TextMeasurer::new(&self.typography, self.config.inner_width());
        self.export_with(document, layout, &measurer, cancel)
    }

    /// Export measuring with `oracle`, which must lay text out at
    /// [`ExportConfig::inner_width`]
    pub fn export_with(
        &self,
        document: &Document,
        layout: &LayoutState,
        oracle: &dyn MeasurementOracle,
        cancel: &CancelToken,
    ) -> Result<ExportArtifact, ExportError> {
        let _session = self.begin()?;
        let plan = ExportPlan::build(document, layout, oracle, &self.config)?;
        info!(pages = plan.page_count(), "export started");

        let mut assembler = PdfAssembler::new(self.config.output_width_pt, self.config.output_height_pt);
        for index in 0..plan.page_count() {
            if cancel.is_cancelled() {
                info!(completed = index, "export cancelled");
                return Err(ExportError::Cancelled);
            }
            let aborted = |source: ExportError| ExportError::Aborted {
                completed: index,
                source: Box::new(source),
            };
            let canvas = plan
                .canvas(index, document, &self.config)
                .ok_or_else(|| aborted(ExportError::Raster(format!("page {index} is not in the plan"))))?;
            let pixmap = self.backend.render(&canvas).map_err(aborted)?;
            assembler.add_page(&pixmap).map_err(aborted)?;
        }

        let pages = assembler.page_count();
        let bytes = assembler.finish().map_err(|source| ExportError::Aborted {
            completed: pages,
            source: Box::new(source),
        })?;

        let report = ExportReport {
            pages,
            ..plan.report().clone()
        };
        if report.pages != report.live_pages {
            debug!(
                export = report.pages,
                live = report.live_pages,
                "export page count differs from live layout"
            );
        }
        info!(pages, bytes = bytes.len(), "export finished");
        Ok(ExportArtifact { bytes, pages, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ImageAsset, Manuscript};
    use crate::layout::{FloatingLayer, LayoutConstraints};
    use crate::test_support::{FailingOracle, FixedOracle};
    use crate::{Point, Size};
    use std::sync::atomic::AtomicUsize;
    use tiny_skia::Pixmap;

    const WIDTH: f32 = 600.0;

    fn export_config() -> ExportConfig {
        ExportConfig {
            page_width: WIDTH + 96.0,
            page_height: 900.0 + 96.0,
            inner_padding: 48.0,
            raster_scale: 0.1,
            safety_margin: 0.0,
            seam_overlap: 0.0,
            ..ExportConfig::default()
        }
    }

    fn live_constraints() -> LayoutConstraints {
        LayoutConstraints {
            page_width: WIDTH + 144.0,
            page_height: 1000.0 + 144.0,
            ..LayoutConstraints::default()
        }
    }

    fn book(front: &str) -> (Document, LayoutState) {
        let doc = Document::from_manuscript(&Manuscript {
            title: "T".to_string(),
            front_matter: front.to_string(),
            ..Manuscript::default()
        });
        let mut layout = LayoutState::new(live_constraints(), 1800);
        layout.relayout(&doc, Some(&FixedOracle::default()));
        (doc, layout)
    }

    fn exporter() -> Exporter {
        Exporter::new(export_config(), Typography::default())
    }

    #[test]
    fn test_plan_orders_title_slices_and_blanks() {
        let (mut doc, mut layout) = book("a:400\n\nb:500\n\nc:300");
        let blank = doc.add_blank_page(0);
        layout.relayout(&doc, Some(&FixedOracle::default()));

        let plan = ExportPlan::build(&doc, &layout, &FixedOracle::default(), &export_config()).unwrap();
        assert_eq!(
            plan.pages(),
            &[
                PlannedPage::Title,
                PlannedPage::Slice { section: 0, slice: 0 },
                PlannedPage::Blank { id: blank },
                PlannedPage::Slice { section: 0, slice: 1 },
                PlannedPage::Slice { section: 1, slice: 0 },
            ]
        );
        assert_eq!(plan.report().live_pages, 5);
    }

    #[test]
    fn test_export_covers_every_paragraph() {
        let (doc, layout) = book("a:400\n\nb:500\n\nc:300");
        let plan = ExportPlan::build(&doc, &layout, &FixedOracle::default(), &export_config()).unwrap();
        let slices = plan.section_slices(SectionId::FrontMatter).unwrap();
        let covered: Vec<usize> = slices.iter().flat_map(|s| s.paragraphs.clone()).collect();
        assert_eq!(covered, vec![0, 1, 2]);
    }

    #[test]
    fn test_heading_pushes_chapter_text_down() {
        let mut doc = Document::from_manuscript(&Manuscript::default());
        doc.add_chapter("Heading:100", "a:850");
        let mut layout = LayoutState::new(live_constraints(), 1800);
        layout.relayout(&doc, Some(&FixedOracle::default()));

        let plan = ExportPlan::build(&doc, &layout, &FixedOracle::default(), &export_config()).unwrap();
        let id = doc.section_ids()[1];
        let slices = plan.section_slices(id).unwrap();
        // 100 + 850 no longer fits a 900 window, so the paragraph is cut
        assert!(slices[0].forced);
        assert_eq!(plan.report().forced_slices, 1);
        assert!(!slices[1].forced);
    }

    #[test]
    fn test_image_crossing_slice_bottom_is_clipped() {
        let (mut doc, layout) = book("a:400\n\nb:500\n\nc:300");
        doc.add_asset(
            "pic",
            ImageAsset {
                mime: "image/png".to_string(),
                natural_width: 200,
                natural_height: 100,
                bytes: Vec::new(),
            },
        );
        let layer = FloatingLayer::new(Size::new(WIDTH, 1000.0));
        layer
            .attach(&mut doc, SectionId::FrontMatter, 0, "pic", Size::new(200.0, 100.0), Some(Point { x: 10.0, y: 850.0 }))
            .unwrap();
        layer
            .attach(&mut doc, SectionId::FrontMatter, 1, "pic", Size::new(200.0, 100.0), Some(Point { x: 10.0, y: 10.0 }))
            .unwrap();

        let plan = ExportPlan::build(&doc, &layout, &FixedOracle::default(), &export_config()).unwrap();
        assert_eq!(plan.report().clipped_images, 1);
        assert_eq!(plan.report().missing_assets, 0);

        let canvas = plan.canvas(2, &doc, &export_config()).unwrap();
        assert_eq!(canvas.images.len(), 1);
        // Live page 1 starts at paragraph c, which exports at y 900
        assert_eq!(canvas.images[0].rect.y, 10.0);
    }

    #[test]
    fn test_export_writes_pdf() {
        let (doc, layout) = book("a:400\n\nb:500\n\nc:300");
        let artifact = exporter()
            .export_with(&doc, &layout, &FixedOracle::default(), &CancelToken::new())
            .unwrap();
        assert_eq!(artifact.pages, 4);
        assert_eq!(pdf::count_pages(&artifact.bytes).unwrap(), 4);
        assert_eq!(artifact.report.live_pages, 4);
    }

    #[test]
    fn test_builtin_measurer_exports_real_text() {
        let (doc, layout) = book("Some words that need a line or two.\n\nAnother paragraph.");
        let artifact = exporter().export(&doc, &layout, &CancelToken::new()).unwrap();
        assert_eq!(artifact.pages, 3);
    }

    #[test]
    fn test_second_export_is_refused_while_running() {
        let exporter = exporter();
        let session = exporter.begin().unwrap();
        assert!(exporter.is_exporting());
        let (doc, layout) = book("a:10");
        let err = exporter
            .export_with(&doc, &layout, &FixedOracle::default(), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, ExportError::ConcurrentExport));
        drop(session);
        assert!(!exporter.is_exporting());
    }

    #[test]
    fn test_cancelled_export() {
        let (doc, layout) = book("a:10");
        let cancel = CancelToken::new();
        cancel.cancel();
        let exporter = exporter();
        let err = exporter
            .export_with(&doc, &layout, &FixedOracle::default(), &cancel)
            .unwrap_err();
        assert!(matches!(err, ExportError::Cancelled));
        assert!(!exporter.is_exporting());
    }

    struct FailOn {
        page: usize,
        calls: AtomicUsize,
    }

    impl RasterBackend for FailOn {
        fn render(&self, canvas: &SliceCanvas<'_>) -> Result<Pixmap, ExportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == self.page {
                return Err(ExportError::Raster("backend gave up".to_string()));
            }
            SkiaBackend::new().render(canvas)
        }
    }

    #[test]
    fn test_raster_failure_aborts_without_output() {
        let (doc, layout) = book("a:400\n\nb:500\n\nc:300");
        let exporter = Exporter::with_backend(
            export_config(),
            Typography::default(),
            Box::new(FailOn {
                page: 2,
                calls: AtomicUsize::new(0),
            }),
        );
        let err = exporter
            .export_with(&doc, &layout, &FixedOracle::default(), &CancelToken::new())
            .unwrap_err();
        match err {
            ExportError::Aborted { completed, source } => {
                assert_eq!(completed, 2);
                assert!(matches!(*source, ExportError::Raster(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!exporter.is_exporting());
    }

    #[test]
    fn test_measurement_failure_is_reported() {
        let (doc, layout) = book("a:10");
        let err = exporter()
            .export_with(&doc, &layout, &FailingOracle, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, ExportError::Layout(_)));
    }

    #[test]
    fn test_artifact_save() {
        let artifact = ExportArtifact {
            bytes: b"%PDF-1.5".to_vec(),
            pages: 0,
            report: ExportReport::default(),
        };
        let path = std::env::temp_dir().join(format!("bookpress_save_{}.pdf", std::process::id()));
        artifact.save(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.5");
        std::fs::remove_file(&path).ok();
    }
}
