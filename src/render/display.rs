//! Display pages: render-ready projection of the live layout

use crate::document::{BlankPageId, Document, ImageId, SectionId};
use crate::layout::{BookPage, LayoutState};
use crate::Rect;
use serde::Serialize;
use std::ops::Range;

/// What a display page shows
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PageKind {
    #[serde(rename_all = "camelCase")]
    Title { title: String, author: Option<String> },
    #[serde(rename_all = "camelCase")]
    Content {
        section: SectionId,
        page: usize,
        content_index: usize,
    },
    Blank { id: BlankPageId },
}

/// A floating image in page-frame coordinates (margins included)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedImage {
    pub id: ImageId,
    pub image_ref: String,
    pub rect: Rect,
}

/// Display data for a single page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPage {
    pub page_index: usize,
    /// Position in the continuous page strip
    pub bounds: Rect,
    #[serde(flatten)]
    pub kind: PageKind,
    /// Chapter heading, on the first page of a chapter only
    pub heading: Option<String>,
    /// Paragraph range of the section shown on this page
    pub paragraphs: Range<usize>,
    pub text: String,
    pub images: Vec<PlacedImage>,
}

/// Every page of the book, stacked top to bottom
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookView {
    pub version: u64,
    pub pages: Vec<DisplayPage>,
}

impl BookView {
    /// Build from the current layout; sections not yet laid out show as a
    /// single page with their whole text
    pub fn build(document: &Document, layout: &LayoutState) -> Self {
        let constraints = layout.constraints();
        let page_height = constraints.page_height;

        let pages = layout
            .book_pages(document)
            .into_iter()
            .enumerate()
            .map(|(page_index, book_page)| {
                let bounds = Rect::new(0.0, page_index as f32 * page_height, constraints.page_width, page_height);
                let mut page = DisplayPage {
                    page_index,
                    bounds,
                    kind: PageKind::Blank { id: BlankPageId(0) },
                    heading: None,
                    paragraphs: 0..0,
                    text: String::new(),
                    images: Vec::new(),
                };
                match book_page {
                    BookPage::Title => {
                        page.kind = PageKind::Title {
                            title: document.title.clone(),
                            author: document.author.clone(),
                        };
                    }
                    BookPage::Blank { id } => page.kind = PageKind::Blank { id },
                    BookPage::Content {
                        section,
                        page: index,
                        content_index,
                    } => {
                        page.kind = PageKind::Content {
                            section,
                            page: index,
                            content_index,
                        };
                        fill_content(&mut page, document, layout, section, index);
                    }
                }
                page
            })
            .collect();

        Self {
            version: document.version(),
            pages,
        }
    }

    /// Pages intersecting a viewport in strip coordinates
    pub fn visible(&self, viewport: Rect) -> impl Iterator<Item = &DisplayPage> {
        self.pages.iter().filter(move |p| {
            p.bounds.y < viewport.y + viewport.height && p.bounds.y + p.bounds.height > viewport.y
        })
    }
}

fn fill_content(page: &mut DisplayPage, document: &Document, layout: &LayoutState, section: SectionId, index: usize) {
    let Some(content) = document.section(section) else {
        return;
    };
    let constraints = layout.constraints();
    let last_page = match layout.section_pages(section) {
        Some(pages) => {
            page.paragraphs = pages.page_paragraphs(index).unwrap_or(0..0);
            page.text = pages.page_text(index).unwrap_or_default().to_string();
            pages.page_count().saturating_sub(1)
        }
        None => {
            page.text = content.rich_text.clone();
            0
        }
    };
    if index == 0 {
        page.heading = document.heading(section).map(str::to_string);
    }

    // Images pinned past the last page stay visible on it
    page.images = content
        .floating_images
        .iter()
        .filter(|image| image.page.min(last_page) == index)
        .map(|image| PlacedImage {
            id: image.id,
            image_ref: image.image_ref.clone(),
            rect: Rect::new(
                image.x + constraints.margin_left,
                image.y + constraints.margin_top,
                image.width,
                image.height,
            ),
        })
        .collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ChapterDraft, ImageAsset, Manuscript};
    use crate::layout::{FloatingLayer, LayoutConstraints};
    use crate::test_support::FixedOracle;
    use crate::{Point, Size};

    fn setup() -> (Document, LayoutState) {
        let mut doc = Document::from_manuscript(&Manuscript {
            title: "Book".to_string(),
            author: Some("A. Writer".to_string()),
            front_matter: "f:10".to_string(),
            chapters: vec![ChapterDraft {
                title: "One".to_string(),
                body: "a:200\n\nb:200".to_string(),
            }],
            ..Manuscript::default()
        });
        doc.add_asset(
            "pic",
            ImageAsset {
                mime: "image/png".to_string(),
                natural_width: 50,
                natural_height: 50,
                bytes: Vec::new(),
            },
        );
        let constraints = LayoutConstraints {
            page_height: 250.0 + 144.0,
            ..LayoutConstraints::default()
        };
        let mut layout = LayoutState::new(constraints, 1800);
        layout.relayout(&doc, Some(&FixedOracle::default()));
        (doc, layout)
    }

    #[test]
    fn test_pages_in_reading_order() {
        let (doc, layout) = setup();
        let view = BookView::build(&doc, &layout);
        let kinds: Vec<&str> = view
            .pages
            .iter()
            .map(|p| match p.kind {
                PageKind::Title { .. } => "title",
                PageKind::Content { .. } => "content",
                PageKind::Blank { .. } => "blank",
            })
            .collect();
        // title, front, chapter x2, conclusion
        assert_eq!(kinds, vec!["title", "content", "content", "content", "content"]);
        assert_eq!(view.pages[2].heading.as_deref(), Some("One"));
        assert_eq!(view.pages[2].text.trim_end(), "a:200");
        assert_eq!(view.pages[3].heading, None);
        assert_eq!(view.pages[3].paragraphs, 1..2);
        assert_eq!(view.pages[4].bounds.y, 4.0 * 394.0);
    }

    #[test]
    fn test_images_in_page_frame() {
        let (mut doc, layout) = setup();
        let layer = FloatingLayer::new(Size::new(468.0, 250.0));
        layer
            .attach(&mut doc, SectionId::FrontMatter, 0, "pic", Size::new(50.0, 50.0), Some(Point { x: 10.0, y: 20.0 }))
            .unwrap();
        let view = BookView::build(&doc, &layout);
        let images = &view.pages[1].images;
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].rect, Rect::new(82.0, 92.0, 50.0, 50.0));
    }

    #[test]
    fn test_blank_page_follows_anchor() {
        let (mut doc, layout) = setup();
        let id = doc.add_blank_page(0);
        let view = BookView::build(&doc, &layout);
        assert_eq!(view.pages[2].kind, PageKind::Blank { id });
    }

    #[test]
    fn test_visible_pages() {
        let (doc, layout) = setup();
        let view = BookView::build(&doc, &layout);
        let visible: Vec<usize> = view
            .visible(Rect::new(0.0, 400.0, 612.0, 400.0))
            .map(|p| p.page_index)
            .collect();
        assert_eq!(visible, vec![1, 2]);
    }

    #[test]
    fn test_serializes_flat_kind() {
        let (doc, layout) = setup();
        let json = serde_json::to_value(BookView::build(&doc, &layout)).unwrap();
        assert_eq!(json["pages"][0]["kind"], "title");
        assert_eq!(json["pages"][1]["section"], "front");
    }
}
