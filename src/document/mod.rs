//! Document model: front matter, chapters, conclusion and blank pages

mod image;
mod paragraph;

pub use image::{FloatingImage, ImageAsset, ImageId};
pub use paragraph::{paragraph_at, spans_range, split_paragraphs, ParagraphSpan};

use crate::editing::{EditOp, EditResult};
use crate::error::EditError;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Stable identifier for a chapter that survives reordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterId(pub u64);

/// Stable identifier for a user-inserted blank page
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlankPageId(pub u64);

/// Identifies one flowing section of the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SectionId {
    FrontMatter,
    Chapter(ChapterId),
    Conclusion,
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionId::FrontMatter => write!(f, "front"),
            SectionId::Chapter(id) => write!(f, "chapter:{}", id.0),
            SectionId::Conclusion => write!(f, "conclusion"),
        }
    }
}

impl FromStr for SectionId {
    type Err = EditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "front" => Ok(SectionId::FrontMatter),
            "conclusion" => Ok(SectionId::Conclusion),
            _ => s
                .strip_prefix("chapter:")
                .and_then(|n| n.parse::<u64>().ok())
                .map(|n| SectionId::Chapter(ChapterId(n)))
                .ok_or_else(|| EditError::UnknownSection(s.to_string())),
        }
    }
}

impl From<SectionId> for String {
    fn from(id: SectionId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for SectionId {
    type Error = EditError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Rich text plus the images floating over its pages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    /// Paragraphs separated by a blank line
    pub rich_text: String,
    pub floating_images: Vec<FloatingImage>,
}

impl Section {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            rich_text: text.into(),
            floating_images: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: ChapterId,
    pub title: String,
    pub section: Section,
}

/// A page with independent content, anchored after a content page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlankPage {
    pub id: BlankPageId,
    /// Book-global content page index (blank pages not counted)
    pub anchor_page_index: usize,
}

/// Chapter text as delivered by the content supplier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChapterDraft {
    pub title: String,
    pub body: String,
}

/// Plain-text manuscript used to seed a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Manuscript {
    pub title: String,
    pub author: Option<String>,
    pub front_matter: String,
    pub chapters: Vec<ChapterDraft>,
    pub conclusion: String,
}

/// Every document field except image binaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFields {
    pub title: String,
    pub author: Option<String>,
    pub front_matter: Section,
    pub chapters: Vec<Chapter>,
    pub conclusion: Section,
    pub blank_pages: Vec<BlankPage>,
}

/// The main document structure
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub title: String,
    pub author: Option<String>,
    front_matter: Section,
    chapters: Vec<Chapter>,
    conclusion: Section,
    blank_pages: Vec<BlankPage>,
    /// Image binaries keyed by image reference
    assets: FxHashMap<String, ImageAsset>,
    /// Monotonic version counter
    version: u64,
    next_chapter_id: u64,
    next_image_id: u64,
    next_blank_id: u64,
}

impl Document {
    /// Create a new empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document from supplier output
    pub fn from_manuscript(manuscript: &Manuscript) -> Self {
        let mut doc = Self {
            title: manuscript.title.clone(),
            author: manuscript.author.clone(),
            front_matter: Section::new(manuscript.front_matter.clone()),
            conclusion: Section::new(manuscript.conclusion.clone()),
            ..Self::default()
        };
        for draft in &manuscript.chapters {
            doc.add_chapter(draft.title.clone(), draft.body.clone());
        }
        doc.version = 0;
        doc
    }

    /// Get the document version
    pub fn version(&self) -> u64 {
        self.version
    }

    fn bump(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Sections in reading order
    pub fn section_ids(&self) -> Vec<SectionId> {
        let mut ids = Vec::with_capacity(self.chapters.len() + 2);
        ids.push(SectionId::FrontMatter);
        ids.extend(self.chapters.iter().map(|c| SectionId::Chapter(c.id)));
        ids.push(SectionId::Conclusion);
        ids
    }

    pub fn section(&self, id: SectionId) -> Option<&Section> {
        match id {
            SectionId::FrontMatter => Some(&self.front_matter),
            SectionId::Conclusion => Some(&self.conclusion),
            SectionId::Chapter(cid) => self.chapter(cid).map(|c| &c.section),
        }
    }

    pub fn section_mut(&mut self, id: SectionId) -> Option<&mut Section> {
        match id {
            SectionId::FrontMatter => Some(&mut self.front_matter),
            SectionId::Conclusion => Some(&mut self.conclusion),
            SectionId::Chapter(cid) => self
                .chapters
                .iter_mut()
                .find(|c| c.id == cid)
                .map(|c| &mut c.section),
        }
    }

    fn sections_mut(&mut self) -> impl Iterator<Item = (SectionId, &mut Section)> {
        std::iter::once((SectionId::FrontMatter, &mut self.front_matter))
            .chain(
                self.chapters
                    .iter_mut()
                    .map(|c| (SectionId::Chapter(c.id), &mut c.section)),
            )
            .chain(std::iter::once((SectionId::Conclusion, &mut self.conclusion)))
    }

    /// Heading rendered above a section's text, if any
    pub fn heading(&self, id: SectionId) -> Option<&str> {
        match id {
            SectionId::Chapter(cid) => self.chapter(cid).map(|c| c.title.as_str()),
            _ => None,
        }
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn chapter(&self, id: ChapterId) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == id)
    }

    /// Append a chapter
    pub fn add_chapter(&mut self, title: impl Into<String>, body: impl Into<String>) -> ChapterId {
        let id = ChapterId(self.next_chapter_id);
        self.next_chapter_id += 1;
        self.chapters.push(Chapter {
            id,
            title: title.into(),
            section: Section::new(body),
        });
        self.bump();
        id
    }

    /// Remove a chapter together with its images
    pub fn remove_chapter(&mut self, id: ChapterId) -> Result<Chapter, EditError> {
        let pos = self
            .chapters
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| EditError::UnknownSection(SectionId::Chapter(id).to_string()))?;
        self.bump();
        Ok(self.chapters.remove(pos))
    }

    pub fn set_chapter_title(&mut self, id: ChapterId, title: impl Into<String>) -> Result<(), EditError> {
        let chapter = self
            .chapters
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| EditError::UnknownSection(SectionId::Chapter(id).to_string()))?;
        chapter.title = title.into();
        self.bump();
        Ok(())
    }

    /// Apply an edit to one section's text
    pub fn apply_edit(&mut self, section: SectionId, op: &EditOp) -> Result<EditResult, EditError> {
        let current = self
            .section(section)
            .ok_or_else(|| EditError::UnknownSection(section.to_string()))?;

        // Work on a copy so a failing transaction leaves the section untouched
        let mut text = current.rich_text.clone();
        let mut touched = SmallVec::new();
        apply_op(&mut text, op, &mut touched)?;

        let new_len = text.len();
        if text == current.rich_text {
            return Ok(EditResult {
                section,
                version: self.version,
                touched: SmallVec::new(),
                new_len,
            });
        }
        if let Some(target) = self.section_mut(section) {
            target.rich_text = text;
        }
        let version = self.bump();

        Ok(EditResult {
            section,
            version,
            touched,
            new_len,
        })
    }

    pub fn blank_pages(&self) -> &[BlankPage] {
        &self.blank_pages
    }

    /// Insert a blank page after the given content page
    pub fn add_blank_page(&mut self, anchor_page_index: usize) -> BlankPageId {
        let id = BlankPageId(self.next_blank_id);
        self.next_blank_id += 1;
        self.blank_pages.push(BlankPage {
            id,
            anchor_page_index,
        });
        self.bump();
        id
    }

    pub fn remove_blank_page(&mut self, id: BlankPageId) -> Result<BlankPage, EditError> {
        let pos = self
            .blank_pages
            .iter()
            .position(|b| b.id == id)
            .ok_or(EditError::UnknownBlankPage(id.0))?;
        self.bump();
        Ok(self.blank_pages.remove(pos))
    }

    pub fn move_blank_page(&mut self, id: BlankPageId, anchor_page_index: usize) -> Result<(), EditError> {
        let page = self
            .blank_pages
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(EditError::UnknownBlankPage(id.0))?;
        page.anchor_page_index = anchor_page_index;
        self.bump();
        Ok(())
    }

    /// Register the binary behind an image reference
    pub fn add_asset(&mut self, image_ref: impl Into<String>, asset: ImageAsset) {
        self.assets.insert(image_ref.into(), asset);
    }

    pub fn asset(&self, image_ref: &str) -> Option<&ImageAsset> {
        self.assets.get(image_ref)
    }

    /// Drop an asset; images referring to it stay until deleted
    pub fn remove_asset(&mut self, image_ref: &str) -> Option<ImageAsset> {
        self.assets.remove(image_ref)
    }

    pub(crate) fn allocate_image_id(&mut self) -> ImageId {
        let id = ImageId(self.next_image_id);
        self.next_image_id += 1;
        id
    }

    /// Locate an image in any section
    pub fn find_image(&self, id: ImageId) -> Option<(SectionId, &FloatingImage)> {
        self.section_ids().into_iter().find_map(|sid| {
            self.section(sid)
                .and_then(|s| s.floating_images.iter().find(|img| img.id == id))
                .map(|img| (sid, img))
        })
    }

    pub fn image_mut(&mut self, id: ImageId) -> Option<(SectionId, &mut FloatingImage)> {
        self.sections_mut().find_map(|(sid, section)| {
            section
                .floating_images
                .iter_mut()
                .find(|img| img.id == id)
                .map(|img| (sid, img))
        })
    }

    pub(crate) fn images_mut(&mut self) -> impl Iterator<Item = &mut FloatingImage> {
        self.sections_mut().flat_map(|(_, section)| section.floating_images.iter_mut())
    }

    pub(crate) fn push_image(&mut self, section: SectionId, image: FloatingImage) -> Result<(), EditError> {
        let target = self
            .section_mut(section)
            .ok_or_else(|| EditError::UnknownSection(section.to_string()))?;
        target.floating_images.push(image);
        self.bump();
        Ok(())
    }

    /// Remove an image; text flow is unaffected
    pub fn remove_image(&mut self, id: ImageId) -> Result<(SectionId, FloatingImage), EditError> {
        let removed = self.sections_mut().find_map(|(sid, section)| {
            section
                .floating_images
                .iter()
                .position(|img| img.id == id)
                .map(|pos| (sid, section.floating_images.remove(pos)))
        });
        match removed {
            Some(found) => {
                self.bump();
                Ok(found)
            }
            None => Err(EditError::UnknownImage(id.0)),
        }
    }

    pub(crate) fn touch(&mut self) {
        self.bump();
    }

    /// Copy every field except image binaries
    pub fn fields(&self) -> DocumentFields {
        DocumentFields {
            title: self.title.clone(),
            author: self.author.clone(),
            front_matter: self.front_matter.clone(),
            chapters: self.chapters.clone(),
            conclusion: self.conclusion.clone(),
            blank_pages: self.blank_pages.clone(),
        }
    }

    /// Replace text and structure from stored fields.
    ///
    /// Images whose asset is no longer present are dropped, since stored
    /// fields never carry binaries. Returns how many were dropped.
    pub fn restore_fields(&mut self, fields: DocumentFields) -> usize {
        let DocumentFields {
            title,
            author,
            front_matter,
            chapters,
            conclusion,
            blank_pages,
        } = fields;

        self.title = title;
        self.author = author;
        self.front_matter = front_matter;
        self.chapters = chapters;
        self.conclusion = conclusion;
        self.blank_pages = blank_pages;

        let assets = &self.assets;
        let mut dropped = 0;
        let mut max_image = None;
        for (_, section) in std::iter::once((SectionId::FrontMatter, &mut self.front_matter))
            .chain(self.chapters.iter_mut().map(|c| (SectionId::Chapter(c.id), &mut c.section)))
            .chain(std::iter::once((SectionId::Conclusion, &mut self.conclusion)))
        {
            let before = section.floating_images.len();
            section
                .floating_images
                .retain(|img| assets.contains_key(&img.image_ref));
            dropped += before - section.floating_images.len();
            max_image = section
                .floating_images
                .iter()
                .map(|img| img.id.0)
                .chain(max_image)
                .max();
        }

        if let Some(max) = self.chapters.iter().map(|c| c.id.0).max() {
            self.next_chapter_id = self.next_chapter_id.max(max + 1);
        }
        if let Some(max) = max_image {
            self.next_image_id = self.next_image_id.max(max + 1);
        }
        if let Some(max) = self.blank_pages.iter().map(|b| b.id.0).max() {
            self.next_blank_id = self.next_blank_id.max(max + 1);
        }

        self.bump();
        dropped
    }
}

fn check_offset(text: &str, offset: usize) -> Result<(), EditError> {
    if offset > text.len() || !text.is_char_boundary(offset) {
        return Err(EditError::InvalidOffset {
            offset,
            len: text.len(),
        });
    }
    Ok(())
}

fn apply_op(
    text: &mut String,
    op: &EditOp,
    touched: &mut SmallVec<[Range<usize>; 2]>,
) -> Result<(), EditError> {
    match op {
        EditOp::Insert { position, text: inserted } => {
            check_offset(text, position.0)?;
            if !inserted.is_empty() {
                text.insert_str(position.0, inserted);
                touched.push(position.0..position.0 + inserted.len());
            }
        }
        EditOp::Delete { start, end } => {
            let (s, e) = (start.0.min(end.0), start.0.max(end.0));
            check_offset(text, s)?;
            check_offset(text, e)?;
            if s < e {
                text.replace_range(s..e, "");
                touched.push(s..s);
            }
        }
        EditOp::Transaction { ops } => {
            for op in ops {
                apply_op(text, op, touched)?;
            }
        }
    }
    Ok(())
}
