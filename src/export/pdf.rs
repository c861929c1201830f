//! Assembling raster pages into one PDF

use crate::error::ExportError;
use lopdf::{dictionary, Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream};
use tiny_skia::Pixmap;

#[cfg(test)]
fn lopdf_err(err: lopdf::Error) -> ExportError {
    ExportError::Assembly(err.to_string())
}

/// Builds a PDF with one raster per page, each scaled to fit the output
/// page and centered
pub struct PdfAssembler {
    doc: LoDocument,
    pages_id: LoObjectId,
    kids: Vec<LoObject>,
    page_width_pt: f32,
    page_height_pt: f32,
}

impl PdfAssembler {
    pub fn new(page_width_pt: f32, page_height_pt: f32) -> Self {
        let mut doc = LoDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            page_width_pt,
            page_height_pt,
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    pub fn add_page(&mut self, raster: &Pixmap) -> Result<(), ExportError> {
        let (px_w, px_h) = (raster.width(), raster.height());
        if px_w == 0 || px_h == 0 {
            return Err(ExportError::Assembly("empty raster page".to_string()));
        }

        // Pages are painted opaque white first, so demultiplying is lossless
        let mut rgb = Vec::with_capacity(px_w as usize * px_h as usize * 3);
        for px in raster.pixels() {
            let c = px.demultiply();
            rgb.extend_from_slice(&[c.red(), c.green(), c.blue()]);
        }
        let image_id = self.doc.add_object(LoStream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => px_w as i64,
                "Height" => px_h as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            rgb,
        ));

        let fit = (self.page_width_pt / px_w as f32).min(self.page_height_pt / px_h as f32);
        let (draw_w, draw_h) = (px_w as f32 * fit, px_h as f32 * fit);
        let x = (self.page_width_pt - draw_w) / 2.0;
        let y = (self.page_height_pt - draw_h) / 2.0;
        let content = format!("q {draw_w:.3} 0 0 {draw_h:.3} {x:.3} {y:.3} cm /Pg Do Q\n").into_bytes();
        let content_id = self.doc.add_object(LoStream::new(dictionary! {}, content));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Pg" => image_id },
            },
            "MediaBox" => vec![0.into(), 0.into(), self.page_width_pt.into(), self.page_height_pt.into()],
        });
        self.kids.push(LoObject::Reference(page_id));
        Ok(())
    }

    /// Finish the document and serialize it
    pub fn finish(mut self) -> Result<Vec<u8>, ExportError> {
        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            LoObject::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.compress();

        let mut out = Vec::new();
        self.doc.save_to(&mut out)?;
        Ok(out)
    }
}

/// Page count of a serialized PDF
#[cfg(test)]
pub(crate) fn count_pages(bytes: &[u8]) -> Result<usize, ExportError> {
    let doc = LoDocument::load_mem(bytes).map_err(lopdf_err)?;
    Ok(doc.get_pages().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_skia::Color;

    fn page(w: u32, h: u32) -> Pixmap {
        let mut pixmap = Pixmap::new(w, h).unwrap();
        pixmap.fill(Color::from_rgba8(255, 255, 255, 255));
        pixmap
    }

    fn assemble(pages: &[Pixmap], page_width_pt: f32, page_height_pt: f32) -> Vec<u8> {
        let mut assembler = PdfAssembler::new(page_width_pt, page_height_pt);
        for page in pages {
            assembler.add_page(page).unwrap();
        }
        assembler.finish().unwrap()
    }

    #[test]
    fn test_one_pdf_page_per_raster() {
        let bytes = assemble(&[page(20, 30), page(20, 30), page(20, 30)], 595.28, 841.89);
        assert!(bytes.starts_with(b"%PDF-1.5"));
        assert_eq!(count_pages(&bytes).unwrap(), 3);
    }

    #[test]
    fn test_media_box_uses_output_size() {
        let bytes = assemble(&[page(10, 10)], 200.0, 100.0);
        let doc = LoDocument::load_mem(&bytes).unwrap();
        let (_, page_id) = doc.get_pages().into_iter().next().unwrap();
        let media_box = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"MediaBox")
            .unwrap()
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(media_box.len(), 4);
        assert_eq!(media_box[2].as_float().unwrap(), 200.0);
        assert_eq!(media_box[3].as_float().unwrap(), 100.0);
    }

    #[test]
    fn test_empty_document_is_valid() {
        let bytes = PdfAssembler::new(100.0, 100.0).finish().unwrap();
        assert_eq!(count_pages(&bytes).unwrap(), 0);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(count_pages(b"not a pdf"), Err(ExportError::Assembly(_))));
    }
}
