//! WASM bindings for the book editor
//!
//! Structured values cross the boundary as JSON strings. Identifiers use
//! their plain forms: sections as `"front"`, `"chapter:<n>"` or
//! `"conclusion"`, everything else as numbers.

use crate::document::{BlankPageId, ChapterId, ImageAsset, ImageId, Manuscript, SectionId};
use crate::editing::current_timestamp;
use crate::error::{LayoutError, StoreError};
use crate::export::CancelToken;
use crate::history::KeyValueStore;
use crate::layout::{DragMode, LayoutConstraints, LayoutDiff, MeasurementOracle};
use crate::render::{BookView, RenderDiff};
use crate::{BookConfig, BookEditor, Point};
use js_sys::{Array, Function, Reflect};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Initialize panic hook for better error messages
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    js_sys::Error::new(&err.to_string()).into()
}

fn to_json<T: Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(js_error)
}

fn section(id: &str) -> Result<SectionId, JsValue> {
    id.parse::<SectionId>().map_err(js_error)
}

/// Measures paragraphs through a JavaScript callback.
///
/// The callback receives an array of paragraph strings and returns the
/// rendered height of the block in pixels.
struct JsOracle {
    measure: Function,
}

impl MeasurementOracle for JsOracle {
    fn measure_block(&self, paragraphs: &[&str]) -> Result<f32, LayoutError> {
        let block: Array = paragraphs.iter().map(|p| JsValue::from_str(p)).collect();
        let height = self
            .measure
            .call1(&JsValue::NULL, &block)
            .map_err(|err| LayoutError::MeasurementUnavailable(format!("measure callback threw: {err:?}")))?;
        height
            .as_f64()
            .filter(|h| h.is_finite() && *h >= 0.0)
            .map(|h| h as f32)
            .ok_or_else(|| LayoutError::MeasurementUnavailable("measure callback returned no height".to_string()))
    }
}

/// Adapts any object with the Web Storage methods (`getItem`, `setItem`,
/// `removeItem`), such as `localStorage`
struct JsStore<'a> {
    storage: &'a JsValue,
}

impl JsStore<'_> {
    fn call(&self, method: &str, args: &[&JsValue]) -> Result<JsValue, JsValue> {
        let function: Function = Reflect::get(self.storage, &JsValue::from_str(method))?.dyn_into()?;
        match args {
            [key] => function.call1(self.storage, key),
            [key, value] => function.call2(self.storage, key, value),
            _ => function.call0(self.storage),
        }
    }
}

impl KeyValueStore for JsStore<'_> {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self
            .call("getItem", &[&JsValue::from_str(key)])
            .map_err(|err| StoreError::Backend(format!("{err:?}")))?;
        Ok(value.as_string().map(String::into_bytes))
    }

    fn save(&mut self, key: &str, blob: &[u8]) -> Result<(), StoreError> {
        let text = std::str::from_utf8(blob).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        self.call("setItem", &[&JsValue::from_str(key), &JsValue::from_str(text)])
            .map(|_| ())
            .map_err(|err| {
                let name = Reflect::get(&err, &JsValue::from_str("name"))
                    .ok()
                    .and_then(|n| n.as_string());
                match name.as_deref() {
                    Some("QuotaExceededError") => StoreError::QuotaExceeded { needed: blob.len() },
                    _ => StoreError::Backend(format!("{err:?}")),
                }
            })
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.call("removeItem", &[&JsValue::from_str(key)])
            .map(|_| ())
            .map_err(|err| StoreError::Backend(format!("{err:?}")))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReflowData {
    reflowed: Vec<SectionId>,
    removed: Vec<SectionId>,
    content_pages: usize,
    degraded: bool,
}

impl From<LayoutDiff> for ReflowData {
    fn from(diff: LayoutDiff) -> Self {
        Self {
            reflowed: diff.reflowed,
            removed: diff.removed,
            content_pages: diff.content_pages,
            degraded: diff.degraded,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TickData {
    reflow: Option<ReflowData>,
    snapshot: Option<u64>,
}

/// WASM-exposed book editor
#[wasm_bindgen]
pub struct WasmBook {
    editor: BookEditor,
    /// Last view handed to the host, for incremental patches
    shown: Option<BookView>,
}

#[wasm_bindgen]
impl WasmBook {
    /// Open a manuscript with the built-in measurers.
    ///
    /// `config_json` may be empty for the defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(manuscript_json: &str, config_json: &str) -> Result<WasmBook, JsValue> {
        let (manuscript, config) = parse_inputs(manuscript_json, config_json)?;
        let editor = BookEditor::from_manuscript(&manuscript, config).map_err(js_error)?;
        Ok(Self { editor, shown: None })
    }

    /// Open a manuscript measured by host callbacks, one at the live page
    /// width and one at the export width
    #[wasm_bindgen(js_name = withMeasure)]
    pub fn with_measure(
        manuscript_json: &str,
        config_json: &str,
        measure: Function,
        export_measure: Function,
    ) -> Result<WasmBook, JsValue> {
        let (manuscript, config) = parse_inputs(manuscript_json, config_json)?;
        let editor = BookEditor::with_oracles(
            &manuscript,
            config,
            Box::new(JsOracle { measure }),
            Box::new(JsOracle { measure: export_measure }),
        )
        .map_err(js_error)?;
        Ok(Self { editor, shown: None })
    }

    #[wasm_bindgen(js_name = insertText)]
    pub fn insert_text(&mut self, section_id: &str, offset: usize, text: &str) -> Result<u64, JsValue> {
        let result = self
            .editor
            .insert_text(section(section_id)?, offset, text)
            .map_err(js_error)?;
        Ok(result.version)
    }

    #[wasm_bindgen(js_name = deleteRange)]
    pub fn delete_range(&mut self, section_id: &str, start: usize, end: usize) -> Result<u64, JsValue> {
        let result = self
            .editor
            .delete(section(section_id)?, start..end)
            .map_err(js_error)?;
        Ok(result.version)
    }

    /// Replace the text shown on one live page
    #[wasm_bindgen(js_name = replacePageText)]
    pub fn replace_page_text(&mut self, section_id: &str, page: usize, text: &str) -> Result<u64, JsValue> {
        let result = self
            .editor
            .replace_page_text(section(section_id)?, page, text)
            .map_err(js_error)?;
        Ok(result.version)
    }

    #[wasm_bindgen(js_name = addChapter)]
    pub fn add_chapter(&mut self, title: &str, body: &str) -> u64 {
        self.editor.add_chapter(title, body).0
    }

    #[wasm_bindgen(js_name = renameChapter)]
    pub fn rename_chapter(&mut self, id: u64, title: &str) -> Result<(), JsValue> {
        self.editor.rename_chapter(ChapterId(id), title).map_err(js_error)
    }

    #[wasm_bindgen(js_name = removeChapter)]
    pub fn remove_chapter(&mut self, id: u64) -> Result<(), JsValue> {
        self.editor.remove_chapter(ChapterId(id)).map(|_| ()).map_err(js_error)
    }

    #[wasm_bindgen(js_name = addBlankPage)]
    pub fn add_blank_page(&mut self, anchor_page_index: usize) -> u64 {
        self.editor.add_blank_page(anchor_page_index).0
    }

    #[wasm_bindgen(js_name = removeBlankPage)]
    pub fn remove_blank_page(&mut self, id: u64) -> Result<(), JsValue> {
        self.editor.remove_blank_page(BlankPageId(id)).map_err(js_error)
    }

    #[wasm_bindgen(js_name = moveBlankPage)]
    pub fn move_blank_page(&mut self, id: u64, anchor_page_index: usize) -> Result<(), JsValue> {
        self.editor
            .move_blank_page(BlankPageId(id), anchor_page_index)
            .map_err(js_error)
    }

    /// Register an encoded image (PNG or JPEG) under a reference
    #[wasm_bindgen(js_name = addAsset)]
    pub fn add_asset(&mut self, image_ref: &str, bytes: Vec<u8>) -> Result<(), JsValue> {
        let asset = ImageAsset::from_bytes(bytes)
            .ok_or_else(|| js_error(format!("asset {image_ref} is not a decodable image")))?;
        self.editor.add_asset(image_ref, asset);
        Ok(())
    }

    /// Pin an image to a live page; returns the new image id
    #[wasm_bindgen(js_name = attachImage)]
    pub fn attach_image(
        &mut self,
        section_id: &str,
        page: usize,
        image_ref: &str,
        x: Option<f32>,
        y: Option<f32>,
    ) -> Result<u64, JsValue> {
        let position = x.zip(y).map(|(x, y)| Point { x, y });
        let image = self
            .editor
            .attach_image(section(section_id)?, page, image_ref, position)
            .map_err(js_error)?;
        Ok(image.id.0)
    }

    #[wasm_bindgen(js_name = moveImage)]
    pub fn move_image(&mut self, id: u64, dx: f32, dy: f32) -> Result<String, JsValue> {
        let rect = self.editor.move_image(ImageId(id), dx, dy).map_err(js_error)?;
        to_json(&rect)
    }

    #[wasm_bindgen(js_name = resizeImage)]
    pub fn resize_image(&mut self, id: u64, delta: f32) -> Result<String, JsValue> {
        let rect = self.editor.resize_image(ImageId(id), delta).map_err(js_error)?;
        to_json(&rect)
    }

    #[wasm_bindgen(js_name = deleteImage)]
    pub fn delete_image(&mut self, id: u64) -> Result<(), JsValue> {
        self.editor.delete_image(ImageId(id)).map(|_| ()).map_err(js_error)
    }

    /// Start a gesture; `resize` selects resizing instead of moving
    #[wasm_bindgen(js_name = beginDrag)]
    pub fn begin_drag(&mut self, id: u64, resize: bool, x: f32, y: f32) -> Result<(), JsValue> {
        let mode = if resize { DragMode::Resize } else { DragMode::Move };
        self.editor
            .begin_drag(ImageId(id), mode, Point { x, y })
            .map_err(js_error)
    }

    #[wasm_bindgen(js_name = dragTo)]
    pub fn drag_to(&self, x: f32, y: f32) -> Result<String, JsValue> {
        let rect = self.editor.drag_to(Point { x, y }).map_err(js_error)?;
        to_json(&rect)
    }

    #[wasm_bindgen(js_name = endDrag)]
    pub fn end_drag(&mut self, x: f32, y: f32) -> Result<String, JsValue> {
        let rect = self.editor.end_drag(Point { x, y }).map_err(js_error)?;
        to_json(&rect)
    }

    #[wasm_bindgen(js_name = cancelDrag)]
    pub fn cancel_drag(&mut self) {
        self.editor.cancel_drag();
    }

    /// Drive debounced work with a host clock in milliseconds
    pub fn tick(&mut self, now_ms: f64) -> Result<String, JsValue> {
        let outcome = self.editor.tick(now_ms.max(0.0) as u64);
        to_json(&TickData {
            reflow: outcome.reflow.map(ReflowData::from),
            snapshot: outcome.snapshot,
        })
    }

    /// Tick with the browser clock
    #[wasm_bindgen(js_name = tickNow)]
    pub fn tick_now(&mut self) -> Result<String, JsValue> {
        self.tick(current_timestamp() as f64)
    }

    /// Reflow immediately
    pub fn flush(&mut self) -> Result<String, JsValue> {
        to_json(&ReflowData::from(self.editor.flush()))
    }

    /// Apply new live page geometry given as JSON. Without `measure` the
    /// built-in measurer takes over at the new width.
    #[wasm_bindgen(js_name = setPageGeometry)]
    pub fn set_page_geometry(&mut self, geometry_json: &str, measure: Option<Function>) -> Result<String, JsValue> {
        let page: LayoutConstraints = serde_json::from_str(geometry_json).map_err(js_error)?;
        let oracle = measure.map(|measure| Box::new(JsOracle { measure }) as Box<dyn MeasurementOracle>);
        let diff = self.editor.set_page_geometry(page, oracle).map_err(js_error)?;
        to_json(&ReflowData::from(diff))
    }

    #[wasm_bindgen(js_name = reflowPending)]
    pub fn reflow_pending(&self) -> bool {
        self.editor.reflow_pending()
    }

    /// Every display page as JSON
    pub fn pages(&mut self) -> Result<String, JsValue> {
        let view = self.editor.pages();
        let json = to_json(&view)?;
        self.shown = Some(view);
        Ok(json)
    }

    /// Patches from the last view handed out to the current one
    #[wasm_bindgen(js_name = renderDiff)]
    pub fn render_diff(&mut self) -> Result<String, JsValue> {
        let view = self.editor.pages();
        let diff = match &self.shown {
            Some(shown) => RenderDiff::between(shown, &view),
            None => RenderDiff::full(&view),
        };
        let json = to_json(&diff)?;
        self.shown = Some(view);
        Ok(json)
    }

    #[wasm_bindgen(js_name = pageCount)]
    pub fn page_count(&mut self) -> usize {
        self.editor.pages().pages.len()
    }

    /// Snapshot ids with their timestamps, oldest first
    pub fn snapshots(&self) -> Result<String, JsValue> {
        let list: Vec<(u64, u64)> = self
            .editor
            .history()
            .snapshots()
            .map(|s| (s.id, s.timestamp))
            .collect();
        to_json(&list)
    }

    /// Return to a snapshot; returns how many images were dropped with it
    pub fn restore(&mut self, snapshot: u64) -> Result<usize, JsValue> {
        self.shown = None;
        self.editor.restore(snapshot).map_err(js_error)
    }

    /// Write history into a Web Storage object; returns the snapshots kept
    #[wasm_bindgen(js_name = persistHistory)]
    pub fn persist_history(&self, storage: &JsValue) -> usize {
        let mut store = JsStore { storage };
        self.editor.persist_history(&mut store)
    }

    #[wasm_bindgen(js_name = loadHistory)]
    pub fn load_history(&mut self, storage: &JsValue) -> usize {
        let store = JsStore { storage };
        self.editor.load_history(&store)
    }

    /// Export the whole book as PDF bytes
    #[wasm_bindgen(js_name = exportPdf)]
    pub fn export_pdf(&mut self) -> Result<Vec<u8>, JsValue> {
        let artifact = self.editor.export(&CancelToken::new()).map_err(js_error)?;
        Ok(artifact.bytes)
    }

    /// The report of a dry export, as JSON
    #[wasm_bindgen(js_name = exportReport)]
    pub fn export_report(&mut self) -> Result<String, JsValue> {
        let artifact = self.editor.export(&CancelToken::new()).map_err(js_error)?;
        to_json(&artifact.report)
    }

    /// The current document as JSON
    #[wasm_bindgen(js_name = documentJson)]
    pub fn document_json(&self) -> Result<String, JsValue> {
        to_json(&self.editor.document().fields())
    }
}

fn parse_inputs(manuscript_json: &str, config_json: &str) -> Result<(Manuscript, BookConfig), JsValue> {
    let manuscript: Manuscript =
        serde_json::from_str(manuscript_json).map_err(|err| js_error(format!("malformed manuscript: {err}")))?;
    let config = if config_json.trim().is_empty() {
        BookConfig::default()
    } else {
        BookConfig::from_json(config_json).map_err(js_error)?
    };
    Ok((manuscript, config))
}
