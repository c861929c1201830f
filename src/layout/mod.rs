//! Live layout: measurement, pagination and floating images

mod engine;
pub mod floating;
pub mod font;
mod line_break;
mod measure;
mod pagination;

pub use engine::{BookPage, LayoutConstraints, LayoutDiff, LayoutState};
pub(crate) use engine::heading_reserve;
pub use floating::{DragMode, FloatingLayer, Interaction, DEFAULT_INSET, MIN_IMAGE_SIZE};
pub use font::FontMetrics;
pub use line_break::{text_width, LineBox, LineBreaker};
pub use measure::{MeasurementOracle, ParagraphBox, TextMeasurer};
pub use pagination::{paginate, PageSlice, PaginationRules, SectionPages};
