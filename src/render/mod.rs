//! Render output: display pages and the diff protocol

mod diff;
mod display;

pub use diff::{RenderDiff, RenderPatch};
pub use display::{BookView, DisplayPage, PageKind, PlacedImage};
