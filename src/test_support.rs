//! Oracles for tests

use crate::error::LayoutError;
use crate::layout::MeasurementOracle;

/// Reads each paragraph's height from its text: `"name:120"` is 120 tall.
/// Text without a number after the last colon is zero tall.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedOracle;

fn fixed_height(paragraph: &str) -> f32 {
    paragraph
        .rsplit_once(':')
        .and_then(|(_, n)| n.trim().parse::<f32>().ok())
        .unwrap_or(0.0)
}

impl MeasurementOracle for FixedOracle {
    fn measure_block(&self, paragraphs: &[&str]) -> Result<f32, LayoutError> {
        Ok(paragraphs.iter().map(|p| fixed_height(p)).sum())
    }
}

/// Never has a surface to measure on
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingOracle;

impl MeasurementOracle for FailingOracle {
    fn measure_block(&self, _paragraphs: &[&str]) -> Result<f32, LayoutError> {
        Err(LayoutError::MeasurementUnavailable("no surface in tests".to_string()))
    }
}
