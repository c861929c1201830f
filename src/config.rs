//! Engine configuration
//!
//! Every section is optional in JSON; missing fields fall back to the
//! defaults below. Typography is shared by the live paginator and the
//! export slicer, so both measure text the same way.

use crate::error::ConfigError;
use crate::layout::LayoutConstraints;
use serde::{Deserialize, Serialize};

/// Typography used for every measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Typography {
    pub font_family: String,
    /// Font size in logical pixels
    pub font_size: f32,
    /// Line height as a multiple of the font size
    pub line_height: f32,
    /// Vertical gap between paragraphs in logical pixels
    pub paragraph_spacing: f32,
}

impl Default for Typography {
    fn default() -> Self {
        Self {
            font_family: "Georgia".to_string(),
            font_size: 16.0,
            line_height: 1.5,
            paragraph_spacing: 12.0,
        }
    }
}

impl Typography {
    /// Line height in logical pixels
    pub fn line_px(&self) -> f32 {
        self.font_size * self.line_height
    }
}

/// Export page geometry and slicing tolerances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExportConfig {
    /// Export page width in logical pixels
    pub page_width: f32,
    /// Export page height in logical pixels
    pub page_height: f32,
    /// Padding around the content box on every side
    pub inner_padding: f32,
    /// Output document page width in points
    pub output_width_pt: f32,
    /// Output document page height in points
    pub output_height_pt: f32,
    /// Device pixels per logical pixel when rasterizing
    pub raster_scale: f32,
    /// Subtracted from each window's bottom bound to avoid partial rows
    pub safety_margin: f32,
    /// Overlap between consecutive windows, hidden under a mask strip
    pub seam_overlap: f32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            page_width: 794.0, // A4 at 96 DPI
            page_height: 1123.0,
            inner_padding: 48.0,
            output_width_pt: 595.28,
            output_height_pt: 841.89,
            raster_scale: 2.0,
            safety_margin: 2.0,
            seam_overlap: 2.0,
        }
    }
}

impl ExportConfig {
    pub fn inner_width(&self) -> f32 {
        self.page_width - 2.0 * self.inner_padding
    }

    pub fn inner_height(&self) -> f32 {
        self.page_height - 2.0 * self.inner_padding
    }
}

/// Snapshot cadence and retention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HistoryConfig {
    /// Ring buffer depth (K)
    pub depth: usize,
    /// Quiet period after a mutation burst before a snapshot is taken
    pub snapshot_interval_ms: u64,
    /// Persistence key for the serialized ring
    pub storage_key: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            depth: 5,
            snapshot_interval_ms: 2000,
            storage_key: "bookpress.history".to_string(),
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BookConfig {
    pub page: LayoutConstraints,
    pub typography: Typography,
    pub export: ExportConfig,
    pub history: HistoryConfig,
    pub reflow: ReflowConfig,
}

/// Live reflow tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReflowConfig {
    /// Quiet period that coalesces rapid edits into one reflow
    pub debounce_ms: u64,
    /// Page capacity in characters when no measurement is available
    pub fallback_chars_per_page: usize,
}

impl Default for ReflowConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            fallback_chars_per_page: 1800,
        }
    }
}

impl BookConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: BookConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject geometry that cannot hold any content
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page.content_width() <= 0.0 || self.page.content_height() <= 0.0 {
            return Err(ConfigError::Invalid(
                "live page margins leave no content box".to_string(),
            ));
        }
        if self.export.inner_width() <= 0.0 || self.export.inner_height() <= 0.0 {
            return Err(ConfigError::Invalid(
                "export padding leaves no content box".to_string(),
            ));
        }
        if self.export.output_width_pt <= 0.0 || self.export.output_height_pt <= 0.0 {
            return Err(ConfigError::Invalid("output page size must be positive".to_string()));
        }
        if self.export.raster_scale <= 0.0 {
            return Err(ConfigError::Invalid("raster scale must be positive".to_string()));
        }
        if self.export.seam_overlap < 0.0 || self.export.safety_margin < 0.0 {
            return Err(ConfigError::Invalid(
                "slicing tolerances cannot be negative".to_string(),
            ));
        }
        // Otherwise every window is too short for whole lines and each cut is forced
        if self.export.safety_margin + self.export.seam_overlap >= self.export.inner_height() {
            return Err(ConfigError::Invalid(
                "safety margin and seam overlap must leave room on an export page".to_string(),
            ));
        }
        if self.typography.font_size <= 0.0 || self.typography.line_height <= 0.0 {
            return Err(ConfigError::Invalid("typography must be positive".to_string()));
        }
        if self.history.depth == 0 {
            return Err(ConfigError::Invalid("history depth must be at least 1".to_string()));
        }
        if self.reflow.fallback_chars_per_page == 0 {
            return Err(ConfigError::Invalid(
                "fallback characters per page must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
