//! Font metrics for layout

use crate::config::Typography;

/// Metrics needed for text layout
#[derive(Debug, Clone)]
pub struct FontMetrics {
    /// Line height in logical pixels
    pub line_height: f32,
    /// Width of ASCII characters (0-127)
    pub char_widths: Vec<f32>,
    /// Default width for non-ASCII characters
    pub default_width: f32,
}

impl Default for FontMetrics {
    fn default() -> Self {
        Self::from_typography(&Typography::default())
    }
}

impl FontMetrics {
    pub fn new(line_height: f32, char_widths: Vec<f32>, default_width: f32) -> Self {
        Self {
            line_height,
            char_widths,
            default_width,
        }
    }

    /// Approximate advance widths for a proportional serif face.
    ///
    /// Widths are em fractions grouped by glyph class; close enough for
    /// line breaking when no shaping engine is attached.
    pub fn from_typography(typography: &Typography) -> Self {
        let em = typography.font_size;
        let char_widths = (0u8..128)
            .map(|b| ascii_em_width(b as char) * em)
            .collect();

        Self {
            line_height: typography.line_px(),
            char_widths,
            default_width: 0.55 * em,
        }
    }

    /// Get width of a character
    pub fn width(&self, c: char) -> f32 {
        if c.is_ascii() {
            if let Some(w) = self.char_widths.get(c as usize) {
                return *w;
            }
        }
        self.default_width
    }
}

fn ascii_em_width(c: char) -> f32 {
    match c {
        c if c.is_control() => 0.0,
        ' ' => 0.25,
        'i' | 'j' | 'l' | '.' | ',' | ':' | ';' | '\'' | '|' | '!' => 0.28,
        'f' | 't' | 'r' | 'I' | '(' | ')' | '[' | ']' | '-' => 0.35,
        'm' | 'w' => 0.78,
        'M' | 'W' => 0.9,
        c if c.is_ascii_uppercase() => 0.68,
        c if c.is_ascii_digit() => 0.5,
        c if c.is_ascii_lowercase() => 0.5,
        _ => 0.45,
    }
}
