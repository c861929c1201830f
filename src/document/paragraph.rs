//! Paragraph splitting for section text

use std::ops::Range;

/// One paragraph of a section.
///
/// `range` covers the body and its trailing separator, so the spans of a
/// section tile its text exactly. `body` excludes surrounding whitespace
/// and is what gets measured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParagraphSpan {
    pub range: Range<usize>,
    pub body: Range<usize>,
}

impl ParagraphSpan {
    pub fn body_text<'a>(&self, text: &'a str) -> &'a str {
        &text[self.body.clone()]
    }
}

/// Split text into blank-line-delimited paragraphs.
///
/// A separator is a whitespace run holding at least two line breaks.
/// Leading whitespace belongs to the first span. Whitespace-only text is a
/// single paragraph with an empty body; empty text has no paragraphs.
pub fn split_paragraphs(text: &str) -> Vec<ParagraphSpan> {
    let mut spans = Vec::new();
    if text.is_empty() {
        return spans;
    }

    let mut span_start = 0;
    let mut body_start: Option<usize> = None;
    let mut run_start: Option<usize> = None;
    let mut run_newlines = 0usize;

    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if run_start.is_none() {
                run_start = Some(idx);
                run_newlines = 0;
            }
            if ch == '\n' {
                run_newlines += 1;
            }
            continue;
        }

        match (body_start, run_start) {
            (Some(start), Some(run)) if run_newlines >= 2 => {
                spans.push(ParagraphSpan {
                    range: span_start..idx,
                    body: start..run,
                });
                span_start = idx;
                body_start = Some(idx);
            }
            (None, _) => body_start = Some(idx),
            _ => {}
        }
        run_start = None;
    }

    let len = text.len();
    match body_start {
        Some(start) => spans.push(ParagraphSpan {
            range: span_start..len,
            body: start..run_start.unwrap_or(len),
        }),
        None => spans.push(ParagraphSpan {
            range: 0..len,
            body: 0..0,
        }),
    }

    spans
}

/// Index of the paragraph whose span contains `offset`.
///
/// Offsets at the very end of the text map to the last paragraph.
pub fn paragraph_at(spans: &[ParagraphSpan], offset: usize) -> Option<usize> {
    if spans.is_empty() {
        return None;
    }
    let idx = spans.partition_point(|span| span.range.end <= offset);
    Some(idx.min(spans.len() - 1))
}

/// Byte range covered by a run of consecutive paragraphs
pub fn spans_range(spans: &[ParagraphSpan], paragraphs: Range<usize>) -> Range<usize> {
    if paragraphs.is_empty() {
        let at = spans
            .get(paragraphs.start)
            .map(|s| s.range.start)
            .or_else(|| spans.last().map(|s| s.range.end))
            .unwrap_or(0);
        return at..at;
    }
    spans[paragraphs.start].range.start..spans[paragraphs.end - 1].range.end
}
