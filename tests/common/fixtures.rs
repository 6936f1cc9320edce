use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use page_stream::{BlockKind, DocumentEvent, DocumentEventSource, ParseError, ParseOutcome};
use page_stream_render::{Alignment, FixedMetricsRenderer, RenderConfig};

static TEMP_NONCE: AtomicUsize = AtomicUsize::new(0);

/// Fresh per-test scratch directory path (not created).
pub fn temp_dir(label: &str) -> PathBuf {
    let nonce = TEMP_NONCE.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "page-stream-{}-{}-{}",
        label,
        std::process::id(),
        nonce
    ))
}

/// 10px glyphs, 10px spaces, 20px lines.
pub fn grid_renderer() -> FixedMetricsRenderer {
    FixedMetricsRenderer::new(10, 10, 20)
}

/// 200x100 viewport: four four-letter words per line, five lines per page.
pub fn grid_config() -> RenderConfig {
    RenderConfig::for_viewport(200, 100)
        .with_indent_level(0)
        .with_spacing_level(0)
        .with_paragraph_alignment(Alignment::Left)
}

/// Document of one-line paragraphs, four words each.
///
/// With [`grid_config`] every five paragraphs fill one page. `fail_at`
/// makes every pass fail, deterministically, before that paragraph starts.
pub struct ScriptedLines {
    pub paragraphs: usize,
    pub fail_at: Option<usize>,
    pub passes: usize,
}

impl ScriptedLines {
    pub fn pages(pages: usize) -> Self {
        Self {
            paragraphs: pages * 5,
            fail_at: None,
            passes: 0,
        }
    }

    pub fn failing_at(paragraphs: usize, fail_at: usize) -> Self {
        Self {
            paragraphs,
            fail_at: Some(fail_at),
            passes: 0,
        }
    }
}

impl DocumentEventSource for ScriptedLines {
    fn parse(
        &mut self,
        sink: &mut dyn FnMut(DocumentEvent<'_>) -> ControlFlow<()>,
    ) -> Result<ParseOutcome, ParseError> {
        self.passes += 1;
        if sink(DocumentEvent::BlockStart(BlockKind::Document)).is_break() {
            return Ok(ParseOutcome::Stopped);
        }
        for idx in 0..self.paragraphs {
            if self.fail_at == Some(idx) {
                return Err(
                    ParseError::new("SCRIPTED", "deterministic failure").with_offset(idx)
                );
            }
            for event in [
                DocumentEvent::BlockStart(BlockKind::Paragraph),
                DocumentEvent::text("word word word word"),
                DocumentEvent::BlockEnd(BlockKind::Paragraph),
            ] {
                if sink(event).is_break() {
                    return Ok(ParseOutcome::Stopped);
                }
            }
        }
        if sink(DocumentEvent::BlockEnd(BlockKind::Document)).is_break() {
            return Ok(ParseOutcome::Stopped);
        }
        Ok(ParseOutcome::Finished)
    }
}

/// Markdown book with headings, styled prose, quotes, lists and code.
pub fn novel_markdown(chapters: usize) -> String {
    let mut out = String::with_capacity(chapters * 1400);
    for chapter in 0..chapters {
        out.push_str(&format!("# Chapter {}\n\n", chapter + 1));
        for para in 0..6 {
            out.push_str(&format!(
                "Paragraph {} of chapter {} has *slanted* and **heavy** words and \
                 enough plain prose to wrap over a few lines &amp; cross pages.\n\n",
                para + 1,
                chapter + 1
            ));
        }
        out.push_str("> Quoted line.\n\n- alpha\n- beta\n\n```\nfn main() {}\n```\n\n---\n\n");
    }
    out
}
