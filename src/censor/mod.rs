//! Pattern-driven censoring policy
//!
//! Two passes over each page. The scan pass walks the page's operations in
//! the same order the rewrite driver replays them, decodes every drawn
//! character with an approximate glyph box, and streams the characters
//! through the tokenizer; each emitted token marks its characters for
//! removal. The rewrite pass then replays the page through the driver with
//! those per-character decisions, and paints an opaque box over every
//! censored run before the page frame flushes.

pub mod layout;

use std::collections::HashSet;
use std::sync::Arc;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::rewrite::driver::{
    self, CharEvent, DecisionSource, Latin1Decoder, TextDecoder, MAX_REGION_DEPTH,
};
use crate::rewrite::frame::Frame;
use crate::rewrite::ops::{self, TextElement};
use crate::tokenizer::{StreamingTokenizer, TokenDefinition};

use layout::{ApproxMetrics, GlyphMetrics, Matrix, Rect, TextTracker};

/// Per-character metadata carried through the tokenizer: where the character
/// sits in the document's replay order and where its glyph lands on the page.
#[derive(Debug, Clone, Copy)]
struct ScanPayload {
    page: usize,
    offset: usize,
    rect: Rect,
}

struct TokenHit {
    rule: String,
    payloads: Vec<ScanPayload>,
}

/// Counters reported after a document is censored.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CensorStats {
    pub pages: usize,
    pub tokens_matched: usize,
    pub chars_censored: usize,
    pub boxes_drawn: usize,
}

/// Censoring policy built from a set of token definitions. The definitions
/// are the censor expressions: every token the scan pass recognizes is
/// removed by the rewrite pass.
pub struct PatternCensor {
    definitions: Vec<TokenDefinition>,
    draw_boxes: bool,
    decoder: Box<dyn TextDecoder>,
    metrics: Box<dyn GlyphMetrics>,
    censored: HashSet<(usize, usize)>,
    boxes: Vec<Vec<Rect>>,
    stats: CensorStats,
}

impl PatternCensor {
    pub fn new(definitions: Vec<TokenDefinition>, draw_boxes: bool) -> Result<Self> {
        if definitions.is_empty() {
            return Err(Error::Config(
                "no censor rules configured".into(),
            ));
        }
        Ok(Self {
            definitions,
            draw_boxes,
            decoder: Box::new(Latin1Decoder),
            metrics: Box::new(ApproxMetrics),
            censored: HashSet::new(),
            boxes: Vec::new(),
            stats: CensorStats::default(),
        })
    }

    /// Scan pass: record which characters belong to a matched token and
    /// where their glyphs sit. Must run before the document is handed to the
    /// rewrite driver with this censor as its decision source.
    pub fn scan(&mut self, doc: &Document) -> Result<()> {
        let hits: Arc<Mutex<Vec<TokenHit>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = hits.clone();
        let tokenizer = StreamingTokenizer::new(self.definitions.clone())?;
        tokenizer.set_handler(Some(Box::new(move |token| {
            sink.lock().push(TokenHit {
                rule: token.definition.id().to_string(),
                payloads: token.payloads,
            });
        })))?;

        let pages: Vec<_> = doc.get_pages().values().copied().collect();
        self.boxes = vec![Vec::new(); pages.len()];
        self.stats.pages = pages.len();
        // forms shared between pages are visited once, like the rewrite pass
        let mut visited: HashSet<ObjectId> = HashSet::new();
        for (page, page_id) in pages.into_iter().enumerate() {
            let source = doc.get_page_content(page_id)?;
            let resources = driver::page_resources(doc, page_id)?;
            let content = Content::decode(&source)?;
            let mut tracker = TextTracker::new();
            let mut offset = 0usize;
            self.gather(
                doc,
                &content.operations,
                &resources,
                &mut tracker,
                &tokenizer,
                &mut visited,
                page,
                &mut offset,
                0,
            )?;
            // tokens never span pages
            tokenizer.flush()?;
        }

        for hit in hits.lock().drain(..) {
            let mut run: Option<Rect> = None;
            for payload in &hit.payloads {
                self.censored.insert((payload.page, payload.offset));
                run = Some(match run {
                    Some(rect) => rect.union(&payload.rect),
                    None => payload.rect,
                });
            }
            if let (Some(rect), Some(first)) = (run, hit.payloads.first()) {
                self.boxes[first.page].push(rect);
            }
            debug!(rule = %hit.rule, chars = hit.payloads.len(), "token censored");
            self.stats.tokens_matched += 1;
        }
        self.stats.chars_censored = self.censored.len();
        Ok(())
    }

    /// Walk one region's operations, feeding drawn characters to the
    /// tokenizer in replay order and recursing into Form XObjects.
    #[allow(clippy::too_many_arguments)]
    fn gather(
        &self,
        doc: &Document,
        operations: &[Operation],
        resources: &Dictionary,
        tracker: &mut TextTracker,
        tokenizer: &StreamingTokenizer<ScanPayload>,
        visited: &mut HashSet<ObjectId>,
        page: usize,
        offset: &mut usize,
        depth: usize,
    ) -> Result<()> {
        for op in operations {
            tracker.apply_op(op);
            if ops::is_text_showing(&op.operator) {
                let mut text = String::new();
                let mut payloads = Vec::new();
                for element in ops::text_elements(op) {
                    match element {
                        TextElement::Glyphs(bytes) => {
                            for ch in self.decoder.decode(bytes).chars() {
                                let rect = tracker.glyph(ch, self.metrics.as_ref());
                                payloads.push(ScanPayload {
                                    page,
                                    offset: *offset,
                                    rect,
                                });
                                *offset += 1;
                                text.push(ch);
                            }
                        }
                        TextElement::Adjust(amount) => tracker.adjust(amount),
                    }
                }
                if !text.is_empty() {
                    tokenizer.input(text, payloads)?;
                }
            } else if op.operator == "Do" {
                let name = match op.operands.first().and_then(|o| o.as_name().ok()) {
                    Some(name) => name,
                    None => continue,
                };
                let region = match driver::resolve_form(doc, name, resources)? {
                    Some(region) => region,
                    None => continue,
                };
                if !visited.insert(region.id) {
                    continue;
                }
                if depth + 1 >= MAX_REGION_DEPTH {
                    return Err(Error::InvalidArgument(format!(
                        "form XObject nesting deeper than {} levels",
                        MAX_REGION_DEPTH
                    )));
                }
                let content = Content::decode(&region.bytes)?;
                tracker.push_ctm();
                if let Some([a, b, c, d, e, f]) = region.matrix {
                    tracker.concat(&Matrix { a, b, c, d, e, f });
                }
                let walked = self.gather(
                    doc,
                    &content.operations,
                    &region.resources,
                    tracker,
                    tokenizer,
                    visited,
                    page,
                    offset,
                    depth + 1,
                );
                tracker.pop_ctm();
                walked?;
            }
        }
        Ok(())
    }

    pub fn into_stats(self) -> CensorStats {
        self.stats
    }
}

impl DecisionSource for PatternCensor {
    fn should_censor(&mut self, event: &CharEvent) -> bool {
        self.censored.contains(&(event.page_index, event.offset))
    }

    /// Paint an opaque black box over every censored run on the page.
    fn finish_page(&mut self, page_index: usize, frame: &mut Frame) -> Result<()> {
        if !self.draw_boxes {
            return Ok(());
        }
        let boxes = match self.boxes.get(page_index) {
            Some(boxes) if !boxes.is_empty() => boxes,
            _ => return Ok(()),
        };
        let mut operations = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "rg",
                vec![Object::Real(0.0), Object::Real(0.0), Object::Real(0.0)],
            ),
        ];
        for rect in boxes {
            operations.push(Operation::new(
                "re",
                vec![
                    Object::Real(rect.x0),
                    Object::Real(rect.y0),
                    Object::Real(rect.width()),
                    Object::Real(rect.height()),
                ],
            ));
        }
        operations.push(Operation::new("f", vec![]));
        operations.push(Operation::new("Q", vec![]));
        self.stats.boxes_drawn += boxes.len();
        frame.write(&ops::encode_operations(operations)?);
        Ok(())
    }
}
