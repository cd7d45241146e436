//! Rewrite driver: selective replay of page content streams

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::error::{Error, Result};
use crate::rewrite::frame::{Frame, RegionSink};
use crate::rewrite::ops;
use crate::rewrite::stack::FrameStack;

/// Nested form regions deeper than this abort the document; circular
/// XObject references would otherwise recurse forever.
pub(crate) const MAX_REGION_DEPTH: usize = 64;

/// The driver and the region sinks both touch the document, the sinks at
/// frame release. Single-threaded shared ownership keeps those borrows
/// scoped to each mutation.
pub type SharedDocument = Rc<RefCell<Document>>;

/// One decoded character as it is replayed, with its position in the page's
/// character stream. Offsets count text-showing characters only, in
/// traversal order, restarting at zero on every page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharEvent {
    pub page_index: usize,
    pub offset: usize,
    pub ch: char,
}

/// Per-character censoring policy consulted during replay. Decisions are
/// consumed immediately and never persisted by the driver.
pub trait DecisionSource {
    /// True drops the text-showing operation the character belongs to.
    fn should_censor(&mut self, event: &CharEvent) -> bool;

    /// Called once per page after replay, before the page frame flushes.
    /// Implementations may append trailing instructions to the frame.
    fn finish_page(&mut self, _page_index: usize, _frame: &mut Frame) -> Result<()> {
        Ok(())
    }
}

/// Maps encoded string bytes to characters. Full font/CMap resolution is
/// external; the default treats each byte as a Latin-1 code point.
pub trait TextDecoder {
    fn decode(&self, bytes: &[u8]) -> String;
}

#[derive(Default)]
pub struct Latin1Decoder;

impl TextDecoder for Latin1Decoder {
    fn decode(&self, bytes: &[u8]) -> String {
        bytes.iter().map(|&b| b as char).collect()
    }
}

/// Replays every page of a document operator by operator, copying non-text
/// operations through and withholding text-showing ones, recursing into Form
/// XObjects and transparency groups so each nested region is rewritten in
/// place.
pub struct RewriteDriver<'a> {
    doc: SharedDocument,
    decisions: &'a mut dyn DecisionSource,
    decoder: Box<dyn TextDecoder>,
    stack: FrameStack,
    visited_forms: HashSet<ObjectId>,
    page_index: usize,
    char_offset: usize,
}

impl<'a> RewriteDriver<'a> {
    pub fn new(doc: SharedDocument, decisions: &'a mut dyn DecisionSource) -> Self {
        Self {
            doc,
            decisions,
            decoder: Box::new(Latin1Decoder),
            stack: FrameStack::new(),
            visited_forms: HashSet::new(),
            page_index: 0,
            char_offset: 0,
        }
    }

    pub fn with_decoder(mut self, decoder: Box<dyn TextDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Rewrite the whole document. Any failure aborts this document with the
    /// session cleaned up; already-flushed regions keep their rewritten
    /// content, so callers persist the document only on success.
    pub fn process(&mut self) -> Result<()> {
        self.stack.begin_session()?;
        let result = self.process_pages();
        self.stack.end_session();
        result
    }

    fn process_pages(&mut self) -> Result<()> {
        let pages: Vec<ObjectId> = self.doc.borrow().get_pages().values().copied().collect();
        for (index, page_id) in pages.into_iter().enumerate() {
            self.page_index = index;
            self.char_offset = 0;
            let (source, resources) = {
                let doc = self.doc.borrow();
                let source = doc.get_page_content(page_id)?;
                let resources = page_resources(&doc, page_id)?;
                (source, resources)
            };
            debug!(page = index + 1, bytes = source.len(), "rewriting page");
            let sink = PageSink {
                doc: self.doc.clone(),
                page_id,
            };
            self.process_region(source, Box::new(sink), &resources, true, 0)?;
        }
        Ok(())
    }

    /// Open a frame over one region, replay it, and flush the frame on every
    /// exit path.
    fn process_region(
        &mut self,
        source: Vec<u8>,
        sink: Box<dyn RegionSink>,
        resources: &Dictionary,
        is_page: bool,
        depth: usize,
    ) -> Result<()> {
        let content = Content::decode(&source)?;
        self.stack.enter_region(source, sink)?;
        let mut result = self.replay(&content.operations, resources, depth);
        if result.is_ok() && is_page {
            let page_index = self.page_index;
            let decisions = &mut *self.decisions;
            result = match self.stack.current_writer() {
                Ok(frame) => decisions.finish_page(page_index, frame),
                Err(e) => Err(e),
            };
        }
        let closed = self.stack.leave_region();
        result.and(closed)
    }

    fn replay(
        &mut self,
        operations: &[Operation],
        resources: &Dictionary,
        depth: usize,
    ) -> Result<()> {
        let mut suppress_next = false;
        for op in operations {
            if ops::is_text_showing(&op.operator) {
                suppress_next = self.consume_text(op);
                continue;
            }
            if suppress_next {
                // positioning/state operation paired with a dropped draw;
                // a suppressed Do skips its recursive replay as well
                suppress_next = false;
                continue;
            }
            let encoded = ops::encode_operation(op)?;
            self.stack.current_writer()?.write(&encoded);
            if op.operator == "Do" {
                self.replay_form(op, resources, depth)?;
            }
        }
        Ok(())
    }

    /// Forward every decoded character of a text-showing operation to the
    /// decision source. The operation itself is never written; the last
    /// decision returned determines whether the operation that immediately
    /// follows is suppressed too.
    fn consume_text(&mut self, op: &Operation) -> bool {
        let mut censored = false;
        for element in ops::text_elements(op) {
            if let ops::TextElement::Glyphs(bytes) = element {
                let text = self.decoder.decode(bytes);
                for ch in text.chars() {
                    let event = CharEvent {
                        page_index: self.page_index,
                        offset: self.char_offset,
                        ch,
                    };
                    self.char_offset += 1;
                    censored = self.decisions.should_censor(&event);
                }
            }
        }
        censored
    }

    fn replay_form(
        &mut self,
        op: &Operation,
        resources: &Dictionary,
        depth: usize,
    ) -> Result<()> {
        let name = match op.operands.first().and_then(|o| o.as_name().ok()) {
            Some(name) => name.to_vec(),
            None => return Ok(()),
        };
        let region = {
            let doc = self.doc.borrow();
            resolve_form(&doc, &name, resources)?
        };
        let region = match region {
            Some(region) => region,
            None => return Ok(()),
        };
        // a form shared by several regions or pages is rewritten once; the
        // scan pass skips revisits the same way, so character offsets agree
        if !self.visited_forms.insert(region.id) {
            return Ok(());
        }
        if depth + 1 >= MAX_REGION_DEPTH {
            return Err(Error::InvalidArgument(format!(
                "form XObject nesting deeper than {} levels",
                MAX_REGION_DEPTH
            )));
        }
        let sink = FormSink {
            doc: self.doc.clone(),
            id: region.id,
        };
        let resources = region.resources;
        self.process_region(region.bytes, Box::new(sink), &resources, false, depth + 1)
    }
}

/// A resolved Form XObject: its stream object, decoded bytes, effective
/// resources and optional placement matrix.
pub(crate) struct FormRegion {
    pub id: ObjectId,
    pub bytes: Vec<u8>,
    pub resources: Dictionary,
    pub matrix: Option<[f64; 6]>,
}

/// Resolve a `Do` operand to a Form XObject stream. Image XObjects and
/// unresolvable names pass through untouched.
pub(crate) fn resolve_form(
    doc: &Document,
    name: &[u8],
    resources: &Dictionary,
) -> Result<Option<FormRegion>> {
    let xobjects = match resources.get(b"XObject") {
        Ok(object) => resolve_dict(doc, object)?,
        Err(_) => return Ok(None),
    };
    let id = match xobjects.get(name).and_then(Object::as_reference) {
        Ok(id) => id,
        Err(_) => return Ok(None),
    };
    let stream = match doc.get_object(id).and_then(Object::as_stream) {
        Ok(stream) => stream,
        Err(_) => return Ok(None),
    };
    let is_form = stream
        .dict
        .get(b"Subtype")
        .and_then(Object::as_name)
        .map_or(false, |subtype| subtype == b"Form");
    if !is_form {
        return Ok(None);
    }
    let bytes = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());
    // forms without their own resources inherit the invoking region's
    let nested = match stream.dict.get(b"Resources") {
        Ok(object) => resolve_dict(doc, object)?.clone(),
        Err(_) => resources.clone(),
    };
    let matrix = stream.dict.get(b"Matrix").ok().and_then(|object| {
        let items = object.as_array().ok()?;
        let nums: Vec<f64> = items.iter().filter_map(ops::number).collect();
        <[f64; 6]>::try_from(nums).ok()
    });
    Ok(Some(FormRegion {
        id,
        bytes,
        resources: nested,
        matrix,
    }))
}

/// Flushes a page frame back into the page's `/Contents`. A single existing
/// content stream is rewritten in place; anything else (arrays, missing
/// entry) is replaced with one fresh stream object.
pub struct PageSink {
    pub doc: SharedDocument,
    pub page_id: ObjectId,
}

impl RegionSink for PageSink {
    fn replace_content(&mut self, bytes: Vec<u8>) -> Result<()> {
        let mut doc = self.doc.borrow_mut();
        let contents = doc
            .get_object(self.page_id)
            .and_then(Object::as_dict)
            .ok()
            .and_then(|dict| dict.get(b"Contents").ok())
            .cloned();
        if let Some(Object::Reference(id)) = contents {
            if let Ok(object) = doc.get_object_mut(id) {
                if let Ok(stream) = object.as_stream_mut() {
                    rewrite_stream(stream, bytes);
                    return Ok(());
                }
            }
        }
        let stream = Stream::new(dictionary! {}, bytes);
        let new_id = doc.add_object(stream);
        doc.get_object_mut(self.page_id)?
            .as_dict_mut()?
            .set("Contents", Object::Reference(new_id));
        Ok(())
    }
}

/// Flushes a nested region frame back into its Form XObject stream.
pub struct FormSink {
    pub doc: SharedDocument,
    pub id: ObjectId,
}

impl RegionSink for FormSink {
    fn replace_content(&mut self, bytes: Vec<u8>) -> Result<()> {
        let mut doc = self.doc.borrow_mut();
        let stream = doc.get_object_mut(self.id)?.as_stream_mut()?;
        rewrite_stream(stream, bytes);
        Ok(())
    }
}

fn rewrite_stream(stream: &mut Stream, bytes: Vec<u8>) {
    stream.dict.remove(b"Filter");
    stream.dict.remove(b"DecodeParms");
    stream
        .dict
        .set("Length", Object::Integer(bytes.len() as i64));
    stream.content = bytes;
}

fn resolve_dict<'d>(doc: &'d Document, object: &'d Object) -> Result<&'d Dictionary> {
    match object {
        Object::Reference(id) => Ok(doc.get_object(*id)?.as_dict()?),
        other => Ok(other.as_dict()?),
    }
}

/// The page's resource dictionary, inherited through the `/Parent` chain
/// when the page node itself has none.
pub(crate) fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    let mut current = page_id;
    for _ in 0..MAX_REGION_DEPTH {
        let dict = doc.get_object(current)?.as_dict()?;
        if let Ok(object) = dict.get(b"Resources") {
            return Ok(resolve_dict(doc, object)?.clone());
        }
        match dict.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => current = parent,
            Err(_) => break,
        }
    }
    Ok(Dictionary::new())
}
