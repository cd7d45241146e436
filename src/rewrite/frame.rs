//! Double-buffered rewrite region

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// Destination a finished region flushes into. Implementations replace the
/// region's previous content wholesale; partial writes are not observable.
pub trait RegionSink {
    fn replace_content(&mut self, bytes: Vec<u8>) -> Result<()>;
}

/// One open rewrite region: the original bytes it was decoded from and the
/// accumulator collecting the rewritten stream. The accumulator only grows
/// until [`release`](Frame::release); the source is dropped only by the
/// frame's own release path.
pub struct Frame {
    source: Option<Vec<u8>>,
    accumulator: Vec<u8>,
    sink: Box<dyn RegionSink>,
}

impl Frame {
    pub fn new(source: Vec<u8>, sink: Box<dyn RegionSink>) -> Self {
        Self {
            source: Some(source),
            accumulator: Vec::new(),
            sink,
        }
    }

    /// Bytes the region was opened with, until release drops them.
    pub fn source(&self) -> Option<&[u8]> {
        self.source.as_deref()
    }

    /// Append rewritten bytes in call order.
    pub fn write(&mut self, bytes: &[u8]) {
        self.accumulator.extend_from_slice(bytes);
    }

    pub fn accumulated(&self) -> &[u8] {
        &self.accumulator
    }

    /// Close out the region: drop the input first, then hand the accumulated
    /// bytes verbatim to the sink, replacing whatever it held before.
    pub fn release(mut self) -> Result<()> {
        self.source.take();
        self.sink.replace_content(self.accumulator)
    }
}

/// In-memory sink, shared with the test or caller that inspects the result.
#[derive(Clone, Default)]
pub struct BufferSink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.buffer.lock().clone()
    }
}

impl RegionSink for BufferSink {
    fn replace_content(&mut self, bytes: Vec<u8>) -> Result<()> {
        *self.buffer.lock() = bytes;
        Ok(())
    }
}
