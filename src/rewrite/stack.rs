//! LIFO stack of open rewrite regions

use tracing::warn;

use crate::error::{Error, Result};
use crate::rewrite::frame::{Frame, RegionSink};

/// Session-scoped stack of [`Frame`]s, one per nesting level. `None` outside
/// a session; inside, the vector holds open frames bottom (page) to top
/// (innermost nested region).
#[derive(Default)]
pub struct FrameStack {
    frames: Option<Vec<Frame>>,
}

impl FrameStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.frames.is_some()
    }

    pub fn depth(&self) -> usize {
        self.frames.as_ref().map_or(0, Vec::len)
    }

    pub fn begin_session(&mut self) -> Result<()> {
        if self.frames.is_some() {
            return Err(Error::SessionAlreadyOpen);
        }
        self.frames = Some(Vec::new());
        Ok(())
    }

    /// Open a nested region and make it the current write target.
    pub fn enter_region(&mut self, source: Vec<u8>, sink: Box<dyn RegionSink>) -> Result<()> {
        let frames = self.frames.as_mut().ok_or(Error::SessionNotOpen)?;
        frames.push(Frame::new(source, sink));
        Ok(())
    }

    /// Close the innermost region, flushing its accumulator into its sink.
    pub fn leave_region(&mut self) -> Result<()> {
        let frames = self.frames.as_mut().ok_or(Error::SessionNotOpen)?;
        let frame = frames.pop().ok_or(Error::SessionNotOpen)?;
        frame.release()
    }

    /// The innermost open frame, which all writes go to.
    pub fn current_writer(&mut self) -> Result<&mut Frame> {
        self.frames
            .as_mut()
            .and_then(|frames| frames.last_mut())
            .ok_or(Error::SessionNotOpen)
    }

    /// End the session. Frames still open at this point were abandoned by an
    /// unbalanced caller; they are discarded unflushed with a single warning.
    /// Returns the number discarded.
    pub fn end_session(&mut self) -> usize {
        let abandoned = self.frames.take().map_or(0, |frames| frames.len());
        if abandoned > 0 {
            warn!(abandoned, "rewrite session ended with unreleased regions");
        }
        abandoned
    }
}
