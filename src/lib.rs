//! pdfveil - selective redaction of PDF content streams
//!
//! Rewrites page content streams operator by operator, withholding
//! text-showing instructions whose characters a decision policy marks for
//! removal while copying everything else through verbatim, including
//! recursive Form XObjects and transparency groups. A streaming,
//! regex-driven tokenizer recognizes sensitive tokens even when they span
//! arbitrary fragment boundaries, carrying opaque per-character metadata
//! from recognition back to the rewrite.
//!
//! The crate exposes three layers:
//! - [`tokenizer`]: incremental token recognition over a character stream.
//! - [`rewrite`]: the frame stack and driver replaying content streams.
//! - [`censor`] / [`pipeline`]: the pattern-based policy and batch runner
//!   tying the two together.

pub mod censor;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod rewrite;
pub mod tokenizer;

pub use censor::{CensorStats, PatternCensor};
pub use config::{CensorConfig, CensorRule};
pub use error::{Error, Result};
pub use pipeline::{BatchSummary, Pipeline, RedactionJob};
pub use rewrite::{
    BufferSink, CharEvent, DecisionSource, Frame, FrameStack, RegionSink, RewriteDriver,
    SharedDocument, TextDecoder,
};
pub use tokenizer::{StreamingTokenizer, TokenDefinition, TokenHandler, TokenMatch};
