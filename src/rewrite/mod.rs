//! Operator-by-operator content stream rewriting
//!
//! A page (or any nested drawing region) is replayed one operation at a time
//! into a double-buffered [`Frame`]; text-showing operations are withheld and
//! everything else is copied through. Nested regions are buffered on a LIFO
//! [`FrameStack`] so each region flushes into its own backing object, inner
//! regions first.

pub mod driver;
pub mod frame;
pub mod ops;
pub mod stack;

pub use driver::{
    CharEvent, DecisionSource, Latin1Decoder, RewriteDriver, SharedDocument, TextDecoder,
};
pub use frame::{BufferSink, Frame, RegionSink};
pub use stack::FrameStack;
