//! Streaming log writer: vendor stream lines in, append-only log text out.

mod cursor;
pub mod event;
pub mod writer;

pub use event::{Normalizer, StreamEvent};
pub use writer::{LogSink, StreamLogWriter};
