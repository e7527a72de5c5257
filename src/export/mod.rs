//! The export engine
//!
//! Streams a regular file to a caller-supplied output descriptor without
//! blocking the owning task, trying the reflink and sendfile fast paths
//! before the generic read/compress/write loop.

mod engine;

pub use engine::{ExportSummary, RawExport, Step};
