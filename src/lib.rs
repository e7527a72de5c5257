//! # RawExport - Non-Blocking Raw Image Export
//!
//! RawExport streams a regular file (typically a raw disk or container
//! image) to a caller-supplied output descriptor without ever stalling the
//! calling task, even when the consumer drains the descriptor slowly.
//!
//! ## Features
//!
//! - **Copy-on-Write Fast Path**: whole-file reflink when source and output
//!   share a CoW filesystem - the export completes in one syscall
//! - **Zero-Copy Fast Path**: kernel `sendfile` in 16 KiB chunks, no
//!   userspace buffering
//! - **Streaming Compression**: gzip, zstd, or LZ4 on the fly
//! - **Snapshot Isolation**: best-effort reflink snapshot so concurrent
//!   writers do not tear the exported image
//! - **Cooperative I/O**: driven by tokio writability notifications; "would
//!   block" suspends the export instead of spinning or failing
//! - **Rate-Limited Progress**: percent-complete over a watch channel plus a
//!   log line, at most once per 100 ms
//!
//! ## Quick Start
//!
//! ```no_run
//! use rawexport::compress::Compression;
//! use rawexport::export::RawExport;
//! use std::fs::File;
//! use std::os::unix::io::AsFd;
//!
//! # async fn example() -> rawexport::error::Result<()> {
//! let output = File::create("/backup/image.raw")?;
//! let mut export = RawExport::start("/images/vm.raw", output.as_fd(), Compression::Uncompressed)?;
//!
//! let mut progress = export.progress_updates();
//! let summary = export.run().await?;
//! println!("exported {} bytes, now at {}%", summary.bytes_read, *progress.borrow());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compress;
pub mod config;
pub mod error;
pub mod export;
pub mod fs;
pub mod progress;

// Re-export commonly used types
pub use compress::Compression;
pub use error::{ExportError, Result};
pub use export::{ExportSummary, RawExport};
pub use progress::ProgressReporter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use rawexport::prelude::*;
    //! ```

    pub use crate::compress::{Compression, Compressor};
    pub use crate::error::{ExportError, IoResultExt, Result};
    pub use crate::export::{ExportSummary, RawExport, Step};
    pub use crate::progress::ProgressReporter;
}
