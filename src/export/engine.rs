//! Raw image export state machine
//!
//! The engine owns the (possibly snapshotted) input file, a pending buffer
//! of compressed-but-unwritten bytes, and per-strategy latches for the two
//! fast paths. Each step performs one bounded unit of work and yields back
//! to the reactor; "would block" is a suspension point, never an error.

use crate::compress::{Compression, Compressor};
use crate::error::{ExportError, IoResultExt, Result};
use crate::fs::{
    copy_times, copy_xattrs, reflink, reflink_snapshot, sendfile_chunk, set_nonblocking,
    write_nonblocking, TRANSFER_CHUNK,
};
use crate::progress::ProgressReporter;
use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::os::unix::io::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Per-strategy fast-path state
///
/// A strategy that failed is never retried for the lifetime of the export,
/// even when a different strategy fails later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FastPath {
    NotTried,
    Failed,
    Succeeded,
}

/// Outcome of one transfer step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Progress was made; call again
    Continue,
    /// The output descriptor is full; wait for writability
    WouldBlock,
    /// The transfer is complete
    Finished,
}

/// Result of a completed export
#[derive(Debug, Clone, Copy)]
pub struct ExportSummary {
    /// Uncompressed bytes consumed from the source
    pub bytes_read: u64,
    /// Bytes written to the output descriptor
    pub bytes_written: u64,
    /// Compression kind the export ran with
    pub compression: Compression,
}

/// Export engine for one raw image
///
/// Constructed by [`RawExport::start`], which performs all startup
/// validation; a constructed engine is already bound to exactly one export.
/// The output descriptor is borrowed from the caller and never closed here;
/// dropping the engine abandons the export and releases everything it owns.
pub struct RawExport<'fd> {
    source_path: PathBuf,
    input: File,
    output: BorrowedFd<'fd>,
    compressor: Compressor,
    pending: VecDeque<u8>,
    written_compressed: u64,
    written_uncompressed: u64,
    progress: ProgressReporter,
    source_size: u64,
    eof: bool,
    reflink_state: FastPath,
    sendfile_state: FastPath,
}

impl<'fd> RawExport<'fd> {
    /// Validate the source and bind an engine to one export
    ///
    /// Puts `output` into non-blocking mode, opens `path` read-only,
    /// requires a regular file, and takes a best-effort copy-on-write
    /// snapshot so concurrent writers do not tear the exported image.
    /// All failures here are startup errors; no engine is constructed.
    pub fn start(
        path: impl AsRef<Path>,
        output: BorrowedFd<'fd>,
        compression: Compression,
    ) -> Result<Self> {
        let path = path.as_ref();

        set_nonblocking(output).map_err(|e| ExportError::syscall("fcntl", e))?;

        let source = File::open(path).map_err(|e| ExportError::open(path, e))?;
        let meta = source.metadata().with_path(path)?;
        if !meta.is_file() {
            return Err(ExportError::UnsupportedFileType {
                path: path.to_path_buf(),
                file_type: file_type_name(&meta.file_type()),
            });
        }

        let input = match reflink_snapshot(&source, path) {
            Ok(snapshot) => {
                debug!("exporting from copy-on-write snapshot of '{}'", path.display());
                snapshot
            }
            Err(e) => {
                debug!("no snapshot, exporting live file '{}': {e}", path.display());
                source
            }
        };

        Ok(Self {
            source_path: path.to_path_buf(),
            input,
            output,
            compressor: Compressor::new(compression)?,
            pending: VecDeque::new(),
            written_compressed: 0,
            written_uncompressed: 0,
            progress: ProgressReporter::new(meta.len()),
            source_size: meta.len(),
            eof: false,
            reflink_state: FastPath::NotTried,
            sendfile_state: FastPath::NotTried,
        })
    }

    /// Drive the export to completion
    ///
    /// Registers for writability on the output descriptor; descriptors the
    /// reactor cannot poll (regular files are always ready) fall back to
    /// cooperative deferred stepping. On success the source's timestamps
    /// and extended attributes are copied to the output, best effort.
    pub async fn run(&mut self) -> Result<ExportSummary> {
        match self.drive().await {
            Ok(()) => {
                self.progress.report_final(self.written_uncompressed);
                if let Err(e) = copy_times(&self.input, self.output) {
                    debug!("could not copy timestamps: {e}");
                }
                if let Err(e) = copy_xattrs(&self.input, self.output) {
                    debug!("could not copy extended attributes: {e}");
                }
                Ok(self.summary())
            }
            Err(e) => {
                warn!("export of '{}' failed: {e}", self.source_path.display());
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> Result<()> {
        match AsyncFd::with_interest(self.output, Interest::WRITABLE) {
            Ok(afd) => loop {
                let mut guard = afd
                    .writable()
                    .await
                    .map_err(|e| ExportError::syscall("poll", e))?;
                match self.step()? {
                    Step::Continue => {}
                    Step::WouldBlock => guard.clear_ready(),
                    Step::Finished => return Ok(()),
                }
            },
            Err(e) if e.raw_os_error() == Some(libc::EPERM) => {
                debug!("output descriptor is not pollable, stepping deferred");
                loop {
                    match self.step()? {
                        Step::Continue | Step::WouldBlock => tokio::task::yield_now().await,
                        Step::Finished => return Ok(()),
                    }
                }
            }
            Err(e) => Err(ExportError::syscall("epoll_ctl", e)),
        }
    }

    /// One bounded transfer step
    ///
    /// Strategy ladder: whole-file reflink (first step only), then chunked
    /// sendfile, then the buffered read/compress/write loop. The fast paths
    /// apply only to uncompressed exports and their latches are one-shot;
    /// once a strategy has failed it is never tried again.
    pub fn step(&mut self) -> Result<Step> {
        if self.reflink_state == FastPath::NotTried && self.compressor.is_passthrough() {
            match reflink(self.input.as_fd(), self.output) {
                Ok(()) => {
                    self.reflink_state = FastPath::Succeeded;
                    // The clone moved the whole file in one shot.
                    self.written_uncompressed = self.source_size;
                    self.written_compressed = self.source_size;
                    debug!("whole-file reflink succeeded");
                    return Ok(Step::Finished);
                }
                Err(e) => {
                    debug!("reflink fast path unavailable: {e}");
                    self.reflink_state = FastPath::Failed;
                }
            }
        }

        if self.sendfile_state != FastPath::Failed && self.compressor.is_passthrough() {
            match sendfile_chunk(self.output, self.input.as_fd(), TRANSFER_CHUNK) {
                Ok(0) => {
                    self.sendfile_state = FastPath::Succeeded;
                    self.eof = true;
                    return Ok(Step::Finished);
                }
                Ok(n) => {
                    self.written_uncompressed += n as u64;
                    self.written_compressed += n as u64;
                    self.progress.report(self.written_uncompressed);
                    return Ok(Step::Continue);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Step::WouldBlock),
                Err(e) => {
                    debug!("sendfile fast path unavailable: {e}");
                    self.sendfile_state = FastPath::Failed;
                }
            }
        }

        // Generic buffered path: fill the pending buffer, then drain as much
        // as the output accepts in one non-blocking write.
        while self.pending.is_empty() {
            if self.eof {
                return Ok(Step::Finished);
            }

            let mut scratch = [0u8; TRANSFER_CHUNK];
            let n = (&self.input)
                .read(&mut scratch)
                .map_err(|e| ExportError::syscall("read", e))?;

            let mut produced = Vec::new();
            if n == 0 {
                self.eof = true;
                self.compressor.finish(&mut produced)?;
            } else {
                self.written_uncompressed += n as u64;
                self.compressor.feed(&scratch[..n], &mut produced)?;
            }
            self.pending.extend(produced);
        }

        let n = match write_nonblocking(self.output, self.pending.as_slices().0) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Step::WouldBlock),
            Err(e) => return Err(ExportError::syscall("write", e)),
        };

        self.pending.drain(..n);
        self.written_compressed += n as u64;
        self.progress.report(self.written_uncompressed);

        if self.pending.is_empty() && self.eof {
            return Ok(Step::Finished);
        }
        Ok(Step::Continue)
    }

    /// Subscribe to rate-limited percent-complete updates
    pub fn progress_updates(&self) -> watch::Receiver<u32> {
        self.progress.subscribe()
    }

    /// Path of the source file this engine exports
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Size of the original source file at open time
    pub fn source_size(&self) -> u64 {
        self.source_size
    }

    /// Uncompressed bytes consumed from the source so far
    pub fn written_uncompressed(&self) -> u64 {
        self.written_uncompressed
    }

    /// Bytes written to the output descriptor so far
    pub fn written_compressed(&self) -> u64 {
        self.written_compressed
    }

    fn summary(&self) -> ExportSummary {
        ExportSummary {
            bytes_read: self.written_uncompressed,
            bytes_written: self.written_compressed,
            compression: self.compressor.kind(),
        }
    }
}

impl fmt::Debug for RawExport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawExport")
            .field("source_path", &self.source_path)
            .field("source_size", &self.source_size)
            .field("compression", &self.compressor.kind())
            .field("written_uncompressed", &self.written_uncompressed)
            .field("written_compressed", &self.written_compressed)
            .field("eof", &self.eof)
            .finish()
    }
}

fn file_type_name(ft: &std::fs::FileType) -> String {
    use std::os::unix::fs::FileTypeExt;

    if ft.is_dir() {
        "directory"
    } else if ft.is_symlink() {
        "symbolic link"
    } else if ft.is_block_device() {
        "block device"
    } else if ft.is_char_device() {
        "character device"
    } else if ft.is_fifo() {
        "fifo"
    } else if ft.is_socket() {
        "socket"
    } else {
        "unknown"
    }
    .to_string()
}
