//! RawExport CLI - stream raw images to files or pipes
//!
//! Thin front-end over the export engine: parses arguments, opens the
//! output descriptor, and prints a summary.

use clap::Parser;
use rawexport::compress::Compression;
use rawexport::config::CliArgs;
use rawexport::error::{ExportError, Result};
use rawexport::export::{ExportSummary, RawExport};
use std::fs::File;
use std::os::unix::io::AsFd;
use tracing_subscriber::EnvFilter;

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> Result<()> {
    let compression: Compression = args.compress.parse()?;

    let runtime = tokio::runtime::Runtime::new()?;
    let summary = runtime.block_on(async {
        if args.output == "-" {
            let stdout = std::io::stdout();
            let mut export = RawExport::start(&args.source, stdout.as_fd(), compression)?;
            export.run().await
        } else {
            let out = File::create(&args.output)
                .map_err(|e| ExportError::open(args.output.as_str(), e))?;
            let mut export = RawExport::start(&args.source, out.as_fd(), compression)?;
            export.run().await
        }
    })?;

    if !args.quiet {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &ExportSummary) {
    eprintln!(
        "Exported {} ({} written, {})",
        humansize::format_size(summary.bytes_read, humansize::BINARY),
        humansize::format_size(summary.bytes_written, humansize::BINARY),
        summary.compression,
    );
}
