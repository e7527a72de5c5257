//! CLI configuration for rawexport
//!
//! Defines the command-line arguments for the export binary.

use crate::compress::Compression;
use clap::builder::PossibleValuesParser;
use clap::Parser;
use std::path::PathBuf;

/// RawExport - stream a raw image to a descriptor with fast-path copies
#[derive(Parser, Debug, Clone)]
#[command(name = "rawexport")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Export a raw image file, optionally compressed")]
#[command(long_about = r#"
Exports a regular file (typically a raw disk or container image) to a file
or to stdout without blocking on a slow consumer.

Uncompressed exports use filesystem fast paths where available: a whole-file
copy-on-write reflink, then kernel sendfile, then a buffered copy. A
best-effort reflink snapshot decouples the export from concurrent writers.

Examples:
  rawexport image.raw                         # stream to stdout
  rawexport image.raw backup.raw              # copy to a file (reflinked when possible)
  rawexport image.raw image.raw.zst -c zstd   # compressed export
  rawexport image.raw - -c gzip | ssh host 'cat > image.raw.gz'
"#)]
pub struct CliArgs {
    /// Source image file to export
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Output file, or "-" for stdout
    #[arg(value_name = "OUTPUT", default_value = "-")]
    pub output: String,

    /// Compression kind
    #[arg(
        short = 'c',
        long = "compress",
        default_value = "none",
        value_name = "KIND",
        value_parser = PossibleValuesParser::new(Compression::ALL.map(|k| k.name()))
    )]
    pub compress: String,

    /// Suppress the final summary
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["rawexport", "image.raw"]);
        assert_eq!(args.source, PathBuf::from("image.raw"));
        assert_eq!(args.output, "-");
        assert_eq!(args.compress, "none");
        assert!(!args.quiet);
    }

    #[test]
    fn test_compress_flag() {
        let args = CliArgs::parse_from(["rawexport", "image.raw", "out.zst", "-c", "zstd"]);
        assert_eq!(args.output, "out.zst");
        assert_eq!(args.compress, "zstd");
    }

    #[test]
    fn test_unknown_compression_kind_is_rejected() {
        let result = CliArgs::try_parse_from(["rawexport", "image.raw", "-c", "xz"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_every_advertised_kind_parses() {
        for kind in Compression::ALL {
            let args =
                CliArgs::parse_from(["rawexport", "image.raw", "-c", kind.name()]);
            assert_eq!(args.compress.parse::<Compression>().unwrap(), kind);
        }
    }
}
