use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::Context;
use flate2::read::MultiGzDecoder;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Nested compression deeper than this is treated as plain data.
const MAX_LAYERS: usize = 4;

/// Opens a variant file and transparently peels off GZIP/BGZF layers
/// to expose the underlying VCF text.
///
/// Layers are detected by magic bytes rather than by extension, so a
/// `.vcf.gz` that is actually plain text (or a double-compressed file)
/// is read correctly.
pub fn open_input(path: &Path) -> anyhow::Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open variant file {}", path.display()))?;
    peel_layers(Box::new(BufReader::new(file)))
        .with_context(|| format!("failed to inspect variant file {}", path.display()))
}

/// Strips gzip layers from an already-open stream.
pub fn peel_layers(
    mut reader: Box<dyn BufRead + Send>,
) -> std::io::Result<Box<dyn BufRead + Send>> {
    for layer in 0..MAX_LAYERS {
        let is_gzip = {
            let buf = reader.fill_buf()?;
            buf.len() >= 2 && buf[..2] == GZIP_MAGIC
        };

        if !is_gzip {
            break;
        }

        tracing::debug!(layer, "detected GZIP/BGZF layer");
        // MultiGzDecoder keeps reading across BGZF blocks and concatenated members.
        reader = Box::new(BufReader::new(MultiGzDecoder::new(reader)));
    }

    Ok(reader)
}
