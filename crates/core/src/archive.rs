//! Gzip archive codec for rendered pages.
//!
//! Pages are stored compressed. Header metadata (file name, comment, mtime)
//! is informational only and decompression returns just the payload text.

use std::io::{Read, Write};

use chrono::Utc;
use flate2::{Compression, GzBuilder, read::GzDecoder};

use crate::Error;

/// Optional gzip header fields written alongside the payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveMeta<'a> {
    /// Stored in the gzip FNAME field; the executor passes the canonical key.
    pub name: Option<&'a str>,
    /// Stored in the gzip FCOMMENT field.
    pub comment: Option<&'a str>,
}

/// Compress page text into a gzip blob.
///
/// NUL bytes are stripped from metadata since the gzip header stores them as
/// C strings.
pub fn compress(text: &str, meta: ArchiveMeta<'_>) -> Result<Vec<u8>, Error> {
    let mtime = u32::try_from(Utc::now().timestamp()).unwrap_or(0);
    let mut builder = GzBuilder::new().mtime(mtime);
    if let Some(name) = meta.name {
        builder = builder.filename(header_field(name));
    }
    if let Some(comment) = meta.comment {
        builder = builder.comment(header_field(comment));
    }

    let mut encoder = builder.write(Vec::new(), Compression::default());
    encoder
        .write_all(text.as_bytes())
        .map_err(|e| Error::Archive(format!("compress failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| Error::Archive(format!("compress failed: {e}")))
}

/// Decompress a gzip blob back into page text.
///
/// # Errors
///
/// Returns `Error::Archive` if the blob is not valid gzip or the payload is not
/// UTF-8.
pub fn decompress(blob: &[u8]) -> Result<String, Error> {
    let mut decoder = GzDecoder::new(blob);
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(|e| Error::Archive(format!("decompress failed: {e}")))?;
    Ok(text)
}

fn header_field(value: &str) -> Vec<u8> {
    value.bytes().filter(|b| *b != 0).collect()
}
