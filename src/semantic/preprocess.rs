//! Content hashing and display helpers.
//!
//! Content hashes are hex-encoded xxh64 digests with seed 0. Text is hashed
//! as given; screenshot assets are hashed over their raw bytes, streamed in
//! fixed-size chunks so large files never sit in memory at once.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use xxhash_rust::xxh64::{xxh64, Xxh64};

/// Chunk size used when streaming asset bytes (1 MiB)
const HASH_CHUNK_SIZE: usize = 1 << 20;

/// Maximum preview length in characters
const PREVIEW_LENGTH: usize = 80;

/// Ellipsis suffix when content is truncated
const TRUNCATION_SUFFIX: &str = "...";

/// Hex xxh64 of `text`.
pub fn hash_text(text: &str) -> String {
    format!("{:016x}", xxh64(text.as_bytes(), 0))
}

/// Hex xxh64 of the file's raw bytes.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut reader = BufReader::with_capacity(HASH_CHUNK_SIZE, File::open(path)?);
    let mut hasher = Xxh64::new(0);
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:016x}", hasher.digest()))
}

/// Shorten `text` for listings, counting characters rather than bytes.
pub fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_LENGTH {
        return text.to_string();
    }

    let truncated: String = text.chars().take(PREVIEW_LENGTH).collect();
    format!("{}{}", truncated, TRUNCATION_SUFFIX)
}
