//! Text extraction from screenshot assets.

use std::path::Path;

/// Placeholder text stored for screenshots whose text could not be read.
pub const NO_TEXT_DETECTED: &str = "[No text detected]";

/// Placeholder text stored when no extraction engine is configured.
pub const OCR_UNAVAILABLE: &str = "[No text detected - OCR unavailable]";

/// Whether `text` is one of the extraction placeholders rather than real content.
pub fn is_sentinel(text: &str) -> bool {
    let text = text.trim();
    text.is_empty() || text == NO_TEXT_DETECTED || text == OCR_UNAVAILABLE
}

/// Reads text out of an image asset.
pub trait TextExtractor: Send + Sync {
    /// Extracted text, or one of the placeholder constants.
    fn extract(&self, path: &Path) -> String;
}

/// Extractor used when no OCR engine is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableExtractor;

impl TextExtractor for UnavailableExtractor {
    fn extract(&self, path: &Path) -> String {
        log::debug!("no text extractor configured, skipping {}", path.display());
        OCR_UNAVAILABLE.to_string()
    }
}
