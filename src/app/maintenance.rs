use std::path::Path;

use crate::{
    items::{ItemStore, SourceKind, StoreError},
    semantic::{hash_file, hash_text},
};

/// Fill in content hashes for legacy rows that were stored without one.
///
/// Screenshots hash their asset bytes when the file is still around and fall
/// back to their text otherwise. Returns the number of rows updated; running
/// it again is a no-op.
pub fn backfill_hashes(store: &dyn ItemStore) -> Result<usize, StoreError> {
    let mut updated = 0;

    for item in store.scan()? {
        if !item.content_hash.is_empty() {
            continue;
        }

        let asset = match item.source {
            SourceKind::Screenshot => item.blob_ref.as_deref().map(Path::new),
            SourceKind::Clipboard => None,
        };

        let hash = match asset.filter(|path| path.exists()).map(hash_file) {
            Some(Ok(hash)) => hash,
            Some(Err(err)) => {
                log::warn!("item={} asset unreadable, hashing text instead: {err}", item.id);
                hash_text(&item.text)
            }
            None => hash_text(&item.text),
        };

        store.set_content_hash(item.id, &hash)?;
        updated += 1;
    }

    if updated > 0 {
        log::info!("backfilled content hashes for {updated} items");
    }

    Ok(updated)
}
