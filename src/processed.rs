use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::storage::write_atomic;

/// Set of screenshot assets that have already gone through ingestion,
/// persisted as a JSON array of canonical paths.
pub struct ProcessedCache {
    path: PathBuf,
    paths: BTreeSet<String>,
    unsaved: usize,
    save_interval: usize,
}

impl ProcessedCache {
    pub fn load(path: &Path, save_interval: usize) -> std::io::Result<Self> {
        let paths = match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice::<BTreeSet<String>>(&bytes)?,
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeSet::new(),
            Err(err) => return Err(err),
        };

        log::debug!("loaded {} processed screenshot paths", paths.len());

        Ok(Self {
            path: path.to_path_buf(),
            paths,
            unsaved: 0,
            save_interval: save_interval.max(1),
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn is_processed(&self, asset: &Path) -> bool {
        self.paths.contains(&canonical(asset))
    }

    /// Record `asset` as handled. Persists every `save_interval` new marks.
    pub fn mark_processed(&mut self, asset: &Path) -> std::io::Result<()> {
        if !self.paths.insert(canonical(asset)) {
            return Ok(());
        }

        self.unsaved += 1;
        if self.unsaved >= self.save_interval {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        let data = serde_json::to_vec_pretty(&self.paths)?;
        write_atomic(&self.path, &data)?;
        self.unsaved = 0;
        Ok(())
    }
}

fn canonical(asset: &Path) -> String {
    std::fs::canonicalize(asset)
        .unwrap_or_else(|_| asset.to_path_buf())
        .to_string_lossy()
        .into_owned()
}
