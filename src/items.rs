use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fmt::Display,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, RwLock},
    time::Instant,
};

use crate::storage::write_atomic_with;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Clipboard,
    Screenshot,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Clipboard => "clipboard",
            SourceKind::Screenshot => "screenshot",
        }
    }
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clipboard" => Ok(SourceKind::Clipboard),
            "screenshot" => Ok(SourceKind::Screenshot),
            other => Err(StoreError::Parse(format!("unknown source '{other}'"))),
        }
    }
}

/// A captured piece of content. Rows are immutable once created, apart from
/// the one-time content hash backfill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: u64,
    pub text: String,
    pub source: SourceKind,
    /// Asset path, present for screenshots only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_ref: Option<String>,
    /// Hex xxh64; empty on legacy rows awaiting backfill
    pub content_hash: String,
    /// Seconds since epoch
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct ItemCreate {
    pub text: String,
    pub source: SourceKind,
    pub blob_ref: Option<String>,
    pub content_hash: String,
    pub created_at: i64,
}

/// Predicate over rows. Empty filter matches everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemFilter {
    /// Strictly newer than this timestamp
    pub after: Option<i64>,
    pub source: Option<SourceKind>,
}

impl ItemFilter {
    pub fn is_active(&self) -> bool {
        self.after.is_some() || self.source.is_some()
    }

    pub fn matches(&self, item: &ContentItem) -> bool {
        if let Some(after) = self.after {
            if item.created_at <= after {
                return false;
            }
        }
        if let Some(source) = self.source {
            if item.source != source {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed record: {0}")]
    Parse(String),

    #[error("Item {0} not found")]
    NotFound(u64),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Id-keyed record store the engine reads and writes content rows through.
pub trait ItemStore: Send + Sync {
    fn create(&self, item: ItemCreate) -> Result<ContentItem, StoreError>;
    fn get(&self, id: u64) -> Result<Option<ContentItem>, StoreError>;
    /// Rows for every id that still exists; missing ids are left out.
    fn get_many(&self, ids: &[u64]) -> Result<HashMap<u64, ContentItem>, StoreError>;
    /// Returns whether a row was removed.
    fn delete(&self, id: u64) -> Result<bool, StoreError>;
    fn find_by_hash(&self, hash: &str) -> Result<Option<u64>, StoreError>;
    fn ids_matching(&self, filter: &ItemFilter) -> Result<HashSet<u64>, StoreError>;
    /// Newest first.
    fn recent(&self, source: Option<SourceKind>, limit: usize) -> Result<Vec<ContentItem>, StoreError>;
    /// Every row in ascending id order.
    fn scan(&self) -> Result<Vec<ContentItem>, StoreError>;
    fn count(&self, source: Option<SourceKind>) -> Result<usize, StoreError>;
    /// Only meant for the hash backfill migration.
    fn set_content_hash(&self, id: u64, hash: &str) -> Result<(), StoreError>;

    fn ids_after(&self, timestamp: i64) -> Result<HashSet<u64>, StoreError> {
        self.ids_matching(&ItemFilter {
            after: Some(timestamp),
            source: None,
        })
    }

    fn ids_by_source(&self, source: SourceKind) -> Result<HashSet<u64>, StoreError> {
        self.ids_matching(&ItemFilter {
            after: None,
            source: Some(source),
        })
    }
}

const CSV_HEADERS: [&str; 6] = [
    "id",
    "source",
    "created_at",
    "content_hash",
    "blob_ref",
    "text",
];

struct Items {
    list: Vec<ContentItem>,
    next_id: u64,
    /// content hash -> ids carrying it; legacy rows may share a hash
    by_hash: HashMap<String, BTreeSet<u64>>,
}

impl Items {
    fn new(list: Vec<ContentItem>, next_id: u64) -> Self {
        let mut by_hash: HashMap<String, BTreeSet<u64>> = HashMap::new();
        for item in list.iter().filter(|item| !item.content_hash.is_empty()) {
            by_hash
                .entry(item.content_hash.clone())
                .or_default()
                .insert(item.id);
        }

        Items {
            list,
            next_id,
            by_hash,
        }
    }

    fn index_hash(&mut self, id: u64, hash: String) {
        if !hash.is_empty() {
            self.by_hash.entry(hash).or_default().insert(id);
        }
    }

    fn unindex_hash(&mut self, id: u64, hash: &str) {
        if let Some(ids) = self.by_hash.get_mut(hash) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_hash.remove(hash);
            }
        }
    }
}

/// CSV-file record store. The whole file is rewritten on every mutation;
/// `items.seq` keeps the id high-water mark so deleted ids are never reused.
#[derive(Clone)]
pub struct BackendCsv {
    items: Arc<RwLock<Items>>,
    path: PathBuf,
    seq_path: PathBuf,
}

impl BackendCsv {
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if let Err(err) = std::fs::metadata(path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    log::info!("Creating new item store at {}", path.display());
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    let mut csv_wrt = csv::Writer::from_path(path)?;
                    csv_wrt.write_record(CSV_HEADERS)?;
                    csv_wrt.flush()?;
                }
                _ => Err(err)?,
            }
        }

        let now = Instant::now();
        let mut csv_reader = csv::Reader::from_path(path)?;

        let mut list = vec![];
        for record in csv_reader.records() {
            list.push(parse_record(&record?)?);
        }
        list.sort_by_key(|item| item.id);

        log::debug!(
            "took {}ms to read {} items",
            now.elapsed().as_micros() as f64 / 1000.0,
            list.len()
        );

        let seq_path = path.with_extension("seq");
        let stored_seq = read_seq(&seq_path)?;
        let next_from_rows = list.last().map(|item| item.id + 1).unwrap_or(1);

        Ok(BackendCsv {
            items: Arc::new(RwLock::new(Items::new(
                list,
                stored_seq.max(next_from_rows),
            ))),
            path: path.to_path_buf(),
            seq_path,
        })
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Items>, StoreError> {
        self.items.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Items>, StoreError> {
        self.items.write().map_err(|_| StoreError::Poisoned)
    }

    fn save(&self, items: &Items) -> Result<(), StoreError> {
        write_atomic_with(&self.seq_path, |file| {
            use std::io::Write;
            write!(file, "{}", items.next_id)
        })?;

        write_atomic_with(&self.path, |file| {
            let mut csv_wrt = csv::Writer::from_writer(file);
            write_rows(&mut csv_wrt, &items.list).map_err(std::io::Error::from)?;
            csv_wrt.flush()
        })?;

        Ok(())
    }
}

fn write_rows<W: std::io::Write>(
    csv_wrt: &mut csv::Writer<W>,
    list: &[ContentItem],
) -> Result<(), csv::Error> {
    csv_wrt.write_record(CSV_HEADERS)?;
    for item in list {
        csv_wrt.write_record([
            item.id.to_string().as_str(),
            item.source.as_str(),
            item.created_at.to_string().as_str(),
            &item.content_hash,
            item.blob_ref.as_deref().unwrap_or_default(),
            &item.text,
        ])?;
    }
    Ok(())
}

fn field<'a>(record: &'a csv::StringRecord, idx: usize, name: &str) -> Result<&'a str, StoreError> {
    record
        .get(idx)
        .ok_or_else(|| StoreError::Parse(format!("couldnt get record {name}")))
}

fn parse_record(record: &csv::StringRecord) -> Result<ContentItem, StoreError> {
    let id = field(record, 0, "id")?
        .parse::<u64>()
        .map_err(|e| StoreError::Parse(format!("bad id: {e}")))?;
    let source = field(record, 1, "source")?.parse::<SourceKind>()?;
    let created_at = field(record, 2, "created_at")?
        .parse::<i64>()
        .map_err(|e| StoreError::Parse(format!("bad created_at for item {id}: {e}")))?;
    let content_hash = field(record, 3, "content_hash")?.to_string();
    let blob_ref = field(record, 4, "blob_ref")?.to_string();
    let text = field(record, 5, "text")?.to_string();

    Ok(ContentItem {
        id,
        text,
        source,
        blob_ref: if blob_ref.is_empty() {
            None
        } else {
            Some(blob_ref)
        },
        content_hash,
        created_at,
    })
}

fn read_seq(path: &Path) -> Result<u64, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(content) => content
            .trim()
            .parse::<u64>()
            .map_err(|e| StoreError::Parse(format!("bad id sequence file: {e}"))),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(1),
        Err(err) => Err(err.into()),
    }
}

impl ItemStore for BackendCsv {
    fn create(&self, create: ItemCreate) -> Result<ContentItem, StoreError> {
        let mut items = self.write()?;
        let item = ContentItem {
            id: items.next_id,
            text: create.text,
            source: create.source,
            blob_ref: create.blob_ref,
            content_hash: create.content_hash,
            created_at: create.created_at,
        };

        items.next_id += 1;
        items.list.push(item.clone());

        if let Err(err) = self.save(&items) {
            items.list.pop();
            items.next_id -= 1;
            return Err(err);
        }

        items.index_hash(item.id, item.content_hash.clone());
        Ok(item)
    }

    fn get(&self, id: u64) -> Result<Option<ContentItem>, StoreError> {
        let items = self.read()?;
        Ok(items
            .list
            .binary_search_by_key(&id, |item| item.id)
            .ok()
            .map(|idx| items.list[idx].clone()))
    }

    fn get_many(&self, ids: &[u64]) -> Result<HashMap<u64, ContentItem>, StoreError> {
        let items = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| {
                items
                    .list
                    .binary_search_by_key(id, |item| item.id)
                    .ok()
                    .map(|idx| (*id, items.list[idx].clone()))
            })
            .collect())
    }

    fn delete(&self, id: u64) -> Result<bool, StoreError> {
        let mut items = self.write()?;
        let Ok(idx) = items.list.binary_search_by_key(&id, |item| item.id) else {
            return Ok(false);
        };

        let removed = items.list.remove(idx);
        if let Err(err) = self.save(&items) {
            items.list.insert(idx, removed);
            return Err(err);
        }

        items.unindex_hash(id, &removed.content_hash);
        Ok(true)
    }

    fn find_by_hash(&self, hash: &str) -> Result<Option<u64>, StoreError> {
        if hash.is_empty() {
            return Ok(None);
        }

        let items = self.read()?;
        Ok(items
            .by_hash
            .get(hash)
            .and_then(|ids| ids.first())
            .copied())
    }

    fn ids_matching(&self, filter: &ItemFilter) -> Result<HashSet<u64>, StoreError> {
        let items = self.read()?;
        Ok(items
            .list
            .iter()
            .filter(|item| filter.matches(item))
            .map(|item| item.id)
            .collect())
    }

    fn recent(&self, source: Option<SourceKind>, limit: usize) -> Result<Vec<ContentItem>, StoreError> {
        let filter = ItemFilter {
            after: None,
            source,
        };

        let items = self.read()?;
        let mut output: Vec<ContentItem> = items
            .list
            .iter()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect();

        output.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        output.truncate(limit);

        Ok(output)
    }

    fn scan(&self) -> Result<Vec<ContentItem>, StoreError> {
        Ok(self.read()?.list.clone())
    }

    fn count(&self, source: Option<SourceKind>) -> Result<usize, StoreError> {
        let items = self.read()?;
        Ok(match source {
            Some(source) => items.list.iter().filter(|item| item.source == source).count(),
            None => items.list.len(),
        })
    }

    fn set_content_hash(&self, id: u64, hash: &str) -> Result<(), StoreError> {
        let mut items = self.write()?;
        let idx = items
            .list
            .binary_search_by_key(&id, |item| item.id)
            .map_err(|_| StoreError::NotFound(id))?;

        let previous = std::mem::replace(&mut items.list[idx].content_hash, hash.to_string());
        if let Err(err) = self.save(&items) {
            items.list[idx].content_hash = previous;
            return Err(err);
        }

        items.unindex_hash(id, &previous);
        items.index_hash(id, hash.to_string());
        Ok(())
    }
}
