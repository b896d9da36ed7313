//! Binary storage for one vector space.
//!
//! Each space is persisted as two files written side by side.
//!
//! `<space>_vectors.bin`
//!
//! Header (51 bytes):
//! - magic: [u8; 4] (`CMVX`)
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of the encoder model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Body: `entry_count * dimensions` f32 values (little-endian, row-major).
//!
//! `<space>_idmap.bin`
//!
//! Header (17 bytes):
//! - magic: [u8; 4] (`CMID`)
//! - version: u8 (1)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Body: `entry_count` item ids as u64 (little-endian), in position order.
//!
//! If the two counts disagree on load, only the common prefix is kept.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::semantic::index::VectorIndex;

/// Current file format version
const FORMAT_VERSION: u8 = 1;

const VECTORS_MAGIC: &[u8; 4] = b"CMVX";
const IDMAP_MAGIC: &[u8; 4] = b"CMID";

/// magic(4) + version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const VECTORS_HEADER_SIZE: usize = 51;

/// magic(4) + version(1) + entry_count(8) + checksum(4)
const IDMAP_HEADER_SIZE: usize = 17;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: index was built with a different encoder, rebuild required")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Storage manager for a single vector space.
pub struct VectorStorage {
    vectors_path: PathBuf,
    idmap_path: PathBuf,
}

impl VectorStorage {
    /// Create a storage manager for space `name` inside `dir`.
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            vectors_path: dir.join(format!("{name}_vectors.bin")),
            idmap_path: dir.join(format!("{name}_idmap.bin")),
        }
    }

    pub fn vectors_path(&self) -> &Path {
        &self.vectors_path
    }

    pub fn idmap_path(&self) -> &Path {
        &self.idmap_path
    }

    /// Both backing files are present.
    pub fn exists(&self) -> bool {
        self.vectors_path.exists() && self.idmap_path.exists()
    }

    /// Exactly one of the two backing files is present.
    pub fn is_partial(&self) -> bool {
        self.vectors_path.exists() != self.idmap_path.exists()
    }

    /// Load the vector index from storage.
    ///
    /// # Arguments
    /// * `expected_model_id` - SHA256 hash of the expected encoder model name
    /// * `expected_dimensions` - Configured dimensions for this space
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<VectorIndex, VectorStorageError> {
        let mut reader = BufReader::new(File::open(&self.vectors_path)?);
        let header = read_vectors_header(&mut reader)?;

        if header.model_id != *expected_model_id {
            return Err(VectorStorageError::ModelMismatch);
        }
        if header.dimensions as usize != expected_dimensions {
            return Err(VectorStorageError::DimensionMismatch {
                expected: expected_dimensions,
                got: header.dimensions as usize,
            });
        }

        let mut id_reader = BufReader::new(File::open(&self.idmap_path)?);
        let id_count = read_idmap_header(&mut id_reader)?;

        // A crash between the two renames leaves one file a save ahead.
        // Positions are append-only, so the shorter file is a valid prefix.
        let count = header.entry_count.min(id_count);
        if id_count != header.entry_count {
            log::warn!(
                "{}: {} vectors but {id_count} ids, keeping the first {count}",
                self.vectors_path.display(),
                header.entry_count
            );
        }

        let data = read_f32s(&mut reader, count as usize * expected_dimensions)?;
        let id_map = read_u64s(&mut id_reader, count as usize)?;

        VectorIndex::from_parts(expected_dimensions, data, id_map)
            .map_err(|e| VectorStorageError::InvalidFormat(e.to_string()))
    }

    /// Save the vector index to storage.
    ///
    /// Uses atomic write for each file: temp file -> fsync -> rename.
    pub fn save(&self, index: &VectorIndex, model_id: &[u8; 32]) -> Result<(), VectorStorageError> {
        let vectors_tmp = self.vectors_path.with_extension("tmp");
        let idmap_tmp = self.idmap_path.with_extension("tmp");

        let result = write_vectors(&vectors_tmp, index, model_id)
            .and_then(|_| write_idmap(&idmap_tmp, index));

        if result.is_err() {
            let _ = std::fs::remove_file(&vectors_tmp);
            let _ = std::fs::remove_file(&idmap_tmp);
            return result;
        }

        std::fs::rename(&vectors_tmp, &self.vectors_path)?;
        std::fs::rename(&idmap_tmp, &self.idmap_path)?;

        Ok(())
    }
}

#[derive(Debug)]
struct VectorsHeader {
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

fn write_vectors(path: &Path, index: &VectorIndex, model_id: &[u8; 32]) -> Result<(), VectorStorageError> {
    let dimensions = u16::try_from(index.dimensions()).map_err(|_| {
        VectorStorageError::InvalidFormat(format!("dimensions {} exceed u16", index.dimensions()))
    })?;

    let mut writer = BufWriter::new(File::create(path)?);

    let mut header = [0u8; VECTORS_HEADER_SIZE];
    header[0..4].copy_from_slice(VECTORS_MAGIC);
    header[4] = FORMAT_VERSION;
    header[5..37].copy_from_slice(model_id);
    header[37..39].copy_from_slice(&dimensions.to_le_bytes());
    header[39..47].copy_from_slice(&(index.len() as u64).to_le_bytes());
    let checksum = crc32fast::hash(&header[0..47]);
    header[47..51].copy_from_slice(&checksum.to_le_bytes());
    writer.write_all(&header)?;

    for value in index.data() {
        writer.write_all(&value.to_le_bytes())?;
    }

    sync(writer)
}

fn write_idmap(path: &Path, index: &VectorIndex) -> Result<(), VectorStorageError> {
    let mut writer = BufWriter::new(File::create(path)?);

    let mut header = [0u8; IDMAP_HEADER_SIZE];
    header[0..4].copy_from_slice(IDMAP_MAGIC);
    header[4] = FORMAT_VERSION;
    header[5..13].copy_from_slice(&(index.len() as u64).to_le_bytes());
    let checksum = crc32fast::hash(&header[0..13]);
    header[13..17].copy_from_slice(&checksum.to_le_bytes());
    writer.write_all(&header)?;

    for id in index.id_map() {
        writer.write_all(&id.to_le_bytes())?;
    }

    sync(writer)
}

fn sync(mut writer: BufWriter<File>) -> Result<(), VectorStorageError> {
    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    file.sync_all()?;
    Ok(())
}

fn read_vectors_header(reader: &mut impl Read) -> Result<VectorsHeader, VectorStorageError> {
    let mut bytes = [0u8; VECTORS_HEADER_SIZE];
    reader.read_exact(&mut bytes)?;

    if &bytes[0..4] != VECTORS_MAGIC {
        return Err(VectorStorageError::InvalidFormat("not a vectors file".to_string()));
    }
    check_version(bytes[4])?;

    let stored_checksum = u32::from_le_bytes([bytes[47], bytes[48], bytes[49], bytes[50]]);
    if stored_checksum != crc32fast::hash(&bytes[0..47]) {
        return Err(VectorStorageError::ChecksumMismatch);
    }

    let mut model_id = [0u8; 32];
    model_id.copy_from_slice(&bytes[5..37]);
    let dimensions = u16::from_le_bytes([bytes[37], bytes[38]]);
    let mut count = [0u8; 8];
    count.copy_from_slice(&bytes[39..47]);

    Ok(VectorsHeader {
        model_id,
        dimensions,
        entry_count: u64::from_le_bytes(count),
    })
}

fn read_idmap_header(reader: &mut impl Read) -> Result<u64, VectorStorageError> {
    let mut bytes = [0u8; IDMAP_HEADER_SIZE];
    reader.read_exact(&mut bytes)?;

    if &bytes[0..4] != IDMAP_MAGIC {
        return Err(VectorStorageError::InvalidFormat("not an id map file".to_string()));
    }
    check_version(bytes[4])?;

    let stored_checksum = u32::from_le_bytes([bytes[13], bytes[14], bytes[15], bytes[16]]);
    if stored_checksum != crc32fast::hash(&bytes[0..13]) {
        return Err(VectorStorageError::ChecksumMismatch);
    }

    let mut count = [0u8; 8];
    count.copy_from_slice(&bytes[5..13]);
    Ok(u64::from_le_bytes(count))
}

fn check_version(version: u8) -> Result<(), VectorStorageError> {
    if version > FORMAT_VERSION {
        return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
    }
    Ok(())
}

fn read_f32s(reader: &mut impl Read, count: usize) -> Result<Vec<f32>, VectorStorageError> {
    let mut bytes = vec![0u8; count * 4];
    reader.read_exact(&mut bytes)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn read_u64s(reader: &mut impl Read, count: usize) -> Result<Vec<u64>, VectorStorageError> {
    let mut bytes = vec![0u8; count * 8];
    reader.read_exact(&mut bytes)?;
    Ok(bytes
        .chunks_exact(8)
        .map(|c| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(c);
            u64::from_le_bytes(buf)
        })
        .collect())
}
