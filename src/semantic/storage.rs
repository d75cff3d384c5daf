//! Binary storage for the chunk index.
//!
//! File format: vectors.bin
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated):
//! - note_id: u64 (little-endian)
//! - seq: u32 (little-endian)
//! - user_id: u64 (little-endian)
//! - text_len: u32 (little-endian), then text as UTF-8 bytes
//! - embedding: [f32; dimensions] (little-endian)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::semantic::index::{ChunkIndex, ChunkRecord};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Storage manager for the chunk index file.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    /// Create a new storage manager for the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Get the storage file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the storage file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the chunk index from storage.
    ///
    /// Entries that fail to insert (zero-norm vector, wrong dimensions) are
    /// skipped with a warning rather than failing the whole load; persisted
    /// state may predate a validation rule.
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<ChunkIndex, VectorStorageError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = self.read_header(&mut reader)?;
        self.validate_header(&header, expected_model_id, expected_dimensions)?;

        let mut index =
            ChunkIndex::with_capacity(header.dimensions as usize, header.entry_count as usize);

        for _ in 0..header.entry_count {
            let record = self.read_entry(&mut reader, header.dimensions as usize)?;
            let id = record.id();
            if let Err(err) = index.insert(record) {
                log::warn!("skipping invalid stored chunk {id}: {err}");
            }
        }

        Ok(index)
    }

    /// Save the chunk index to storage.
    ///
    /// Uses atomic write: temp file -> fsync -> rename
    pub fn save(&self, index: &ChunkIndex, model_id: &[u8; 32]) -> Result<(), VectorStorageError> {
        let temp_path = self.path.with_extension("tmp");

        let result = self.write_to_file(&temp_path, index, model_id);

        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    /// Delete the storage file if it exists.
    pub fn delete(&self) -> Result<(), VectorStorageError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// Write index to a file.
    fn write_to_file(
        &self,
        path: &Path,
        index: &ChunkIndex,
        model_id: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = Header {
            version: FORMAT_VERSION,
            model_id: *model_id,
            dimensions: index.dimensions() as u16,
            entry_count: index.len() as u64,
        };
        self.write_header(&mut writer, &header)?;

        for record in index.iter() {
            self.write_entry(&mut writer, record)?;
        }

        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        file.sync_all()?;

        Ok(())
    }

    /// Read header from file.
    fn read_header(&self, reader: &mut BufReader<File>) -> Result<Header, VectorStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;

        let version = header_bytes[0];

        // Version check first
        if version > FORMAT_VERSION {
            return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
        }

        let mut model_id = [0u8; 32];
        model_id.copy_from_slice(&header_bytes[1..33]);

        let dimensions = u16::from_le_bytes([header_bytes[33], header_bytes[34]]);
        let entry_count = u64::from_le_bytes([
            header_bytes[35],
            header_bytes[36],
            header_bytes[37],
            header_bytes[38],
            header_bytes[39],
            header_bytes[40],
            header_bytes[41],
            header_bytes[42],
        ]);
        let stored_checksum = u32::from_le_bytes([
            header_bytes[43],
            header_bytes[44],
            header_bytes[45],
            header_bytes[46],
        ]);

        // Verify checksum (computed over header without checksum field)
        let computed_checksum = Self::compute_checksum(&header_bytes[0..43]);
        if stored_checksum != computed_checksum {
            return Err(VectorStorageError::ChecksumMismatch);
        }

        Ok(Header {
            version,
            model_id,
            dimensions,
            entry_count,
        })
    }

    /// Validate header against expected values.
    fn validate_header(
        &self,
        header: &Header,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<(), VectorStorageError> {
        if header.model_id != *expected_model_id {
            return Err(VectorStorageError::ModelMismatch);
        }

        if header.dimensions as usize != expected_dimensions {
            return Err(VectorStorageError::DimensionMismatch {
                expected: expected_dimensions,
                got: header.dimensions as usize,
            });
        }

        Ok(())
    }

    /// Write header to file.
    fn write_header(
        &self,
        writer: &mut BufWriter<File>,
        header: &Header,
    ) -> Result<(), VectorStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];

        header_bytes[0] = header.version;
        header_bytes[1..33].copy_from_slice(&header.model_id);
        header_bytes[33..35].copy_from_slice(&header.dimensions.to_le_bytes());
        header_bytes[35..43].copy_from_slice(&header.entry_count.to_le_bytes());

        let checksum = Self::compute_checksum(&header_bytes[0..43]);
        header_bytes[43..47].copy_from_slice(&checksum.to_le_bytes());

        writer.write_all(&header_bytes)?;
        Ok(())
    }

    /// Read a single chunk entry from file.
    fn read_entry(
        &self,
        reader: &mut BufReader<File>,
        dimensions: usize,
    ) -> Result<ChunkRecord, VectorStorageError> {
        let mut u64_bytes = [0u8; 8];
        reader.read_exact(&mut u64_bytes)?;
        let note_id = u64::from_le_bytes(u64_bytes);

        let mut u32_bytes = [0u8; 4];
        reader.read_exact(&mut u32_bytes)?;
        let seq = u32::from_le_bytes(u32_bytes);

        reader.read_exact(&mut u64_bytes)?;
        let user_id = u64::from_le_bytes(u64_bytes);

        reader.read_exact(&mut u32_bytes)?;
        let text_len = u32::from_le_bytes(u32_bytes);

        let mut text_bytes = vec![0u8; text_len as usize];
        reader.read_exact(&mut text_bytes)?;
        let text = String::from_utf8(text_bytes)
            .map_err(|e| VectorStorageError::InvalidFormat(format!("chunk text: {e}")))?;

        let mut embedding = Vec::with_capacity(dimensions);
        for _ in 0..dimensions {
            let mut float_bytes = [0u8; 4];
            reader.read_exact(&mut float_bytes)?;
            embedding.push(f32::from_le_bytes(float_bytes));
        }

        Ok(ChunkRecord {
            note_id,
            seq,
            user_id,
            text,
            embedding,
        })
    }

    /// Write a single chunk entry to file.
    fn write_entry(
        &self,
        writer: &mut BufWriter<File>,
        record: &ChunkRecord,
    ) -> Result<(), VectorStorageError> {
        writer.write_all(&record.note_id.to_le_bytes())?;
        writer.write_all(&record.seq.to_le_bytes())?;
        writer.write_all(&record.user_id.to_le_bytes())?;

        writer.write_all(&(record.text.len() as u32).to_le_bytes())?;
        writer.write_all(record.text.as_bytes())?;

        for &value in &record.embedding {
            writer.write_all(&value.to_le_bytes())?;
        }

        Ok(())
    }

    /// Compute CRC32 checksum of data.
    fn compute_checksum(data: &[u8]) -> u32 {
        crc32fast::hash(data)
    }
}

/// File header structure.
#[derive(Debug)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}
