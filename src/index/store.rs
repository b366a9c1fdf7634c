// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence for vector index snapshots.
//!
//! File format (little-endian):
//!
//! ```text
//! Header:
//!   Magic: "SSVI" (4 bytes)
//!   Version: u16
//!   Dimension: u32
//!   Count: u32
//!   HeaderCRC32: u32 (CRC32 of the header bytes before this field)
//! Ids:
//!   Count x (len: u32, UTF-8 bytes)
//! Vectors:
//!   Count x Dimension x f32, row-major
//! BodyCRC32: u32 (CRC32 of ids and vectors)
//! ```

use memmap2::Mmap;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::errors::IndexError;

type Result<T> = std::result::Result<T, IndexError>;

pub const SSVI_MAGIC: [u8; 4] = *b"SSVI";
pub const SSVI_VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 4 + 4;

/// Row-major vectors plus the parallel list of document ids.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndexSnapshot {
    pub dimension: usize,
    pub doc_ids: Vec<String>,
    pub vectors: Vec<f32>,
}

impl IndexSnapshot {
    pub fn empty(dimension: usize) -> Self {
        Self {
            dimension,
            doc_ids: Vec::new(),
            vectors: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    /// Vector stored at `position`.
    pub fn row(&self, position: usize) -> &[f32] {
        let start = position * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    /// Serializes the snapshot in SSVI format.
    pub fn write_to<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        let mut header = Vec::with_capacity(HEADER_LEN);
        header.extend_from_slice(&SSVI_MAGIC);
        header.extend_from_slice(&SSVI_VERSION.to_le_bytes());
        header.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        header.extend_from_slice(&(self.doc_ids.len() as u32).to_le_bytes());
        writer.write_all(&header)?;
        writer.write_all(&crc32fast::hash(&header).to_le_bytes())?;

        let mut hasher = crc32fast::Hasher::new();
        for id in &self.doc_ids {
            let len = (id.len() as u32).to_le_bytes();
            hasher.update(&len);
            hasher.update(id.as_bytes());
            writer.write_all(&len)?;
            writer.write_all(id.as_bytes())?;
        }
        for value in &self.vectors {
            let bytes = value.to_le_bytes();
            hasher.update(&bytes);
            writer.write_all(&bytes)?;
        }
        writer.write_all(&hasher.finalize().to_le_bytes())?;
        Ok(())
    }

    /// Parses a snapshot from SSVI bytes, verifying both checksums.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);

        let header = reader.take(HEADER_LEN)?;
        let header_crc = reader.u32()?;
        if crc32fast::hash(header) != header_crc {
            return Err(IndexError::Checksum { section: "header" });
        }
        if header[..4] != SSVI_MAGIC {
            return Err(IndexError::Format("bad magic".into()));
        }
        let mut header_reader = ByteReader::new(&header[4..]);
        let version = header_reader.u16()?;
        if version != SSVI_VERSION {
            return Err(IndexError::Format(format!(
                "unsupported version {}",
                version
            )));
        }
        let dimension = header_reader.u32()? as usize;
        let count = header_reader.u32()? as usize;

        let body_start = reader.position();
        // Every id takes at least its 4-byte length prefix.
        let mut doc_ids = Vec::with_capacity(count.min(reader.remaining() / 4));
        for _ in 0..count {
            let len = reader.u32()? as usize;
            let raw = reader.take(len)?;
            let id = std::str::from_utf8(raw)
                .map_err(|_| IndexError::Format("document id is not UTF-8".into()))?;
            doc_ids.push(id.to_string());
        }

        let floats = count
            .checked_mul(dimension)
            .ok_or_else(|| IndexError::Format("vector slab size overflows".into()))?;
        let slab_len = floats
            .checked_mul(4)
            .ok_or_else(|| IndexError::Format("vector slab size overflows".into()))?;
        let slab = reader.take(slab_len)?;
        let body_end = reader.position();
        let body_crc = reader.u32()?;
        if crc32fast::hash(&bytes[body_start..body_end]) != body_crc {
            return Err(IndexError::Checksum { section: "body" });
        }
        if reader.remaining() != 0 {
            return Err(IndexError::Format("trailing bytes after checksum".into()));
        }

        let vectors = slab
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Self {
            dimension,
            doc_ids,
            vectors,
        })
    }
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(IndexError::Format("file is truncated".into()));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Load-or-absent and save for index snapshots.
pub trait IndexStore: Send + Sync {
    /// Returns the persisted snapshot, or `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<IndexSnapshot>>;

    /// Durably replaces the persisted snapshot.
    fn save(&self, snapshot: &IndexSnapshot) -> Result<()>;
}

/// Stores the snapshot in a single SSVI file.
pub struct FileIndexStore {
    path: PathBuf,
}

impl FileIndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> IndexError {
        IndexError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl IndexStore for FileIndexStore {
    fn load(&self) -> Result<Option<IndexSnapshot>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_error(err)),
        };
        let len = file.metadata().map_err(|e| self.io_error(e))?.len();
        if len == 0 {
            return Err(IndexError::Format("file is empty".into()));
        }

        // SAFETY: the file is opened read-only and only written through
        // temp-file + rename, so the mapped inode is never modified.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| self.io_error(e))?;
        let snapshot = IndexSnapshot::from_bytes(&mmap)?;
        tracing::info!(
            path = %self.path.display(),
            count = snapshot.len(),
            dimension = snapshot.dimension,
            "loaded vector index"
        );
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &IndexSnapshot) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;

        let mut temp_name = self.path.as_os_str().to_os_string();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        let file = File::create(&temp_path).map_err(|e| self.io_error(e))?;
        let mut writer = BufWriter::new(file);
        snapshot
            .write_to(&mut writer)
            .map_err(|e| self.io_error(e))?;
        let file = writer
            .into_inner()
            .map_err(|e| self.io_error(e.into_error()))?;
        file.sync_all().map_err(|e| self.io_error(e))?;
        drop(file);

        std::fs::rename(&temp_path, &self.path).map_err(|e| self.io_error(e))?;
        tracing::info!(
            path = %self.path.display(),
            count = snapshot.len(),
            "saved vector index"
        );
        Ok(())
    }
}

/// Keeps the snapshot in memory; nothing survives the process.
#[derive(Default)]
pub struct MemoryIndexStore {
    snapshot: Mutex<Option<IndexSnapshot>>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexStore for MemoryIndexStore {
    fn load(&self) -> Result<Option<IndexSnapshot>> {
        Ok(self.snapshot.lock().clone())
    }

    fn save(&self, snapshot: &IndexSnapshot) -> Result<()> {
        *self.snapshot.lock() = Some(snapshot.clone());
        Ok(())
    }
}
