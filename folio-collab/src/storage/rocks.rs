//! RocksDB-backed document and version archive store.
//!
//! Column families:
//! - `documents`    : Document rows (bincode, LZ4 compressed), keyed by doc_id
//! - `archive`      : Evicted version deltas (bincode, LZ4), keyed by doc_id:version
//! - `project_index`: Empty values keyed by project_id:doc_id
//!
//! Performance targets:
//! - Document load (cache hit): <1ms
//! - Archive persist (1KB delta): <50μs
//! - Archive range scan (100 versions): <2ms
//!
//! Reference: Kleppmann, DDIA, Chapter 3 (LSM Trees, SSTables)

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    Direction, IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use folio_core::{ArchiveError, ArchivedVersion, Document, VersionArchive};

use super::{DocumentRepository, StoreError};

const CF_DOCUMENTS: &str = "documents";
const CF_ARCHIVE: &str = "archive";
const CF_PROJECT_INDEX: &str = "project_index";

const COLUMN_FAMILIES: &[&str] = &[CF_DOCUMENTS, CF_ARCHIVE, CF_PROJECT_INDEX];

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 256MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Enable fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 512)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 64MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("folio_data"),
            block_cache_size: 256 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 512,
            write_buffer_size: 64 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Create config for testing (small caches).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024,
        }
    }
}

/// RocksDB-backed store for documents and their archived versions.
///
/// Implements both [`DocumentRepository`] and [`VersionArchive`], so one
/// database holds everything a document needs to be rebuilt.
pub struct DocumentStore {
    /// RocksDB instance (single-threaded CF management; reads and writes are shared)
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
}

impl DocumentStore {
    /// Open the store, creating the database and column families if missing.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        log::info!("Opened document store at {}", config.path.display());
        Ok(Self { db, config })
    }

    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        block_opts.set_block_size(16 * 1024);
        opts.set_block_based_table_factory(&block_opts);

        opts.set_compression_type(DBCompressionType::Lz4);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            CF_DOCUMENTS => {
                // Point lookups by document id
                opts.set_max_write_buffer_number(2);
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            CF_ARCHIVE => {
                // Append-mostly, range-scanned by doc_id prefix
                opts.set_max_write_buffer_number(4);
                opts.set_prefix_extractor(rocksdb::SliceTransform::create_fixed_prefix(16));
            }
            CF_PROJECT_INDEX => {
                opts.set_max_write_buffer_number(2);
                opts.set_compression_type(DBCompressionType::None);
                opts.set_prefix_extractor(rocksdb::SliceTransform::create_fixed_prefix(16));
            }
            _ => {}
        }

        opts
    }

    /// Force a flush of memtables to disk.
    pub fn sync(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::DatabaseError(format!("Column family '{name}' not found")))
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;
        Ok(())
    }

    /// Archive key: doc_id (16 bytes) + version (8 bytes big-endian).
    fn archive_key(doc_id: Uuid, version: u32) -> Vec<u8> {
        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(doc_id.as_bytes());
        key.extend_from_slice(&u64::from(version).to_be_bytes());
        key
    }

    /// Index key: project_id (16 bytes) + doc_id (16 bytes).
    fn index_key(project_id: Uuid, doc_id: Uuid) -> Vec<u8> {
        let mut key = Vec::with_capacity(32);
        key.extend_from_slice(project_id.as_bytes());
        key.extend_from_slice(doc_id.as_bytes());
        key
    }

    /// Keys and values in `cf` that start with `prefix`, from `start` on,
    /// stopping after `end` (inclusive) when given.
    fn scan(
        &self,
        cf_name: &str,
        prefix: &[u8],
        start: &[u8],
        end: Option<&[u8]>,
    ) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>, StoreError> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(start, Direction::Forward));

        let mut out = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            if end.is_some_and(|end| key.as_ref() > end) {
                break;
            }
            out.push((key, value));
        }
        Ok(out)
    }

    /// Document ids recorded under a project.
    fn project_documents(&self, project_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let prefix = project_id.as_bytes();
        self.scan(CF_PROJECT_INDEX, prefix, prefix, None)?
            .into_iter()
            .map(|(key, _)| {
                let bytes: [u8; 16] = key
                    .get(16..32)
                    .and_then(|s| s.try_into().ok())
                    .ok_or_else(|| StoreError::DeserializationError("Invalid index key".into()))?;
                Ok(Uuid::from_bytes(bytes))
            })
            .collect()
    }

    fn delete_archive_of(&self, doc_id: Uuid, batch: &mut WriteBatch) -> Result<u64, StoreError> {
        let cf = self.cf(CF_ARCHIVE)?;
        let prefix = doc_id.as_bytes();
        let keys = self.scan(CF_ARCHIVE, prefix, prefix, None)?;
        for (key, _) in &keys {
            batch.delete_cf(&cf, key);
        }
        Ok(keys.len() as u64)
    }

    fn archive_entries(
        &self,
        doc_id: Uuid,
        from_inclusive: u32,
        to_inclusive: u32,
    ) -> Result<Vec<ArchivedVersion>, StoreError> {
        let start = Self::archive_key(doc_id, from_inclusive);
        let end = Self::archive_key(doc_id, to_inclusive);
        self.scan(CF_ARCHIVE, doc_id.as_bytes(), &start, Some(&end))?
            .into_iter()
            .map(|(_, value)| decode_compressed(&value))
            .collect()
    }
}

/// bincode, then LZ4 with the uncompressed size prepended.
fn encode_compressed<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    let raw = bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::SerializationError(e.to_string()))?;
    Ok(lz4_flex::compress_prepend_size(&raw))
}

fn decode_compressed<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    let raw = lz4_flex::decompress_size_prepended(bytes)
        .map_err(|e| StoreError::CompressionError(e.to_string()))?;
    let (value, _) = bincode::serde::decode_from_slice(&raw, bincode::config::standard())
        .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
    Ok(value)
}

impl DocumentRepository for DocumentStore {
    fn load(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        let cf = self.cf(CF_DOCUMENTS)?;
        match self.db.get_cf(&cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(decode_compressed(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save(&self, document: &Document) -> Result<(), StoreError> {
        let cf_docs = self.cf(CF_DOCUMENTS)?;
        let cf_index = self.cf(CF_PROJECT_INDEX)?;

        // Atomic batch: row + project index
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_docs, document.id.as_bytes(), encode_compressed(document)?);
        batch.put_cf(
            &cf_index,
            Self::index_key(document.project_id, document.id),
            b"",
        );
        self.write(batch)
    }

    /// Removes the row, its index entry and any archived versions.
    fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let Some(document) = self.load(id)? else {
            return Ok(false);
        };
        let cf_docs = self.cf(CF_DOCUMENTS)?;
        let cf_index = self.cf(CF_PROJECT_INDEX)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_docs, id.as_bytes());
        batch.delete_cf(&cf_index, Self::index_key(document.project_id, id));
        self.delete_archive_of(id, &mut batch)?;
        self.write(batch)?;
        Ok(true)
    }

    fn list_for_project(&self, project_id: Uuid) -> Result<Vec<Document>, StoreError> {
        let mut documents = Vec::new();
        for id in self.project_documents(project_id)? {
            // Index entries written by archiving may outlive a missing row
            if let Some(document) = self.load(id)? {
                documents.push(document);
            }
        }
        Ok(documents)
    }
}

impl VersionArchive for DocumentStore {
    fn persist(&self, entry: &ArchivedVersion) -> Result<(), ArchiveError> {
        let cf_archive = self.cf(CF_ARCHIVE)?;
        let cf_index = self.cf(CF_PROJECT_INDEX)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_archive,
            Self::archive_key(entry.document_id, entry.version()),
            encode_compressed(entry)?,
        );
        batch.put_cf(
            &cf_index,
            Self::index_key(entry.project_id, entry.document_id),
            b"",
        );
        Ok(self.write(batch)?)
    }

    fn find_range(
        &self,
        document_id: Uuid,
        from_exclusive: u32,
        to_inclusive: u32,
    ) -> Result<Vec<ArchivedVersion>, ArchiveError> {
        if from_exclusive >= to_inclusive {
            return Ok(Vec::new());
        }
        Ok(self.archive_entries(document_id, from_exclusive + 1, to_inclusive)?)
    }

    fn find_all(&self, document_id: Uuid) -> Result<Vec<ArchivedVersion>, ArchiveError> {
        Ok(self.archive_entries(document_id, 0, u32::MAX)?)
    }

    fn delete_all_for_document(&self, document_id: Uuid) -> Result<u64, ArchiveError> {
        let mut batch = WriteBatch::default();
        let removed = self.delete_archive_of(document_id, &mut batch)?;
        if removed > 0 {
            self.write(batch)?;
        }
        Ok(removed)
    }

    fn delete_all_for_project(&self, project_id: Uuid) -> Result<u64, ArchiveError> {
        let mut batch = WriteBatch::default();
        let mut removed = 0;
        for doc_id in self.project_documents(project_id)? {
            removed += self.delete_archive_of(doc_id, &mut batch)?;
        }
        if removed > 0 {
            self.write(batch)?;
        }
        Ok(removed)
    }

    fn count_for_project(&self, project_id: Uuid) -> Result<u64, ArchiveError> {
        let mut count = 0;
        for doc_id in self.project_documents(project_id)? {
            let prefix = doc_id.as_bytes();
            count += self.scan(CF_ARCHIVE, prefix, prefix, None)?.len() as u64;
        }
        Ok(count)
    }
}

/// Get number of CPU cores for RocksDB parallelism.
fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}
