//! Durable snapshot stores.
//!
//! The core only needs opaque put/get of snapshot blobs keyed by (shard,
//! generation). [`MemoryStore`] keeps them in memory; [`FileStore`] writes
//! them to disk with the following layout:
//! ```text
//! store.meta.json                  - metadata and schema version
//! snapshots/
//!   0_0_0/
//!     000000000042.sds.cbor.zst    - CBOR+zstd compressed snapshot blobs
//! integrity/
//!   manifest.json                  - hash chain manifest
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shardspace_common::ShardCoord;
use shardspace_kernel::codec::sha256_hex;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::snapshot::Sds;

/// Current schema version of stored snapshot blobs.
const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Opaque durable put/get keyed by (shard coordinate, generation).
///
/// A put for an existing key replaces the blob (recomputed generations).
pub trait DurableStore: Send + Sync {
    fn put(&self, shard: ShardCoord, generation: u64, blob: &[u8]) -> Result<(), StoreError>;

    /// `Ok(None)` when nothing was stored under the key.
    fn get(&self, shard: ShardCoord, generation: u64) -> Result<Option<Vec<u8>>, StoreError>;
}

/// Serialize `sds` and put it under (`shard`, its generation).
pub fn store_snapshot(
    store: &dyn DurableStore,
    shard: ShardCoord,
    sds: &Sds,
) -> Result<(), StoreError> {
    store.put(shard, sds.generation, &sds.to_bytes()?)
}

/// Load and verify the snapshot stored under (`shard`, `generation`).
pub fn load_snapshot(
    store: &dyn DurableStore,
    shard: ShardCoord,
    generation: u64,
) -> Result<Option<Sds>, StoreError> {
    let Some(blob) = store.get(shard, generation)? else {
        return Ok(None);
    };
    let sds = Sds::from_bytes(&blob)?;
    if sds.generation != generation {
        return Err(StoreError::GenerationMismatch {
            shard,
            expected: generation,
            got: sds.generation,
        });
    }
    if !sds.verify() {
        return Err(StoreError::IntegrityMismatch {
            expected: sds.digest.clone(),
            actual: "recomputed snapshot digest differs".into(),
        });
    }
    Ok(Some(sds))
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<BTreeMap<(ShardCoord, u64), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DurableStore for MemoryStore {
    fn put(&self, shard: ShardCoord, generation: u64, blob: &[u8]) -> Result<(), StoreError> {
        self.blobs.lock().insert((shard, generation), blob.to_vec());
        Ok(())
    }

    fn get(&self, shard: ShardCoord, generation: u64) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blobs.lock().get(&(shard, generation)).cloned())
    }
}

/// Metadata stored in store.meta.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMeta {
    pub snapshot_schema_version: u32,
    /// Total puts, replacements included.
    pub put_count: u64,
}

/// A single entry in the integrity manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to `snapshots/`.
    pub filename: String,
    pub sha256: String,
    pub prev_hash: Option<String>,
}

/// Integrity manifest chaining every written blob's hash.
///
/// A replaced blob appends a new entry; the latest entry for a filename is
/// the one its current content must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityManifest {
    pub entries: Vec<ManifestEntry>,
}

impl IntegrityManifest {
    fn latest_for(&self, filename: &str) -> Option<&ManifestEntry> {
        self.entries.iter().rev().find(|e| e.filename == filename)
    }
}

struct FileStoreState {
    meta: StoreMeta,
    manifest: IntegrityManifest,
}

/// File-backed store with schema versioning and integrity checking.
pub struct FileStore {
    root: PathBuf,
    state: Mutex<FileStoreState>,
}

impl FileStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("snapshots"))?;
        std::fs::create_dir_all(root.join("integrity"))?;

        let meta_path = root.join("store.meta.json");
        let manifest_path = root.join("integrity").join("manifest.json");

        let (meta, manifest) = if meta_path.exists() {
            let meta: StoreMeta = serde_json::from_reader(std::fs::File::open(&meta_path)?)?;
            if meta.snapshot_schema_version != SNAPSHOT_SCHEMA_VERSION {
                return Err(StoreError::SchemaMismatch {
                    file_version: meta.snapshot_schema_version,
                    expected_version: SNAPSHOT_SCHEMA_VERSION,
                });
            }
            let manifest: IntegrityManifest = if manifest_path.exists() {
                serde_json::from_reader(std::fs::File::open(&manifest_path)?)?
            } else {
                IntegrityManifest::default()
            };
            (meta, manifest)
        } else {
            let meta = StoreMeta {
                snapshot_schema_version: SNAPSHOT_SCHEMA_VERSION,
                put_count: 0,
            };
            let manifest = IntegrityManifest::default();
            serde_json::to_writer_pretty(std::fs::File::create(&meta_path)?, &meta)?;
            serde_json::to_writer_pretty(std::fs::File::create(&manifest_path)?, &manifest)?;
            (meta, manifest)
        };

        tracing::debug!(root = %root.display(), entries = manifest.entries.len(), "file store opened");
        Ok(Self {
            root,
            state: Mutex::new(FileStoreState { meta, manifest }),
        })
    }

    /// Get the path to the store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get a copy of the metadata.
    pub fn meta(&self) -> StoreMeta {
        self.state.lock().meta.clone()
    }

    /// Verify the manifest chain and the current content of every stored blob.
    pub fn verify_integrity(&self) -> Result<(), StoreError> {
        let state = self.state.lock();
        let mut prev_hash: Option<String> = None;
        for entry in &state.manifest.entries {
            if entry.prev_hash != prev_hash {
                return Err(StoreError::IntegrityMismatch {
                    expected: prev_hash.unwrap_or_else(|| "None".into()),
                    actual: entry.prev_hash.clone().unwrap_or_else(|| "None".into()),
                });
            }
            prev_hash = Some(entry.sha256.clone());
        }

        let mut seen = std::collections::HashSet::new();
        for entry in state.manifest.entries.iter().rev() {
            if !seen.insert(entry.filename.as_str()) {
                continue;
            }
            let data = std::fs::read(self.root.join("snapshots").join(&entry.filename))?;
            let actual = sha256_hex(&data);
            if actual != entry.sha256 {
                return Err(StoreError::IntegrityMismatch {
                    expected: entry.sha256.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }

    fn save(&self, state: &FileStoreState) -> Result<(), StoreError> {
        let meta_path = self.root.join("store.meta.json");
        serde_json::to_writer_pretty(std::fs::File::create(meta_path)?, &state.meta)?;
        let manifest_path = self.root.join("integrity").join("manifest.json");
        serde_json::to_writer_pretty(std::fs::File::create(manifest_path)?, &state.manifest)?;
        Ok(())
    }
}

impl DurableStore for FileStore {
    fn put(&self, shard: ShardCoord, generation: u64, blob: &[u8]) -> Result<(), StoreError> {
        let filename = blob_filename(shard, generation);
        let path = self.root.join("snapshots").join(&filename);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let compressed = zstd_compress(blob)?;
        let hash = sha256_hex(&compressed);

        let mut state = self.state.lock();
        let prev_hash = state.manifest.entries.last().map(|e| e.sha256.clone());
        std::fs::write(&path, &compressed)?;
        state.manifest.entries.push(ManifestEntry {
            filename,
            sha256: hash,
            prev_hash,
        });
        state.meta.put_count += 1;
        self.save(&state)?;
        tracing::trace!(%shard, generation, bytes = compressed.len(), "snapshot blob written");
        Ok(())
    }

    fn get(&self, shard: ShardCoord, generation: u64) -> Result<Option<Vec<u8>>, StoreError> {
        let filename = blob_filename(shard, generation);
        let path = self.root.join("snapshots").join(&filename);
        if !path.exists() {
            return Ok(None);
        }
        let compressed = std::fs::read(&path)?;

        // Verify hash against manifest
        let actual = sha256_hex(&compressed);
        if let Some(entry) = self.state.lock().manifest.latest_for(&filename) {
            if entry.sha256 != actual {
                return Err(StoreError::IntegrityMismatch {
                    expected: entry.sha256.clone(),
                    actual,
                });
            }
        }

        Ok(Some(zstd_decompress(&compressed)?))
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore").field("root", &self.root).finish()
    }
}

fn blob_filename(shard: ShardCoord, generation: u64) -> String {
    format!("{}_{}_{}/{:012}.sds.cbor.zst", shard.x, shard.y, shard.z, generation)
}

fn zstd_compress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}
