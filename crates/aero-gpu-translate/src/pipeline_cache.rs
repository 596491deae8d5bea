//! Pipeline object cache.
//!
//! Compiled pipelines are looked up by [`PipelineKey`] in a bounded LRU. Entries are shared
//! (`Arc`) with the runtime's bound-pipeline tracking; evicted entries are handed back to the
//! caller for deferred destruction rather than destroyed in place.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use thiserror::Error;
use tracing::debug;

use crate::state::PipelineKey;
use crate::types::{BindPoint, NativePipeline, ProgramId};

#[derive(Debug)]
pub struct PipelineObject {
    handle: NativePipeline,
    bind_point: BindPoint,
    program: ProgramId,
    key_hash: u64,
    last_used: AtomicU64,
}

impl PipelineObject {
    pub fn new(
        handle: NativePipeline,
        bind_point: BindPoint,
        program: ProgramId,
        key_hash: u64,
        context: u64,
    ) -> Self {
        Self {
            handle,
            bind_point,
            program,
            key_hash,
            last_used: AtomicU64::new(context),
        }
    }

    pub fn handle(&self) -> NativePipeline {
        self.handle
    }

    pub fn bind_point(&self) -> BindPoint {
        self.bind_point
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn key_hash(&self) -> u64 {
        self.key_hash
    }

    /// Serial of the last recording context that used this pipeline.
    pub fn last_used(&self) -> u64 {
        self.last_used.load(Ordering::Relaxed)
    }

    pub fn touch(&self, context: u64) {
        self.last_used.fetch_max(context, Ordering::Relaxed);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub compile_failures: u64,
    pub evictions: u64,
    pub entries: usize,
}

pub struct Realized {
    pub object: Arc<PipelineObject>,
    /// Entry pushed out of the cache to make room.
    pub evicted: Option<Arc<PipelineObject>>,
}

pub struct PipelineCache {
    entries: LruCache<PipelineKey, Arc<PipelineObject>>,
    stats: PipelineCacheStats,
}

impl PipelineCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            stats: PipelineCacheStats::default(),
        }
    }

    pub fn stats(&self) -> PipelineCacheStats {
        PipelineCacheStats {
            entries: self.entries.len(),
            ..self.stats
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks `key` up, compiling through `create` on a miss. A failed compile leaves the cache
    /// untouched so the next attempt starts from scratch.
    pub fn get_or_create(
        &mut self,
        key: PipelineKey,
        bind_point: BindPoint,
        program: ProgramId,
        context: u64,
        create: impl FnOnce(&PipelineKey) -> anyhow::Result<NativePipeline>,
    ) -> anyhow::Result<Realized> {
        if let Some(object) = self.entries.get(&key) {
            self.stats.hits += 1;
            object.touch(context);
            return Ok(Realized {
                object: object.clone(),
                evicted: None,
            });
        }

        self.stats.misses += 1;
        let handle = match create(&key) {
            Ok(handle) => handle,
            Err(err) => {
                self.stats.compile_failures += 1;
                return Err(err);
            }
        };
        debug!(
            key_hash = format_args!("{:016x}", key.hash_value()),
            ?bind_point,
            program = program.0,
            "compiled pipeline"
        );
        let object = Arc::new(PipelineObject::new(
            handle,
            bind_point,
            program,
            key.hash_value(),
            context,
        ));
        let evicted = self.entries.push(key, object.clone()).map(|(_, old)| old);
        if evicted.is_some() {
            self.stats.evictions += 1;
        }
        Ok(Realized { object, evicted })
    }

    /// Removes every pipeline built from `program`.
    pub fn remove_program(&mut self, program: ProgramId) -> Vec<Arc<PipelineObject>> {
        let keys: Vec<PipelineKey> = self
            .entries
            .iter()
            .filter(|(_, obj)| obj.program() == program)
            .map(|(k, _)| k.clone())
            .collect();
        keys.iter().filter_map(|k| self.entries.pop(k)).collect()
    }

    pub fn drain(&mut self) -> Vec<Arc<PipelineObject>> {
        let mut out = Vec::with_capacity(self.entries.len());
        while let Some((_, obj)) = self.entries.pop_lru() {
            out.push(obj);
        }
        out
    }
}

const BLOB_MAGIC: [u8; 8] = *b"AEROPSO\0";
const BLOB_VERSION: u32 = 1;
const BLOB_HEADER_LEN: usize = 8 + 4 + 8 + 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PersistentCacheError {
    #[error("pipeline cache blob is truncated")]
    Truncated,
    #[error("pipeline cache blob has an unknown magic")]
    BadMagic,
    #[error("unsupported pipeline cache blob version {0}")]
    UnsupportedVersion(u32),
    #[error("pipeline cache blob checksum mismatch")]
    ChecksumMismatch,
}

/// Wraps driver pipeline cache data as `magic | version | len | blake3(payload) | payload`.
pub fn encode_blob(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(BLOB_HEADER_LEN + payload.len());
    out.extend_from_slice(&BLOB_MAGIC);
    out.extend_from_slice(&BLOB_VERSION.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(blake3::hash(payload).as_bytes());
    out.extend_from_slice(payload);
    out
}

/// Validates a blob written by [`encode_blob`] and returns its payload.
pub fn decode_blob(blob: &[u8]) -> Result<&[u8], PersistentCacheError> {
    if blob.len() < BLOB_HEADER_LEN {
        return Err(PersistentCacheError::Truncated);
    }
    let (header, payload) = blob.split_at(BLOB_HEADER_LEN);
    if header[..8] != BLOB_MAGIC {
        return Err(PersistentCacheError::BadMagic);
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&header[8..12]);
    let version = u32::from_le_bytes(version);
    if version != BLOB_VERSION {
        return Err(PersistentCacheError::UnsupportedVersion(version));
    }
    let mut len = [0u8; 8];
    len.copy_from_slice(&header[12..20]);
    if u64::from_le_bytes(len) != payload.len() as u64 {
        return Err(PersistentCacheError::Truncated);
    }
    if blake3::hash(payload).as_bytes()[..] != header[20..52] {
        return Err(PersistentCacheError::ChecksumMismatch);
    }
    Ok(payload)
}
