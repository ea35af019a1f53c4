//! The chunk store engine.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use skerry_meta::{MetaError, MetaStore};
use skerry_types::{Address, Chunk, Meta, SHARD_COUNT};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::free_cache::OffsetCache;
use crate::gate::Gate;
use crate::traits::ChunkStore;

/// How long [`close`](ChunkStore::close) waits for in-flight operations.
const DRAIN_DEADLINE: Duration = Duration::from_secs(15);

/// Chunk store configuration.
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// Maximum payload size in bytes. Every section in a shard file is
    /// exactly this large. Must be in `1..=u16::MAX`.
    pub max_chunk_size: usize,
    /// Keep an in-memory cache of reclaimable offsets per shard.
    pub with_cache: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 4096,
            with_cache: true,
        }
    }
}

/// One shard: a file of fixed-size sections and the lock serializing
/// access to it.
///
/// Positioned reads and writes go through [`FileExt`] while holding
/// `lock`, so the file handle carries no cursor state and close can sync
/// it without taking shard locks.
struct Shard {
    file: File,
    lock: Mutex<()>,
}

/// Chunk store partitioned across [`SHARD_COUNT`] shard files.
///
/// See the crate docs for the layout. Construct with [`Store::open`] and
/// operate through the [`ChunkStore`] trait.
impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("shards", &self.shards.len())
            .finish()
    }
}

pub struct Store {
    shards: Vec<Shard>,
    meta: Arc<dyn MetaStore>,
    /// Per-shard hint that the shard may have reclaimable slots. Raised by
    /// delete (and displaced overwrites) before the shard lock is taken;
    /// cleared only by the allocator once both the cache and the metadata
    /// store come up empty.
    free: Vec<AtomicBool>,
    free_cache: Option<OffsetCache>,
    max_chunk_size: usize,
    gate: Gate,
}

impl Store {
    /// Open a store rooted at `dir`, creating the directory and the shard
    /// files `chunks-0.db` … `chunks-31.db` as needed.
    pub fn open(
        dir: impl AsRef<Path>,
        meta: Arc<dyn MetaStore>,
        config: StoreConfig,
    ) -> Result<Self, StoreError> {
        if config.max_chunk_size == 0 || config.max_chunk_size > usize::from(u16::MAX) {
            return Err(StoreError::InvalidMaxChunkSize(config.max_chunk_size));
        }

        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let mut shards = Vec::with_capacity(usize::from(SHARD_COUNT));
        for id in 0..SHARD_COUNT {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(dir.join(format!("chunks-{id}.db")))?;
            shards.push(Shard {
                file,
                lock: Mutex::new(()),
            });
        }

        debug!(
            dir = %dir.display(),
            max_chunk_size = config.max_chunk_size,
            with_cache = config.with_cache,
            "opened chunk store"
        );
        Ok(Self {
            shards,
            meta,
            free: (0..SHARD_COUNT).map(|_| AtomicBool::new(false)).collect(),
            free_cache: config.with_cache.then(OffsetCache::new),
            max_chunk_size: config.max_chunk_size,
            gate: Gate::new(),
        })
    }

    /// Find a reclaimable offset for the shard: hint flag first, then the
    /// cache, then the metadata store. `None` means append at end of file.
    ///
    /// Clears the hint flag when both sources come up empty, so later
    /// writes skip the lookup until the next delete raises it again.
    /// Callers hold the shard lock.
    fn free_slot(&self, shard: u8) -> Result<Option<u64>, StoreError> {
        if !self.free[usize::from(shard)].load(Ordering::Acquire) {
            return Ok(None);
        }
        if let Some(cache) = &self.free_cache
            && let Some(offset) = cache.get(shard)
        {
            return Ok(Some(offset));
        }
        if let Some(offset) = self.meta.free_offset(shard)? {
            return Ok(Some(offset));
        }
        self.free[usize::from(shard)].store(false, Ordering::Release);
        Ok(None)
    }

    /// Append position for a shard: end of file rounded up to the next
    /// section boundary. A failed partial write may leave the file at an
    /// unaligned length; rounding up keeps every recorded offset aligned.
    fn append_offset(&self, file: &File) -> Result<u64, StoreError> {
        let len = file.metadata()?.len();
        Ok(len.next_multiple_of(self.max_chunk_size as u64))
    }

    fn shard(&self, addr: &Address) -> &Shard {
        &self.shards[usize::from(addr.shard())]
    }
}

impl ChunkStore for Store {
    fn get(&self, addr: &Address) -> Result<Chunk, StoreError> {
        let _permit = self.gate.enter()?;

        let sh = self.shard(addr);
        let _lock = sh.lock.lock().expect("shard lock poisoned");

        let meta = self.meta.get(addr)?;
        let mut data = vec![0u8; usize::from(meta.size)];
        let read = read_full_at(&sh.file, &mut data, meta.offset)?;
        if read != data.len() {
            return Err(StoreError::IncompleteData {
                read,
                expected: data.len(),
            });
        }
        Ok(Chunk::new(addr.clone(), data))
    }

    fn has(&self, addr: &Address) -> Result<bool, StoreError> {
        let _permit = self.gate.enter()?;

        let sh = self.shard(addr);
        let _lock = sh.lock.lock().expect("shard lock poisoned");

        match self.meta.get(addr) {
            Ok(_) => Ok(true),
            Err(MetaError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, chunk: &Chunk) -> Result<(), StoreError> {
        let _permit = self.gate.enter()?;

        if chunk.data.len() > self.max_chunk_size {
            return Err(StoreError::ChunkTooLarge {
                size: chunk.data.len(),
                max: self.max_chunk_size,
            });
        }

        let shard = chunk.address.shard();
        let mut section = vec![0u8; self.max_chunk_size];
        section[..chunk.data.len()].copy_from_slice(&chunk.data);

        let sh = &self.shards[usize::from(shard)];
        let _lock = sh.lock.lock().expect("shard lock poisoned");

        let (offset, reclaimed) = match self.free_slot(shard)? {
            Some(offset) => (offset, true),
            None => (self.append_offset(&sh.file)?, false),
        };
        sh.file.write_all_at(&section, offset)?;

        if reclaimed && let Some(cache) = &self.free_cache {
            cache.remove(shard, offset);
        }

        let displaced = self.meta.set(
            &chunk.address,
            shard,
            reclaimed,
            Meta {
                size: chunk.data.len() as u16,
                offset,
            },
        )?;
        if let Some(old) = displaced {
            // The overwritten chunk's slot just became reclaimable.
            self.free[usize::from(shard)].store(true, Ordering::Release);
            if let Some(cache) = &self.free_cache {
                cache.set(shard, old);
            }
        }

        debug!(
            address = %chunk.address,
            shard,
            offset,
            reclaimed,
            size = chunk.data.len(),
            "stored chunk"
        );
        Ok(())
    }

    fn delete(&self, addr: &Address) -> Result<(), StoreError> {
        let _permit = self.gate.enter()?;

        let shard = addr.shard();
        // Raise the hint before taking the shard lock. It may stay raised
        // if the delete fails below; the allocator tolerates stale hints.
        self.free[usize::from(shard)].store(true, Ordering::Release);

        let sh = &self.shards[usize::from(shard)];
        let _lock = sh.lock.lock().expect("shard lock poisoned");

        let offset = if self.free_cache.is_some() {
            Some(self.meta.get(addr)?.offset)
        } else {
            None
        };
        self.meta.remove(addr, shard)?;
        if let (Some(cache), Some(offset)) = (&self.free_cache, offset) {
            cache.set(shard, offset);
        }

        debug!(address = %addr, shard, "deleted chunk");
        Ok(())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.meta.count()?)
    }

    fn iterate(
        &self,
        f: &mut dyn FnMut(Chunk) -> Result<bool, StoreError>,
    ) -> Result<(), StoreError> {
        let _permit = self.gate.enter()?;

        // Take every shard lock, in ascending id order. No other operation
        // holds more than one, so the ordering alone rules out deadlock.
        let _guards: Vec<_> = self
            .shards
            .iter()
            .map(|sh| sh.lock.lock().expect("shard lock poisoned"))
            .collect();

        let mut failure = None;
        self.meta.iterate(&mut |addr, meta| {
            let sh = &self.shards[usize::from(addr.shard())];
            let mut data = vec![0u8; usize::from(meta.size)];
            match read_full_at(&sh.file, &mut data, meta.offset) {
                Ok(read) if read == data.len() => {}
                Ok(read) => {
                    failure = Some(StoreError::IncompleteData {
                        read,
                        expected: data.len(),
                    });
                    return true;
                }
                Err(e) => {
                    failure = Some(e.into());
                    return true;
                }
            }
            match f(Chunk::new(addr, data)) {
                Ok(stop) => stop,
                Err(e) => {
                    failure = Some(e);
                    true
                }
            }
        })?;

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn close(&self) -> Result<(), StoreError> {
        if !self.gate.close(DRAIN_DEADLINE) {
            warn!(
                deadline_secs = DRAIN_DEADLINE.as_secs(),
                "close proceeding with operations still in flight"
            );
        }

        // Sync every shard file even if one fails; the first error wins
        // over the metadata store's close result.
        let mut first_err: Option<io::Error> = None;
        for (id, sh) in self.shards.iter().enumerate() {
            if let Err(e) = sh.file.sync_all() {
                warn!(shard = id, error = %e, "failed to sync shard file");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }

        let meta_result = self.meta.close();
        if let Some(e) = first_err {
            return Err(e.into());
        }
        meta_result?;
        debug!("chunk store closed");
        Ok(())
    }
}

/// Read `buf.len()` bytes at `offset`, tolerating short reads and EOF.
/// Returns the number of bytes actually read.
fn read_full_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
