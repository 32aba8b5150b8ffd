use super::*;
use blk_dev::BlockDevice;
use error::Result;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

pub struct BlockCache {
    cache: Box<[u8; BSIZE]>,
    blockno: u32,
    dirty: bool,
}

impl BlockCache {
    /// block(disk) -> block(mem). Load a new BlockCache from disk.
    fn load(blockno: u32, blk_dev: &dyn BlockDevice) -> Result<Self> {
        let mut cache = Box::new([0u8; BSIZE]);
        blk_dev.read(blockno as u64 * BLKSECTS as u64, cache.as_mut_slice())?;
        Ok(Self {
            cache,
            blockno,
            dirty: false,
        })
    }

    pub fn data(&self) -> &[u8] {
        self.cache.as_slice()
    }

    /// any mutable access counts as a write
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.dirty = true;
        self.cache.as_mut_slice()
    }

    pub fn get<T: DeserializeOwned>(&self, offset: usize) -> Result<T> {
        assert!(offset < BSIZE);
        disk::decode(&self.cache[offset..])
    }

    pub fn put<T: Serialize>(&mut self, offset: usize, value: &T) -> Result<()> {
        assert!(offset < BSIZE);
        disk::encode_into(&mut self.data_mut()[offset..], value)
    }

    /// block(mem) -> block(disk). Write the BlockCache to disk.
    fn write(&mut self, blk_dev: &dyn BlockDevice) -> Result<()> {
        blk_dev.write(self.blockno as u64 * BLKSECTS as u64, self.cache.as_slice())?;
        self.dirty = false;
        Ok(())
    }
}

/// Write-back cache over the whole device. A block is read in on first
/// touch and stays resident; nothing reaches the disk until `flush`.
pub struct BlockCacheManager {
    blk_dev: Arc<dyn BlockDevice>,
    cached: HashMap<u32 /* blockno */, BlockCache>,
}

impl BlockCacheManager {
    pub fn new(blk_dev: Arc<dyn BlockDevice>) -> Self {
        Self {
            blk_dev,
            cached: HashMap::new(),
        }
    }

    pub fn get_block_cache(&mut self, blockno: u32) -> Result<&mut BlockCache> {
        match self.cached.entry(blockno) {
            Entry::Occupied(hit) => Ok(hit.into_mut()),
            Entry::Vacant(slot) => {
                let block = BlockCache::load(blockno, self.blk_dev.as_ref())?;
                Ok(slot.insert(block))
            }
        }
    }

    pub fn block(&mut self, blockno: u32) -> Result<&[u8]> {
        Ok(self.get_block_cache(blockno)?.data())
    }

    pub fn block_mut(&mut self, blockno: u32) -> Result<&mut [u8]> {
        Ok(self.get_block_cache(blockno)?.data_mut())
    }

    pub fn read<T: DeserializeOwned>(&mut self, blockno: u32, offset: usize) -> Result<T> {
        self.get_block_cache(blockno)?.get(offset)
    }

    pub fn write<T: Serialize>(&mut self, blockno: u32, offset: usize, value: &T) -> Result<()> {
        self.get_block_cache(blockno)?.put(offset, value)
    }

    /// zero a block
    pub fn zero(&mut self, blockno: u32) -> Result<()> {
        self.block_mut(blockno)?.fill(0);
        Ok(())
    }

    pub fn is_dirty(&self, blockno: u32) -> bool {
        self.cached.get(&blockno).is_some_and(|b| b.dirty)
    }

    /// write `blockno` back if it is resident and dirty
    pub fn flush(&mut self, blockno: u32) -> Result<()> {
        if let Some(block) = self.cached.get_mut(&blockno) {
            if block.dirty {
                block.write(self.blk_dev.as_ref())?;
            }
        }
        Ok(())
    }

    pub fn flush_all(&mut self) -> Result<()> {
        let mut dirty: Vec<u32> = self
            .cached
            .values()
            .filter(|b| b.dirty)
            .map(|b| b.blockno)
            .collect();
        dirty.sort_unstable();
        for blockno in dirty {
            self.flush(blockno)?;
        }
        Ok(())
    }
}
