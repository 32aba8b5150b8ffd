use super::*;
use blk_cch::BlockCacheManager;
use error::Result;

/// One bit per item, 1 = free, 0 = in use.
#[derive(Clone, Copy, Debug)]
pub struct BitMap {
    start: u32,
    nbits: u32, // # of items tracked, not # of bitmap blocks
}

impl BitMap {
    pub fn new(start_block_no: u32, nbits: u32) -> Self {
        Self {
            start: start_block_no,
            nbits,
        }
    }

    /// (bitmap block, byte, mask) for item `n`
    fn locate(&self, n: u32) -> (u32, usize, u8) {
        let n = n as usize;
        let bi = n / BLKBITSIZE; // segment
        let bj = n % BLKBITSIZE; // offset
        (self.start + bi as u32, bj / 8, 1 << (bj % 8))
    }

    pub fn block_of(&self, n: u32) -> u32 {
        self.locate(n).0
    }

    /// out of range items are never free
    pub fn is_free(&self, blk_cch_mgr: &mut BlockCacheManager, n: u32) -> Result<bool> {
        if n >= self.nbits {
            return Ok(false);
        }
        let (blockno, byte, mask) = self.locate(n);
        Ok(blk_cch_mgr.block(blockno)?[byte] & mask != 0)
    }

    /// Claim the lowest free item. The bitmap block is written through
    /// before returning, so the claim is durable by the time the caller sees it.
    pub fn alloc(&self, blk_cch_mgr: &mut BlockCacheManager) -> Result<Option<u32>> {
        let mut n = 0;
        while n < self.nbits {
            let blockno = self.block_of(n);
            let cache = blk_cch_mgr.block(blockno)?;
            let found = (0..BLKBITSIZE)
                .take_while(|bj| n + (*bj as u32) < self.nbits)
                .find(|bj| cache[bj / 8] & (1 << (bj % 8)) != 0);
            if let Some(bj) = found {
                blk_cch_mgr.block_mut(blockno)?[bj / 8] &= !(1 << (bj % 8));
                blk_cch_mgr.flush(blockno)?;
                return Ok(Some(n + bj as u32));
            }
            n += BLKBITSIZE as u32;
        }
        Ok(None)
    }

    /// Mark `n` free. The change stays in the cache until the next flush.
    pub fn set_free(&self, blk_cch_mgr: &mut BlockCacheManager, n: u32) -> Result<()> {
        assert!(n < self.nbits);
        let (blockno, byte, mask) = self.locate(n);
        blk_cch_mgr.block_mut(blockno)?[byte] |= mask;
        Ok(())
    }

    /// # of free items, for accounting and tests
    pub fn count_free(&self, blk_cch_mgr: &mut BlockCacheManager) -> Result<u32> {
        let mut free = 0;
        for n in 0..self.nbits {
            if self.is_free(blk_cch_mgr, n)? {
                free += 1;
            }
        }
        Ok(free)
    }
}
