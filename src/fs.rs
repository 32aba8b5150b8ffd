use super::*;
use bitmap::BitMap;
use blk_cch::BlockCacheManager;
use blk_dev::BlockDevice;
use disk::{DInode, Layout, SuperBlock};
use error::{corrupt, FsError, Result};

use log::{debug, info};
use std::sync::Arc;

/// A mounted volume.
///
/// Owns the cache and every piece of volume-wide state. All operations take
/// `&mut self`; callers that share a volume across threads wrap the whole
/// thing in one lock.
pub struct FileSystem {
    pub(crate) cache: BlockCacheManager,
    pub(crate) layout: Layout,
    super_blk: SuperBlock,
    bitmap_b: BitMap,
    bitmap_i: BitMap,
}

impl FileSystem {
    /// Read the superblock, place the bitmaps and the inode table, and run
    /// the mount-time integrity checks. Any failed check means the volume is
    /// corrupt and comes back as `FsError::Corrupt`.
    pub fn mount(blk_dev: Arc<dyn BlockDevice>) -> Result<Self> {
        let capacity = blk_dev.num_blocks();
        let mut cache = BlockCacheManager::new(blk_dev);
        if capacity <= SUPER_BLOCK as u64 {
            corrupt!("device holds only {capacity} blocks");
        }
        let super_blk: SuperBlock = cache.read(SUPER_BLOCK, 0)?;
        check_super(&super_blk, capacity)?;

        let layout = Layout::new(super_blk.nblocks, super_blk.ninodes);
        layout.validate()?;
        let mut fs = Self {
            cache,
            layout,
            bitmap_b: BitMap::new(layout.bmap_start, layout.nblocks),
            bitmap_i: BitMap::new(layout.imap_start, layout.ninodes),
            super_blk,
        };
        fs.check_block_bitmap()?;
        fs.check_inode_bitmap()?;
        fs.check_inodes()?;
        Ok(fs)
    }

    pub fn super_blk(&self) -> &SuperBlock {
        &self.super_blk
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    fn check_block_bitmap(&mut self) -> Result<()> {
        // reserved block, superblock, both bitmaps and the inode table
        for blockno in 0..self.layout.data_start() {
            if self.block_is_free(blockno)? {
                corrupt!("metadata block {blockno} is marked free");
            }
        }
        info!("block bitmap is good");
        Ok(())
    }

    fn check_inode_bitmap(&mut self) -> Result<()> {
        if self.inode_is_free(ROOTINO)? {
            corrupt!("root i-node is marked free");
        }
        info!("i-node bitmap is good");
        Ok(())
    }

    fn check_inodes(&mut self) -> Result<()> {
        for ino in 0..self.layout.ninodes {
            let inode = match self.inode(ino) {
                Ok(inode) => inode,
                Err(FsError::Codec(e)) => corrupt!("i-node {ino} is unreadable: {e}"),
                Err(e) => return Err(e),
            };
            if inode.fileno != ino {
                corrupt!("i-node slot {ino} claims to be {}", inode.fileno);
            }
        }
        let root = self.inode(ROOTINO)?;
        if !root.is_dir() {
            corrupt!("root i-node is not a directory");
        }
        info!("i-nodes are good");
        Ok(())
    }

    // --------------------------------------------------------------
    // Free block bitmap
    // --------------------------------------------------------------

    pub fn block_is_free(&mut self, blockno: u32) -> Result<bool> {
        self.bitmap_b.is_free(&mut self.cache, blockno)
    }

    /// Lowest-numbered free block. The bitmap change is on disk before this
    /// returns.
    pub fn alloc_block(&mut self) -> Result<u32> {
        match self.bitmap_b.alloc(&mut self.cache)? {
            Some(NULL_BLOCK) => corrupt!("block bitmap hands out the null block"),
            Some(blockno) => {
                debug!("alloc block {blockno}");
                Ok(blockno)
            }
            None => Err(FsError::NoSpace),
        }
    }

    pub fn free_block(&mut self, blockno: u32) -> Result<()> {
        // block 0 is the null pointer of block numbers
        if blockno == NULL_BLOCK {
            corrupt!("attempt to free zero block");
        }
        if blockno >= self.layout.nblocks {
            corrupt!("attempt to free block {blockno} past end of volume");
        }
        if self.layout.is_metadata(blockno) {
            corrupt!("attempt to free metadata block {blockno}");
        }
        if self.block_is_free(blockno)? {
            corrupt!("attempt to free already free block {blockno}");
        }
        debug!("free block {blockno}");
        self.bitmap_b.set_free(&mut self.cache, blockno)
    }

    pub fn free_block_count(&mut self) -> Result<u32> {
        self.bitmap_b.count_free(&mut self.cache)
    }

    // --------------------------------------------------------------
    // Free i-node bitmap
    // --------------------------------------------------------------

    pub fn inode_is_free(&mut self, ino: u32) -> Result<bool> {
        self.bitmap_i.is_free(&mut self.cache, ino)
    }

    /// Claim the lowest free i-node. Like `alloc_block`, the bitmap bit is
    /// flushed before the number is returned; the record itself is left as is.
    pub fn alloc_inode(&mut self) -> Result<u32> {
        match self.bitmap_i.alloc(&mut self.cache)? {
            Some(ino) => {
                debug!("alloc i-node {ino}");
                Ok(ino)
            }
            None => Err(FsError::NoSpace),
        }
    }

    /// Release an i-node whose reference count already dropped to zero.
    pub fn free_inode(&mut self, ino: u32) -> Result<()> {
        self.layout.check_ino(ino)?;
        let refcnt = self.inode(ino)?.refcnt;
        if refcnt != 0 {
            corrupt!("attempt to free an i-node with non-zero refcnt {refcnt}");
        }
        // fileno zero is the root directory
        if ino == ROOTINO {
            corrupt!("attempt to free root directory");
        }
        if self.inode_is_free(ino)? {
            corrupt!("attempt to free already free i-node {ino}");
        }
        debug!("free i-node {ino}");
        self.bitmap_i.set_free(&mut self.cache, ino)
    }

    /// Drop one reference, releasing the i-node when none remain.
    pub fn decref_inode(&mut self, ino: u32) -> Result<()> {
        let mut inode = self.inode(ino)?;
        if inode.refcnt <= 0 {
            corrupt!(
                "attempt to decref an i-node with non-positive refcnt {}",
                inode.refcnt
            );
        }
        inode.refcnt -= 1;
        self.put_inode(&inode)?;
        if inode.refcnt == 0 {
            self.free_inode(ino)?;
        }
        Ok(())
    }

    pub fn free_inode_count(&mut self) -> Result<u32> {
        self.bitmap_i.count_free(&mut self.cache)
    }

    // --------------------------------------------------------------
    // I-node table
    // --------------------------------------------------------------

    /// copy of i-node `ino` as it sits in the cache
    pub fn inode(&mut self, ino: u32) -> Result<DInode> {
        self.layout.check_ino(ino)?;
        let (blockno, offset) = self.layout.inode_pos(ino);
        self.cache.read(blockno, offset)
    }

    pub fn stat(&mut self, ino: u32) -> Result<DInode> {
        self.inode(ino)
    }

    /// store an i-node back into its slot; reaches the disk on the next flush
    pub(crate) fn put_inode(&mut self, inode: &DInode) -> Result<()> {
        self.layout.check_ino(inode.fileno)?;
        let (blockno, offset) = self.layout.inode_pos(inode.fileno);
        self.cache.write(blockno, offset, inode)
    }

    pub(crate) fn flush_inode(&mut self, ino: u32) -> Result<()> {
        let (blockno, _) = self.layout.inode_pos(ino);
        self.cache.flush(blockno)
    }

    /// Write back every block of the volume. A big hammer.
    pub fn sync(&mut self) -> Result<()> {
        self.cache.flush_all()
    }
}

fn check_super(super_blk: &SuperBlock, capacity: u64) -> Result<()> {
    if super_blk.magic != UFS_MAGIC {
        corrupt!("bad unix file system magic number {:#x}", super_blk.magic);
    }
    if super_blk.nblocks as u64 > DISKSIZE / BSIZE as u64 {
        corrupt!("file system is too large");
    }
    if super_blk.nblocks as u64 > capacity {
        corrupt!(
            "file system claims {} blocks but the device holds {capacity}",
            super_blk.nblocks
        );
    }
    if super_blk.root.fileno != ROOTINO {
        corrupt!("root entry names i-node {}", super_blk.root.fileno);
    }
    info!("superblock is good");
    Ok(())
}
