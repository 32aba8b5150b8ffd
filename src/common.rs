use super::*;
use disk::{DInode, DirEntry};

/// magic number stored in the superblock
pub const UFS_MAGIC: u32 = 0x4A05_30AF;

/// block size
pub const BSIZE: usize = 4096;

/// bytes per disk sector
pub const SECTSIZE: usize = 512;

/// sectors per block
pub const BLKSECTS: usize = BSIZE / SECTSIZE;

/// bits per bitmap block
pub const BLKBITSIZE: usize = BSIZE * 8;

/// largest volume we can handle (3GB)
pub const DISKSIZE: u64 = 0xC000_0000;

/// block 0 is never handed out, it doubles as the null block number
pub const NULL_BLOCK: u32 = 0;

/// superblock location
pub const SUPER_BLOCK: u32 = 1;

/// first block of the block bitmap
pub const BMAP_START: u32 = 2;

/// root directory i-number
pub const ROOTINO: u32 = 0;

/// direct blocks in inode
pub const NDIRECT: usize = 11;

/// number of block numbers an indirect block holds
pub const NINDIRECT: usize = BSIZE / std::mem::size_of::<u32>();

/// max # of blocks a file can have
pub const MAXFILE: usize = NDIRECT + NINDIRECT;

/// max file size in bytes
pub const MAXFILESIZE: u64 = (MAXFILE * BSIZE) as u64;

/// on-disk inode size
pub const INODE_SIZE: usize = DInode::SIZE;

/// inodes per block
pub const IPB: usize = BSIZE / INODE_SIZE;

/// on-disk directory entry size
pub const DIRENT_SIZE: usize = DirEntry::SIZE;

/// directory entries per block
pub const DPB: usize = BSIZE / DIRENT_SIZE;

/// names must be strictly shorter than this (room for the NUL)
pub const MAXNAMELEN: usize = 124;

/// # of blocks needed to hold `bytes`
pub fn blocks_for(bytes: u64) -> u64 {
    bytes.div_ceil(BSIZE as u64)
}
