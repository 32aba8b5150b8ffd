//! A small unix-style file system engine.
//!
//! Volumes are a flat array of blocks holding a superblock, a block bitmap,
//! an i-node bitmap, an i-node table and data blocks. Files address their
//! data through direct block pointers plus one indirect block.
//!
//! The engine is single-writer: every operation takes `&mut FileSystem`
//! and runs to completion on the caller's thread.

mod bitmap; // free block / free i-node bitmaps
mod blk_cch; // cache for block devices
mod blk_dev;
mod common;
mod dir;
mod disk; // on-disk records and layout
mod error;
mod file;
mod fs; // file system
mod inode;
pub mod mkfs;

pub use blk_cch::{BlockCache, BlockCacheManager};
pub use blk_dev::{BlockDevice, FileDisk, RamDisk};
pub use common::*;
pub use dir::{EntryRef, Walk, WalkError};
pub use disk::{DInode, DirEntry, FileKind, Layout, SuperBlock};
pub use error::{FsError, Result};
pub use fs::FileSystem;
pub use inode::Slot;
pub use mkfs::{DirBuilder, ImageBuilder};
