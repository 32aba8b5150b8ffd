//! Disk layout:
//! [ reserved | super block | block bitmap | inode bitmap | inode blocks | data blocks ]
//!
//! Bitmaps use 1 = free, 0 = in use. Every record is encoded with bincode's
//! fixed-width little-endian format, so sizes below are exact.

use super::*;
use error::{corrupt, FsError, Result};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

pub fn encode_into<T: Serialize>(buf: &mut [u8], value: &T) -> Result<()> {
    bincode::serialize_into(buf, value)?;
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum FileKind {
    Regular = 0,
    Directory = 1,
}

impl From<FileKind> for u32 {
    fn from(kind: FileKind) -> Self {
        kind as u32
    }
}

impl TryFrom<u32> for FileKind {
    type Error = String;

    fn try_from(raw: u32) -> std::result::Result<Self, Self::Error> {
        match raw {
            0 => Ok(FileKind::Regular),
            1 => Ok(FileKind::Directory),
            _ => Err(format!("unknown file type {raw}")),
        }
    }
}

/// directory entry on disk
#[derive(Clone, Serialize, Deserialize)]
pub struct DirEntry {
    /// NUL padded; an empty name marks a free slot
    #[serde(with = "BigArray")]
    name: [u8; MAXNAMELEN],
    /// inode num
    pub fileno: u32,
}

impl DirEntry {
    pub const SIZE: usize = MAXNAMELEN + 4;

    pub fn new(name: &str, fileno: u32) -> Result<Self> {
        let mut entry = Self::empty();
        entry.set_name(name)?;
        entry.fileno = fileno;
        Ok(entry)
    }

    pub fn empty() -> Self {
        Self {
            name: [0; MAXNAMELEN],
            fileno: 0,
        }
    }

    pub fn is_free(&self) -> bool {
        self.name[0] == 0
    }

    /// name bytes up to the first NUL
    pub fn name_bytes(&self) -> &[u8] {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(MAXNAMELEN);
        &self.name[..len]
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        if name.len() >= MAXNAMELEN {
            return Err(FsError::BadPath);
        }
        if name.is_empty() || name.contains('\0') {
            return Err(FsError::InvalidArgument);
        }
        self.name = [0; MAXNAMELEN];
        self.name[..name.len()].copy_from_slice(name.as_bytes());
        Ok(())
    }

    /// tombstone the slot
    pub fn clear(&mut self) {
        self.name = [0; MAXNAMELEN];
        self.fileno = 0;
    }
}

impl std::fmt::Debug for DirEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirEntry")
            .field("name", &self.name())
            .field("fileno", &self.fileno)
            .finish()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuperBlock {
    /// Must be UFS_MAGIC
    pub magic: u32,
    /// Size of file system image (blocks)
    pub nblocks: u32,
    /// Number of inodes
    pub ninodes: u32,
    /// Entry naming the root directory
    pub root: DirEntry,
}

impl SuperBlock {
    /// byte offset of `root` inside the superblock
    pub const ROOT_OFFSET: usize = 12;
}

/// inode on disk
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DInode {
    /// Must equal the slot this inode occupies
    pub fileno: u32,
    pub kind: FileKind,
    /// Size of file (bytes)
    pub size: u32,
    /// Number of directory entries naming this inode
    pub refcnt: i32,
    /// Data block addresses
    pub direct: [u32; NDIRECT],
    pub indirect: u32,
}

impl DInode {
    pub const SIZE: usize = 16 + NDIRECT * 4 + 4;

    /// a fresh, empty inode for slot `fileno`
    pub fn new(fileno: u32, kind: FileKind) -> Self {
        Self {
            fileno,
            kind,
            size: 0,
            refcnt: 0,
            direct: [NULL_BLOCK; NDIRECT],
            indirect: NULL_BLOCK,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// # of blocks covered by the current size
    pub fn nblocks(&self) -> u32 {
        blocks_for(self.size as u64) as u32
    }
}

/// Where each region lives, derived from the block and inode counts alone.
/// The builder and the mount path must agree on this byte for byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    pub nblocks: u32,
    pub ninodes: u32,
    pub bmap_start: u32,
    pub bmap_blocks: u32,
    pub imap_start: u32,
    pub imap_blocks: u32,
    pub inode_start: u32,
    pub inode_blocks: u32,
}

impl Layout {
    pub fn new(nblocks: u32, ninodes: u32) -> Self {
        let bmap_blocks = (nblocks as usize).div_ceil(BLKBITSIZE) as u32;
        let imap_blocks = (ninodes as usize).div_ceil(BLKBITSIZE) as u32;
        let inode_blocks = (ninodes as usize * INODE_SIZE).div_ceil(BSIZE) as u32;
        let imap_start = BMAP_START + bmap_blocks;
        let inode_start = imap_start + imap_blocks;
        Self {
            nblocks,
            ninodes,
            bmap_start: BMAP_START,
            bmap_blocks,
            imap_start,
            imap_blocks,
            inode_start,
            inode_blocks,
        }
    }

    /// first block after all metadata
    pub fn data_start(&self) -> u32 {
        self.inode_start + self.inode_blocks
    }

    /// (block, byte offset) holding inode `ino`
    pub fn inode_pos(&self, ino: u32) -> (u32, usize) {
        let ino = ino as usize;
        (
            self.inode_start + (ino / IPB) as u32,
            (ino % IPB) * INODE_SIZE,
        )
    }

    pub fn check_ino(&self, ino: u32) -> Result<()> {
        if ino >= self.ninodes {
            return Err(FsError::InvalidArgument);
        }
        Ok(())
    }

    pub fn is_metadata(&self, blockno: u32) -> bool {
        blockno < self.data_start()
    }

    pub fn validate(&self) -> Result<()> {
        if self.ninodes == 0 {
            corrupt!("volume has no inodes");
        }
        if self.data_start() > self.nblocks {
            corrupt!(
                "metadata needs {} blocks but volume has {}",
                self.data_start(),
                self.nblocks
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes_match_layout() {
        let inode = DInode::new(7, FileKind::Directory);
        assert_eq!(bincode::serialize(&inode).unwrap().len(), INODE_SIZE);
        assert_eq!(INODE_SIZE, 64);

        let entry = DirEntry::new("motd", 3).unwrap();
        assert_eq!(bincode::serialize(&entry).unwrap().len(), DIRENT_SIZE);
        assert_eq!(DIRENT_SIZE, 128);

        let sb = SuperBlock {
            magic: UFS_MAGIC,
            nblocks: 10,
            ninodes: 10,
            root: entry,
        };
        let bytes = bincode::serialize(&sb).unwrap();
        assert_eq!(bytes.len(), SuperBlock::ROOT_OFFSET + DIRENT_SIZE);
        assert_eq!(&bytes[SuperBlock::ROOT_OFFSET..SuperBlock::ROOT_OFFSET + 4], b"motd");
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut bytes = bincode::serialize(&DInode::new(0, FileKind::Regular)).unwrap();
        bytes[4] = 9;
        assert!(decode::<DInode>(&bytes).is_err());
    }

    #[test]
    fn layout_placement() {
        let layout = Layout::new(1024, 100);
        assert_eq!(layout.bmap_start, 2);
        assert_eq!(layout.bmap_blocks, 1);
        assert_eq!(layout.imap_start, 3);
        assert_eq!(layout.imap_blocks, 1);
        assert_eq!(layout.inode_start, 4);
        assert_eq!(layout.inode_blocks, 2);
        assert_eq!(layout.data_start(), 6);
        assert_eq!(layout.inode_pos(65), (5, INODE_SIZE));
    }

    #[test]
    fn names_are_bounded() {
        let long = "x".repeat(MAXNAMELEN);
        assert!(matches!(DirEntry::new(&long, 1), Err(FsError::BadPath)));
        let fits = "x".repeat(MAXNAMELEN - 1);
        assert_eq!(DirEntry::new(&fits, 1).unwrap().name(), fits);
    }
}
