//! Directory entries and path walking.
//!
//! A directory is a file holding packed `DirEntry` records. Its size is
//! always a whole number of blocks.

use super::*;
use disk::{DInode, DirEntry, SuperBlock};
use error::{corrupt, FsError, Result};
use fs::FileSystem;

/// Where a directory entry lives: a block and a byte offset inside it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryRef {
    pub blockno: u32,
    pub offset: usize,
}

impl EntryRef {
    /// the root entry kept in the superblock
    pub const ROOT: EntryRef = EntryRef {
        blockno: SUPER_BLOCK,
        offset: SuperBlock::ROOT_OFFSET,
    };
}

/// Successful path walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Walk {
    /// directory holding the entry; `None` for the root
    pub dir: Option<u32>,
    pub entry: EntryRef,
}

/// Failed path walk. When only the final component is missing, `parent`
/// names the directory it would go in and the missing name.
#[derive(Debug)]
pub struct WalkError {
    pub error: FsError,
    pub parent: Option<(u32, String)>,
}

impl From<FsError> for WalkError {
    fn from(error: FsError) -> Self {
        Self {
            error,
            parent: None,
        }
    }
}

impl From<WalkError> for FsError {
    fn from(e: WalkError) -> Self {
        e.error
    }
}

impl FileSystem {
    pub fn entry(&mut self, at: EntryRef) -> Result<DirEntry> {
        self.cache.read(at.blockno, at.offset)
    }

    pub(crate) fn set_entry(&mut self, at: EntryRef, entry: &DirEntry) -> Result<()> {
        self.cache.write(at.blockno, at.offset, entry)
    }

    fn dir_inode(&mut self, dir: u32) -> Result<DInode> {
        let inode = self.inode(dir)?;
        if !inode.is_dir() {
            return Err(FsError::NotFound);
        }
        // We maintain the invariant that the size of a directory-file
        // is always a multiple of the file system's block size.
        if inode.size as usize % BSIZE != 0 {
            corrupt!("directory {dir} has partial block size {}", inode.size);
        }
        Ok(inode)
    }

    /// Visit entry slots of `dir` in block order, then slot order, until
    /// `pred` matches one.
    fn find_entry<F>(&mut self, dir: u32, mut pred: F) -> Result<Option<EntryRef>>
    where
        F: FnMut(&DirEntry) -> bool,
    {
        let nblock = self.dir_inode(dir)?.nblocks();
        for i in 0..nblock {
            let blockno = self.get_block(dir, i)?;
            for j in 0..DPB {
                let at = EntryRef {
                    blockno,
                    offset: j * DIRENT_SIZE,
                };
                if pred(&self.entry(at)?) {
                    return Ok(Some(at));
                }
            }
        }
        Ok(None)
    }

    /// Entry called `name` in `dir`.
    pub fn lookup(&mut self, dir: u32, name: &str) -> Result<EntryRef> {
        self.find_entry(dir, |e| !e.is_free() && e.name_bytes() == name.as_bytes())?
            .ok_or(FsError::NotFound)
    }

    /// A free slot in `dir`, growing the directory by one whole block when
    /// every existing slot is taken. The caller fills the entry in.
    pub fn alloc_entry(&mut self, dir: u32) -> Result<EntryRef> {
        if let Some(at) = self.find_entry(dir, DirEntry::is_free)? {
            return Ok(at);
        }
        let mut inode = self.dir_inode(dir)?;
        let nblock = inode.nblocks();
        if nblock as usize >= MAXFILE {
            return Err(FsError::NoSpace);
        }
        let had_indirect = inode.indirect != NULL_BLOCK;
        inode.size += BSIZE as u32;
        self.put_inode(&inode)?;
        match self.get_block(dir, nblock) {
            Ok(blockno) => Ok(EntryRef { blockno, offset: 0 }),
            Err(e) => {
                // get_block may have attached a fresh indirect block before failing
                let mut inode = self.inode(dir)?;
                inode.size -= BSIZE as u32;
                if !had_indirect && inode.indirect != NULL_BLOCK {
                    self.free_block(inode.indirect)?;
                    inode.indirect = NULL_BLOCK;
                }
                self.put_inode(&inode)?;
                Err(e)
            }
        }
    }

    /// Live entries of `dir`, in on-disk order.
    pub fn read_dir(&mut self, dir: u32) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        self.find_entry(dir, |e| {
            if !e.is_free() {
                entries.push(e.clone());
            }
            false
        })?;
        Ok(entries)
    }

    /// Evaluate `path` from the root. Runs of '/' are skipped, so "a//b/"
    /// and "/a/b" name the same file.
    pub fn walk_path(&mut self, path: &str) -> std::result::Result<Walk, WalkError> {
        let mut rest = path.trim_start_matches('/');
        let mut entry = EntryRef::ROOT;
        let mut dir = None;

        while !rest.is_empty() {
            let cur = self.entry(entry)?.fileno;
            let (name, tail) = rest.split_once('/').unwrap_or((rest, ""));
            if name.len() >= MAXNAMELEN {
                return Err(FsError::BadPath.into());
            }
            rest = tail.trim_start_matches('/');

            if !self.inode(cur)?.is_dir() {
                return Err(FsError::NotFound.into());
            }
            dir = Some(cur);
            entry = match self.lookup(cur, name) {
                Ok(found) => found,
                Err(FsError::NotFound) if rest.is_empty() => {
                    return Err(WalkError {
                        error: FsError::NotFound,
                        parent: Some((cur, name.to_string())),
                    })
                }
                Err(e) => return Err(e.into()),
            };
        }
        Ok(Walk { dir, entry })
    }
}
