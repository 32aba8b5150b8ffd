//! Path-level and byte-level file operations.

use super::*;
use dir::{EntryRef, WalkError};
use disk::{DInode, DirEntry, FileKind};
use error::{FsError, Result};
use fs::FileSystem;

use log::{debug, warn};

impl FileSystem {
    /// Create `path` as a new, empty file of the given kind.
    pub fn create(&mut self, path: &str, kind: FileKind) -> Result<EntryRef> {
        let (dir, name) = self.missing_parent(path)?;
        // a bad name must fail before anything is allocated
        let mut entry = DirEntry::new(&name, 0)?;
        let at = self.alloc_entry(dir)?;
        let ino = self.alloc_inode()?;

        let mut inode = DInode::new(ino, kind);
        inode.refcnt = 1;
        self.put_inode(&inode)?;
        self.flush_inode(ino)?;

        entry.fileno = ino;
        self.set_entry(at, &entry)?;
        self.flush(dir)?;
        debug!("create {path} -> i-node {ino}");
        Ok(at)
    }

    /// Resolve `path` without touching anything.
    pub fn open(&mut self, path: &str) -> Result<EntryRef> {
        Ok(self.walk_path(path)?.entry)
    }

    /// i-number named by `path`
    pub fn open_ino(&mut self, path: &str) -> Result<u32> {
        let at = self.open(path)?;
        Ok(self.entry(at)?.fileno)
    }

    /// Parent directory and final name of a path that must not exist yet.
    fn missing_parent(&mut self, path: &str) -> Result<(u32, String)> {
        match self.walk_path(path) {
            Ok(_) => Err(FsError::AlreadyExists),
            Err(WalkError {
                error: FsError::NotFound,
                parent: Some(parent),
            }) => Ok(parent),
            Err(e) => Err(e.into()),
        }
    }

    /// Read up to `buf.len()` bytes at `offset`. Reading at or past the end
    /// gives 0 bytes; holes read as zeros and stay unallocated.
    pub fn read(&mut self, ino: u32, buf: &mut [u8], offset: u64) -> Result<usize> {
        let size = self.inode(ino)?.size as u64;
        if offset >= size {
            return Ok(0);
        }
        let count = (buf.len() as u64).min(size - offset) as usize;

        let mut done = 0;
        while done < count {
            let pos = offset + done as u64;
            let in_blk = (pos % BSIZE as u64) as usize;
            let bn = (BSIZE - in_blk).min(count - done);
            let dst = &mut buf[done..done + bn];
            match self.data_block(ino, (pos / BSIZE as u64) as u32)? {
                Some(blockno) => {
                    dst.copy_from_slice(&self.cache.block(blockno)?[in_blk..in_blk + bn])
                }
                None => dst.fill(0),
            }
            done += bn;
        }
        Ok(count)
    }

    /// Write `buf` at `offset`, growing the file first if the write ends
    /// past the current size. Blocks are allocated as they are touched.
    pub fn write(&mut self, ino: u32, buf: &[u8], offset: u64) -> Result<usize> {
        let end = offset
            .checked_add(buf.len() as u64)
            .filter(|end| *end <= MAXFILESIZE)
            .ok_or(FsError::InvalidArgument)?;
        if end > self.inode(ino)?.size as u64 {
            self.set_size(ino, end)?;
        }

        let mut done = 0;
        while done < buf.len() {
            let pos = offset + done as u64;
            let in_blk = (pos % BSIZE as u64) as usize;
            let bn = (BSIZE - in_blk).min(buf.len() - done);
            let blockno = self.get_block(ino, (pos / BSIZE as u64) as u32)?;
            self.cache.block_mut(blockno)?[in_blk..in_blk + bn]
                .copy_from_slice(&buf[done..done + bn]);
            done += bn;
        }
        Ok(buf.len())
    }

    /// Set the size of a file, releasing blocks past the new end when it
    /// shrinks. The i-node block is flushed either way.
    pub fn set_size(&mut self, ino: u32, newsize: u64) -> Result<()> {
        if newsize > MAXFILESIZE {
            return Err(FsError::InvalidArgument);
        }
        if self.inode(ino)?.size as u64 > newsize {
            self.truncate_blocks(ino, newsize)?;
            self.zero_tail(ino, newsize)?;
        }
        let mut inode = self.inode(ino)?;
        inode.size = newsize as u32;
        self.put_inode(&inode)?;
        self.flush_inode(ino)
    }

    /// Free the blocks of `ino` that a file of `newsize` bytes no longer
    /// needs, and the indirect block once everything fits in direct slots.
    /// The stored size is left alone.
    fn truncate_blocks(&mut self, ino: u32, newsize: u64) -> Result<()> {
        let old_nblocks = self.inode(ino)?.nblocks();
        let new_nblocks = blocks_for(newsize) as u32;
        for filebno in new_nblocks..old_nblocks {
            if let Err(e) = self.free_file_block(ino, filebno) {
                if e.is_fatal() {
                    return Err(e);
                }
                // leaking a block is safe, stopping halfway is not
                warn!("i-node {ino}: could not free file block {filebno}: {e}");
            }
        }

        let mut inode = self.inode(ino)?;
        if new_nblocks as usize <= NDIRECT && inode.indirect != NULL_BLOCK {
            self.free_block(inode.indirect)?;
            inode.indirect = NULL_BLOCK;
            self.put_inode(&inode)?;
        }
        Ok(())
    }

    /// Remove one block from a file; a hole is left as is.
    fn free_file_block(&mut self, ino: u32, filebno: u32) -> Result<()> {
        let slot = self.resolve_slot(ino, filebno, false)?;
        let blockno = self.slot_get(slot)?;
        if blockno != NULL_BLOCK {
            self.free_block(blockno)?;
            self.slot_set(slot, NULL_BLOCK)?;
        }
        Ok(())
    }

    /// Clear the bytes past `newsize` in what is now the last block, so a
    /// later grow never exposes old contents.
    fn zero_tail(&mut self, ino: u32, newsize: u64) -> Result<()> {
        let in_blk = (newsize % BSIZE as u64) as usize;
        if in_blk == 0 {
            return Ok(());
        }
        if let Some(blockno) = self.data_block(ino, (newsize / BSIZE as u64) as u32)? {
            self.cache.block_mut(blockno)?[in_blk..].fill(0);
        }
        Ok(())
    }

    /// Write back every data block of the file, then its i-node block and
    /// its indirect block. Clean blocks are skipped by the cache.
    pub fn flush(&mut self, ino: u32) -> Result<()> {
        let inode = self.inode(ino)?;
        for filebno in 0..inode.nblocks() {
            if let Some(blockno) = self.data_block(ino, filebno)? {
                self.cache.flush(blockno)?;
            }
        }
        self.flush_inode(ino)?;
        if inode.indirect != NULL_BLOCK {
            self.cache.flush(inode.indirect)?;
        }
        Ok(())
    }

    /// Unlink `path`. The i-node and its blocks go away with the last link.
    pub fn remove(&mut self, path: &str) -> Result<()> {
        let walk = self.walk_path(path)?;
        let dir = walk.dir.ok_or(FsError::InvalidArgument)?;
        let mut entry = self.entry(walk.entry)?;
        let ino = entry.fileno;

        let inode = self.inode(ino)?;
        if inode.is_dir() && !self.read_dir(ino)?.is_empty() {
            return Err(FsError::DirNotEmpty);
        }

        entry.clear();
        self.set_entry(walk.entry, &entry)?;
        self.flush(dir)?;

        if inode.refcnt == 1 {
            self.set_size(ino, 0)?;
        }
        self.decref_inode(ino)?;
        self.flush_inode(ino)?;
        debug!("remove {path} (i-node {ino})");
        Ok(())
    }

    /// Give the regular file at `target` a second name, `linkpath`.
    pub fn link(&mut self, target: &str, linkpath: &str) -> Result<EntryRef> {
        let ino = self.open_ino(target)?;
        let mut inode = self.inode(ino)?;
        if inode.is_dir() {
            return Err(FsError::InvalidArgument);
        }

        let (dir, name) = self.missing_parent(linkpath)?;
        let entry = DirEntry::new(&name, ino)?;
        let at = self.alloc_entry(dir)?;
        self.set_entry(at, &entry)?;

        inode.refcnt += 1;
        self.put_inode(&inode)?;
        self.flush_inode(ino)?;
        self.flush(dir)?;
        Ok(at)
    }
}
