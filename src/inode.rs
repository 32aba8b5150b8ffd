//! Logical block -> physical block translation for one file.

use super::*;
use error::{FsError, Result};
use fs::FileSystem;

/// Handle to the slot holding a block number: either one of the inode's
/// direct pointers or an entry of its indirect block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    Direct { ino: u32, index: usize },
    Indirect { blockno: u32, index: usize },
}

impl FileSystem {
    /// Find the slot responsible for logical block `filebno` of `ino`.
    ///
    /// Slots past the direct range live in the indirect block; if there is
    /// none yet it is allocated (and zeroed) when `alloc` is set, otherwise
    /// the walk fails with `NotFound`. The slot may still hold the null block.
    pub fn resolve_slot(&mut self, ino: u32, filebno: u32, alloc: bool) -> Result<Slot> {
        let filebno = filebno as usize;
        if filebno >= MAXFILE {
            return Err(FsError::InvalidArgument);
        }
        if filebno < NDIRECT {
            self.layout.check_ino(ino)?;
            return Ok(Slot::Direct {
                ino,
                index: filebno,
            });
        }

        let mut inode = self.inode(ino)?;
        if inode.indirect == NULL_BLOCK {
            if !alloc {
                return Err(FsError::NotFound);
            }
            let blockno = self.alloc_block()?;
            self.cache.zero(blockno)?;
            inode.indirect = blockno;
            self.put_inode(&inode)?;
        }
        Ok(Slot::Indirect {
            blockno: inode.indirect,
            index: filebno - NDIRECT,
        })
    }

    pub fn slot_get(&mut self, slot: Slot) -> Result<u32> {
        match slot {
            Slot::Direct { ino, index } => Ok(self.inode(ino)?.direct[index]),
            Slot::Indirect { blockno, index } => self.cache.read(blockno, index * 4),
        }
    }

    pub fn slot_set(&mut self, slot: Slot, value: u32) -> Result<()> {
        match slot {
            Slot::Direct { ino, index } => {
                let mut inode = self.inode(ino)?;
                inode.direct[index] = value;
                self.put_inode(&inode)
            }
            Slot::Indirect { blockno, index } => self.cache.write(blockno, index * 4, &value),
        }
    }

    /// Physical block backing logical block `filebno`, allocating the
    /// indirect block and the data block on first touch. Fresh data blocks
    /// come back zeroed.
    pub fn get_block(&mut self, ino: u32, filebno: u32) -> Result<u32> {
        let slot = self.resolve_slot(ino, filebno, true)?;
        let mut blockno = self.slot_get(slot)?;
        if blockno == NULL_BLOCK {
            blockno = self.alloc_block()?;
            self.cache.zero(blockno)?;
            self.slot_set(slot, blockno)?;
        }
        Ok(blockno)
    }

    /// Like `get_block` but never allocates; `None` for a hole.
    pub fn data_block(&mut self, ino: u32, filebno: u32) -> Result<Option<u32>> {
        let slot = match self.resolve_slot(ino, filebno, false) {
            Ok(slot) => slot,
            Err(FsError::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };
        let blockno = self.slot_get(slot)?;
        Ok((blockno != NULL_BLOCK).then_some(blockno))
    }
}
