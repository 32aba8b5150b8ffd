//! Offline image builder.
//!
//! Lays out a fresh volume exactly the way `FileSystem::mount` expects it,
//! handing out blocks and i-nodes strictly in order. Nothing is ever freed
//! here, which is why this does not reuse the engine's allocator.

use super::*;
use disk::{encode_into, DInode, DirEntry, FileKind, Layout, SuperBlock};
use error::{FsError, Result};

use log::{debug, info};
use std::fs;
use std::path::Path;

/// most entries a directory built here can hold
pub const MAX_DIR_ENTS: usize = 128;

/// most blocks an image may have
pub const MAX_IMAGE_BLOCKS: u32 = 2048;

/// most i-nodes an image may have
pub const MAX_IMAGE_INODES: u32 = 1024;

/// Entries collected for one directory until it is finished.
pub struct DirBuilder {
    ino: u32,
    ents: Vec<DirEntry>,
}

impl DirBuilder {
    pub fn ino(&self) -> u32 {
        self.ino
    }
}

pub struct ImageBuilder {
    layout: Layout,
    image: Vec<u8>,
    /// next block to hand out
    diskpos: u32,
    /// next i-node to hand out
    inodepos: u32,
}

impl ImageBuilder {
    pub fn new(nblocks: u32, ninodes: u32) -> Result<Self> {
        if !(2..=MAX_IMAGE_BLOCKS).contains(&nblocks)
            || !(1..=MAX_IMAGE_INODES).contains(&ninodes)
        {
            return Err(FsError::InvalidArgument);
        }
        let layout = Layout::new(nblocks, ninodes);
        let mut builder = Self {
            layout,
            image: vec![0u8; nblocks as usize * BSIZE],
            diskpos: 0,
            inodepos: 0,
        };

        builder.alloc_blocks(BSIZE)?; // reserved
        let sb = builder.alloc_blocks(BSIZE)?;
        builder.put(
            sb,
            0,
            &SuperBlock {
                magic: UFS_MAGIC,
                nblocks,
                ninodes,
                root: DirEntry::new("/", ROOTINO)?,
            },
        )?;

        let bmap = builder.alloc_blocks(layout.bmap_blocks as usize * BSIZE)?;
        let imap = builder.alloc_blocks(layout.imap_blocks as usize * BSIZE)?;
        debug_assert_eq!((bmap, imap), (layout.bmap_start, layout.imap_start));
        builder.blocks_mut(bmap, layout.bmap_blocks).fill(0xff);
        builder.blocks_mut(imap, layout.imap_blocks).fill(0xff);

        let inodes = builder.alloc_blocks(layout.inode_blocks as usize * BSIZE)?;
        debug_assert_eq!(inodes, layout.inode_start);
        for ino in 0..ninodes {
            builder.put_inode(&DInode::new(ino, FileKind::Regular))?;
        }

        let root_ino = builder.alloc_inode()?;
        let mut root = builder.inode(root_ino)?;
        root.kind = FileKind::Directory;
        root.refcnt = 1;
        builder.put_inode(&root)?;
        Ok(builder)
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Claim enough whole blocks for `bytes`, returning the first.
    fn alloc_blocks(&mut self, bytes: usize) -> Result<u32> {
        let start = self.diskpos;
        let end = start as u64 + blocks_for(bytes as u64);
        if end > self.layout.nblocks as u64 {
            return Err(FsError::NoSpace);
        }
        self.diskpos = end as u32;
        Ok(start)
    }

    fn alloc_inode(&mut self) -> Result<u32> {
        if self.inodepos >= self.layout.ninodes {
            return Err(FsError::NoSpace);
        }
        self.inodepos += 1;
        Ok(self.inodepos - 1)
    }

    fn blocks_mut(&mut self, start: u32, count: u32) -> &mut [u8] {
        let from = start as usize * BSIZE;
        &mut self.image[from..from + count as usize * BSIZE]
    }

    fn put<T: serde::Serialize>(&mut self, blockno: u32, offset: usize, value: &T) -> Result<()> {
        let at = blockno as usize * BSIZE + offset;
        encode_into(&mut self.image[at..], value)
    }

    fn inode(&self, ino: u32) -> Result<DInode> {
        let (blockno, offset) = self.layout.inode_pos(ino);
        disk::decode(&self.image[blockno as usize * BSIZE + offset..])
    }

    fn put_inode(&mut self, inode: &DInode) -> Result<()> {
        let (blockno, offset) = self.layout.inode_pos(inode.fileno);
        self.put(blockno, offset, inode)
    }

    pub fn start_dir(&self, ino: u32) -> DirBuilder {
        DirBuilder {
            ino,
            ents: Vec::new(),
        }
    }

    pub fn root(&self) -> DirBuilder {
        self.start_dir(ROOTINO)
    }

    /// New entry in `dir` naming a fresh i-node of `kind`.
    pub fn dir_add(&mut self, dir: &mut DirBuilder, kind: FileKind, name: &str) -> Result<u32> {
        if dir.ents.len() >= MAX_DIR_ENTS {
            return Err(FsError::NoSpace);
        }
        let ino = self.alloc_inode()?;
        dir.ents.push(DirEntry::new(name, ino)?);
        let mut inode = self.inode(ino)?;
        inode.kind = kind;
        inode.refcnt = 1;
        self.put_inode(&inode)?;
        Ok(ino)
    }

    /// Point `ino` at `len` bytes stored contiguously from block `start`,
    /// spilling into an indirect block past the direct slots.
    fn finish_file(&mut self, ino: u32, start: u32, len: usize) -> Result<()> {
        let mut inode = self.inode(ino)?;
        inode.size = len as u32;
        let nblocks = blocks_for(len as u64) as u32;
        for i in 0..nblocks.min(NDIRECT as u32) {
            inode.direct[i as usize] = start + i;
        }
        if nblocks as usize > NDIRECT {
            let ind = self.alloc_blocks(BSIZE)?;
            inode.indirect = ind;
            for i in NDIRECT as u32..nblocks {
                self.put(ind, (i as usize - NDIRECT) * 4, &(start + i))?;
            }
        }
        self.put_inode(&inode)
    }

    /// Add a regular file called `name` holding `data`.
    pub fn add_file(&mut self, dir: &mut DirBuilder, name: &str, data: &[u8]) -> Result<u32> {
        if data.len() as u64 >= MAXFILESIZE {
            return Err(FsError::InvalidArgument);
        }
        let ino = self.dir_add(dir, FileKind::Regular, name)?;
        let start = self.alloc_blocks(data.len())?;
        let at = start as usize * BSIZE;
        self.image[at..at + data.len()].copy_from_slice(data);
        self.finish_file(ino, start, data.len())?;
        debug!("add file {name}: i-node {ino}, {} bytes", data.len());
        Ok(ino)
    }

    /// Write out the entries of `dir`. Even an empty directory gets a block.
    pub fn finish_dir(&mut self, dir: DirBuilder) -> Result<()> {
        let size = (dir.ents.len() * DIRENT_SIZE).max(BSIZE);
        let start = self.alloc_blocks(size)?;
        for (i, entry) in dir.ents.iter().enumerate() {
            self.put(start, i * DIRENT_SIZE, entry)?;
        }
        let size = blocks_for(size as u64) as usize * BSIZE;
        self.finish_file(dir.ino, start, size)
    }

    /// Copy a host file, or a host directory tree, into `dir`.
    pub fn add_host_path(&mut self, dir: &mut DirBuilder, path: &Path) -> Result<u32> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or(FsError::BadPath)?;
        let meta = fs::metadata(path)?;
        if meta.is_dir() {
            let ino = self.dir_add(dir, FileKind::Directory, name)?;
            let mut sub = self.start_dir(ino);
            let mut children: Vec<_> = fs::read_dir(path)?
                .map(|e| e.map(|e| e.path()))
                .collect::<std::io::Result<_>>()?;
            children.sort();
            for child in children {
                self.add_host_path(&mut sub, &child)?;
            }
            self.finish_dir(sub)?;
            Ok(ino)
        } else if meta.is_file() {
            let data = fs::read(path)?;
            self.add_file(dir, name, &data)
        } else {
            Err(FsError::InvalidArgument)
        }
    }

    /// Mark every block and i-node handed out so far as in use and return
    /// the finished image.
    pub fn finish(mut self) -> Vec<u8> {
        let layout = self.layout;
        let used_blocks = self.diskpos;
        let used_inodes = self.inodepos;
        let bmap = self.blocks_mut(layout.bmap_start, layout.bmap_blocks);
        for i in 0..used_blocks as usize {
            bmap[i / 8] &= !(1 << (i % 8));
        }
        let imap = self.blocks_mut(layout.imap_start, layout.imap_blocks);
        for i in 0..used_inodes as usize {
            imap[i / 8] &= !(1 << (i % 8));
        }
        info!(
            "image: {used_blocks}/{} blocks, {used_inodes}/{} i-nodes used",
            layout.nblocks, layout.ninodes
        );
        self.image
    }
}
