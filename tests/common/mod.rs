//! Common utilities for tests

#![allow(unused)]

use std::sync::Arc;

use ufs::{FileSystem, ImageBuilder, RamDisk};

pub fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Format a ram disk holding an empty root directory and mount it.
pub fn fresh_fs(nblocks: u32, ninodes: u32) -> (Arc<RamDisk>, FileSystem) {
    let mut builder = ImageBuilder::new(nblocks, ninodes).unwrap();
    let root = builder.root();
    builder.finish_dir(root).unwrap();
    mount_image(builder.finish())
}

pub fn mount_image(image: Vec<u8>) -> (Arc<RamDisk>, FileSystem) {
    init_log();
    let dev = Arc::new(RamDisk::from_image(image));
    let fs = FileSystem::mount(dev.clone()).unwrap();
    (dev, fs)
}

/// Mount the device again, dropping everything only held in the old cache.
pub fn remount(dev: &Arc<RamDisk>) -> FileSystem {
    FileSystem::mount(Arc::new(RamDisk::from_image(dev.image()))).unwrap()
}

/// Free bits in the block bitmap.
pub fn free_blocks(fs: &mut FileSystem) -> u32 {
    fs.free_block_count().unwrap()
}

pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
