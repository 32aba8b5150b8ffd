mod common;

use common::{free_blocks, fresh_fs, pattern, remount};
use ufs::{
    FileKind, FileSystem, FsError, Slot, BSIZE, MAXFILE, MAXFILESIZE, NDIRECT, NULL_BLOCK,
};

fn new_file(fs: &mut FileSystem, path: &str) -> u32 {
    let at = fs.create(path, FileKind::Regular).unwrap();
    fs.entry(at).unwrap().fileno
}

#[test]
fn write_then_read_back() {
    let (_, mut fs) = fresh_fs(128, 32);
    let ino = new_file(&mut fs, "/data");

    // spans the direct/indirect boundary at an unaligned offset
    let data = pattern(3 * BSIZE + 123, 7);
    let offset = (NDIRECT as u64 - 2) * BSIZE as u64 + 77;
    assert_eq!(fs.write(ino, &data, offset).unwrap(), data.len());
    assert_eq!(fs.stat(ino).unwrap().size as u64, offset + data.len() as u64);

    let mut back = vec![0u8; data.len()];
    assert_eq!(fs.read(ino, &mut back, offset).unwrap(), data.len());
    assert_eq!(back, data);

    // small overwrite in the middle
    fs.write(ino, b"hello", offset + 10).unwrap();
    let mut five = [0u8; 5];
    fs.read(ino, &mut five, offset + 10).unwrap();
    assert_eq!(&five, b"hello");
}

#[test]
fn read_is_clamped_to_size() {
    let (_, mut fs) = fresh_fs(64, 32);
    let ino = new_file(&mut fs, "/short");
    fs.write(ino, b"0123456789", 0).unwrap();

    let mut buf = [0xaau8; 32];
    assert_eq!(fs.read(ino, &mut buf, 4).unwrap(), 6);
    assert_eq!(&buf[..6], b"456789");
    assert_eq!(buf[6], 0xaa);
    assert_eq!(fs.read(ino, &mut buf, 10).unwrap(), 0);
    assert_eq!(fs.read(ino, &mut buf, 1000).unwrap(), 0);
}

#[test]
fn holes_read_as_zero_without_allocating() {
    let (_, mut fs) = fresh_fs(64, 32);
    let ino = new_file(&mut fs, "/sparse");
    let free = free_blocks(&mut fs);

    fs.set_size(ino, 5 * BSIZE as u64).unwrap();
    assert_eq!(free_blocks(&mut fs), free);

    let mut buf = vec![0xffu8; 2 * BSIZE];
    assert_eq!(fs.read(ino, &mut buf, BSIZE as u64).unwrap(), buf.len());
    assert!(buf.iter().all(|&b| b == 0));
    assert_eq!(free_blocks(&mut fs), free);

    // writing the last byte only claims the last block
    fs.write(ino, &[1], 5 * BSIZE as u64 - 1).unwrap();
    assert_eq!(free_blocks(&mut fs), free - 1);
}

#[test]
fn write_past_max_file_size_is_rejected() {
    let (_, mut fs) = fresh_fs(64, 32);
    let ino = new_file(&mut fs, "/f");
    let e = fs.write(ino, b"x", MAXFILESIZE).unwrap_err();
    assert!(matches!(e, FsError::InvalidArgument));
    assert_eq!(fs.stat(ino).unwrap().size, 0);
    assert!(matches!(
        fs.set_size(ino, MAXFILESIZE + 1),
        Err(FsError::InvalidArgument)
    ));
}

#[test]
fn resolve_slot_ranges() {
    let (_, mut fs) = fresh_fs(64, 32);
    let ino = new_file(&mut fs, "/f");

    assert_eq!(
        fs.resolve_slot(ino, 3, false).unwrap(),
        Slot::Direct { ino, index: 3 }
    );
    assert!(matches!(
        fs.resolve_slot(ino, NDIRECT as u32, false),
        Err(FsError::NotFound)
    ));
    assert!(matches!(
        fs.resolve_slot(ino, MAXFILE as u32, true),
        Err(FsError::InvalidArgument)
    ));

    let slot = fs.resolve_slot(ino, NDIRECT as u32 + 4, true).unwrap();
    let indirect = fs.stat(ino).unwrap().indirect;
    assert_ne!(indirect, NULL_BLOCK);
    assert_eq!(slot, Slot::Indirect { blockno: indirect, index: 4 });
    // fresh indirect block holds only null pointers
    assert_eq!(fs.slot_get(slot).unwrap(), NULL_BLOCK);
}

#[test]
fn get_block_allocates_once() {
    let (_, mut fs) = fresh_fs(64, 32);
    let ino = new_file(&mut fs, "/f");
    let free = free_blocks(&mut fs);

    let b = fs.get_block(ino, 2).unwrap();
    assert_eq!(fs.get_block(ino, 2).unwrap(), b);
    assert_eq!(fs.stat(ino).unwrap().direct[2], b);
    assert_eq!(free_blocks(&mut fs), free - 1);

    // first touch past the direct slots also brings in the indirect block
    fs.get_block(ino, NDIRECT as u32).unwrap();
    assert_eq!(free_blocks(&mut fs), free - 3);
}

#[test]
fn shrinking_frees_exactly_the_trailing_blocks() {
    let (_, mut fs) = fresh_fs(128, 32);
    let ino = new_file(&mut fs, "/big");
    let free = free_blocks(&mut fs);

    let nblocks = NDIRECT + 5;
    fs.write(ino, &pattern(nblocks * BSIZE, 1), 0).unwrap();
    // data blocks plus the indirect block
    assert_eq!(free_blocks(&mut fs), free - nblocks as u32 - 1);

    // still needs the indirect block
    fs.set_size(ino, (NDIRECT as u64 + 2) * BSIZE as u64).unwrap();
    assert_eq!(free_blocks(&mut fs), free - (NDIRECT as u32 + 2) - 1);
    assert_ne!(fs.stat(ino).unwrap().indirect, NULL_BLOCK);

    // fits in direct slots: indirect block goes too
    fs.set_size(ino, 3 * BSIZE as u64 - 1).unwrap();
    assert_eq!(free_blocks(&mut fs), free - 3);
    let inode = fs.stat(ino).unwrap();
    assert_eq!(inode.indirect, NULL_BLOCK);
    assert_eq!(inode.size as usize, 3 * BSIZE - 1);
    assert!(inode.direct[3..].iter().all(|&b| b == NULL_BLOCK));

    fs.set_size(ino, 0).unwrap();
    assert_eq!(free_blocks(&mut fs), free);
}

#[test]
fn regrown_tail_reads_as_zero() {
    let (_, mut fs) = fresh_fs(64, 32);
    let ino = new_file(&mut fs, "/f");
    fs.write(ino, &[0x55; 100], 0).unwrap();
    fs.set_size(ino, 10).unwrap();
    fs.set_size(ino, 100).unwrap();

    let mut buf = [0xffu8; 100];
    fs.read(ino, &mut buf, 0).unwrap();
    assert!(buf[..10].iter().all(|&b| b == 0x55));
    assert!(buf[10..].iter().all(|&b| b == 0));
}

#[test]
fn reused_blocks_come_back_zeroed() {
    let (_, mut fs) = fresh_fs(64, 32);
    let a = new_file(&mut fs, "/a");
    fs.write(a, &[0xee; BSIZE], 0).unwrap();
    let old = fs.stat(a).unwrap().direct[0];
    fs.set_size(a, 0).unwrap();

    let b = new_file(&mut fs, "/b");
    fs.write(b, b"x", 10).unwrap();
    assert_eq!(fs.stat(b).unwrap().direct[0], old);
    let mut buf = [0xffu8; 11];
    fs.read(b, &mut buf, 0).unwrap();
    assert_eq!(&buf[..10], &[0u8; 10]);
}

#[test]
fn flush_makes_contents_durable() {
    let (dev, mut fs) = fresh_fs(64, 32);
    let ino = new_file(&mut fs, "/persist");
    let data = pattern(2 * BSIZE + 5, 3);
    fs.write(ino, &data, 0).unwrap();
    fs.flush(ino).unwrap();

    let mut again = remount(&dev);
    let ino = again.open_ino("/persist").unwrap();
    let mut back = vec![0u8; data.len()];
    assert_eq!(again.read(ino, &mut back, 0).unwrap(), data.len());
    assert_eq!(back, data);
}

#[test]
fn unflushed_contents_are_not_on_disk() {
    let (dev, mut fs) = fresh_fs(64, 32);
    let ino = new_file(&mut fs, "/volatile");
    fs.write(ino, b"not yet", 0).unwrap();

    // the size change is flushed by set_size, the bytes are not
    let mut again = remount(&dev);
    let ino = again.open_ino("/volatile").unwrap();
    assert_eq!(again.stat(ino).unwrap().size, 7);
    let mut buf = [0xffu8; 7];
    again.read(ino, &mut buf, 0).unwrap();
    assert_eq!(&buf, &[0u8; 7]);
}

#[test]
fn sync_writes_back_everything() {
    let (dev, mut fs) = fresh_fs(64, 32);
    let ino = new_file(&mut fs, "/s");
    fs.write(ino, b"synced", 0).unwrap();
    let spare = fs.alloc_block().unwrap();
    fs.free_block(spare).unwrap();
    fs.sync().unwrap();

    let mut again = remount(&dev);
    assert!(again.block_is_free(spare).unwrap());
    let ino = again.open_ino("/s").unwrap();
    let mut buf = [0u8; 6];
    again.read(ino, &mut buf, 0).unwrap();
    assert_eq!(&buf, b"synced");
}

#[test]
fn shrinking_a_sparse_file_skips_missing_blocks() {
    let (_, mut fs) = fresh_fs(64, 32);
    let ino = new_file(&mut fs, "/sparse");
    let free = free_blocks(&mut fs);

    // past NDIRECT with no indirect block behind it
    fs.set_size(ino, ((NDIRECT + 3) * BSIZE) as u64).unwrap();
    assert_eq!(free_blocks(&mut fs), free);
    assert_eq!(fs.stat(ino).unwrap().indirect, NULL_BLOCK);

    fs.set_size(ino, 0).unwrap();
    let inode = fs.stat(ino).unwrap();
    assert_eq!(inode.size, 0);
    assert_eq!(inode.indirect, NULL_BLOCK);
    assert_eq!(free_blocks(&mut fs), free);
}
