use super::*;

use std::any::Any;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

/// Sector-granular device. The sector count of a transfer is `buf.len() / SECTSIZE`.
pub trait BlockDevice: Send + Sync + Any {
    fn num_sectors(&self) -> u64;
    fn read(&self, sector: u64, buf: &mut [u8]) -> io::Result<()>;
    fn write(&self, sector: u64, buf: &[u8]) -> io::Result<()>;

    /// # of whole file system blocks on the device
    fn num_blocks(&self) -> u64 {
        self.num_sectors() / BLKSECTS as u64
    }
}

fn check_range(dev: &dyn BlockDevice, sector: u64, len: usize) -> io::Result<()> {
    if len % SECTSIZE != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("transfer of {len} bytes is not sector aligned"),
        ));
    }
    let count = (len / SECTSIZE) as u64;
    if sector + count > dev.num_sectors() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("sectors {sector}..{} past end of device", sector + count),
        ));
    }
    Ok(())
}

/// Memory-backed device.
pub struct RamDisk {
    data: Mutex<Vec<u8>>,
}

impl RamDisk {
    pub fn new(nsectors: u64) -> Self {
        Self {
            data: Mutex::new(vec![0u8; nsectors as usize * SECTSIZE]),
        }
    }

    /// wrap an existing image, padded up to a whole sector
    pub fn from_image(mut image: Vec<u8>) -> Self {
        let padded = image.len().div_ceil(SECTSIZE) * SECTSIZE;
        image.resize(padded, 0);
        Self {
            data: Mutex::new(image),
        }
    }

    pub fn image(&self) -> Vec<u8> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<u8>> {
        // a poisoned lock still guards plain bytes
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BlockDevice for RamDisk {
    fn num_sectors(&self) -> u64 {
        (self.lock().len() / SECTSIZE) as u64
    }

    fn read(&self, sector: u64, buf: &mut [u8]) -> io::Result<()> {
        check_range(self, sector, buf.len())?;
        let start = sector as usize * SECTSIZE;
        buf.copy_from_slice(&self.lock()[start..start + buf.len()]);
        Ok(())
    }

    fn write(&self, sector: u64, buf: &[u8]) -> io::Result<()> {
        check_range(self, sector, buf.len())?;
        let start = sector as usize * SECTSIZE;
        self.lock()[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }
}

/// Device backed by an image file on the host.
pub struct FileDisk {
    file: Mutex<File>,
    nsectors: u64,
}

impl FileDisk {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let nsectors = file.metadata()?.len() / SECTSIZE as u64;
        Ok(Self {
            file: Mutex::new(file),
            nsectors,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BlockDevice for FileDisk {
    fn num_sectors(&self) -> u64 {
        self.nsectors
    }

    fn read(&self, sector: u64, buf: &mut [u8]) -> io::Result<()> {
        check_range(self, sector, buf.len())?;
        let mut file = self.lock();
        file.seek(SeekFrom::Start(sector * SECTSIZE as u64))?;
        file.read_exact(buf)
    }

    fn write(&self, sector: u64, buf: &[u8]) -> io::Result<()> {
        check_range(self, sector, buf.len())?;
        let mut file = self.lock();
        file.seek(SeekFrom::Start(sector * SECTSIZE as u64))?;
        file.write_all(buf)?;
        file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ram_disk_rejects_out_of_range() {
        let dev = RamDisk::new(16);
        let mut buf = [0u8; SECTSIZE];
        assert!(dev.read(15, &mut buf).is_ok());
        assert!(dev.read(16, &mut buf).is_err());
        assert!(dev.write(0, &buf[..100]).is_err());
    }

    #[test]
    fn ram_disk_multi_sector_transfer() {
        let dev = RamDisk::new(32);
        let data: Vec<u8> = (0..BSIZE).map(|i| (i % 251) as u8).collect();
        dev.write(BLKSECTS as u64, &data).unwrap();
        let mut back = vec![0u8; BSIZE];
        dev.read(BLKSECTS as u64, &mut back).unwrap();
        assert_eq!(back, data);
        assert_eq!(dev.num_blocks(), 4);
    }
}
