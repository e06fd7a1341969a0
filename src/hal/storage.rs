use alloc::vec;
use alloc::vec::Vec;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StorageErr {
    #[error("block index is out of range")]
    BlockOutOfRange,
    #[error("buffer length does not match the block size")]
    WrongBufferSize,
}

/// A random-access medium partitioned into equally sized blocks.
///
/// Transfers are always whole blocks; byte-granular access is layered on top
/// by the driver.
pub trait BlockDevice {
    fn block_size(&self) -> usize;
    fn block_count(&self) -> usize;

    fn read_block(&self, idx: u32, buf: &mut [u8]) -> Result<(), StorageErr>;
    fn write_block(&mut self, idx: u32, buf: &[u8]) -> Result<(), StorageErr>;
}

/// A memory-backed block device.
#[derive(Debug, Clone)]
pub struct MemDisk {
    block_size: usize,
    block_count: usize,
    bytes: Vec<u8>,
}

impl MemDisk {
    pub fn new(block_size: usize, block_count: usize) -> Self {
        Self {
            block_size,
            block_count,
            bytes: vec![0u8; block_size * block_count],
        }
    }

    /// The raw device contents, for inspection by embedders and tests.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn span(&self, idx: u32, len: usize) -> Result<core::ops::Range<usize>, StorageErr> {
        if idx as usize >= self.block_count {
            return Err(StorageErr::BlockOutOfRange);
        }
        if len != self.block_size {
            return Err(StorageErr::WrongBufferSize);
        }
        let start = idx as usize * self.block_size;
        Ok(start..start + self.block_size)
    }
}

impl BlockDevice for MemDisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> usize {
        self.block_count
    }

    fn read_block(&self, idx: u32, buf: &mut [u8]) -> Result<(), StorageErr> {
        let span = self.span(idx, buf.len())?;
        buf.copy_from_slice(&self.bytes[span]);
        Ok(())
    }

    fn write_block(&mut self, idx: u32, buf: &[u8]) -> Result<(), StorageErr> {
        let span = self.span(idx, buf.len())?;
        self.bytes[span].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_back_written_block() {
        let mut disk = MemDisk::new(512, 8);
        let block = [0xabu8; 512];
        disk.write_block(3, &block).unwrap();

        let mut out = [0u8; 512];
        disk.read_block(3, &mut out).unwrap();
        assert_eq!(out, block);

        disk.read_block(2, &mut out).unwrap();
        assert_eq!(out, [0u8; 512]);
    }

    #[test]
    fn rejects_out_of_range_index() {
        let mut disk = MemDisk::new(512, 8);
        let mut buf = [0u8; 512];
        assert_eq!(
            disk.read_block(8, &mut buf),
            Err(StorageErr::BlockOutOfRange)
        );
        assert_eq!(disk.write_block(9, &buf), Err(StorageErr::BlockOutOfRange));
    }

    #[test]
    fn rejects_partial_transfers() {
        let disk = MemDisk::new(512, 8);
        let mut short = [0u8; 100];
        assert_eq!(
            disk.read_block(0, &mut short),
            Err(StorageErr::WrongBufferSize)
        );
    }
}
