//! Random access to the descriptor table.

use log::warn;

use crate::fs::{
    BITMAP_SIZE, BlockFs, FileKind, FsError, INODE_RECORD_SIZE, INODE_SIZE, InodeRecord, N_SIZE,
};
use crate::hal::storage::BlockDevice;

/// Absolute byte offset of descriptor `ino` inside the metadata region.
pub(crate) fn descriptor_offset(ino: u32) -> u32 {
    BITMAP_SIZE + N_SIZE + ino * INODE_SIZE
}

impl<D: BlockDevice> BlockFs<D> {
    /// Reads descriptor `ino` from the table.
    ///
    /// The `ino` field of the returned record is forced to the requested
    /// index rather than trusted from the device.
    pub fn get_descriptor(&self, ino: u32) -> Result<InodeRecord, FsError> {
        if ino >= self.get_n()? {
            return Err(FsError::DescriptorNotFound);
        }
        let mut buf = [0u8; INODE_RECORD_SIZE];
        self.read_at(descriptor_offset(ino), &mut buf)?;

        let mut record = InodeRecord::try_from(&buf[..])?;
        record.ino = ino;
        Ok(record)
    }

    pub(crate) fn update_descriptor(&mut self, record: &InodeRecord) -> Result<(), FsError> {
        if record.ino >= self.get_n()? {
            return Err(FsError::DescriptorNotFound);
        }
        self.write_at(descriptor_offset(record.ino), &record.to_buf())
    }

    /// Linear scan for a free descriptor; there is no free-inode bitmap.
    pub(crate) fn find_unused_descriptor(&self) -> Result<u32, FsError> {
        let n = self.get_n()?;
        for ino in 0..n {
            if self.get_descriptor(ino)?.kind == FileKind::Unused {
                return Ok(ino);
            }
        }
        warn!("all {n} descriptors are in use");
        Err(FsError::NotEnoughMemory)
    }
}
