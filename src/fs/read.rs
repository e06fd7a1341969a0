use alloc::vec;
use alloc::vec::Vec;

use crate::fs::{BLOCK_SIZE, BlockFs, FsError, InodeRecord, NAN_BLOCK_ADDRESS, ZERO_BLOCK_ADDRESS};
use crate::hal::storage::BlockDevice;

impl<D: BlockDevice> BlockFs<D> {
    /// Reads `len` bytes of the file body starting at `offset`.
    ///
    /// The range must lie entirely within `record.size`. Hole slots
    /// contribute zeros without touching the device.
    pub(crate) fn read_bytes(
        &self,
        record: &InodeRecord,
        offset: u32,
        len: u32,
    ) -> Result<Vec<u8>, FsError> {
        let end = offset.checked_add(len).ok_or(FsError::OutOfBounds)?;
        if end > record.size {
            return Err(FsError::OutOfBounds);
        }

        let mut out = vec![0u8; len as usize];
        let mut done = 0usize;
        while done < out.len() {
            let pos = offset as usize + done;
            let idx = (pos / BLOCK_SIZE as usize) as u32;
            let in_block = pos % BLOCK_SIZE as usize;
            let span = (BLOCK_SIZE as usize - in_block).min(out.len() - done);

            let addr = self.block_address_at(record, idx)?;
            if addr != ZERO_BLOCK_ADDRESS && addr != NAN_BLOCK_ADDRESS && addr != 0 {
                let block = self.read_device_block(addr)?;
                out[done..done + span].copy_from_slice(&block[in_block..in_block + span]);
            }
            done += span;
        }
        Ok(out)
    }
}
