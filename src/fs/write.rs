use crate::fs::{BLOCK_SIZE, BlockFs, FsError, InodeRecord, NAN_BLOCK_ADDRESS, ZERO_BLOCK_ADDRESS};
use crate::hal::storage::BlockDevice;

impl<D: BlockDevice> BlockFs<D> {
    /// Overwrites file bytes starting at `offset`.
    ///
    /// Writes never extend the file; the range must lie within
    /// `record.size` (grow with `resize` first). A hole slot touched by the
    /// write is materialized: a real block is claimed, cleared, and entered
    /// into the map. The caller persists `record` afterwards.
    pub(crate) fn write_bytes(
        &mut self,
        record: &mut InodeRecord,
        offset: u32,
        data: &[u8],
    ) -> Result<(), FsError> {
        let end = offset
            .checked_add(data.len() as u32)
            .ok_or(FsError::OutOfBounds)?;
        if end > record.size {
            return Err(FsError::OutOfBounds);
        }

        let mut done = 0usize;
        while done < data.len() {
            let pos = offset as usize + done;
            let idx = (pos / BLOCK_SIZE as usize) as u32;
            let in_block = pos % BLOCK_SIZE as usize;
            let span = (BLOCK_SIZE as usize - in_block).min(data.len() - done);

            let mut addr = self.block_address_at(record, idx)?;
            if addr == ZERO_BLOCK_ADDRESS || addr == NAN_BLOCK_ADDRESS || addr == 0 {
                addr = self.allocate_block()?;
                self.set_block_address_at(record, idx, addr)?;
            }

            if span == BLOCK_SIZE as usize {
                self.write_device_block(addr, &data[done..done + span])?;
            } else {
                let mut block = self.read_device_block(addr)?;
                block[in_block..in_block + span].copy_from_slice(&data[done..done + span]);
                self.write_device_block(addr, &block)?;
            }
            done += span;
        }
        Ok(())
    }
}
