//! The free-block bitmap and the descriptor-count field.

use alloc::vec;
use log::warn;

use crate::fs::{BITMAP_SIZE, BLOCK_COUNT, BLOCK_SIZE, BlockFs, FsError};
use crate::hal::storage::BlockDevice;

impl<D: BlockDevice> BlockFs<D> {
    pub(crate) fn set_bit_used(&mut self, block_idx: u32) -> Result<(), FsError> {
        self.flip_bit(block_idx, true)
    }

    pub(crate) fn set_bit_free(&mut self, block_idx: u32) -> Result<(), FsError> {
        self.flip_bit(block_idx, false)
    }

    fn flip_bit(&mut self, block_idx: u32, used: bool) -> Result<(), FsError> {
        if block_idx >= BLOCK_COUNT {
            return Err(FsError::InvalidArgument);
        }
        let byte_pos = block_idx / 8;
        let mask = 1u8 << (block_idx % 8);
        let map_block = byte_pos / BLOCK_SIZE;
        let in_block = (byte_pos % BLOCK_SIZE) as usize;

        let mut block = self.read_device_block(map_block)?;
        if used {
            block[in_block] |= mask;
        } else {
            block[in_block] &= !mask;
        }
        self.write_device_block(map_block, &block)
    }

    /// Scans the bitmap byte by byte, bit 0 first within each byte, and
    /// returns the lowest-numbered free block.
    pub(crate) fn first_free_block(&self) -> Result<u32, FsError> {
        let map_blocks = (BITMAP_SIZE + BLOCK_SIZE - 1) / BLOCK_SIZE;
        for map_block in 0..map_blocks {
            let block = self.read_device_block(map_block)?;
            let start_byte = map_block * BLOCK_SIZE;
            let end_byte = BITMAP_SIZE.min(start_byte + BLOCK_SIZE);

            for byte_pos in start_byte..end_byte {
                let byte = block[(byte_pos - start_byte) as usize];
                if byte == 0xff {
                    continue;
                }
                for bit in 0..8 {
                    let idx = byte_pos * 8 + bit;
                    if idx >= BLOCK_COUNT {
                        break;
                    }
                    if byte & (1 << bit) == 0 {
                        return Ok(idx);
                    }
                }
            }
        }

        warn!("no free blocks left on the device");
        Err(FsError::NotEnoughMemory)
    }

    /// Claims the lowest free block and clears it before handing it out.
    pub(crate) fn allocate_block(&mut self) -> Result<u32, FsError> {
        let idx = self.first_free_block()?;
        self.set_bit_used(idx)?;
        self.write_device_block(idx, &vec![0u8; BLOCK_SIZE as usize])?;
        Ok(idx)
    }

    pub(crate) fn free_block_count(&self) -> Result<u32, FsError> {
        let map_blocks = (BITMAP_SIZE + BLOCK_SIZE - 1) / BLOCK_SIZE;
        let mut free = 0;
        for map_block in 0..map_blocks {
            let block = self.read_device_block(map_block)?;
            let start_byte = map_block * BLOCK_SIZE;
            let end_byte = BITMAP_SIZE.min(start_byte + BLOCK_SIZE);

            for byte_pos in start_byte..end_byte {
                let byte = block[(byte_pos - start_byte) as usize];
                for bit in 0..8 {
                    let idx = byte_pos * 8 + bit;
                    if idx >= BLOCK_COUNT {
                        break;
                    }
                    if byte & (1 << bit) == 0 {
                        free += 1;
                    }
                }
            }
        }
        Ok(free)
    }

    pub(crate) fn set_n(&mut self, n: u32) -> Result<(), FsError> {
        self.write_at(BITMAP_SIZE, &n.to_be_bytes())
    }

    pub(crate) fn get_n(&self) -> Result<u32, FsError> {
        let mut buf = [0u8; 4];
        self.read_at(BITMAP_SIZE, &mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }
}
