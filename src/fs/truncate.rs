//! Growing and shrinking file bodies.
//!
//! Growth is lazy: new logical slots are entered as [`ZERO_BLOCK_ADDRESS`]
//! holes and only the indirect map blocks the new indices require are
//! actually allocated. Shrinking releases real data blocks, trims indirect
//! map blocks whose slot range emptied, and zeroes the tail of the new last
//! block so that a later re-grow exposes zeros.

use crate::fs::extent::{DIRECT_TIER_END, SINGLE_TIER_END};
use crate::fs::{
    ADDRESS_SIZE, ADDRESSES_IN_BLOCK, BLOCK_SIZE, BlockFs, FileKind, FsError, InodeRecord,
    NAN_BLOCK_ADDRESS, ZERO_BLOCK_ADDRESS,
};
use crate::hal::storage::BlockDevice;

impl<D: BlockDevice> BlockFs<D> {
    /// Changes the logical length of a file to `new_size`.
    ///
    /// On a growth failure (map capacity or free blocks exhausted) every
    /// slot appended so far is taken back and `record.size` keeps its
    /// pre-call value. The caller persists `record`.
    pub(crate) fn resize(
        &mut self,
        record: &mut InodeRecord,
        new_size: u32,
    ) -> Result<(), FsError> {
        let current_blocks = record.size.div_ceil(BLOCK_SIZE);
        let required_blocks = new_size.div_ceil(BLOCK_SIZE);

        if new_size > record.size {
            for idx in current_blocks..required_blocks {
                if let Err(e) = self.set_block_address_at(record, idx, ZERO_BLOCK_ADDRESS) {
                    self.release_slots(record, current_blocks, idx)?;
                    return Err(e);
                }
            }
            record.size = new_size;
        } else if new_size < record.size {
            self.release_slots(record, required_blocks, current_blocks)?;

            if new_size % BLOCK_SIZE != 0 {
                let last = self.block_address_at(record, required_blocks - 1)?;
                if last != ZERO_BLOCK_ADDRESS && last != NAN_BLOCK_ADDRESS && last != 0 {
                    let mut block = self.read_device_block(last)?;
                    block[(new_size % BLOCK_SIZE) as usize..].fill(0);
                    self.write_device_block(last, &block)?;
                }
            }
            record.size = new_size;
        }

        Ok(())
    }

    /// Releases logical slots `[from, to)`: real data blocks go back to the
    /// bitmap, slot entries are erased, and indirect map blocks left
    /// without any slot in use are freed.
    fn release_slots(
        &mut self,
        record: &mut InodeRecord,
        from: u32,
        to: u32,
    ) -> Result<(), FsError> {
        for idx in (from..to).rev() {
            let addr = self.block_address_at(record, idx)?;
            if addr != ZERO_BLOCK_ADDRESS && addr != NAN_BLOCK_ADDRESS && addr != 0 {
                self.set_bit_free(addr)?;
            }
            self.clear_slot(record, idx)?;
        }
        self.trim_indirect(record, from)
    }

    fn clear_slot(&mut self, record: &mut InodeRecord, idx: u32) -> Result<(), FsError> {
        if idx < DIRECT_TIER_END {
            record.straight_links[idx as usize] = NAN_BLOCK_ADDRESS;
            return Ok(());
        }

        if idx < SINGLE_TIER_END {
            if record.single_indirect != NAN_BLOCK_ADDRESS {
                self.store_map_entry(record.single_indirect, idx - DIRECT_TIER_END, 0)?;
            }
            return Ok(());
        }

        if record.double_indirect != NAN_BLOCK_ADDRESS {
            let rel = idx - SINGLE_TIER_END;
            let inner = self.map_entry(record.double_indirect, rel / ADDRESSES_IN_BLOCK)?;
            if inner != 0 && inner != NAN_BLOCK_ADDRESS {
                self.store_map_entry(inner, rel % ADDRESSES_IN_BLOCK, 0)?;
            }
        }
        Ok(())
    }

    /// Frees every indirect map block that `remaining` logical blocks no
    /// longer need and resets the emptied root fields to
    /// [`NAN_BLOCK_ADDRESS`].
    fn trim_indirect(&mut self, record: &mut InodeRecord, remaining: u32) -> Result<(), FsError> {
        if remaining <= DIRECT_TIER_END && record.single_indirect != NAN_BLOCK_ADDRESS {
            self.set_bit_free(record.single_indirect)?;
            record.single_indirect = NAN_BLOCK_ADDRESS;
        }

        if record.double_indirect != NAN_BLOCK_ADDRESS {
            let needed_inner = if remaining <= SINGLE_TIER_END {
                0
            } else {
                (remaining - SINGLE_TIER_END + ADDRESSES_IN_BLOCK - 1) / ADDRESSES_IN_BLOCK
            };

            let mut outer = self.read_device_block(record.double_indirect)?;
            let mut dirty = false;
            for pos in needed_inner..ADDRESSES_IN_BLOCK {
                let off = (pos * ADDRESS_SIZE) as usize;
                let inner = u32::from_be_bytes(outer[off..off + 4].try_into().unwrap());
                if inner != 0 && inner != NAN_BLOCK_ADDRESS {
                    self.set_bit_free(inner)?;
                    outer[off..off + 4].copy_from_slice(&0u32.to_be_bytes());
                    dirty = true;
                }
            }

            if needed_inner == 0 {
                self.set_bit_free(record.double_indirect)?;
                record.double_indirect = NAN_BLOCK_ADDRESS;
            } else if dirty {
                let map_block = record.double_indirect;
                self.write_device_block(map_block, &outer)?;
            }
        }
        Ok(())
    }

    /// Changes the length of the regular file at `path`.
    pub fn truncate(&mut self, path: &str, new_size: u32) -> Result<(), FsError> {
        let ino = self.lookup(path, false)?;
        let mut record = self.get_descriptor(ino)?;
        if record.kind != FileKind::Regular {
            return Err(FsError::InvalidPath);
        }
        self.resize(&mut record, new_size)?;
        self.update_descriptor(&record)
    }
}
