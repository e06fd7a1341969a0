//! Mapping from a file's logical block index to a physical block address.
//!
//! The map has three tiers: `STRAIGHT_LINKS_COUNT` direct slots in the
//! record itself, one single-indirect block of `ADDRESSES_IN_BLOCK` slots,
//! and a double-indirect region treated as a flat array of
//! `ADDRESSES_IN_BLOCK^2` slots behind an outer block of inner-block
//! addresses. Indirect blocks are allocated on first touch and start out
//! zeroed; a zero entry means the slot was never assigned.

use crate::fs::{
    ADDRESS_SIZE, ADDRESSES_IN_BLOCK, BlockFs, FsError, InodeRecord, NAN_BLOCK_ADDRESS,
    STRAIGHT_LINKS_COUNT,
};
use crate::hal::storage::BlockDevice;

/// First logical index served by the single-indirect block.
pub(crate) const DIRECT_TIER_END: u32 = STRAIGHT_LINKS_COUNT as u32;
/// First logical index served by the double-indirect region.
pub(crate) const SINGLE_TIER_END: u32 = DIRECT_TIER_END + ADDRESSES_IN_BLOCK;
/// One past the last addressable logical index.
pub(crate) const DOUBLE_TIER_END: u32 =
    SINGLE_TIER_END + ADDRESSES_IN_BLOCK * ADDRESSES_IN_BLOCK;

impl<D: BlockDevice> BlockFs<D> {
    /// The address currently stored for logical block `idx`.
    ///
    /// Unallocated tiers report [`NAN_BLOCK_ADDRESS`]; indices past the
    /// double-indirect capacity fail with `NotEnoughMemory`.
    pub(crate) fn block_address_at(
        &self,
        record: &InodeRecord,
        idx: u32,
    ) -> Result<u32, FsError> {
        if idx < DIRECT_TIER_END {
            return Ok(record.straight_links[idx as usize]);
        }

        if idx < SINGLE_TIER_END {
            if record.single_indirect == NAN_BLOCK_ADDRESS {
                return Ok(NAN_BLOCK_ADDRESS);
            }
            return self.map_entry(record.single_indirect, idx - DIRECT_TIER_END);
        }

        if idx < DOUBLE_TIER_END {
            if record.double_indirect == NAN_BLOCK_ADDRESS {
                return Ok(NAN_BLOCK_ADDRESS);
            }
            let rel = idx - SINGLE_TIER_END;
            let inner = self.map_entry(record.double_indirect, rel / ADDRESSES_IN_BLOCK)?;
            if inner == 0 || inner == NAN_BLOCK_ADDRESS {
                return Ok(NAN_BLOCK_ADDRESS);
            }
            return self.map_entry(inner, rel % ADDRESSES_IN_BLOCK);
        }

        Err(FsError::NotEnoughMemory)
    }

    /// Stores `addr` as the mapping of logical block `idx`, allocating the
    /// indirect map blocks the index needs on first touch.
    ///
    /// Direct slots and the two indirect roots are updated in `record`; the
    /// caller persists the record.
    pub(crate) fn set_block_address_at(
        &mut self,
        record: &mut InodeRecord,
        idx: u32,
        addr: u32,
    ) -> Result<(), FsError> {
        if idx < DIRECT_TIER_END {
            record.straight_links[idx as usize] = addr;
            return Ok(());
        }

        if idx < SINGLE_TIER_END {
            if record.single_indirect == NAN_BLOCK_ADDRESS {
                record.single_indirect = self.allocate_block()?;
            }
            return self.store_map_entry(record.single_indirect, idx - DIRECT_TIER_END, addr);
        }

        if idx < DOUBLE_TIER_END {
            if record.double_indirect == NAN_BLOCK_ADDRESS {
                record.double_indirect = self.allocate_block()?;
            }
            let rel = idx - SINGLE_TIER_END;
            let outer_pos = rel / ADDRESSES_IN_BLOCK;
            let mut inner = self.map_entry(record.double_indirect, outer_pos)?;
            if inner == 0 {
                inner = self.allocate_block()?;
                self.store_map_entry(record.double_indirect, outer_pos, inner)?;
            }
            return self.store_map_entry(inner, rel % ADDRESSES_IN_BLOCK, addr);
        }

        Err(FsError::NotEnoughMemory)
    }

    pub(crate) fn map_entry(&self, map_block: u32, pos: u32) -> Result<u32, FsError> {
        let block = self.read_device_block(map_block)?;
        let off = (pos * ADDRESS_SIZE) as usize;
        Ok(u32::from_be_bytes(block[off..off + 4].try_into().unwrap()))
    }

    pub(crate) fn store_map_entry(
        &mut self,
        map_block: u32,
        pos: u32,
        addr: u32,
    ) -> Result<(), FsError> {
        let mut block = self.read_device_block(map_block)?;
        let off = (pos * ADDRESS_SIZE) as usize;
        block[off..off + 4].copy_from_slice(&addr.to_be_bytes());
        self.write_device_block(map_block, &block)
    }
}
