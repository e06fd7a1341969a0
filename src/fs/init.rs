//! Formatting a device.

use alloc::vec;
use log::info;

use crate::fs::inode::descriptor_offset;
use crate::fs::{
    BITMAP_SIZE, BLOCK_COUNT, BLOCK_SIZE, BlockFs, FileKind, FsError, INODE_SIZE, InodeRecord,
    N_SIZE, ROOT_INO,
};
use crate::hal::storage::BlockDevice;

impl<D: BlockDevice> BlockFs<D> {
    /// Creates a fresh file system with `n` descriptors.
    ///
    /// Zeroes the bitmap, writes the descriptor-count field and `n` UNUSED
    /// records, premarks every metadata block as allocated, and builds the
    /// root directory at inode 0 with `.` and `..` pointing to itself.
    /// In-memory state (working directory, open handles) is reset.
    pub fn mkfs(&mut self, n: u32) -> Result<(), FsError> {
        if n < 2 {
            return Err(FsError::InvalidArgument);
        }
        let table_bytes = n
            .checked_mul(INODE_SIZE)
            .and_then(|t| t.checked_add(BITMAP_SIZE + N_SIZE))
            .ok_or(FsError::InvalidArgument)?;
        let metadata_blocks = table_bytes.div_ceil(BLOCK_SIZE);
        if metadata_blocks >= BLOCK_COUNT {
            return Err(FsError::InvalidArgument);
        }

        self.handles.clear();
        self.next_fd = 0;
        self.cwd = ROOT_INO;

        self.write_at(0, &vec![0u8; BITMAP_SIZE as usize])?;
        self.set_n(n)?;

        let mut table = vec![0u8; (n * INODE_SIZE) as usize];
        for ino in 0..n {
            let record = InodeRecord::unused(ino).to_buf();
            let off = (ino * INODE_SIZE) as usize;
            table[off..off + record.len()].copy_from_slice(&record);
        }
        self.write_at(descriptor_offset(0), &table)?;

        for idx in 0..metadata_blocks {
            self.set_bit_used(idx)?;
        }

        let mut root = InodeRecord::unused(ROOT_INO);
        root.kind = FileKind::Directory;
        self.update_descriptor(&root)?;
        self.add_link(ROOT_INO, ROOT_INO, ".")?;
        self.add_link(ROOT_INO, ROOT_INO, "..")?;

        info!("formatted device: {n} descriptors, {metadata_blocks} metadata blocks");
        Ok(())
    }
}
