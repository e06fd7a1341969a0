//! The on-device format and the driver.
//!
//! On-device layout, from byte 0:
//!
//! 1. Free-block bitmap, `ceil(BLOCK_COUNT / 8)` bytes. Bit `i` set means
//!    block `i` is allocated. Bit 0 of a byte is the lowest-numbered block
//!    covered by that byte.
//! 2. Descriptor-count field, 4 bytes, the `n` passed to `mkfs`.
//! 3. Descriptor table, `n * INODE_SIZE` bytes, record `k` describing
//!    inode `k`. Records encode to [`INODE_RECORD_SIZE`] bytes and are
//!    zero-padded to the [`INODE_SIZE`] stride.
//! 4. Data region: every remaining block. The blocks covering 1-3 are
//!    premarked allocated by `mkfs` and never handed out as data blocks.
//!
//! All on-device integers are big-endian. A file's block map holds physical
//! block addresses, [`ZERO_BLOCK_ADDRESS`] for a logical hole (reads as
//! zeros, materialized on first write), or [`NAN_BLOCK_ADDRESS`] for a slot
//! past the logical end of the file.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use thiserror::Error;

use crate::hal::storage::{BlockDevice, StorageErr};

pub mod allocator;
pub mod create;
pub mod delete;
pub mod dirs;
pub mod extent;
pub mod init;
pub mod inode;
pub mod open;
pub mod read;
pub mod resolve;
pub mod truncate;
pub mod write;

#[cfg(test)]
mod tests;

/// Bytes per block.
pub const BLOCK_SIZE: u32 = 1024;
/// Blocks per device.
pub const BLOCK_COUNT: u32 = 4096;
/// Bytes occupied by the free-block bitmap.
pub const BITMAP_SIZE: u32 = (BLOCK_COUNT + 7) / 8;
/// Width of the descriptor-count field.
pub const N_SIZE: u32 = 4;
/// Table stride per descriptor record.
pub const INODE_SIZE: u32 = 64;
/// Direct block pointers per inode.
pub const STRAIGHT_LINKS_COUNT: usize = 10;
/// Bytes per stored block address.
pub const ADDRESS_SIZE: u32 = 4;
/// Block addresses held by one indirect block.
pub const ADDRESSES_IN_BLOCK: u32 = BLOCK_SIZE / ADDRESS_SIZE;
/// Width of the filename field of a directory entry.
pub const FILENAME_SIZE: usize = 28;
/// Bytes per directory entry (filename field + inode number).
pub const DENTRY_SIZE: u32 = FILENAME_SIZE as u32 + 4;
/// Symlink expansions allowed within a single resolution.
pub const MAX_SYMLINK_DEPTH: u32 = 5;

/// Sentinel address: this slot points nowhere.
pub const NAN_BLOCK_ADDRESS: u32 = 0xFFFF_FFFF;
/// Sentinel address: logical hole, materialized on first write.
pub const ZERO_BLOCK_ADDRESS: u32 = 0xFFFF_FFFE;

/// The root directory's inode number.
pub const ROOT_INO: u32 = 0;

const LINKS_OFFSET: usize = 12;
const SINGLE_INDIRECT_OFFSET: usize = LINKS_OFFSET + STRAIGHT_LINKS_COUNT * ADDRESS_SIZE as usize;
const DOUBLE_INDIRECT_OFFSET: usize = SINGLE_INDIRECT_OFFSET + ADDRESS_SIZE as usize;
/// Encoded length of an inode record; the table pads it to [`INODE_SIZE`].
pub const INODE_RECORD_SIZE: usize = DOUBLE_INDIRECT_OFFSET + ADDRESS_SIZE as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecErr {
    #[error("buffer is too small for the record")]
    BufferTooSmall,
    #[error("unknown file kind tag: {0}")]
    BadKindTag(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("invalid path")]
    InvalidPath,
    #[error("file already exists")]
    FileAlreadyExist,
    #[error("descriptor not found")]
    DescriptorNotFound,
    #[error("out of bounds")]
    OutOfBounds,
    #[error("not enough memory")]
    NotEnoughMemory,
    #[error("dir is not empty")]
    DirectoryNotEmpty,
    #[error("symlink max depth exceeded")]
    SymlinkDepthExceeded,
    #[error("storage error: {0}")]
    Storage(#[from] StorageErr),
}

impl From<CodecErr> for FsError {
    fn from(_: CodecErr) -> Self {
        FsError::InvalidArgument
    }
}

/// What a descriptor currently describes. `Unused` records are free for
/// reallocation; every other kind is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FileKind {
    Unused = 0,
    Regular = 1,
    Directory = 2,
    Symlink = 3,
}

impl TryFrom<u16> for FileKind {
    type Error = CodecErr;

    fn try_from(tag: u16) -> Result<Self, CodecErr> {
        match tag {
            0 => Ok(Self::Unused),
            1 => Ok(Self::Regular),
            2 => Ok(Self::Directory),
            3 => Ok(Self::Symlink),
            _ => Err(CodecErr::BadKindTag(tag)),
        }
    }
}

/// One record of the descriptor table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeRecord {
    pub ino: u32,
    pub kind: FileKind,
    /// Hard-link count; the record is reclaimed when it drops to zero.
    pub refs: u16,
    /// Logical byte length of the file body.
    pub size: u32,
    /// Direct block addresses. Slots at or past `ceil(size / BLOCK_SIZE)`
    /// hold [`NAN_BLOCK_ADDRESS`].
    pub straight_links: [u32; STRAIGHT_LINKS_COUNT],
    pub single_indirect: u32,
    pub double_indirect: u32,
}

impl InodeRecord {
    /// A free record: no references, no body, every slot pointing nowhere.
    pub fn unused(ino: u32) -> Self {
        Self {
            ino,
            kind: FileKind::Unused,
            refs: 0,
            size: 0,
            straight_links: [NAN_BLOCK_ADDRESS; STRAIGHT_LINKS_COUNT],
            single_indirect: NAN_BLOCK_ADDRESS,
            double_indirect: NAN_BLOCK_ADDRESS,
        }
    }

    pub fn to_buf(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(INODE_RECORD_SIZE);
        buf.extend(&self.ino.to_be_bytes());
        buf.extend(&(self.kind as u16).to_be_bytes());
        buf.extend(&self.refs.to_be_bytes());
        buf.extend(&self.size.to_be_bytes());
        for link in &self.straight_links {
            buf.extend(&link.to_be_bytes());
        }
        buf.extend(&self.single_indirect.to_be_bytes());
        buf.extend(&self.double_indirect.to_be_bytes());
        buf
    }
}

impl TryFrom<&[u8]> for InodeRecord {
    type Error = CodecErr;

    fn try_from(value: &[u8]) -> Result<Self, CodecErr> {
        if value.len() < INODE_RECORD_SIZE {
            return Err(CodecErr::BufferTooSmall);
        }

        let mut straight_links = [NAN_BLOCK_ADDRESS; STRAIGHT_LINKS_COUNT];
        for (i, slot) in straight_links.iter_mut().enumerate() {
            let off = LINKS_OFFSET + i * ADDRESS_SIZE as usize;
            *slot = u32::from_be_bytes(value[off..off + 4].try_into().unwrap());
        }

        Ok(InodeRecord {
            ino: u32::from_be_bytes(value[0..4].try_into().unwrap()),
            kind: FileKind::try_from(u16::from_be_bytes(value[4..6].try_into().unwrap()))?,
            refs: u16::from_be_bytes(value[6..8].try_into().unwrap()),
            size: u32::from_be_bytes(value[8..12].try_into().unwrap()),
            straight_links,
            single_indirect: u32::from_be_bytes(
                value[SINGLE_INDIRECT_OFFSET..SINGLE_INDIRECT_OFFSET + 4]
                    .try_into()
                    .unwrap(),
            ),
            double_indirect: u32::from_be_bytes(
                value[DOUBLE_INDIRECT_OFFSET..DOUBLE_INDIRECT_OFFSET + 4]
                    .try_into()
                    .unwrap(),
            ),
        })
    }
}

/// A directory entry: a name bound to an inode number.
///
/// Stored as `FILENAME_SIZE` bytes of UTF-8, NUL-terminated unless the name
/// fills the whole field, followed by the big-endian inode number. Names
/// longer than the field are truncated on encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub ino: u32,
}

impl DirEntry {
    pub fn new(name: &str, ino: u32) -> Self {
        Self {
            name: String::from(name),
            ino,
        }
    }

    pub fn to_buf(&self) -> Vec<u8> {
        let mut buf = vec![0u8; DENTRY_SIZE as usize];
        let raw = self.name.as_bytes();
        let len = raw.len().min(FILENAME_SIZE);
        buf[..len].copy_from_slice(&raw[..len]);
        buf[FILENAME_SIZE..].copy_from_slice(&self.ino.to_be_bytes());
        buf
    }
}

impl TryFrom<&[u8]> for DirEntry {
    type Error = CodecErr;

    fn try_from(value: &[u8]) -> Result<Self, CodecErr> {
        if value.len() < DENTRY_SIZE as usize {
            return Err(CodecErr::BufferTooSmall);
        }
        let field = &value[..FILENAME_SIZE];
        let len = field.iter().position(|&b| b == 0).unwrap_or(FILENAME_SIZE);
        Ok(DirEntry {
            name: String::from_utf8_lossy(&field[..len]).into_owned(),
            ino: u32::from_be_bytes(
                value[FILENAME_SIZE..DENTRY_SIZE as usize].try_into().unwrap(),
            ),
        })
    }
}

/// An open-file handle. Opaque, unique for the driver's lifetime, gone on
/// restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Fd(u64);

/// Descriptor metadata as reported by [`BlockFs::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub ino: u32,
    pub kind: FileKind,
    pub refs: u16,
    pub size: u32,
}

/// Aggregate usage counters as reported by [`BlockFs::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub block_count: u32,
    pub free_blocks: u32,
    pub descriptor_count: u32,
    pub free_descriptors: u32,
}

/// The file-system driver.
///
/// Owns the device exclusively. The current working directory and the
/// open-file table live in memory only and do not survive a restart.
#[derive(Debug)]
pub struct BlockFs<D: BlockDevice> {
    device: D,
    cwd: u32,
    handles: BTreeMap<Fd, u32>,
    next_fd: u64,
}

impl<D: BlockDevice> BlockFs<D> {
    /// Wraps a device whose geometry matches the compiled-in layout.
    pub fn new(device: D) -> Result<Self, FsError> {
        if device.block_size() != BLOCK_SIZE as usize
            || device.block_count() != BLOCK_COUNT as usize
        {
            return Err(FsError::InvalidArgument);
        }
        Ok(Self {
            device,
            cwd: ROOT_INO,
            handles: BTreeMap::new(),
            next_fd: 0,
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub(crate) fn read_device_block(&self, idx: u32) -> Result<Vec<u8>, FsError> {
        let mut block = vec![0u8; BLOCK_SIZE as usize];
        self.device.read_block(idx, &mut block)?;
        Ok(block)
    }

    pub(crate) fn write_device_block(&mut self, idx: u32, block: &[u8]) -> Result<(), FsError> {
        self.device.write_block(idx, block)?;
        Ok(())
    }

    /// Byte-granular read of the metadata region, spanning blocks as needed.
    pub(crate) fn read_at(&self, offset: u32, buf: &mut [u8]) -> Result<(), FsError> {
        let mut done = 0usize;
        while done < buf.len() {
            let pos = offset as usize + done;
            let idx = (pos / BLOCK_SIZE as usize) as u32;
            let in_block = pos % BLOCK_SIZE as usize;
            let span = (BLOCK_SIZE as usize - in_block).min(buf.len() - done);

            let block = self.read_device_block(idx)?;
            buf[done..done + span].copy_from_slice(&block[in_block..in_block + span]);
            done += span;
        }
        Ok(())
    }

    /// Byte-granular write of the metadata region. Partial blocks are
    /// read-modify-written.
    pub(crate) fn write_at(&mut self, offset: u32, buf: &[u8]) -> Result<(), FsError> {
        let mut done = 0usize;
        while done < buf.len() {
            let pos = offset as usize + done;
            let idx = (pos / BLOCK_SIZE as usize) as u32;
            let in_block = pos % BLOCK_SIZE as usize;
            let span = (BLOCK_SIZE as usize - in_block).min(buf.len() - done);

            if span == BLOCK_SIZE as usize {
                self.write_device_block(idx, &buf[done..done + span])?;
            } else {
                let mut block = self.read_device_block(idx)?;
                block[in_block..in_block + span].copy_from_slice(&buf[done..done + span]);
                self.write_device_block(idx, &block)?;
            }
            done += span;
        }
        Ok(())
    }
}
