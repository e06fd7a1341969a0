//! The open-file table and handle-based I/O.
//!
//! A handle is nothing but a fresh identifier bound to an inode number; it
//! carries no cursor and no reference count, and it does not keep the file
//! alive. A file unlinked while open leaves the handle dangling, and the
//! dangling handle fails on use.

use alloc::string::String;
use alloc::vec::Vec;

use crate::fs::{BLOCK_COUNT, BlockFs, Fd, FileKind, FileStat, FsError, FsStats, InodeRecord};
use crate::hal::storage::BlockDevice;

impl<D: BlockDevice> BlockFs<D> {
    /// Opens the regular file at `path` and returns a fresh handle.
    pub fn open(&mut self, path: &str) -> Result<Fd, FsError> {
        let ino = self.lookup(path, false)?;
        if self.get_descriptor(ino)?.kind != FileKind::Regular {
            return Err(FsError::InvalidPath);
        }

        let fd = Fd(self.next_fd);
        self.next_fd += 1;
        self.handles.insert(fd, ino);
        Ok(fd)
    }

    /// Forgets a handle. Unknown handles are ignored.
    pub fn close(&mut self, fd: Fd) {
        self.handles.remove(&fd);
    }

    fn handle_record(&self, fd: Fd) -> Result<InodeRecord, FsError> {
        let ino = *self.handles.get(&fd).ok_or(FsError::InvalidArgument)?;
        let record = self.get_descriptor(ino)?;
        if record.kind != FileKind::Regular {
            return Err(FsError::InvalidArgument);
        }
        Ok(record)
    }

    /// Reads `len` bytes at `offset` through an open handle.
    pub fn read(&self, fd: Fd, offset: u32, len: u32) -> Result<Vec<u8>, FsError> {
        let record = self.handle_record(fd)?;
        self.read_bytes(&record, offset, len)
    }

    /// Writes `data` at `offset` through an open handle. The write must
    /// stay within the file's current size.
    pub fn write(&mut self, fd: Fd, offset: u32, data: &[u8]) -> Result<(), FsError> {
        let mut record = self.handle_record(fd)?;
        self.write_bytes(&mut record, offset, data)?;
        self.update_descriptor(&record)
    }

    /// Descriptor metadata for `path`, trailing symlink not followed.
    pub fn stat(&self, path: &str) -> Result<FileStat, FsError> {
        let ino = self.lookup(path, false)?;
        let record = self.get_descriptor(ino)?;
        Ok(FileStat {
            ino,
            kind: record.kind,
            refs: record.refs,
            size: record.size,
        })
    }

    /// The body of the symlink at `path`.
    pub fn readlink(&self, path: &str) -> Result<String, FsError> {
        let ino = self.lookup(path, false)?;
        let record = self.get_descriptor(ino)?;
        if record.kind != FileKind::Symlink {
            return Err(FsError::InvalidPath);
        }
        let body = self.read_bytes(&record, 0, record.size)?;
        String::from_utf8(body).map_err(|_| FsError::InvalidPath)
    }

    /// Aggregate usage counters, by linear scan.
    pub fn stats(&self) -> Result<FsStats, FsError> {
        let n = self.get_n()?;
        let mut free_descriptors = 0;
        for ino in 0..n {
            if self.get_descriptor(ino)?.kind == FileKind::Unused {
                free_descriptors += 1;
            }
        }
        Ok(FsStats {
            block_count: BLOCK_COUNT,
            free_blocks: self.free_block_count()?,
            descriptor_count: n,
            free_descriptors,
        })
    }
}
