//! A Unix-style file system stored inside a fixed-geometry block device.
//!
//! The device is a flat array of equally sized blocks of opaque bytes; the
//! driver lays a free-block bitmap, a descriptor table and a data region on
//! top of it and exposes path-based operations (`create`, `mkdir`,
//! `symlink`, `open`, `read`, `write`, ...). Everything lives on the device:
//! inodes, bitmap bits, indirect blocks and directory bodies are all just
//! projections onto device bytes, and every mutation goes through the
//! device's block-write interface.
//!
//! The driver is single-threaded and synchronous. It owns its device
//! exclusively; embedders that need sharing can wrap the whole [`BlockFs`]
//! in a mutex without changing any semantics.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod fs;
pub mod hal;

pub use fs::{BlockFs, DirEntry, Fd, FileKind, FileStat, FsError, FsStats, InodeRecord};
pub use hal::storage::{BlockDevice, MemDisk, StorageErr};
