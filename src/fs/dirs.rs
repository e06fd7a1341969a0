//! Directory bodies and the links stored in them.
//!
//! A directory's file body is a packed sequence of `DENTRY_SIZE` records,
//! nothing else; its length is always a multiple of `DENTRY_SIZE`. The
//! first two entries of every directory are `.` and `..`.

use alloc::string::String;
use alloc::vec::Vec;
use log::debug;

use crate::fs::{BlockFs, DENTRY_SIZE, DirEntry, FileKind, FsError, InodeRecord};
use crate::hal::storage::BlockDevice;

impl<D: BlockDevice> BlockFs<D> {
    pub(crate) fn read_dir_entries(&self, record: &InodeRecord) -> Result<Vec<DirEntry>, FsError> {
        if record.kind != FileKind::Directory {
            return Err(FsError::InvalidPath);
        }
        let raw = self.read_bytes(record, 0, record.size)?;
        let mut entries = Vec::with_capacity((record.size / DENTRY_SIZE) as usize);
        for chunk in raw.chunks_exact(DENTRY_SIZE as usize) {
            entries.push(DirEntry::try_from(chunk)?);
        }
        Ok(entries)
    }

    /// Appends an entry binding `name` to `target_ino` at the directory's
    /// tail and bumps the target's reference count.
    pub(crate) fn add_link(
        &mut self,
        dir_ino: u32,
        target_ino: u32,
        name: &str,
    ) -> Result<(), FsError> {
        let mut dir = self.get_descriptor(dir_ino)?;
        let entries = self.read_dir_entries(&dir)?;
        if entries.iter().any(|e| e.name == name) {
            return Err(FsError::FileAlreadyExist);
        }

        let tail = dir.size;
        self.resize(&mut dir, tail + DENTRY_SIZE)?;
        self.write_bytes(&mut dir, tail, &DirEntry::new(name, target_ino).to_buf())?;
        self.update_descriptor(&dir)?;

        // Re-read in case the directory references itself.
        let mut target = self.get_descriptor(target_ino)?;
        target.refs += 1;
        self.update_descriptor(&target)
    }

    /// Removes the entry called `name`, rewriting the surviving list from
    /// offset 0 and truncating to its exact length. When the target's
    /// reference count drops to zero its record is reclaimed.
    pub(crate) fn remove_link(&mut self, dir_ino: u32, name: &str) -> Result<(), FsError> {
        let mut dir = self.get_descriptor(dir_ino)?;
        let entries = self.read_dir_entries(&dir)?;
        let position = entries
            .iter()
            .position(|e| e.name == name)
            .ok_or(FsError::InvalidPath)?;
        let target_ino = entries[position].ino;

        let mut survivors = Vec::with_capacity(entries.len().saturating_sub(1) * DENTRY_SIZE as usize);
        for (i, entry) in entries.iter().enumerate() {
            if i != position {
                survivors.extend(entry.to_buf());
            }
        }
        if !survivors.is_empty() {
            self.write_bytes(&mut dir, 0, &survivors)?;
        }
        let new_size = dir.size - DENTRY_SIZE;
        self.resize(&mut dir, new_size)?;
        self.update_descriptor(&dir)?;

        let mut target = self.get_descriptor(target_ino)?;
        target.refs -= 1;
        if target.refs == 0 {
            self.resize(&mut target, 0)?;
            target.kind = FileKind::Unused;
            debug!("reclaimed inode {}", target.ino);
        }
        self.update_descriptor(&target)
    }

    /// Lists the directory at `path` in storage order.
    pub fn readdir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        let ino = self.lookup(path, false)?;
        let record = self.get_descriptor(ino)?;
        self.read_dir_entries(&record)
    }

    /// Moves the working directory. The trailing component may be a
    /// symlink; it is followed.
    pub fn cd(&mut self, path: &str) -> Result<(), FsError> {
        let ino = self.lookup(path, true)?;
        if self.get_descriptor(ino)?.kind != FileKind::Directory {
            return Err(FsError::InvalidPath);
        }
        self.cwd = ino;
        Ok(())
    }

    /// Rebuilds the absolute path of the working directory by walking `..`
    /// entries upwards until the directory whose `.` and `..` agree (the
    /// root), finding the current directory's name in each parent.
    pub fn pwd(&self) -> Result<String, FsError> {
        let mut names: Vec<String> = Vec::new();
        let mut current = self.cwd;

        loop {
            let record = self.get_descriptor(current)?;
            let entries = self.read_dir_entries(&record)?;
            let dot = entries
                .iter()
                .find(|e| e.name == ".")
                .ok_or(FsError::InvalidPath)?;
            let dotdot = entries
                .iter()
                .find(|e| e.name == "..")
                .ok_or(FsError::InvalidPath)?;
            if dot.ino == dotdot.ino {
                break;
            }

            let parent = self.get_descriptor(dotdot.ino)?;
            let own_entry = self
                .read_dir_entries(&parent)?
                .into_iter()
                .find(|e| e.ino == current && e.name != "." && e.name != "..")
                .ok_or(FsError::InvalidPath)?;
            names.push(own_entry.name);
            current = dotdot.ino;
        }

        let mut out = String::from("/");
        for (i, name) in names.iter().rev().enumerate() {
            if i > 0 {
                out.push('/');
            }
            out.push_str(name);
        }
        Ok(out)
    }
}
