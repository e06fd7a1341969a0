//! Removing names, and reclaiming inodes when the last name goes.

use log::debug;

use crate::fs::{BlockFs, FileKind, FsError, ROOT_INO};
use crate::hal::storage::BlockDevice;

impl<D: BlockDevice> BlockFs<D> {
    /// Removes the name at `path`. Directories cannot be unlinked. When the
    /// removed name was the inode's last reference, its body and record are
    /// reclaimed; open handles to it are left dangling.
    pub fn unlink(&mut self, path: &str) -> Result<(), FsError> {
        let ino = self.lookup(path, false)?;
        if self.get_descriptor(ino)?.kind == FileKind::Directory {
            return Err(FsError::InvalidPath);
        }

        let (parent_ino, name) = self.resolve_parent(path)?;
        self.remove_link(parent_ino, &name)?;
        debug!("unlinked {path}");
        Ok(())
    }

    /// Removes the empty directory at `path`.
    ///
    /// Empty means the body holds exactly `.` and `..`. A directory whose
    /// refcount is back to 2 but which still holds files or symlinks (they
    /// never raise a directory's refcount) is refused, since removing it
    /// would strand their inodes.
    pub fn rmdir(&mut self, path: &str) -> Result<(), FsError> {
        let ino = self.lookup(path, false)?;
        if ino == ROOT_INO {
            return Err(FsError::InvalidPath);
        }
        let record = self.get_descriptor(ino)?;
        if record.kind != FileKind::Directory {
            return Err(FsError::InvalidPath);
        }
        if self.read_dir_entries(&record)?.len() > 2 {
            return Err(FsError::DirectoryNotEmpty);
        }

        let (parent_ino, name) = self.resolve_parent(path)?;
        if name == "." || name == ".." {
            return Err(FsError::InvalidPath);
        }

        self.remove_link(ino, ".")?;
        self.remove_link(ino, "..")?;
        self.remove_link(parent_ino, &name)?;
        debug!("removed directory {path}");
        Ok(())
    }
}
