//! Operations that bring new names into the tree.
//!
//! Each of these may allocate a descriptor and then fail while linking it
//! in (typically on a name collision). Every durable step taken so far is
//! undone before the error is re-raised, so a failed call leaves the
//! descriptor table and the bitmap exactly as they were.

use log::debug;

use crate::fs::{BlockFs, FileKind, FsError, InodeRecord};
use crate::hal::storage::BlockDevice;

impl<D: BlockDevice> BlockFs<D> {
    /// Creates an empty regular file at `path`.
    pub fn create(&mut self, path: &str) -> Result<(), FsError> {
        let (parent_ino, name) = self.resolve_parent(path)?;
        let ino = self.allocate_descriptor(FileKind::Regular)?;

        if let Err(e) = self.add_link(parent_ino, ino, &name) {
            self.discard_descriptor(ino)?;
            return Err(e);
        }
        debug!("created {path} as inode {ino}");
        Ok(())
    }

    /// Creates a directory at `path` containing `.` and `..`.
    pub fn mkdir(&mut self, path: &str) -> Result<(), FsError> {
        let (parent_ino, name) = self.resolve_parent(path)?;
        let ino = self.allocate_descriptor(FileKind::Directory)?;

        if let Err(e) = self.add_link(parent_ino, ino, &name) {
            self.discard_descriptor(ino)?;
            return Err(e);
        }
        if let Err(e) = self.write_dot_entries(ino, parent_ino) {
            let _ = self.remove_link(parent_ino, &name);
            self.discard_descriptor(ino)?;
            return Err(e);
        }
        debug!("created directory {path} as inode {ino}");
        Ok(())
    }

    fn write_dot_entries(&mut self, ino: u32, parent_ino: u32) -> Result<(), FsError> {
        self.add_link(ino, ino, ".")?;
        self.add_link(ino, parent_ino, "..")
    }

    /// Creates a symlink at `path` whose body is `target`. The body is
    /// stored verbatim; nothing checks that it resolves.
    pub fn symlink(&mut self, path: &str, target: &str) -> Result<(), FsError> {
        let (parent_ino, name) = self.resolve_parent(path)?;
        let ino = self.allocate_descriptor(FileKind::Symlink)?;

        if let Err(e) = self.write_symlink_body(ino, target) {
            self.discard_descriptor(ino)?;
            return Err(e);
        }
        if let Err(e) = self.add_link(parent_ino, ino, &name) {
            self.discard_descriptor(ino)?;
            return Err(e);
        }
        debug!("created symlink {path} -> {target}");
        Ok(())
    }

    fn write_symlink_body(&mut self, ino: u32, target: &str) -> Result<(), FsError> {
        let mut record = self.get_descriptor(ino)?;
        self.resize(&mut record, target.len() as u32)?;
        self.write_bytes(&mut record, 0, target.as_bytes())?;
        self.update_descriptor(&record)
    }

    /// Adds a second name for the regular file at `src`.
    ///
    /// Hard links to directories are rejected, as are links to symlinks:
    /// only regular files may carry extra names.
    pub fn link(&mut self, src: &str, dst: &str) -> Result<(), FsError> {
        let src_ino = self.lookup(src, false)?;
        if self.get_descriptor(src_ino)?.kind != FileKind::Regular {
            return Err(FsError::InvalidPath);
        }

        let (parent_ino, name) = self.resolve_parent(dst)?;
        self.add_link(parent_ino, src_ino, &name)?;
        debug!("linked {dst} -> inode {src_ino}");
        Ok(())
    }

    fn allocate_descriptor(&mut self, kind: FileKind) -> Result<u32, FsError> {
        let ino = self.find_unused_descriptor()?;
        let mut record = InodeRecord::unused(ino);
        record.kind = kind;
        self.update_descriptor(&record)?;
        Ok(ino)
    }

    /// Rolls a partially created inode back to UNUSED, returning any blocks
    /// its body had claimed.
    fn discard_descriptor(&mut self, ino: u32) -> Result<(), FsError> {
        let mut record = self.get_descriptor(ino)?;
        self.resize(&mut record, 0)?;
        self.update_descriptor(&InodeRecord::unused(ino))
    }
}

#[cfg(test)]
mod tests {
    use crate::fs::tests::fresh_fs;
    use crate::fs::{DENTRY_SIZE, FileKind, FsError, ROOT_INO};

    #[test]
    fn create_links_a_fresh_regular_inode() {
        let mut fs = fresh_fs(10);
        fs.create("/file").unwrap();

        let record = fs.get_descriptor(1).unwrap();
        assert_eq!(record.kind, FileKind::Regular);
        assert_eq!(record.refs, 1);
        assert_eq!(record.size, 0);
    }

    #[test]
    fn mkdir_sets_up_dot_entries_and_refs() {
        let mut fs = fresh_fs(16);
        fs.mkdir("/a").unwrap();

        let a = fs.stat("/a").unwrap();
        assert_eq!(a.kind, FileKind::Directory);
        assert_eq!(a.refs, 2);
        assert_eq!(a.size, 2 * DENTRY_SIZE);

        // The child's `..` holds a reference on the parent.
        let root = fs.get_descriptor(ROOT_INO).unwrap();
        assert_eq!(root.refs, 3);

        let entries = fs.readdir("/a").unwrap();
        assert_eq!(entries[0].name, ".");
        assert_eq!(entries[0].ino, a.ino);
        assert_eq!(entries[1].name, "..");
        assert_eq!(entries[1].ino, ROOT_INO);
    }

    #[test]
    fn collision_rolls_the_descriptor_back() {
        let mut fs = fresh_fs(10);
        fs.create("/x").unwrap();
        let free_before = fs.stats().unwrap();

        assert_eq!(fs.mkdir("/x"), Err(FsError::FileAlreadyExist));
        assert_eq!(fs.symlink("/x", "anywhere"), Err(FsError::FileAlreadyExist));
        assert_eq!(fs.create("/x"), Err(FsError::FileAlreadyExist));

        let after = fs.stats().unwrap();
        assert_eq!(after.free_descriptors, free_before.free_descriptors);
        assert_eq!(after.free_blocks, free_before.free_blocks);

        // The rolled-back descriptor is the next one handed out.
        fs.create("/y").unwrap();
        assert_eq!(fs.stat("/y").unwrap().ino, 2);
    }

    #[test]
    fn hard_links_to_directories_are_rejected() {
        let mut fs = fresh_fs(16);
        fs.mkdir("/d").unwrap();
        assert_eq!(fs.link("/d", "/d2"), Err(FsError::InvalidPath));
    }

    #[test]
    fn hard_links_to_symlinks_are_rejected() {
        let mut fs = fresh_fs(16);
        fs.symlink("/s", "/nowhere").unwrap();
        assert_eq!(fs.link("/s", "/s2"), Err(FsError::InvalidPath));
    }

    #[test]
    fn link_shares_the_inode_and_bumps_refs() {
        let mut fs = fresh_fs(10);
        fs.create("/file").unwrap();
        fs.link("/file", "/alias").unwrap();

        let a = fs.stat("/file").unwrap();
        let b = fs.stat("/alias").unwrap();
        assert_eq!(a.ino, b.ino);
        assert_eq!(a.refs, 2);
    }

    #[test]
    fn symlink_bodies_are_stored_verbatim() {
        let mut fs = fresh_fs(10);
        fs.symlink("/s", "/does/not/exist").unwrap();
        let record = fs.get_descriptor(fs.lookup("/s", false).unwrap()).unwrap();
        assert_eq!(record.kind, FileKind::Symlink);
        assert_eq!(record.size, "/does/not/exist".len() as u32);
    }

    #[test]
    fn creating_under_a_missing_parent_fails() {
        let mut fs = fresh_fs(10);
        assert_eq!(fs.create("/no/file"), Err(FsError::InvalidPath));
    }

    #[test]
    fn creating_under_a_file_fails() {
        let mut fs = fresh_fs(10);
        fs.create("/f").unwrap();
        assert_eq!(fs.create("/f/child"), Err(FsError::InvalidPath));
        assert_eq!(fs.mkdir("/f/child"), Err(FsError::InvalidPath));
    }
}
