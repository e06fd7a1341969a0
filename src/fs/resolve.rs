//! Component-wise path resolution.
//!
//! A path is split around its final `/`; the parent part is resolved
//! recursively (always following symlinks), then the final component is
//! looked up among the parent's entries. A leading `/` anchors the walk at
//! the root, anything else at the caller's base (the working directory at
//! the top level). Symlink bodies resolve relative to the directory
//! containing the symlink, and one expansion budget covers the entire walk.

use alloc::string::String;

use crate::fs::{BlockFs, FileKind, FsError, MAX_SYMLINK_DEPTH, ROOT_INO};
use crate::hal::path;
use crate::hal::storage::BlockDevice;

impl<D: BlockDevice> BlockFs<D> {
    /// Resolves `path` to an inode number, starting from the working
    /// directory for relative paths.
    ///
    /// With `follow_trailing` unset a symlink in the final position is
    /// returned as itself; intermediate symlinks are always expanded.
    pub fn lookup(&self, path: &str, follow_trailing: bool) -> Result<u32, FsError> {
        let mut depth = 0;
        self.lookup_from(path, self.cwd, follow_trailing, &mut depth)
    }

    pub(crate) fn lookup_from(
        &self,
        path: &str,
        base: u32,
        follow_trailing: bool,
        depth: &mut u32,
    ) -> Result<u32, FsError> {
        if path == "/" {
            return Ok(ROOT_INO);
        }
        if path.is_empty() {
            return Ok(base);
        }

        let (parent_path, name) = path::split(path);
        let parent_ino = if parent_path.is_empty() {
            base
        } else {
            self.lookup_from(parent_path, base, true, depth)?
        };

        let parent = self.get_descriptor(parent_ino)?;
        let entry = self
            .read_dir_entries(&parent)?
            .into_iter()
            .find(|e| e.name == name)
            .ok_or(FsError::InvalidPath)?;

        let record = self.get_descriptor(entry.ino)?;
        if record.kind == FileKind::Symlink && follow_trailing {
            if *depth >= MAX_SYMLINK_DEPTH {
                return Err(FsError::SymlinkDepthExceeded);
            }
            *depth += 1;

            let body = self.read_bytes(&record, 0, record.size)?;
            let body = String::from_utf8(body).map_err(|_| FsError::InvalidPath)?;
            return self.lookup_from(&body, parent_ino, true, depth);
        }

        Ok(entry.ino)
    }

    /// Resolves the directory that holds the final component of `path` and
    /// returns it with the component's name. The path itself need not
    /// exist; its parent must.
    pub(crate) fn resolve_parent(&self, path: &str) -> Result<(u32, String), FsError> {
        if path.is_empty() || path == "/" {
            return Err(FsError::InvalidPath);
        }

        let (parent_path, name) = path::split(path);
        if name.is_empty() {
            return Err(FsError::InvalidPath);
        }

        let mut depth = 0;
        let parent_ino = if parent_path.is_empty() {
            self.cwd
        } else {
            self.lookup_from(parent_path, self.cwd, true, &mut depth)?
        };
        if self.get_descriptor(parent_ino)?.kind != FileKind::Directory {
            return Err(FsError::InvalidPath);
        }
        Ok((parent_ino, String::from(name)))
    }
}

#[cfg(test)]
mod tests {
    use crate::fs::tests::fresh_fs;
    use crate::fs::{FileKind, FsError, ROOT_INO};

    #[test]
    fn root_and_empty_paths_resolve_canonically() {
        let mut fs = fresh_fs(16);
        fs.mkdir("/d").unwrap();
        fs.cd("/d").unwrap();

        assert_eq!(fs.lookup("/", false).unwrap(), ROOT_INO);
        let cwd = fs.lookup("", false).unwrap();
        assert_eq!(cwd, fs.lookup("/d", false).unwrap());
    }

    #[test]
    fn relative_paths_resolve_from_the_working_directory() {
        let mut fs = fresh_fs(16);
        fs.mkdir("/d").unwrap();
        fs.create("/d/f").unwrap();

        fs.cd("/d").unwrap();
        assert_eq!(
            fs.lookup("f", false).unwrap(),
            fs.lookup("/d/f", false).unwrap()
        );
        assert_eq!(
            fs.lookup("../d/f", false).unwrap(),
            fs.lookup("/d/f", false).unwrap()
        );
    }

    #[test]
    fn missing_components_are_invalid() {
        let fs = fresh_fs(10);
        assert_eq!(fs.lookup("/nope", false), Err(FsError::InvalidPath));
        assert_eq!(fs.lookup("/nope/deeper", false), Err(FsError::InvalidPath));
    }

    #[test]
    fn empty_components_are_invalid() {
        let mut fs = fresh_fs(16);
        fs.mkdir("/a").unwrap();
        fs.mkdir("/a/b").unwrap();
        assert_eq!(fs.lookup("/a//b", false), Err(FsError::InvalidPath));
    }

    #[test]
    fn trailing_symlinks_follow_only_on_request() {
        let mut fs = fresh_fs(16);
        fs.mkdir("/d").unwrap();
        fs.symlink("/lnk", "/d").unwrap();

        let raw = fs.lookup("/lnk", false).unwrap();
        assert_eq!(
            fs.get_descriptor(raw).unwrap().kind,
            FileKind::Symlink
        );
        assert_eq!(
            fs.lookup("/lnk", true).unwrap(),
            fs.lookup("/d", false).unwrap()
        );
    }

    #[test]
    fn intermediate_symlinks_always_follow() {
        let mut fs = fresh_fs(16);
        fs.mkdir("/d").unwrap();
        fs.create("/d/f").unwrap();
        fs.symlink("/lnk", "/d").unwrap();

        assert_eq!(
            fs.lookup("/lnk/f", false).unwrap(),
            fs.lookup("/d/f", false).unwrap()
        );
    }

    #[test]
    fn symlink_bodies_resolve_from_their_own_directory() {
        let mut fs = fresh_fs(16);
        fs.mkdir("/a").unwrap();
        fs.mkdir("/a/b").unwrap();
        fs.create("/a/peer").unwrap();
        fs.symlink("/a/b/up", "../peer").unwrap();

        // Resolution must not depend on the working directory.
        fs.cd("/a/b").unwrap();
        assert_eq!(
            fs.lookup("/a/b/up", true).unwrap(),
            fs.lookup("/a/peer", false).unwrap()
        );
        fs.cd("/").unwrap();
        assert_eq!(
            fs.lookup("/a/b/up", true).unwrap(),
            fs.lookup("/a/peer", false).unwrap()
        );
    }
}
