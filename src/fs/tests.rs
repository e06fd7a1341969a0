//! End-to-end scenarios run against a memory-backed device.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use std::collections::BTreeMap;

use crate::fs::{
    BLOCK_COUNT, BLOCK_SIZE, BlockFs, DENTRY_SIZE, FileKind, FsError, NAN_BLOCK_ADDRESS, ROOT_INO,
    STRAIGHT_LINKS_COUNT, ZERO_BLOCK_ADDRESS,
};
use crate::hal::storage::MemDisk;

pub(crate) fn fresh_fs(n: u32) -> BlockFs<MemDisk> {
    let _ = env_logger::builder().is_test(true).try_init();
    let disk = MemDisk::new(BLOCK_SIZE as usize, BLOCK_COUNT as usize);
    let mut fs = BlockFs::new(disk).unwrap();
    fs.mkfs(n).unwrap();
    fs
}

fn names_and_inos(fs: &BlockFs<MemDisk>, path: &str) -> Vec<(String, u32)> {
    fs.readdir(path)
        .unwrap()
        .into_iter()
        .map(|e| (e.name, e.ino))
        .collect()
}

fn listing(entries: &[(&str, u32)]) -> Vec<(String, u32)> {
    entries
        .iter()
        .map(|(name, ino)| (String::from(*name), *ino))
        .collect()
}

#[test]
fn geometry_mismatch_is_rejected() {
    let disk = MemDisk::new(512, 16);
    assert!(matches!(BlockFs::new(disk), Err(FsError::InvalidArgument)));
}

#[test]
fn descriptor_zero_after_mkfs() {
    let fs = fresh_fs(10);
    let root = fs.get_descriptor(ROOT_INO).unwrap();

    assert_eq!(root.ino, ROOT_INO);
    assert_eq!(root.kind, FileKind::Directory);
    assert_eq!(root.refs, 2);
    assert_eq!(root.size, 2 * DENTRY_SIZE);

    // The two dentries are real bytes, so slot 0 holds an allocated block;
    // everything past the logical end points nowhere.
    assert_ne!(root.straight_links[0], NAN_BLOCK_ADDRESS);
    assert_ne!(root.straight_links[0], ZERO_BLOCK_ADDRESS);
    for idx in 1..STRAIGHT_LINKS_COUNT {
        assert_eq!(root.straight_links[idx], NAN_BLOCK_ADDRESS);
    }
    assert_eq!(root.single_indirect, NAN_BLOCK_ADDRESS);
    assert_eq!(root.double_indirect, NAN_BLOCK_ADDRESS);
}

#[test]
fn create_shows_up_in_the_root_listing() {
    let mut fs = fresh_fs(10);
    fs.create("/file").unwrap();

    assert_eq!(
        names_and_inos(&fs, "/"),
        listing(&[(".", 0), ("..", 0), ("file", 1)])
    );

    let record = fs.get_descriptor(1).unwrap();
    assert_eq!(record.kind, FileKind::Regular);
    assert_eq!(record.refs, 1);
    assert_eq!(record.size, 0);
}

#[test]
fn link_then_unlink_is_a_no_op() {
    let mut fs = fresh_fs(10);
    fs.create("/file").unwrap();
    fs.link("/file", "/link").unwrap();
    assert_eq!(fs.get_descriptor(1).unwrap().refs, 2);

    fs.unlink("/link").unwrap();
    assert_eq!(
        names_and_inos(&fs, "/"),
        listing(&[(".", 0), ("..", 0), ("file", 1)])
    );
    assert_eq!(fs.get_descriptor(1).unwrap().refs, 1);
}

#[test]
fn write_shrink_grow_exposes_zeros() {
    let mut fs = fresh_fs(10);
    fs.create("/f").unwrap();
    fs.truncate("/f", 20).unwrap();

    let fd = fs.open("/f").unwrap();
    fs.write(fd, 10, &[1, 2, 3, 4, 5, 6, 7]).unwrap();

    fs.truncate("/f", 15).unwrap();
    fs.truncate("/f", 30).unwrap();

    let mut expected = vec![0u8; 10];
    expected.extend([1, 2, 3, 4, 5]);
    expected.extend([0u8; 15]);
    assert_eq!(fs.read(fd, 0, 30).unwrap(), expected);
}

#[test]
fn symlink_traversal_through_parents() {
    let mut fs = fresh_fs(16);
    fs.mkdir("/a").unwrap();
    fs.mkdir("/a/b").unwrap();
    fs.mkdir("/a/b/c").unwrap();
    fs.symlink("/a/b/c/up", "../..").unwrap();

    // `../..` is interpreted from the symlink's own directory.
    assert_eq!(
        fs.lookup("/a/b/c/up", true).unwrap(),
        fs.lookup("/a", false).unwrap()
    );

    let a = fs.lookup("/a", false).unwrap();
    let b = fs.lookup("/a/b", false).unwrap();
    let c = fs.lookup("/a/b/c", false).unwrap();
    assert_eq!(
        names_and_inos(&fs, "/a/b/c/up/b"),
        listing(&[(".", b), ("..", a), ("c", c)])
    );
}

#[test]
fn symlink_recursion_is_bounded() {
    let mut fs = fresh_fs(10);
    fs.symlink("/s", ".").unwrap();
    assert_eq!(
        fs.lookup("/s/s/s/s/s/s", true),
        Err(FsError::SymlinkDepthExceeded)
    );
    // A shorter chain still resolves.
    assert_eq!(fs.lookup("/s/s/s/s/s", true).unwrap(), ROOT_INO);
}

#[test]
fn cd_through_a_symlink_updates_pwd() {
    let mut fs = fresh_fs(16);
    fs.mkdir("/a").unwrap();
    fs.mkdir("/a/b").unwrap();
    fs.symlink("/jump", "/a/b").unwrap();

    fs.cd("/jump").unwrap();
    assert_eq!(fs.pwd().unwrap(), "/a/b");
}

#[test]
fn refs_match_the_entries_across_the_tree() {
    let mut fs = fresh_fs(16);
    fs.mkdir("/a").unwrap();
    fs.create("/a/f").unwrap();
    fs.link("/a/f", "/g").unwrap();
    fs.symlink("/s", "/a").unwrap();

    let n = fs.stats().unwrap().descriptor_count;
    let mut tally: BTreeMap<u32, u16> = BTreeMap::new();
    for ino in 0..n {
        let record = fs.get_descriptor(ino).unwrap();
        if record.kind != FileKind::Directory {
            continue;
        }
        for entry in fs.read_dir_entries(&record).unwrap() {
            *tally.entry(entry.ino).or_default() += 1;
        }
    }

    for ino in 0..n {
        let record = fs.get_descriptor(ino).unwrap();
        if record.kind == FileKind::Unused {
            continue;
        }
        assert_eq!(
            record.refs,
            tally.get(&ino).copied().unwrap_or(0),
            "inode {ino}"
        );
    }
}

#[test]
fn slots_past_the_logical_end_always_point_nowhere() {
    let mut fs = fresh_fs(16);
    fs.mkdir("/d").unwrap();
    fs.create("/d/f").unwrap();
    fs.truncate("/d/f", BLOCK_SIZE * 4 + 17).unwrap();
    fs.truncate("/d/f", BLOCK_SIZE * 2).unwrap();

    let n = fs.stats().unwrap().descriptor_count;
    for ino in 0..n {
        let record = fs.get_descriptor(ino).unwrap();
        if record.kind == FileKind::Unused {
            continue;
        }
        let used = ((record.size + BLOCK_SIZE - 1) / BLOCK_SIZE) as usize;
        for idx in used..STRAIGHT_LINKS_COUNT {
            assert_eq!(record.straight_links[idx], NAN_BLOCK_ADDRESS, "inode {ino}");
        }
    }
}

#[test]
fn files_reach_into_the_double_indirect_region() {
    let mut fs = fresh_fs(10);
    fs.create("/big").unwrap();

    let offset = (STRAIGHT_LINKS_COUNT as u32 + crate::fs::ADDRESSES_IN_BLOCK + 3) * BLOCK_SIZE;
    fs.truncate("/big", offset + 8).unwrap();

    let fd = fs.open("/big").unwrap();
    fs.write(fd, offset, &[0xaa; 8]).unwrap();
    assert_eq!(fs.read(fd, offset, 8).unwrap(), vec![0xaa; 8]);
    assert_eq!(fs.read(fd, offset - 8, 8).unwrap(), vec![0u8; 8]);

    let record = fs.get_descriptor(fs.stat("/big").unwrap().ino).unwrap();
    assert_ne!(record.double_indirect, NAN_BLOCK_ADDRESS);

    // Shrinking back under the direct tier returns every map block.
    let clean = fs.stats().unwrap().free_blocks;
    fs.truncate("/big", 0).unwrap();
    let record = fs.get_descriptor(fs.stat("/big").unwrap().ino).unwrap();
    assert_eq!(record.double_indirect, NAN_BLOCK_ADDRESS);
    assert_eq!(record.single_indirect, NAN_BLOCK_ADDRESS);
    assert!(fs.stats().unwrap().free_blocks > clean);
}

#[test]
fn writes_never_extend_a_file() {
    let mut fs = fresh_fs(10);
    fs.create("/f").unwrap();
    let fd = fs.open("/f").unwrap();

    assert_eq!(fs.write(fd, 0, &[1]), Err(FsError::OutOfBounds));
    fs.truncate("/f", 4).unwrap();
    assert_eq!(fs.write(fd, 2, &[1, 2, 3]), Err(FsError::OutOfBounds));
    fs.write(fd, 1, &[1, 2, 3]).unwrap();
}

#[test]
fn truncate_rejects_non_regular_targets() {
    let mut fs = fresh_fs(16);
    fs.mkdir("/d").unwrap();
    fs.symlink("/s", "/d").unwrap();
    assert_eq!(fs.truncate("/d", 0), Err(FsError::InvalidPath));
    assert_eq!(fs.truncate("/s", 0), Err(FsError::InvalidPath));
}

#[test]
fn device_exhaustion_surfaces_not_enough_memory() {
    let mut fs = fresh_fs(10);
    fs.create("/hog").unwrap();
    let free = fs.stats().unwrap().free_blocks;

    // A hole large enough to cover every free block, then one more.
    fs.truncate("/hog", free * BLOCK_SIZE).unwrap();
    let fd = fs.open("/hog").unwrap();

    let block = vec![0x55u8; BLOCK_SIZE as usize];
    let mut result = Ok(());
    for idx in 0..free {
        result = fs.write(fd, idx * BLOCK_SIZE, &block);
        if result.is_err() {
            break;
        }
    }
    assert_eq!(result, Err(FsError::NotEnoughMemory));
}
