//! Path addressed filesystem access.
//!
//! The engine never touches `std::fs` directly. It goes through the
//! [`Filesystem`] trait so that the same code runs against the host
//! ([`HostFilesystem`]) or against an in-memory tree ([`MemoryFilesystem`]).
//! Both implementations report failures as `std::io::Error` with matching
//! `ErrorKind`s for the common cases (missing entries, entries in the way).

use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
};

mod host;
mod memory;

pub use host::HostFilesystem;
pub use memory::MemoryFilesystem;

/// Default mode for newly created regular files.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Type of a filesystem entry. Symlinks are never followed when reporting
/// the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    /// Device nodes, sockets and FIFOs.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub kind: FileKind,
    /// Permission bits, including setuid, setgid and sticky.
    pub mode: u32,
    pub len: u64,
}

impl Metadata {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: OsString,
    pub kind: FileKind,
}

pub trait Filesystem: Send + Sync {
    /// Creates an empty file, truncating it if it exists.
    fn create(&self, path: &Path) -> io::Result<()>;

    /// Creates a directory and all missing parents. Directories created by
    /// this call get `mode`. Succeeds if the directory already exists.
    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Reads the whole contents of a file.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Writes `contents` to a file, creating or truncating it. The parent
    /// directory must exist.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Lists a directory, sorted by name. An empty directory yields an empty
    /// list.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Gets metadata, following a final symlink.
    fn metadata(&self, path: &Path) -> io::Result<Metadata>;

    /// Gets metadata without following a final symlink.
    fn symlink_metadata(&self, path: &Path) -> io::Result<Metadata>;

    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Creates a symlink at `link` pointing to `original`.
    fn symlink(&self, original: &Path, link: &Path) -> io::Result<()>;

    /// Sets the permission bits of a file or directory.
    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Removes a file or symlink.
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Removes a directory and everything below it. A symlink is removed
    /// without following it.
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Checks whether an entry exists at the path.
    fn exists(&self, path: &Path) -> bool {
        self.symlink_metadata(path).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Runs the same scenario against any implementation, so the host and
    /// in-memory filesystems are held to the same behavior.
    fn exercise(fs: &dyn Filesystem, root: &Path) {
        // Empty directory
        let empty = root.join("empty");
        fs.create_dir_all(&empty, 0o755).unwrap();
        assert_eq!(fs.read_dir(&empty).unwrap(), vec![]);
        fs.create_dir_all(&empty, 0o755).unwrap();

        // Nested creation
        let nested = root.join("a/b/c");
        fs.create_dir_all(&nested, 0o700).unwrap();
        assert!(fs.symlink_metadata(&nested).unwrap().is_dir());
        assert_eq!(fs.symlink_metadata(&nested).unwrap().mode, 0o700);

        // Files
        let file = root.join("a/file");
        fs.write(&file, b"hello").unwrap();
        assert_eq!(fs.read(&file).unwrap(), b"hello");
        let metadata = fs.symlink_metadata(&file).unwrap();
        assert!(metadata.is_file());
        assert_eq!(metadata.len, 5);
        fs.write(&file, b"bye").unwrap();
        assert_eq!(fs.read(&file).unwrap(), b"bye");
        fs.set_mode(&file, 0o600).unwrap();
        assert_eq!(fs.symlink_metadata(&file).unwrap().mode, 0o600);

        fs.create(&file).unwrap();
        assert_eq!(fs.read(&file).unwrap(), b"");

        // Listing is sorted and typed
        assert_eq!(
            fs.read_dir(&root.join("a")).unwrap(),
            vec![
                DirEntry {
                    name: "b".into(),
                    kind: FileKind::Directory
                },
                DirEntry {
                    name: "file".into(),
                    kind: FileKind::File
                },
            ]
        );

        // Symlinks
        let link = root.join("a/link");
        fs.write(&file, b"through link").unwrap();
        fs.symlink(Path::new("file"), &link).unwrap();
        assert!(fs.symlink_metadata(&link).unwrap().is_symlink());
        assert_eq!(fs.read_link(&link).unwrap(), Path::new("file"));
        assert_eq!(fs.read(&link).unwrap(), b"through link");
        assert_eq!(
            fs.symlink(Path::new("file"), &link).unwrap_err().kind(),
            io::ErrorKind::AlreadyExists
        );
        fs.remove_file(&link).unwrap();
        assert!(!fs.exists(&link));

        // Following a symlink to a directory
        let dir_link = root.join("dir-link");
        fs.symlink(&root.join("a"), &dir_link).unwrap();
        assert!(fs.metadata(&dir_link).unwrap().is_dir());
        assert!(fs.symlink_metadata(&dir_link).unwrap().is_symlink());
        fs.remove_dir_all(&dir_link).unwrap();
        assert!(!fs.exists(&dir_link));
        assert!(fs.exists(&root.join("a/b/c")));

        // Removing a tree
        let tree = root.join("tree");
        fs.create_dir_all(&tree.join("x/y"), 0o755).unwrap();
        fs.write(&tree.join("x/file"), b"gone").unwrap();
        fs.create_dir_all(&root.join("tree-sibling"), 0o755).unwrap();
        fs.remove_dir_all(&tree).unwrap();
        assert!(!fs.exists(&tree));
        assert!(fs.exists(&root.join("tree-sibling")));
        assert!(fs.remove_dir_all(&file).is_err());

        // Errors
        let missing = root.join("missing");
        assert_eq!(
            fs.read(&missing).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
        assert_eq!(
            fs.read_dir(&missing).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
        assert_eq!(
            fs.write(&missing.join("file"), b"x").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
        assert!(fs.create_dir_all(&file.join("sub"), 0o755).is_err());
        assert!(fs.read(&root.join("a")).is_err());
    }

    #[test]
    fn test_host_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&HostFilesystem, dir.path());
    }

    #[test]
    fn test_memory_filesystem() {
        let fs = MemoryFilesystem::new();
        fs.create_dir_all(Path::new("/tmp/root"), 0o755).unwrap();
        exercise(&fs, Path::new("/tmp/root"));
    }
}
