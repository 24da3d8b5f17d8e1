use std::{
    fs::{self, DirBuilder, File, FileType, Permissions},
    io,
    os::unix::fs::{DirBuilderExt, PermissionsExt},
    path::{Path, PathBuf},
};

use log::trace;

use super::{DirEntry, FileKind, Filesystem, Metadata};

/// Filesystem backed by the host's `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostFilesystem;

fn file_kind(file_type: FileType) -> FileKind {
    if file_type.is_symlink() {
        FileKind::Symlink
    } else if file_type.is_dir() {
        FileKind::Directory
    } else if file_type.is_file() {
        FileKind::File
    } else {
        FileKind::Other
    }
}

fn convert_metadata(metadata: fs::Metadata) -> Metadata {
    Metadata {
        kind: file_kind(metadata.file_type()),
        mode: metadata.permissions().mode() & 0o7777,
        len: metadata.len(),
    }
}

impl Filesystem for HostFilesystem {
    fn create(&self, path: &Path) -> io::Result<()> {
        trace!("Creating file '{}'", path.display());
        File::create(path).map(|_| ())
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        trace!("Creating directory '{}' with mode {mode:#o}", path.display());
        DirBuilder::new().recursive(true).mode(mode).create(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        trace!("Writing {} bytes to '{}'", contents.len(), path.display());
        fs::write(path, contents)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = fs::read_dir(path)?
            .map(|entry| {
                let entry = entry?;
                Ok(DirEntry {
                    name: entry.file_name(),
                    kind: file_kind(entry.file_type()?),
                })
            })
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn metadata(&self, path: &Path) -> io::Result<Metadata> {
        fs::metadata(path).map(convert_metadata)
    }

    fn symlink_metadata(&self, path: &Path) -> io::Result<Metadata> {
        fs::symlink_metadata(path).map(convert_metadata)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(path)
    }

    fn symlink(&self, original: &Path, link: &Path) -> io::Result<()> {
        trace!(
            "Creating symlink '{}' -> '{}'",
            link.display(),
            original.display()
        );
        std::os::unix::fs::symlink(original, link)
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        fs::set_permissions(path, Permissions::from_mode(mode))
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        trace!("Removing directory tree '{}'", path.display());
        fs::remove_dir_all(path)
    }
}
