use std::{
    collections::BTreeMap,
    ffi::OsString,
    io,
    path::{Component, Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use super::{DirEntry, FileKind, Filesystem, Metadata, DEFAULT_FILE_MODE};

/// Maximum number of symlinks followed while resolving one path, matching
/// Linux's MAXSYMLINKS.
const MAX_SYMLINK_HOPS: usize = 40;

const ROOT_DIRECTORY_MODE: u32 = 0o755;

#[derive(Debug, Clone)]
enum Node {
    File { contents: Vec<u8>, mode: u32 },
    Directory { mode: u32 },
    Symlink { target: PathBuf },
}

/// Filesystem kept entirely in memory.
///
/// Only absolute paths are accepted. The tree starts with an empty root
/// directory.
#[derive(Debug)]
pub struct MemoryFilesystem {
    nodes: Mutex<BTreeMap<PathBuf, Node>>,
}

impl Default for MemoryFilesystem {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("No such file or directory: '{}'", path.display()),
    )
}

fn already_exists(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("File exists: '{}'", path.display()),
    )
}

fn is_a_directory(path: &Path) -> io::Error {
    io::Error::other(format!("Is a directory: '{}'", path.display()))
}

fn not_a_directory(path: &Path) -> io::Error {
    io::Error::other(format!("Not a directory: '{}'", path.display()))
}

/// Splits a path into names, keeping `..` so that it is applied after
/// preceding symlinks are resolved.
fn names(path: &Path) -> Vec<OsString> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_os_string()),
            Component::ParentDir => Some("..".into()),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => None,
        })
        .collect()
}

impl MemoryFilesystem {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            PathBuf::from("/"),
            Node::Directory {
                mode: ROOT_DIRECTORY_MODE,
            },
        );
        Self {
            nodes: Mutex::new(nodes),
        }
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, BTreeMap<PathBuf, Node>>> {
        self.nodes
            .lock()
            .map_err(|_| io::Error::other("In-memory filesystem lock is poisoned"))
    }

    /// Turns `path` into the key of the entry it designates, following
    /// symlinks in every component. The final component is only followed
    /// when `follow_last` is set.
    fn resolve(
        nodes: &BTreeMap<PathBuf, Node>,
        path: &Path,
        follow_last: bool,
    ) -> io::Result<PathBuf> {
        if !path.is_absolute() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Path must be absolute: '{}'", path.display()),
            ));
        }

        let mut resolved = PathBuf::from("/");
        let mut pending = names(path);
        pending.reverse();
        let mut hops = 0;

        while let Some(name) = pending.pop() {
            if name == ".." {
                resolved.pop();
                continue;
            }

            let candidate = resolved.join(&name);
            let is_last = pending.is_empty();
            match nodes.get(&candidate) {
                Some(Node::Symlink { target }) if follow_last || !is_last => {
                    hops += 1;
                    if hops > MAX_SYMLINK_HOPS {
                        return Err(io::Error::other(format!(
                            "Too many levels of symbolic links: '{}'",
                            path.display()
                        )));
                    }

                    if target.is_absolute() {
                        resolved = PathBuf::from("/");
                    }
                    pending.extend(names(target).into_iter().rev());
                }
                _ => resolved = candidate,
            }
        }

        Ok(resolved)
    }

    /// Ensures the parent of `path` is an existing directory.
    fn check_parent(nodes: &BTreeMap<PathBuf, Node>, path: &Path) -> io::Result<()> {
        let parent = path.parent().ok_or_else(|| already_exists(path))?;
        match nodes.get(parent) {
            Some(Node::Directory { .. }) => Ok(()),
            Some(_) => Err(not_a_directory(parent)),
            None => Err(not_found(parent)),
        }
    }

    /// Gets metadata, following a final symlink when `follow_last` is set.
    fn stat(&self, path: &Path, follow_last: bool) -> io::Result<Metadata> {
        let nodes = self.lock()?;
        let path = Self::resolve(&nodes, path, follow_last)?;
        match nodes.get(&path) {
            Some(Node::File { contents, mode }) => Ok(Metadata {
                kind: FileKind::File,
                mode: *mode,
                len: contents.len() as u64,
            }),
            Some(Node::Directory { mode }) => Ok(Metadata {
                kind: FileKind::Directory,
                mode: *mode,
                len: 0,
            }),
            Some(Node::Symlink { target }) => Ok(Metadata {
                kind: FileKind::Symlink,
                mode: 0o777,
                len: target.as_os_str().len() as u64,
            }),
            None => Err(not_found(&path)),
        }
    }

    /// Inserts or replaces the contents of a regular file.
    fn store(&self, path: &Path, contents: Vec<u8>) -> io::Result<()> {
        let mut nodes = self.lock()?;
        let path = Self::resolve(&nodes, path, true)?;
        match nodes.get_mut(&path) {
            Some(Node::File {
                contents: existing, ..
            }) => {
                *existing = contents;
                Ok(())
            }
            Some(_) => Err(is_a_directory(&path)),
            None => {
                Self::check_parent(&nodes, &path)?;
                nodes.insert(
                    path,
                    Node::File {
                        contents,
                        mode: DEFAULT_FILE_MODE,
                    },
                );
                Ok(())
            }
        }
    }
}

impl Filesystem for MemoryFilesystem {
    fn create(&self, path: &Path) -> io::Result<()> {
        self.store(path, Vec::new())
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut nodes = self.lock()?;
        let path = Self::resolve(&nodes, path, true)?;

        let mut ancestors: Vec<&Path> = path.ancestors().collect();
        ancestors.reverse();
        for ancestor in ancestors {
            match nodes.get(ancestor) {
                Some(Node::Directory { .. }) => {}
                Some(_) => return Err(already_exists(ancestor)),
                None => {
                    nodes.insert(ancestor.to_path_buf(), Node::Directory { mode });
                }
            }
        }

        Ok(())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let nodes = self.lock()?;
        let path = Self::resolve(&nodes, path, true)?;
        match nodes.get(&path) {
            Some(Node::File { contents, .. }) => Ok(contents.clone()),
            Some(_) => Err(is_a_directory(&path)),
            None => Err(not_found(&path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.store(path, contents.to_vec())
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let nodes = self.lock()?;
        let path = Self::resolve(&nodes, path, true)?;
        match nodes.get(&path) {
            Some(Node::Directory { .. }) => {}
            Some(_) => return Err(not_a_directory(&path)),
            None => return Err(not_found(&path)),
        }

        // Keys are ordered component-wise, so all descendants of `path`
        // directly follow it.
        Ok(nodes
            .range(path.clone()..)
            .skip(1)
            .take_while(|(key, _)| key.starts_with(&path))
            .filter(|(key, _)| key.parent() == Some(path.as_path()))
            .filter_map(|(key, node)| {
                Some(DirEntry {
                    name: key.file_name()?.to_os_string(),
                    kind: match node {
                        Node::File { .. } => FileKind::File,
                        Node::Directory { .. } => FileKind::Directory,
                        Node::Symlink { .. } => FileKind::Symlink,
                    },
                })
            })
            .collect())
    }

    fn metadata(&self, path: &Path) -> io::Result<Metadata> {
        self.stat(path, true)
    }

    fn symlink_metadata(&self, path: &Path) -> io::Result<Metadata> {
        self.stat(path, false)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        let nodes = self.lock()?;
        let path = Self::resolve(&nodes, path, false)?;
        match nodes.get(&path) {
            Some(Node::Symlink { target }) => Ok(target.clone()),
            Some(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Not a symlink: '{}'", path.display()),
            )),
            None => Err(not_found(&path)),
        }
    }

    fn symlink(&self, original: &Path, link: &Path) -> io::Result<()> {
        let mut nodes = self.lock()?;
        let link = Self::resolve(&nodes, link, false)?;
        if nodes.contains_key(&link) {
            return Err(already_exists(&link));
        }
        Self::check_parent(&nodes, &link)?;
        nodes.insert(
            link,
            Node::Symlink {
                target: original.to_path_buf(),
            },
        );
        Ok(())
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut nodes = self.lock()?;
        let path = Self::resolve(&nodes, path, true)?;
        match nodes.get_mut(&path) {
            Some(Node::File { mode: current, .. }) | Some(Node::Directory { mode: current }) => {
                *current = mode & 0o7777;
                Ok(())
            }
            Some(Node::Symlink { .. }) => Err(not_found(&path)),
            None => Err(not_found(&path)),
        }
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.lock()?;
        let path = Self::resolve(&nodes, path, false)?;
        match nodes.get(&path) {
            Some(Node::File { .. }) | Some(Node::Symlink { .. }) => {
                nodes.remove(&path);
                Ok(())
            }
            Some(Node::Directory { .. }) => Err(is_a_directory(&path)),
            None => Err(not_found(&path)),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.lock()?;
        let path = Self::resolve(&nodes, path, false)?;
        match nodes.get(&path) {
            Some(Node::Directory { .. }) => {}
            Some(Node::Symlink { .. }) => {
                nodes.remove(&path);
                return Ok(());
            }
            Some(Node::File { .. }) => return Err(not_a_directory(&path)),
            None => return Err(not_found(&path)),
        }

        nodes.retain(|key, _| !key.starts_with(&path));
        Ok(())
    }
}
