use std::path::Path;

use log::{debug, info, trace, warn};

use cosinstall_api::error::{CopyError, DeployerError, ReportError};
use osutils::filesystem::{FileKind, Filesystem};

use super::DeploymentContext;

/// Owner bits added while a directory is being populated, so that read-only
/// source directories can still be filled in.
const POPULATE_DIRECTORY_MODE: u32 = 0o700;

#[derive(Debug, Default)]
struct CopyStats {
    files: usize,
    directories: usize,
    symlinks: usize,
    skipped: usize,
}

/// Copies the configured OS tree from `source` into `target`.
#[tracing::instrument(skip_all)]
pub fn copy_os(ctx: &DeploymentContext) -> Result<(), DeployerError> {
    ctx.config.validate_paths()?;
    copy_tree(ctx.fs, &ctx.config.source, &ctx.config.target)
}

/// Recursively copies the contents of `source` into the existing directory
/// `target`.
///
/// Files keep their bytes and permission bits, symlinks are recreated with the
/// same destination and directories are created as needed. Entries already
/// present in the target are overwritten, including a directory standing
/// where the source has a symlink. `source` and `target` themselves may be
/// symlinks to directories. Device nodes, sockets and FIFOs are
/// skipped. When `target` lives inside `source` it is not copied into itself.
///
/// The copy stops at the first failure and leaves whatever was already copied
/// in place.
#[tracing::instrument(skip_all, fields(source = %source.display(), target = %target.display()))]
pub fn copy_tree(fs: &dyn Filesystem, source: &Path, target: &Path) -> Result<(), DeployerError> {
    if !fs
        .metadata(source)
        .structured(CopyError::SourceNotDirectory {
            path: source.to_path_buf(),
        })?
        .is_dir()
    {
        return Err(DeployerError::new(CopyError::SourceNotDirectory {
            path: source.to_path_buf(),
        }));
    }

    if !fs
        .metadata(target)
        .structured(CopyError::TargetNotDirectory {
            path: target.to_path_buf(),
        })?
        .is_dir()
    {
        return Err(DeployerError::new(CopyError::TargetNotDirectory {
            path: target.to_path_buf(),
        }));
    }

    let nested_target = (target != source && target.starts_with(source)).then_some(target);
    if nested_target.is_some() {
        debug!(
            "Target '{}' is inside source '{}', it will not be copied",
            target.display(),
            source.display()
        );
    }

    info!("Copying '{}' into '{}'", source.display(), target.display());
    let mut stats = CopyStats::default();
    copy_directory_contents(fs, source, target, nested_target, &mut stats)?;

    info!(
        "Copied {} files, {} directories and {} symlinks into '{}'",
        stats.files,
        stats.directories,
        stats.symlinks,
        target.display()
    );
    if stats.skipped > 0 {
        warn!("Skipped {} special files", stats.skipped);
    }

    Ok(())
}

fn copy_directory_contents(
    fs: &dyn Filesystem,
    source: &Path,
    target: &Path,
    skip: Option<&Path>,
    stats: &mut CopyStats,
) -> Result<(), DeployerError> {
    let entries = fs.read_dir(source).structured(CopyError::ReadDirectory {
        path: source.to_path_buf(),
    })?;

    for entry in entries {
        let from = source.join(&entry.name);
        let to = target.join(&entry.name);

        if skip == Some(from.as_path()) {
            debug!("Skipping copy target '{}'", from.display());
            continue;
        }

        match entry.kind {
            FileKind::Directory => {
                let mode = fs
                    .symlink_metadata(&from)
                    .structured(CopyError::Inspect { path: from.clone() })?
                    .mode;
                copy_directory(fs, &from, &to, mode, skip, stats)?;
            }
            FileKind::File => {
                copy_file(fs, &from, &to)?;
                stats.files += 1;
            }
            FileKind::Symlink => {
                copy_symlink(fs, &from, &to)?;
                stats.symlinks += 1;
            }
            FileKind::Other => {
                warn!("Skipping special file '{}'", from.display());
                stats.skipped += 1;
            }
        }
    }

    Ok(())
}

fn copy_directory(
    fs: &dyn Filesystem,
    from: &Path,
    to: &Path,
    mode: u32,
    skip: Option<&Path>,
    stats: &mut CopyStats,
) -> Result<(), DeployerError> {
    trace!("Copying directory '{}'", from.display());

    // A file or symlink in the way is replaced
    if fs
        .symlink_metadata(to)
        .is_ok_and(|metadata| !metadata.is_dir())
    {
        fs.remove_file(to).structured(CopyError::CreateDirectory {
            path: to.to_path_buf(),
        })?;
    }

    fs.create_dir_all(to, mode | POPULATE_DIRECTORY_MODE)
        .structured(CopyError::CreateDirectory {
            path: to.to_path_buf(),
        })?;
    fs.set_mode(to, mode | POPULATE_DIRECTORY_MODE)
        .structured(CopyError::SetPermissions {
            path: to.to_path_buf(),
        })?;
    stats.directories += 1;

    copy_directory_contents(fs, from, to, skip, stats)?;

    fs.set_mode(to, mode).structured(CopyError::SetPermissions {
        path: to.to_path_buf(),
    })
}

fn copy_file(fs: &dyn Filesystem, from: &Path, to: &Path) -> Result<(), DeployerError> {
    trace!("Copying file '{}'", from.display());

    let mode = fs
        .symlink_metadata(from)
        .structured(CopyError::Inspect {
            path: from.to_path_buf(),
        })?
        .mode;

    // Writing through an existing symlink would modify its destination
    if fs
        .symlink_metadata(to)
        .is_ok_and(|metadata| metadata.is_symlink())
    {
        fs.remove_file(to).structured(CopyError::CopyFile {
            path: from.to_path_buf(),
        })?;
    }

    let contents = fs.read(from).structured(CopyError::CopyFile {
        path: from.to_path_buf(),
    })?;
    fs.write(to, &contents).structured(CopyError::CopyFile {
        path: from.to_path_buf(),
    })?;
    fs.set_mode(to, mode).structured(CopyError::SetPermissions {
        path: to.to_path_buf(),
    })
}

fn copy_symlink(fs: &dyn Filesystem, from: &Path, to: &Path) -> Result<(), DeployerError> {
    let destination = fs.read_link(from).structured(CopyError::CopySymlink {
        path: from.to_path_buf(),
    })?;
    trace!(
        "Copying symlink '{}' -> '{}'",
        from.display(),
        destination.display()
    );

    if let Ok(existing) = fs.symlink_metadata(to) {
        let removed = if existing.is_dir() {
            fs.remove_dir_all(to)
        } else {
            fs.remove_file(to)
        };
        removed.structured(CopyError::CopySymlink {
            path: from.to_path_buf(),
        })?;
    }

    fs.symlink(&destination, to)
        .structured(CopyError::CopySymlink {
            path: from.to_path_buf(),
        })
}
