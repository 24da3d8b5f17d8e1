use std::{io, path::Path};

use log::{debug, info};

use cosinstall_api::{
    constants::{
        ROOT_MOUNT_POINT_PATH, SELINUX_CONFIG_RELATIVE_PATH, SELINUX_DEFAULT_POLICY_TYPE,
        SELINUX_DIRECTORY, SELINUX_FILE_CONTEXTS_SUBPATH, SETFILES_CHROOT_PATH,
    },
    error::{DeployerError, RelabelError, ReportError},
};
use osutils::{dependencies::Dependency, filesystem::Filesystem, path::join_relative};

use super::DeploymentContext;

/// Gets the policy type from the contents of an SELinux config file.
fn parse_selinux_type(contents: &str) -> Option<&str> {
    contents
        .lines()
        .find_map(|line| line.trim().strip_prefix("SELINUXTYPE="))
        .map(|selinux_type| selinux_type.trim().trim_matches('"'))
        .filter(|selinux_type| !selinux_type.is_empty())
}

/// Gets the SELinux policy type configured in the OS at `root`, falling back
/// to the default policy type when the OS does not declare one.
fn selinux_policy_type(fs: &dyn Filesystem, root: &Path) -> Result<String, DeployerError> {
    let config_path = join_relative(root, SELINUX_CONFIG_RELATIVE_PATH);
    let contents = match fs.read(&config_path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(
                "No SELinux config at '{}', assuming policy type '{SELINUX_DEFAULT_POLICY_TYPE}'",
                config_path.display()
            );
            return Ok(SELINUX_DEFAULT_POLICY_TYPE.into());
        }
        Err(e) => {
            return Err(DeployerError::with_source(
                RelabelError::ReadSelinuxConfig { path: config_path },
                e.into(),
            ))
        }
    };

    Ok(parse_selinux_type(&String::from_utf8_lossy(&contents))
        .unwrap_or(SELINUX_DEFAULT_POLICY_TYPE)
        .to_string())
}

/// Ensures the tools needed for relabeling are available, returning an
/// error naming the first one that is missing.
fn check_tools(ctx: &DeploymentContext, chroot: bool) -> Result<(), DeployerError> {
    if !chroot {
        return ctx
            .runner
            .path(Dependency::Setfiles)
            .map(|_| ())
            .structured(RelabelError::MissingTool {
                binary: Dependency::Setfiles.to_string(),
            });
    }

    ctx.runner
        .path(Dependency::Chroot)
        .structured(RelabelError::MissingTool {
            binary: Dependency::Chroot.to_string(),
        })?;

    let setfiles = join_relative(&ctx.config.target, SETFILES_CHROOT_PATH);
    if !ctx.fs.exists(&setfiles) {
        return Err(DeployerError::new(RelabelError::MissingTool {
            binary: setfiles.display().to_string(),
        }));
    }

    Ok(())
}

/// Restores the SELinux labels of every file under the target.
///
/// With `chroot` set, setfiles from the target OS is run with the target as
/// its root. Otherwise the host's setfiles relabels the target as an
/// alternate root. A missing tool is an error. A target without a file
/// context database has nothing to relabel and succeeds.
#[tracing::instrument(skip_all, fields(chroot = chroot))]
pub fn relabel(ctx: &DeploymentContext, chroot: bool) -> Result<(), DeployerError> {
    ctx.config.validate_target()?;
    let target = &ctx.config.target;

    check_tools(ctx, chroot)?;

    let policy_type = selinux_policy_type(ctx.fs, target)?;
    let contexts_relative = Path::new(SELINUX_DIRECTORY)
        .join(&policy_type)
        .join(SELINUX_FILE_CONTEXTS_SUBPATH);
    let contexts = join_relative(target, &contexts_relative);

    match ctx.fs.symlink_metadata(&contexts) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!(
                "No SELinux file contexts found at '{}', nothing to relabel",
                contexts.display()
            );
            return Ok(());
        }
        Err(e) => {
            return Err(DeployerError::with_source(
                RelabelError::InspectFileContexts { path: contexts },
                e.into(),
            ))
        }
    }

    let command = if chroot {
        Dependency::Chroot
            .cmd()
            .with_arg(target)
            .with_arg(SETFILES_CHROOT_PATH)
            .with_arg(Path::new(ROOT_MOUNT_POINT_PATH).join(&contexts_relative))
            .with_arg(ROOT_MOUNT_POINT_PATH)
    } else {
        Dependency::Setfiles
            .cmd()
            .with_arg("-r")
            .with_arg(target)
            .with_arg(&contexts)
            .with_arg(target)
    };

    info!(
        "Relabeling '{}' with SELinux policy type '{policy_type}'",
        target.display()
    );
    command
        .run_and_check(ctx.runner)
        .structured(RelabelError::RunSetfiles {
            target: target.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    use indoc::indoc;

    use cosinstall_api::{config::InstallConfig, error::ErrorKind};
    use osutils::{filesystem::MemoryFilesystem, testutils::runner::MockRunner};

    const TARGETED_CONTEXTS: &str = "/etc/selinux/targeted/contexts/files/file_contexts";

    fn config(target: &str) -> InstallConfig {
        InstallConfig {
            target: PathBuf::from(target),
            ..Default::default()
        }
    }

    fn create_file(fs: &dyn Filesystem, path: &str) {
        let path = Path::new(path);
        if let Some(parent) = path.parent() {
            fs.create_dir_all(parent, 0o755).unwrap();
        }
        fs.create(path).unwrap();
    }

    #[test]
    fn test_parse_selinux_type() {
        assert_eq!(
            parse_selinux_type(indoc! {r#"
                # This file controls the state of SELinux on the system.
                SELINUX=enforcing
                SELINUXTYPE=targeted
            "#}),
            Some("targeted")
        );
        assert_eq!(
            parse_selinux_type("SELINUXTYPE=mls\nSELINUXTYPE=strict\n"),
            Some("mls")
        );
        assert_eq!(parse_selinux_type("SELINUXTYPE=\"minimum\"\n"), Some("minimum"));
        assert_eq!(parse_selinux_type("SELINUX=disabled\n"), None);
        assert_eq!(parse_selinux_type("SELINUXTYPE=\n"), None);
        assert_eq!(parse_selinux_type(""), None);
    }

    #[test]
    fn test_selinux_policy_type() {
        let fs = MemoryFilesystem::new();
        assert_eq!(
            selinux_policy_type(&fs, Path::new("/mnt/target")).unwrap(),
            "targeted"
        );

        fs.create_dir_all(Path::new("/mnt/target/etc/selinux"), 0o755)
            .unwrap();
        fs.write(
            Path::new("/mnt/target/etc/selinux/config"),
            b"SELINUX=permissive\nSELINUXTYPE=mls\n",
        )
        .unwrap();
        assert_eq!(
            selinux_policy_type(&fs, Path::new("/mnt/target")).unwrap(),
            "mls"
        );

        fs.write(Path::new("/mnt/target/etc/selinux/config"), b"SELINUX=permissive\n")
            .unwrap();
        assert_eq!(
            selinux_policy_type(&fs, Path::new("/mnt/target")).unwrap(),
            "targeted"
        );
    }

    #[test]
    fn test_relabel_chroot_without_setfiles() {
        // Nothing in the target, so there is no setfiles to run from it
        let fs = MemoryFilesystem::new();
        let runner = MockRunner::new();
        let ctx = DeploymentContext::new(config("/"), &fs, &runner);

        let error = relabel(&ctx, true).unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::Relabel(RelabelError::MissingTool {
                binary: "/usr/sbin/setfiles".into()
            })
        );
        assert!(runner.history().is_empty());
    }

    #[test]
    fn test_relabel_host_setfiles() {
        let fs = MemoryFilesystem::new();
        create_file(&fs, TARGETED_CONTEXTS);
        let runner = MockRunner::new();
        let ctx = DeploymentContext::new(config("/"), &fs, &runner);

        relabel(&ctx, false).unwrap();
        assert_eq!(
            runner.history(),
            vec![format!("setfiles -r / {TARGETED_CONTEXTS} /")]
        );
    }

    #[test]
    fn test_relabel_missing_host_setfiles() {
        let fs = MemoryFilesystem::new();
        create_file(&fs, TARGETED_CONTEXTS);
        let runner = MockRunner::new().with_missing(Dependency::Setfiles);
        let ctx = DeploymentContext::new(config("/"), &fs, &runner);

        let error = relabel(&ctx, false).unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::Relabel(RelabelError::MissingTool {
                binary: "setfiles".into()
            })
        );
        assert!(error.source().is_some());
    }

    #[test]
    fn test_relabel_missing_chroot() {
        let fs = MemoryFilesystem::new();
        create_file(&fs, "/mnt/target/usr/sbin/setfiles");
        let runner = MockRunner::new().with_missing(Dependency::Chroot);
        let ctx = DeploymentContext::new(config("/mnt/target"), &fs, &runner);

        assert_eq!(
            relabel(&ctx, true).unwrap_err().kind(),
            &ErrorKind::Relabel(RelabelError::MissingTool {
                binary: "chroot".into()
            })
        );
    }

    #[test]
    fn test_relabel_without_contexts() {
        let fs = MemoryFilesystem::new();
        create_file(&fs, "/mnt/target/usr/sbin/setfiles");
        let runner = MockRunner::new();

        for chroot in [false, true] {
            let ctx = DeploymentContext::new(config("/mnt/target"), &fs, &runner);
            relabel(&ctx, chroot).unwrap();
        }
        assert!(runner.history().is_empty());
    }

    #[test]
    fn test_relabel_chroot() {
        let fs = MemoryFilesystem::new();
        create_file(&fs, "/mnt/target/usr/sbin/setfiles");
        create_file(&fs, "/mnt/target/etc/selinux/mls/contexts/files/file_contexts");
        fs.write(
            Path::new("/mnt/target/etc/selinux/config"),
            b"SELINUX=enforcing\nSELINUXTYPE=mls\n",
        )
        .unwrap();
        let runner = MockRunner::new();
        let ctx = DeploymentContext::new(config("/mnt/target"), &fs, &runner);

        relabel(&ctx, true).unwrap();
        assert_eq!(
            runner.history(),
            vec![
                "chroot /mnt/target /usr/sbin/setfiles /etc/selinux/mls/contexts/files/file_contexts /"
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_relabel_host_alternate_root() {
        let fs = MemoryFilesystem::new();
        create_file(
            &fs,
            "/mnt/target/etc/selinux/targeted/contexts/files/file_contexts",
        );
        let runner = MockRunner::new();
        let ctx = DeploymentContext::new(config("/mnt/target"), &fs, &runner);

        relabel(&ctx, false).unwrap();
        assert_eq!(
            runner.history(),
            vec![
                "setfiles -r /mnt/target /mnt/target/etc/selinux/targeted/contexts/files/file_contexts /mnt/target"
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_relabel_setfiles_failure() {
        let fs = MemoryFilesystem::new();
        create_file(&fs, TARGETED_CONTEXTS);
        let runner = MockRunner::new().with_exit_code(Dependency::Setfiles, 255);
        let ctx = DeploymentContext::new(config("/"), &fs, &runner);

        let error = relabel(&ctx, false).unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::Relabel(RelabelError::RunSetfiles {
                target: PathBuf::from("/")
            })
        );
    }

    #[test]
    fn test_relabel_relative_target() {
        let fs = MemoryFilesystem::new();
        let runner = MockRunner::new();
        let ctx = DeploymentContext::new(config("mnt/target"), &fs, &runner);

        assert!(matches!(
            relabel(&ctx, false).unwrap_err().kind(),
            ErrorKind::InvalidInput(_)
        ));
    }
}
