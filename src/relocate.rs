//! Moving the homelab tree into the new home, with `mv` semantics.

use nix::errno::Errno;
use std::fs;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::ProvisionError;
use crate::plan::ExistingPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relocated {
    /// Renamed in place
    Moved(PathBuf),
    /// Copied across filesystems, source removed
    Copied(PathBuf),
    /// Source gone and destination present from an earlier run
    AlreadyInPlace(PathBuf),
}

impl Relocated {
    pub fn path(&self) -> &Path {
        match self {
            Self::Moved(p) | Self::Copied(p) | Self::AlreadyInPlace(p) => p,
        }
    }
}

fn present(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Where `mv source destination` puts the source: inside `destination`
/// when that is an existing directory, otherwise at `destination`.
pub fn target_path(source: &Path, destination: &Path) -> PathBuf {
    match source.file_name() {
        Some(name) if destination.is_dir() => destination.join(name),
        _ => destination.to_path_buf(),
    }
}

/// Move `source` to `destination`
pub fn relocate(
    source: &Path,
    destination: &Path,
    policy: ExistingPolicy,
) -> Result<Relocated, ProvisionError> {
    if !present(source) {
        if policy == ExistingPolicy::Reuse && destination.is_dir() {
            tracing::debug!(path = %destination.display(), "already relocated");
            return Ok(Relocated::AlreadyInPlace(destination.to_path_buf()));
        }
        return Err(ProvisionError::io(
            "move",
            source,
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ));
    }

    let target = target_path(source, destination);
    if present(&target) {
        return Err(ProvisionError::MoveConflict {
            from: source.to_path_buf(),
            to: target,
            reason: "destination already exists".into(),
        });
    }

    match fs::rename(source, &target) {
        Ok(()) => {
            tracing::info!(from = %source.display(), to = %target.display(), "moved");
            Ok(Relocated::Moved(target))
        }
        Err(e) if e.raw_os_error() == Some(Errno::EXDEV as i32) => {
            tracing::warn!(
                from = %source.display(),
                to = %target.display(),
                "different filesystems, copying instead of renaming"
            );
            copy_tree(source, &target)?;
            fs::remove_dir_all(source).map_err(|e| ProvisionError::io("remove", source, e))?;
            Ok(Relocated::Copied(target))
        }
        Err(e) => Err(ProvisionError::io("move", source, e)),
    }
}

/// Copy a tree preserving permissions and symlinks
pub fn copy_tree(source: &Path, target: &Path) -> Result<(), ProvisionError> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source).to_path_buf();
            let err = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
            ProvisionError::io("read", &path, err)
        })?;

        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| ProvisionError::io("copy", entry.path(), std::io::Error::other(e)))?;
        let dest = target.join(relative);
        let kind = entry.file_type();

        if kind.is_symlink() {
            let link = fs::read_link(entry.path())
                .map_err(|e| ProvisionError::io("read link", entry.path(), e))?;
            symlink(&link, &dest).map_err(|e| ProvisionError::io("create link", &dest, e))?;
        } else if kind.is_dir() {
            fs::create_dir(&dest).map_err(|e| ProvisionError::io("create", &dest, e))?;
            let mode = entry
                .metadata()
                .map(|m| m.permissions().mode())
                .unwrap_or(0o755);
            fs::set_permissions(&dest, fs::Permissions::from_mode(mode))
                .map_err(|e| ProvisionError::io("set permissions on", &dest, e))?;
        } else {
            fs::copy(entry.path(), &dest).map_err(|e| ProvisionError::io("copy to", &dest, e))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn homelab_in(dir: &Path) -> PathBuf {
        let src = dir.join("invoker/homelab");
        fs::create_dir_all(src.join("n8n")).unwrap();
        fs::write(src.join("README.md"), "# homelab\n").unwrap();
        fs::write(src.join("n8n/docker-compose.yml"), "services: {}\n").unwrap();
        src
    }

    #[test]
    fn moves_into_new_path() {
        let dir = tempfile::tempdir().unwrap();
        let src = homelab_in(dir.path());
        fs::create_dir_all(dir.path().join("home/alice")).unwrap();
        let dst = dir.path().join("home/alice/homelab");

        let out = relocate(&src, &dst, ExistingPolicy::Fail).unwrap();

        assert_eq!(out, Relocated::Moved(dst.clone()));
        assert!(!src.exists());
        assert_eq!(
            fs::read_to_string(dst.join("README.md")).unwrap(),
            "# homelab\n"
        );
    }

    #[test]
    fn existing_directory_destination_nests_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = homelab_in(dir.path());
        let dst = dir.path().join("home/alice/homelab");
        fs::create_dir_all(&dst).unwrap();

        let out = relocate(&src, &dst, ExistingPolicy::Fail).unwrap();

        assert_eq!(out.path(), dst.join("homelab"));
        assert!(dst.join("homelab/README.md").exists());
    }

    #[test]
    fn conflicting_entry_is_move_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let src = homelab_in(dir.path());
        let dst = dir.path().join("home/alice/homelab");
        fs::create_dir_all(dst.join("homelab")).unwrap();

        let err = relocate(&src, &dst, ExistingPolicy::Fail).unwrap_err();

        assert!(matches!(err, ProvisionError::MoveConflict { .. }));
        assert!(src.exists());
    }

    #[test]
    fn missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = relocate(
            &dir.path().join("homelab"),
            &dir.path().join("home/alice/homelab"),
            ExistingPolicy::Fail,
        )
        .unwrap_err();

        assert!(matches!(err, ProvisionError::Io { action: "move", .. }));
    }

    #[test]
    fn missing_source_with_destination_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("home/alice/homelab");
        fs::create_dir_all(&dst).unwrap();

        let out = relocate(&dir.path().join("homelab"), &dst, ExistingPolicy::Reuse).unwrap();

        assert_eq!(out, Relocated::AlreadyInPlace(dst));
    }

    #[test]
    fn missing_parent_fails() {
        let dir = tempfile::tempdir().unwrap();
        let src = homelab_in(dir.path());
        let err = relocate(
            &src,
            &dir.path().join("home/nobody/homelab"),
            ExistingPolicy::Fail,
        )
        .unwrap_err();

        assert!(matches!(err, ProvisionError::Io { .. }));
        assert!(src.exists());
    }

    #[test]
    fn copy_tree_preserves_links_and_modes() {
        let dir = tempfile::tempdir().unwrap();
        let src = homelab_in(dir.path());
        symlink("README.md", src.join("LATEST")).unwrap();
        fs::set_permissions(src.join("n8n"), fs::Permissions::from_mode(0o750)).unwrap();
        let dst = dir.path().join("copy");

        copy_tree(&src, &dst).unwrap();

        assert_eq!(
            fs::read_to_string(dst.join("n8n/docker-compose.yml")).unwrap(),
            "services: {}\n"
        );
        assert_eq!(
            fs::read_link(dst.join("LATEST")).unwrap(),
            PathBuf::from("README.md")
        );
        assert_eq!(
            fs::metadata(dst.join("n8n")).unwrap().permissions().mode() & 0o777,
            0o750
        );
    }
}
