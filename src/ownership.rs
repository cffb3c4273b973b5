//! Recursive ownership assignment.
//!
//! Walks the tree without following symlinks and changes each entry with
//! `lchown`, so a link pointing outside the tree never hands its target to
//! the new user.

use nix::unistd::{Group, User};
use std::io;
use std::os::unix::fs::lchown;
use std::path::Path;
use walkdir::WalkDir;

use crate::error::ProvisionError;

/// Numeric owner resolved from account names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

impl Owner {
    pub fn resolve(user: &str, group: &str) -> Result<Self, ProvisionError> {
        let uid = User::from_name(user)
            .map_err(|e| ProvisionError::UnknownAccount {
                name: format!("{} ({})", user, e),
            })?
            .ok_or_else(|| ProvisionError::UnknownAccount { name: user.into() })?
            .uid;

        let gid = Group::from_name(group)
            .map_err(|e| ProvisionError::UnknownAccount {
                name: format!("{} ({})", group, e),
            })?
            .ok_or_else(|| ProvisionError::UnknownAccount {
                name: group.into(),
            })?
            .gid;

        Ok(Self {
            uid: uid.as_raw(),
            gid: gid.as_raw(),
        })
    }
}

/// Change owner and group of `root` and everything below it.
/// Returns the number of entries changed.
pub fn chown_tree(root: &Path, owner: Owner) -> Result<usize, ProvisionError> {
    let mut changed = 0;

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| io::Error::other("filesystem loop"));
            ProvisionError::io("walk", &path, source)
        })?;

        lchown(entry.path(), Some(owner.uid), Some(owner.gid))
            .map_err(|e| ProvisionError::io("chown", entry.path(), e))?;
        changed += 1;
    }

    tracing::info!(
        path = %root.display(),
        uid = owner.uid,
        gid = owner.gid,
        entries = changed,
        "ownership changed"
    );

    Ok(changed)
}
