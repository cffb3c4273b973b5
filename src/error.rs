use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::provisioner::Step;

/// Why a single provisioning step failed
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid username '{username}': {reason}")]
    InvalidUsername { username: String, reason: String },

    #[error("user '{username}' already exists")]
    UserExists { username: String },

    #[error("failed to create user '{username}': {reason}")]
    UserCreation { username: String, reason: String },

    #[error("no such user or group '{name}'")]
    UnknownAccount { name: String },

    #[error("SSH hardening failed: {reason}")]
    SshHardening { reason: String },

    #[error("template not found: {}", path.display())]
    MissingTemplate { path: PathBuf },

    #[error("cannot move {} to {}: {reason}", from.display(), to.display())]
    MoveConflict {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },

    #[error("permission denied while trying to {action} {}", path.display())]
    Permission {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} already exists", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not confirm overwrite of {}: {reason}", path.display())]
    Confirmation { path: PathBuf, reason: String },
}

impl ProvisionError {
    /// Classify an io error for `path`; permission problems get their own variant.
    pub fn io(action: &'static str, path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::PermissionDenied => Self::Permission {
                action,
                path,
                source,
            },
            io::ErrorKind::AlreadyExists => Self::AlreadyExists { path },
            _ => Self::Io {
                action,
                path,
                source,
            },
        }
    }

    pub fn ssh(reason: impl std::fmt::Display) -> Self {
        Self::SshHardening {
            reason: reason.to_string(),
        }
    }
}

/// First failure of a run, tagged with the step that produced it
#[derive(Debug, Error)]
#[error("step {index}/{total} ({step}) failed")]
pub struct StepFailure {
    pub step: Step,
    pub index: usize,
    pub total: usize,
    #[source]
    pub error: ProvisionError,
}
