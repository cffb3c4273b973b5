//! Seeding live service config files from their checked-in examples.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ProvisionError;
use crate::host::Host;
use crate::plan::{OverwritePolicy, TemplateSpec};

/// What happened to one destination file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seeded {
    Copied(PathBuf),
    /// Copied after saving the previous content to the given path
    BackedUp(PathBuf, PathBuf),
    Kept(PathBuf),
}

fn backup_path(destination: &Path) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".bak-{}", stamp));
    destination.with_file_name(name)
}

fn copy(source: &Path, destination: &Path) -> Result<(), ProvisionError> {
    fs::copy(source, destination).map_err(|e| ProvisionError::io("copy to", destination, e))?;
    Ok(())
}

/// Copy one template into place according to `policy`
pub fn seed_one(
    host: &dyn Host,
    source: &Path,
    destination: &Path,
    policy: OverwritePolicy,
) -> Result<Seeded, ProvisionError> {
    if !source.is_file() {
        return Err(ProvisionError::MissingTemplate {
            path: source.to_path_buf(),
        });
    }

    let exists = destination.exists();
    let keep = exists
        && match policy {
            OverwritePolicy::Overwrite | OverwritePolicy::Backup => false,
            OverwritePolicy::Keep => true,
            OverwritePolicy::Prompt => !host.confirm_overwrite(destination).map_err(|e| {
                ProvisionError::Confirmation {
                    path: destination.to_path_buf(),
                    reason: format!("{:#}", e),
                }
            })?,
        };

    if keep {
        tracing::debug!(path = %destination.display(), "keeping existing file");
        return Ok(Seeded::Kept(destination.to_path_buf()));
    }

    if exists && policy == OverwritePolicy::Backup {
        let backup = backup_path(destination);
        fs::copy(destination, &backup).map_err(|e| ProvisionError::io("back up", destination, e))?;
        copy(source, destination)?;
        tracing::info!(path = %destination.display(), backup = %backup.display(), "template seeded");
        return Ok(Seeded::BackedUp(destination.to_path_buf(), backup));
    }

    copy(source, destination)?;
    tracing::info!(path = %destination.display(), "template seeded");
    Ok(Seeded::Copied(destination.to_path_buf()))
}

/// The seed-templates step. Stops at the first template that fails.
pub fn seed_all(
    host: &dyn Host,
    workdir: &Path,
    templates: &[TemplateSpec],
    policy: OverwritePolicy,
) -> Result<Vec<Seeded>, ProvisionError> {
    templates
        .iter()
        .map(|spec| {
            let (source, destination) = spec.resolve(workdir);
            let seeded = seed_one(host, &source, &destination, policy)?;
            println!(
                "  {} -> {}",
                spec.source.display(),
                spec.destination.display()
            );
            Ok(seeded)
        })
        .collect()
}

pub fn describe(workdir: &Path, templates: &[TemplateSpec], policy: OverwritePolicy) -> String {
    let pairs: Vec<String> = templates
        .iter()
        .map(|t| format!("{} -> {}", t.source.display(), t.destination.display()))
        .collect();
    format!(
        "copy in {} ({:?} existing): {}",
        workdir.display(),
        policy,
        pairs.join(", ")
    )
}
