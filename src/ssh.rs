//! SSH hardening for the provisioned account.
//!
//! Directives go into a drop-in when the main config includes it ahead of
//! any `Match`, otherwise into a marked block in the main config. Managed
//! keywords that sshd would read before our values are commented out either
//! way. Both forms are rewritten identically on every run.

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::ProvisionError;
use crate::host::Host;
use crate::plan::{Plan, SshConfig};

const BLOCK_BEGIN: &str = "# BEGIN homelab-provision";
const BLOCK_END: &str = "# END homelab-provision";
const DISABLED_PREFIX: &str = "# disabled by homelab-provision: ";

/// Keyword/value pairs enforced for `username`
pub fn directives(config: &SshConfig, username: &str) -> Vec<(&'static str, String)> {
    let yes_no = |on: bool| (if on { "yes" } else { "no" }).to_string();

    let mut out = vec![
        ("PermitRootLogin", yes_no(config.permit_root_login)),
        ("PasswordAuthentication", yes_no(config.password_authentication)),
        (
            "KbdInteractiveAuthentication",
            yes_no(config.password_authentication),
        ),
    ];
    if config.allow_users {
        out.push(("AllowUsers", username.to_string()));
    }
    out
}

fn render_lines(directives: &[(&'static str, String)]) -> Vec<String> {
    directives
        .iter()
        .map(|(key, value)| format!("{} {}", key, value))
        .collect()
}

/// Content of the managed drop-in snippet
pub fn render_drop_in(directives: &[(&'static str, String)]) -> String {
    let mut out = String::from("# Managed by homelab-provision. Local edits are overwritten.\n");
    for line in render_lines(directives) {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn keyword(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    trimmed
        .split(|c: char| c.is_whitespace() || c == '=')
        .next()
        .map(str::to_ascii_lowercase)
}

fn managed_keywords(directives: &[(&'static str, String)]) -> Vec<String> {
    directives
        .iter()
        .map(|(key, _)| key.to_ascii_lowercase())
        .collect()
}

fn disable_if_managed(line: &str, managed: &[String]) -> String {
    match keyword(line) {
        Some(kw) if managed.contains(&kw) => format!("{}{}", DISABLED_PREFIX, line.trim_start()),
        _ => line.to_string(),
    }
}

/// Rewrite a full sshd_config so the managed directives take effect.
///
/// sshd keeps the first value it sees for a keyword, and anything after a
/// `Match` line is conditional, so the block is placed before the first
/// `Match` and conflicting lines elsewhere are commented out.
pub fn merge_into_config(existing: &str, directives: &[(&'static str, String)]) -> String {
    let managed = managed_keywords(directives);

    let mut lines: Vec<String> = Vec::new();
    let mut in_block = false;
    let mut after_block = false;
    for line in existing.lines() {
        let was_after_block = std::mem::take(&mut after_block);
        match line.trim() {
            BLOCK_BEGIN => in_block = true,
            BLOCK_END => {
                in_block = false;
                after_block = true;
            }
            _ if in_block => {}
            // separator written together with the block
            "" if was_after_block => {}
            _ => lines.push(disable_if_managed(line, &managed)),
        }
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }

    let mut block = vec![BLOCK_BEGIN.to_string()];
    block.extend(render_lines(directives));
    block.push(BLOCK_END.to_string());

    match lines
        .iter()
        .position(|l| keyword(l).as_deref() == Some("match"))
    {
        Some(at) => {
            block.push(String::new());
            lines.splice(at..at, block);
        }
        None => {
            if !lines.is_empty() {
                lines.push(String::new());
            }
            lines.extend(block);
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Line index of the first global `Include` whose pattern covers the drop-in.
///
/// Relative patterns resolve against the main config's directory. An
/// `Include` after a `Match` is conditional and does not count.
pub fn drop_in_include(existing: &str, config: &SshConfig) -> Option<usize> {
    let target = config.drop_in_dir.join(&config.drop_in_name);
    let base = config.config_path.parent().unwrap_or(Path::new("/"));
    let options = glob::MatchOptions {
        require_literal_separator: true,
        ..glob::MatchOptions::new()
    };

    for (at, line) in existing.lines().enumerate() {
        match keyword(line).as_deref() {
            Some("match") => return None,
            Some("include") => {}
            _ => continue,
        }
        let args = line.trim_start()["include".len()..]
            .trim_start_matches(|c: char| c.is_whitespace() || c == '=');
        let covered = args.split_whitespace().any(|arg| {
            let pattern = base.join(arg.trim_matches('"'));
            glob::Pattern::new(&pattern.to_string_lossy())
                .map(|p| p.matches_path_with(&target, options))
                .unwrap_or(false)
        });
        if covered {
            return Some(at);
        }
    }
    None
}

/// Comment out managed keywords on lines before `until`
pub fn disable_before(
    existing: &str,
    until: usize,
    directives: &[(&'static str, String)],
) -> String {
    let managed = managed_keywords(directives);
    let mut out = existing
        .lines()
        .enumerate()
        .map(|(at, line)| {
            if at < until {
                disable_if_managed(line, &managed)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    if existing.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// True when sshd reads our drop-in ahead of any `Match`
pub fn uses_drop_in(config: &SshConfig) -> bool {
    if !config.drop_in_dir.is_dir() {
        return false;
    }
    fs::read_to_string(&config.config_path)
        .map(|content| drop_in_include(&content, config).is_some())
        .unwrap_or(false)
}

/// Replace `path` with `content` via a temp file in the same directory
fn write_atomic(path: &Path, content: &str, mode: u32) -> Result<(), ProvisionError> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| ProvisionError::io("create temp file in", dir, e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| ProvisionError::io("write", tmp.path(), e))?;
    fs::set_permissions(tmp.path(), fs::Permissions::from_mode(mode))
        .map_err(|e| ProvisionError::io("set permissions on", tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| ProvisionError::io("replace", path, e.error))?;
    Ok(())
}

/// Write the directives; returns the file that now carries them
pub fn apply_directives(config: &SshConfig, username: &str) -> Result<PathBuf, ProvisionError> {
    let directives = directives(config, username);

    let path = &config.config_path;
    let existing = fs::read_to_string(path).map_err(|e| ProvisionError::io("read", path, e))?;
    let mode = fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o7777)
        .unwrap_or(0o644);

    let include = if config.drop_in_dir.is_dir() {
        drop_in_include(&existing, config)
    } else {
        None
    };

    match include {
        Some(at) => {
            let cleaned = disable_before(&existing, at, &directives);
            if cleaned != existing {
                write_atomic(path, &cleaned, mode)?;
                tracing::info!(path = %path.display(), "disabled directives read before Include");
            }
            let drop_in = config.drop_in_dir.join(&config.drop_in_name);
            write_atomic(&drop_in, &render_drop_in(&directives), 0o644)?;
            Ok(drop_in)
        }
        None => {
            if config.drop_in_dir.is_dir() {
                tracing::debug!(path = %path.display(), "drop-in not included, editing main config");
            }
            write_atomic(path, &merge_into_config(&existing, &directives), mode)?;
            Ok(path.clone())
        }
    }
}

/// Add missing public keys to `<home>/.ssh/authorized_keys`, owned by the user
pub fn install_authorized_keys(
    host: &dyn Host,
    home: &Path,
    username: &str,
    keys: &[String],
) -> Result<(), ProvisionError> {
    if keys.is_empty() {
        return Ok(());
    }

    let ssh_dir = home.join(".ssh");
    let auth_keys = ssh_dir.join("authorized_keys");

    fs::create_dir_all(&ssh_dir).map_err(|e| ProvisionError::io("create", &ssh_dir, e))?;
    fs::set_permissions(&ssh_dir, fs::Permissions::from_mode(0o700))
        .map_err(|e| ProvisionError::io("set permissions on", &ssh_dir, e))?;

    let mut content = match fs::read_to_string(&auth_keys) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(ProvisionError::io("read", &auth_keys, e)),
    };
    let mut missing: Vec<&str> = Vec::new();
    for key in keys.iter().map(|k| k.trim()).filter(|k| !k.is_empty()) {
        if !missing.contains(&key) && !content.lines().any(|l| l.trim() == key) {
            missing.push(key);
        }
    }

    if !missing.is_empty() {
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        for key in &missing {
            content.push_str(key);
            content.push('\n');
        }
        fs::write(&auth_keys, content).map_err(|e| ProvisionError::io("write", &auth_keys, e))?;
        tracing::info!(path = %auth_keys.display(), added = missing.len(), "authorized keys added");
    }
    fs::set_permissions(&auth_keys, fs::Permissions::from_mode(0o600))
        .map_err(|e| ProvisionError::io("set permissions on", &auth_keys, e))?;

    host.chown_recursive(&ssh_dir, username, username)
}

/// Permission problems keep their own variant
fn into_ssh_error(e: ProvisionError) -> ProvisionError {
    match e {
        ProvisionError::Permission { .. } => e,
        other => ProvisionError::ssh(other),
    }
}

/// The harden-ssh step: directives, keys, validation, reload
pub fn harden(host: &dyn Host, plan: &Plan, username: &str) -> Result<PathBuf, ProvisionError> {
    let config = &plan.ssh;

    let written = apply_directives(config, username).map_err(into_ssh_error)?;
    tracing::info!(path = %written.display(), "sshd directives written");

    install_authorized_keys(host, &plan.home_dir(username), username, &config.authorized_keys)
        .map_err(into_ssh_error)?;

    host.check_sshd_config(&config.config_path)
        .map_err(|e| ProvisionError::ssh(format!("{:#}", e)))?;
    host.reload_sshd(config.service.as_deref())
        .map_err(|e| ProvisionError::ssh(format!("{:#}", e)))?;

    Ok(written)
}

pub fn describe(plan: &Plan, username: &str) -> String {
    let target = if uses_drop_in(&plan.ssh) {
        plan.ssh.drop_in_dir.join(&plan.ssh.drop_in_name)
    } else {
        plan.ssh.config_path.clone()
    };
    let settings = render_lines(&directives(&plan.ssh, username)).join(", ");
    let keys = match plan.ssh.authorized_keys.len() {
        0 => String::new(),
        n => format!(", install {} authorized key(s)", n),
    };
    format!(
        "write {} to {}{}, then validate and reload sshd",
        settings,
        target.display(),
        keys
    )
}
