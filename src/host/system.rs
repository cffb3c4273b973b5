use anyhow::{bail, Context, Result};
use nix::unistd::User;
use std::path::{Path, PathBuf};

use super::Host;
use crate::cmd;
use crate::error::ProvisionError;
use crate::ownership::{self, Owner};
use crate::plan::Plan;
use crate::prompt;

/// Service names tried when the plan does not name one
const SSH_SERVICES: &[&str] = &["sshd", "ssh"];

/// The running machine
#[derive(Debug, Clone, Default)]
pub struct SystemHost;

impl SystemHost {
    pub fn new() -> Self {
        Self
    }

    /// Tools the plan needs that are not on PATH
    pub fn preflight(plan: &Plan, set_password: bool) -> Vec<&'static str> {
        let mut required = vec!["useradd"];
        if set_password {
            required.push("chpasswd");
        }
        if plan.ssh.enabled {
            required.push("sshd");
        }

        required
            .into_iter()
            .filter(|tool| which::which(tool).is_err() && !in_sbin(tool))
            .collect()
    }
}

/// sudo often drops /usr/sbin from PATH
fn in_sbin(tool: &str) -> bool {
    ["/usr/sbin", "/sbin"]
        .iter()
        .any(|dir| Path::new(dir).join(tool).exists())
}

fn locate(tool: &str) -> PathBuf {
    which::which(tool).unwrap_or_else(|_| {
        ["/usr/sbin", "/sbin"]
            .iter()
            .map(|dir| Path::new(dir).join(tool))
            .find(|p| p.exists())
            .unwrap_or_else(|| PathBuf::from(tool))
    })
}

fn useradd_args(username: &str, home: &Path, shell: &str, groups: &[String]) -> Vec<String> {
    let mut args = vec![
        "-m".to_string(),
        "-d".into(),
        home.to_string_lossy().into_owned(),
        "-s".into(),
        shell.into(),
    ];

    if !groups.is_empty() {
        args.push("-G".into());
        args.push(groups.join(","));
    }

    args.push(username.into());
    args
}

/// Reload command for the first init tool present
fn reload_command(service: &str) -> Option<(&'static str, Vec<String>)> {
    if which::which("systemctl").is_ok() {
        Some(("systemctl", vec!["reload".into(), service.into()]))
    } else if which::which("rc-service").is_ok() {
        Some(("rc-service", vec![service.into(), "reload".into()]))
    } else if which::which("sv").is_ok() {
        Some(("sv", vec!["reload".into(), service.into()]))
    } else {
        None
    }
}

impl Host for SystemHost {
    fn user_exists(&self, username: &str) -> Result<bool> {
        let user = User::from_name(username)
            .with_context(|| format!("Failed to look up user '{}'", username))?;
        Ok(user.is_some())
    }

    fn create_user(
        &self,
        username: &str,
        home: &Path,
        shell: &str,
        groups: &[String],
    ) -> Result<()> {
        let useradd = locate("useradd");
        cmd::run(
            &useradd.to_string_lossy(),
            useradd_args(username, home, shell, groups),
        )
        .with_context(|| format!("Failed to create user '{}'", username))
    }

    fn set_password(&self, username: &str, password: &str) -> Result<()> {
        let chpasswd = locate("chpasswd");
        cmd::run_with_stdin(
            &chpasswd.to_string_lossy(),
            &[] as &[&str],
            format!("{}:{}\n", username, password).as_bytes(),
        )
        .with_context(|| format!("Failed to set password for '{}'", username))
    }

    fn check_sshd_config(&self, config: &Path) -> Result<()> {
        let sshd = locate("sshd");
        let config = config.to_string_lossy();
        cmd::run_captured(&sshd.to_string_lossy(), ["-t", "-f", &*config])
            .context("sshd rejected the configuration")?;
        Ok(())
    }

    fn reload_sshd(&self, service: Option<&str>) -> Result<()> {
        let candidates: Vec<&str> = match service {
            Some(name) => vec![name],
            None => SSH_SERVICES.to_vec(),
        };

        let mut last_error = None;
        for name in candidates {
            let Some((program, args)) = reload_command(name) else {
                bail!("No supported service manager found (systemctl, rc-service, sv)");
            };

            match cmd::run_captured(program, &args) {
                Ok(_) => {
                    tracing::info!(service = name, "sshd reloaded");
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!("Reloading {} failed: {:#}", name, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e.context("Failed to reload the SSH daemon")),
            None => bail!("No SSH service name to reload"),
        }
    }

    fn chown_recursive(&self, path: &Path, user: &str, group: &str) -> Result<(), ProvisionError> {
        let owner = Owner::resolve(user, group)?;
        ownership::chown_tree(path, owner).map(|_| ())
    }

    fn confirm_overwrite(&self, path: &Path) -> Result<bool> {
        prompt::prompt_yes_no(&format!("Overwrite {}?", path.display()), false)
    }
}
