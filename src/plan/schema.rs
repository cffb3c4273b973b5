use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Account to create; falls back to the `username` environment variable
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default = "default_home_root")]
    pub home_root: PathBuf,

    #[serde(default = "default_shell")]
    pub shell: String,

    /// Supplementary groups for the new account
    #[serde(default)]
    pub groups: Vec<String>,

    /// Base directory for template paths (defaults to the working directory)
    #[serde(default)]
    pub workdir: Option<PathBuf>,

    #[serde(default = "default_templates")]
    pub templates: Vec<TemplateSpec>,

    #[serde(default)]
    pub homelab: HomelabConfig,

    #[serde(default = "default_config_dir")]
    pub config_dir: String,

    #[serde(default)]
    pub ssh: SshConfig,

    #[serde(default)]
    pub policy: Policy,
}

fn default_home_root() -> PathBuf {
    PathBuf::from(paths::HOME_ROOT)
}

fn default_shell() -> String {
    paths::DEFAULT_SHELL.into()
}

fn default_config_dir() -> String {
    paths::CONFIG_DIR.into()
}

fn default_templates() -> Vec<TemplateSpec> {
    vec![
        TemplateSpec::new("n8n/example.env", "n8n/.env"),
        TemplateSpec::new("watchtower/example.env", "watchtower/.env"),
        TemplateSpec::new(
            "caddy/caddyfile/Caddyfile.example",
            "caddy/caddyfile/Caddyfile",
        ),
    ]
}

impl Default for Plan {
    fn default() -> Self {
        Self {
            username: None,
            home_root: default_home_root(),
            shell: default_shell(),
            groups: Vec::new(),
            workdir: None,
            templates: default_templates(),
            homelab: HomelabConfig::default(),
            config_dir: default_config_dir(),
            ssh: SshConfig::default(),
            policy: Policy::default(),
        }
    }
}

impl Plan {
    pub fn home_dir(&self, username: &str) -> PathBuf {
        self.home_root.join(username)
    }
}

/// An example file and the live file it seeds, relative to the workdir
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl TemplateSpec {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    pub fn resolve(&self, workdir: &Path) -> (PathBuf, PathBuf) {
        (workdir.join(&self.source), workdir.join(&self.destination))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomelabConfig {
    /// Directory name, kept the same at the destination
    #[serde(default = "default_homelab_name")]
    pub name: String,

    /// Where the directory currently lives (defaults to the invoking user's home)
    #[serde(default)]
    pub source_root: Option<PathBuf>,
}

fn default_homelab_name() -> String {
    paths::HOMELAB_DIR.into()
}

impl Default for HomelabConfig {
    fn default() -> Self {
        Self {
            name: default_homelab_name(),
            source_root: None,
        }
    }
}

/// sshd hardening for the provisioned account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_sshd_config")]
    pub config_path: PathBuf,

    #[serde(default = "default_drop_in_dir")]
    pub drop_in_dir: PathBuf,

    #[serde(default = "default_drop_in_name")]
    pub drop_in_name: String,

    #[serde(default)]
    pub permit_root_login: bool,

    /// Also governs KbdInteractiveAuthentication
    #[serde(default)]
    pub password_authentication: bool,

    /// Restrict logins to the provisioned account
    #[serde(default = "default_true")]
    pub allow_users: bool,

    /// Public keys installed into ~/.ssh/authorized_keys
    #[serde(default)]
    pub authorized_keys: Vec<String>,

    /// Service to reload; auto-detected (sshd, ssh) when unset
    #[serde(default)]
    pub service: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_sshd_config() -> PathBuf {
    PathBuf::from(paths::SSHD_CONFIG)
}

fn default_drop_in_dir() -> PathBuf {
    PathBuf::from(paths::SSHD_DROP_IN_DIR)
}

fn default_drop_in_name() -> String {
    paths::SSHD_DROP_IN_NAME.into()
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            config_path: default_sshd_config(),
            drop_in_dir: default_drop_in_dir(),
            drop_in_name: default_drop_in_name(),
            permit_root_login: false,
            password_authentication: false,
            allow_users: true,
            authorized_keys: Vec::new(),
            service: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub existing: ExistingPolicy,

    #[serde(default)]
    pub overwrite: OverwritePolicy,
}

/// What to do when the user, `.config` or relocated tree is already there
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingPolicy {
    /// Abort: the host was already provisioned
    #[default]
    Fail,
    /// Skip what is already in place so re-runs converge
    Reuse,
}

/// What to do with a live config file that already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwritePolicy {
    #[default]
    Overwrite,
    Backup,
    Keep,
    Prompt,
}

impl std::str::FromStr for OverwritePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overwrite" => Ok(Self::Overwrite),
            "backup" => Ok(Self::Backup),
            "keep" => Ok(Self::Keep),
            "prompt" => Ok(Self::Prompt),
            other => Err(format!(
                "unknown overwrite policy '{}' (expected overwrite, backup, keep or prompt)",
                other
            )),
        }
    }
}
