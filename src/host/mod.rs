mod system;

#[cfg(test)]
pub(crate) mod fake;

pub use system::SystemHost;

use anyhow::Result;
use std::path::Path;

use crate::error::ProvisionError;

/// Account database, sshd and ownership operations that need privilege.
///
/// Plain filesystem work (copy, move, mkdir) is done directly by the steps;
/// everything that touches system-wide state goes through here.
pub trait Host {
    /// Check whether an account with this name exists
    fn user_exists(&self, username: &str) -> Result<bool>;

    /// Create the account with a home directory at `home`
    fn create_user(&self, username: &str, home: &Path, shell: &str, groups: &[String])
        -> Result<()>;

    fn set_password(&self, username: &str, password: &str) -> Result<()>;

    /// Validate sshd configuration rooted at `config`
    fn check_sshd_config(&self, config: &Path) -> Result<()>;

    /// Reload the SSH daemon; `service` overrides name detection
    fn reload_sshd(&self, service: Option<&str>) -> Result<()>;

    /// Give `path` and everything below it to `user:group`
    fn chown_recursive(&self, path: &Path, user: &str, group: &str) -> Result<(), ProvisionError>;

    /// Ask whether an existing live config file may be replaced
    fn confirm_overwrite(&self, path: &Path) -> Result<bool>;
}
