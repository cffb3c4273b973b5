//! Recording host for exercising the step sequence without root.

use anyhow::{bail, Result};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::Host;
use crate::error::ProvisionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateUser(String),
    SetPassword(String),
    CheckSshd(PathBuf),
    ReloadSshd(Option<String>),
    Chown(PathBuf, String),
    Confirm(PathBuf),
}

#[derive(Debug, Default)]
pub struct FakeHost {
    pub users: RefCell<HashSet<String>>,
    pub calls: RefCell<Vec<Call>>,
    /// Name of an operation that should fail ("create_user", "reload_sshd", ...)
    pub fail: Option<&'static str>,
    pub confirm: bool,
}

impl FakeHost {
    pub fn with_user(self, name: &str) -> Self {
        self.users.borrow_mut().insert(name.into());
        self
    }

    pub fn failing(mut self, op: &'static str) -> Self {
        self.fail = Some(op);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn chowned(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Chown(path, _) => Some(path),
                _ => None,
            })
            .collect()
    }

    fn check(&self, op: &str) -> Result<()> {
        if self.fail == Some(op) {
            bail!("{} failed (injected)", op);
        }
        Ok(())
    }
}

impl Host for FakeHost {
    fn user_exists(&self, username: &str) -> Result<bool> {
        Ok(self.users.borrow().contains(username))
    }

    fn create_user(
        &self,
        username: &str,
        home: &Path,
        _shell: &str,
        _groups: &[String],
    ) -> Result<()> {
        self.check("create_user")?;
        self.calls
            .borrow_mut()
            .push(Call::CreateUser(username.into()));
        self.users.borrow_mut().insert(username.into());
        // useradd -m
        fs::create_dir_all(home)?;
        Ok(())
    }

    fn set_password(&self, username: &str, _password: &str) -> Result<()> {
        self.check("set_password")?;
        self.calls
            .borrow_mut()
            .push(Call::SetPassword(username.into()));
        Ok(())
    }

    fn check_sshd_config(&self, config: &Path) -> Result<()> {
        self.check("check_sshd_config")?;
        self.calls
            .borrow_mut()
            .push(Call::CheckSshd(config.to_path_buf()));
        Ok(())
    }

    fn reload_sshd(&self, service: Option<&str>) -> Result<()> {
        self.check("reload_sshd")?;
        self.calls
            .borrow_mut()
            .push(Call::ReloadSshd(service.map(String::from)));
        Ok(())
    }

    fn chown_recursive(&self, path: &Path, user: &str, group: &str) -> Result<(), ProvisionError> {
        if !path.exists() {
            return Err(ProvisionError::io(
                "chown",
                path,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        self.calls
            .borrow_mut()
            .push(Call::Chown(path.to_path_buf(), format!("{}:{}", user, group)));
        Ok(())
    }

    fn confirm_overwrite(&self, path: &Path) -> Result<bool> {
        self.calls
            .borrow_mut()
            .push(Call::Confirm(path.to_path_buf()));
        Ok(self.confirm)
    }
}
