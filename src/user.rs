//! Account name validation and the create-user step.

use crate::error::ProvisionError;
use crate::host::Host;
use crate::plan::{ExistingPolicy, Plan};

/// useradd's default limit
pub const USERNAME_MAX_LEN: usize = 32;

/// Accept names useradd accepts under its default NAME_REGEX:
/// `[a-z_][a-z0-9_-]*[$]?`, at most 32 bytes.
pub fn validate_username(username: &str) -> Result<(), ProvisionError> {
    let invalid = |reason: &str| ProvisionError::InvalidUsername {
        username: username.into(),
        reason: reason.into(),
    };

    if username.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if username.len() > USERNAME_MAX_LEN {
        return Err(invalid("longer than 32 characters"));
    }

    let body = username.strip_suffix('$').unwrap_or(username);
    let mut chars = body.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return Err(invalid("must start with a lowercase letter or '_'")),
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-') {
        return Err(invalid("only lowercase letters, digits, '_' and '-' are allowed"));
    }

    Ok(())
}

/// What the create-user step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOutcome {
    Created,
    AlreadyPresent,
}

/// Create `username` with its home under the plan's home root.
///
/// An existing account is an error under [`ExistingPolicy::Fail`], which
/// leaves the host untouched since this is the first mutating step. Under
/// [`ExistingPolicy::Reuse`] only the requested password is applied.
pub fn ensure_user(
    host: &dyn Host,
    plan: &Plan,
    username: &str,
    password: Option<&str>,
) -> Result<UserOutcome, ProvisionError> {
    validate_username(username)?;

    let creation_error = |e: anyhow::Error| ProvisionError::UserCreation {
        username: username.into(),
        reason: format!("{:#}", e),
    };

    if host.user_exists(username).map_err(creation_error)? {
        return match plan.policy.existing {
            ExistingPolicy::Fail => Err(ProvisionError::UserExists {
                username: username.into(),
            }),
            ExistingPolicy::Reuse => {
                tracing::debug!(username, "user already exists, reusing");
                if let Some(password) = password {
                    host.set_password(username, password)
                        .map_err(creation_error)?;
                    tracing::info!(username, "password updated");
                }
                Ok(UserOutcome::AlreadyPresent)
            }
        };
    }

    let home = plan.home_dir(username);
    host.create_user(username, &home, &plan.shell, &plan.groups)
        .map_err(creation_error)?;
    tracing::info!(username, home = %home.display(), "user created");

    if let Some(password) = password {
        host.set_password(username, password)
            .map_err(creation_error)?;
    }

    Ok(UserOutcome::Created)
}

/// Human-readable line printed once the account is ready
pub fn success_line(username: &str) -> String {
    format!("User '{}' created successfully.", username)
}

pub fn describe(plan: &Plan, username: &str) -> String {
    format!(
        "create user '{}' with home {}{}",
        username,
        plan.home_dir(username).display(),
        if plan.groups.is_empty() {
            String::new()
        } else {
            format!(" and groups {}", plan.groups.join(","))
        }
    )
}
