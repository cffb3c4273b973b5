//! Command line parsing for `homelab-provision`.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use crate::paths;
use crate::plan::{ExistingPolicy, OverwritePolicy, Plan, PlanSource};

pub const USAGE: &str = r#"homelab-provision - bootstrap a homelab host

Usage:
    homelab-provision [OPTIONS] [PLAN]

PLAN is a YAML, JSON or TOML file, an http(s) URL, or - for stdin.
Without one the built-in plan is used.

Options:
    -u, --user NAME        Account to create (default: $username)
    -n, --dry-run          Print what would be done without changing anything
    -C, --workdir DIR      Directory holding n8n/, watchtower/ and caddy/
        --set-password     Prompt for a password to set on the account
        --reuse-existing   Skip the user, homelab and .config if already present
        --overwrite MODE   Existing live configs: overwrite, backup, keep, prompt
    -h, --help             Show this help message

Examples:
    sudo username=alice homelab-provision
    sudo homelab-provision --user alice --dry-run
    sudo homelab-provision --overwrite backup plan.yaml
"#;

/// Parsed invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Provision(Args),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    pub plan: Option<String>,
    pub user: Option<String>,
    pub dry_run: bool,
    pub workdir: Option<PathBuf>,
    pub set_password: bool,
    pub reuse_existing: bool,
    pub overwrite: Option<OverwritePolicy>,
}

/// Parse arguments (without the program name)
pub fn parse(args: &[String]) -> Result<Command> {
    let mut parsed = Args::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .with_context(|| format!("{} requires a value", flag))
        };

        match arg.as_str() {
            "-h" | "--help" | "help" => return Ok(Command::Help),
            "-u" | "--user" => parsed.user = Some(value(arg)?),
            "-n" | "--dry-run" => parsed.dry_run = true,
            "-C" | "--workdir" => parsed.workdir = Some(PathBuf::from(value(arg)?)),
            "--set-password" => parsed.set_password = true,
            "--reuse-existing" => parsed.reuse_existing = true,
            "--overwrite" => {
                let mode = value(arg)?;
                parsed.overwrite = Some(mode.parse().map_err(anyhow::Error::msg)?);
            }
            "-" => set_plan(&mut parsed, arg)?,
            flag if flag.starts_with('-') => bail!("Unknown option: {}", flag),
            _ => set_plan(&mut parsed, arg)?,
        }
    }

    Ok(Command::Provision(parsed))
}

fn set_plan(parsed: &mut Args, arg: &str) -> Result<()> {
    if let Some(existing) = &parsed.plan {
        bail!("Only one plan may be given (got {} and {})", existing, arg);
    }
    parsed.plan = Some(arg.to_string());
    Ok(())
}

impl Args {
    pub fn plan_source(&self) -> PlanSource {
        PlanSource::from_arg(self.plan.as_deref())
    }

    /// Fold flags into the loaded plan; flags win
    pub fn apply_to(&self, plan: &mut Plan) {
        if let Some(user) = &self.user {
            plan.username = Some(user.clone());
        }
        if let Some(dir) = &self.workdir {
            plan.workdir = Some(dir.clone());
        }
        if self.reuse_existing {
            plan.policy.existing = ExistingPolicy::Reuse;
        }
        if let Some(mode) = self.overwrite {
            plan.policy.overwrite = mode;
        }
    }
}

/// Account name from the plan, else from the `username` environment variable
pub fn resolve_username(plan: &Plan, env: Option<String>) -> Result<String> {
    match plan.username.clone().or(env).filter(|u| !u.is_empty()) {
        Some(name) => Ok(name),
        None => bail!(
            "No username given. Use --user NAME, set it in the plan, or export {}",
            paths::USERNAME_ENV
        ),
    }
}
