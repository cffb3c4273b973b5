use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::path::PathBuf;

use crate::error::{ProvisionError, StepFailure};
use crate::host::Host;
use crate::plan::{ExistingPolicy, Plan};
use crate::relocate::{self, Relocated};
use crate::ssh;
use crate::templates;
use crate::user::{self, UserOutcome};

/// Provisioning steps in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CreateUser,
    HardenSsh,
    Announce,
    SeedTemplates,
    RelocateHomelab,
    ChownHomelab,
    CreateConfigDir,
    ChownConfigDir,
}

impl Step {
    pub const ALL: [Step; 8] = [
        Step::CreateUser,
        Step::HardenSsh,
        Step::Announce,
        Step::SeedTemplates,
        Step::RelocateHomelab,
        Step::ChownHomelab,
        Step::CreateConfigDir,
        Step::ChownConfigDir,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Step::CreateUser => "create-user",
            Step::HardenSsh => "harden-ssh",
            Step::Announce => "announce",
            Step::SeedTemplates => "seed-templates",
            Step::RelocateHomelab => "relocate-homelab",
            Step::ChownHomelab => "chown-homelab",
            Step::CreateConfigDir => "create-config-dir",
            Step::ChownConfigDir => "chown-config-dir",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Step::CreateUser => "Creating user",
            Step::HardenSsh => "Hardening SSH",
            Step::Announce => "Reporting",
            Step::SeedTemplates => "Seeding service configuration",
            Step::RelocateHomelab => "Relocating homelab",
            Step::ChownHomelab => "Assigning homelab ownership",
            Step::CreateConfigDir => "Creating config directory",
            Step::ChownConfigDir => "Assigning config directory ownership",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Skipped(String),
    /// Dry run: what the step would have done
    Planned(String),
}

#[derive(Debug, Default)]
pub struct Report {
    pub steps: Vec<(Step, Outcome)>,
}

impl Report {
    pub fn outcome(&self, step: Step) -> Option<&Outcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    /// Password applied to the account, whether created or reused
    pub password: Option<String>,
}

pub struct Provisioner<'a> {
    plan: &'a Plan,
    host: &'a dyn Host,
    username: String,
    workdir: PathBuf,
    homelab_root: PathBuf,
    options: RunOptions,
}

impl<'a> Provisioner<'a> {
    /// Resolve the working directory and invoking home the plan leaves open
    pub fn new(
        plan: &'a Plan,
        host: &'a dyn Host,
        username: impl Into<String>,
        options: RunOptions,
    ) -> Result<Self> {
        let workdir = match &plan.workdir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Failed to determine working directory")?,
        };
        let homelab_root = match &plan.homelab.source_root {
            Some(dir) => dir.clone(),
            None => dirs::home_dir().context("Failed to determine the invoking user's home")?,
        };

        Ok(Self {
            plan,
            host,
            username: username.into(),
            workdir,
            homelab_root,
            options,
        })
    }

    fn home(&self) -> PathBuf {
        self.plan.home_dir(&self.username)
    }

    fn homelab_source(&self) -> PathBuf {
        self.homelab_root.join(&self.plan.homelab.name)
    }

    fn homelab_destination(&self) -> PathBuf {
        self.home().join(&self.plan.homelab.name)
    }

    fn config_dir(&self) -> PathBuf {
        self.home().join(&self.plan.config_dir)
    }

    /// Run every step in order, stopping at the first failure
    pub fn run(&self) -> Result<Report, StepFailure> {
        let total = Step::ALL.len();
        let mut report = Report::default();

        user::validate_username(&self.username).map_err(|error| StepFailure {
            step: Step::CreateUser,
            index: 1,
            total,
            error,
        })?;

        if self.options.dry_run {
            println!("Dry run: nothing will be changed.");
        }

        for (i, step) in Step::ALL.into_iter().enumerate() {
            let index = i + 1;
            println!("\n[{}/{}] {}...", index, total, step.title());

            let outcome = if self.options.dry_run {
                let planned = self.describe(step);
                println!("  would {}", planned);
                Outcome::Planned(planned)
            } else {
                self.execute(step).map_err(|error| StepFailure {
                    step,
                    index,
                    total,
                    error,
                })?
            };

            if let Outcome::Skipped(reason) = &outcome {
                println!("  skipped: {}", reason);
            }
            tracing::debug!(step = %step, ?outcome, "step finished");
            report.steps.push((step, outcome));
        }

        Ok(report)
    }

    fn execute(&self, step: Step) -> Result<Outcome, ProvisionError> {
        let name = self.username.as_str();
        let policy = self.plan.policy.existing;

        match step {
            Step::CreateUser => {
                let password = self.options.password.as_deref();
                match user::ensure_user(self.host, self.plan, name, password)? {
                    UserOutcome::Created => Ok(Outcome::Done),
                    UserOutcome::AlreadyPresent => {
                        Ok(Outcome::Skipped(format!("user '{}' already exists", name)))
                    }
                }
            }
            Step::HardenSsh => {
                if !self.plan.ssh.enabled {
                    return Ok(Outcome::Skipped("SSH hardening disabled".into()));
                }
                ssh::harden(self.host, self.plan, name)?;
                Ok(Outcome::Done)
            }
            Step::Announce => {
                println!("{}", user::success_line(name));
                Ok(Outcome::Done)
            }
            Step::SeedTemplates => {
                templates::seed_all(
                    self.host,
                    &self.workdir,
                    &self.plan.templates,
                    self.plan.policy.overwrite,
                )?;
                Ok(Outcome::Done)
            }
            Step::RelocateHomelab => {
                let source = self.homelab_source();
                match relocate::relocate(&source, &self.homelab_destination(), policy)? {
                    Relocated::AlreadyInPlace(path) => Ok(Outcome::Skipped(format!(
                        "{} already in place",
                        path.display()
                    ))),
                    Relocated::Moved(_) | Relocated::Copied(_) => Ok(Outcome::Done),
                }
            }
            Step::ChownHomelab => {
                self.host
                    .chown_recursive(&self.homelab_destination(), name, name)?;
                Ok(Outcome::Done)
            }
            Step::CreateConfigDir => {
                let dir = self.config_dir();
                match fs::create_dir(&dir) {
                    Ok(()) => {
                        tracing::info!(path = %dir.display(), "created");
                        Ok(Outcome::Done)
                    }
                    Err(e)
                        if e.kind() == std::io::ErrorKind::AlreadyExists
                            && policy == ExistingPolicy::Reuse =>
                    {
                        Ok(Outcome::Skipped(format!("{} already exists", dir.display())))
                    }
                    Err(e) => Err(ProvisionError::io("create", &dir, e)),
                }
            }
            Step::ChownConfigDir => {
                self.host.chown_recursive(&self.config_dir(), name, name)?;
                Ok(Outcome::Done)
            }
        }
    }

    fn describe(&self, step: Step) -> String {
        let name = self.username.as_str();

        match step {
            Step::CreateUser => user::describe(self.plan, name),
            Step::HardenSsh if !self.plan.ssh.enabled => "skip SSH hardening (disabled)".into(),
            Step::HardenSsh => ssh::describe(self.plan, name),
            Step::Announce => format!("print \"{}\"", user::success_line(name)),
            Step::SeedTemplates => templates::describe(
                &self.workdir,
                &self.plan.templates,
                self.plan.policy.overwrite,
            ),
            Step::RelocateHomelab => {
                let source = self.homelab_source();
                let target = relocate::target_path(&source, &self.homelab_destination());
                format!("move {} to {}", source.display(), target.display())
            }
            Step::ChownHomelab => format!(
                "chown -R {}:{} {}",
                name,
                name,
                self.homelab_destination().display()
            ),
            Step::CreateConfigDir => format!("create {}", self.config_dir().display()),
            Step::ChownConfigDir => {
                format!("chown -R {}:{} {}", name, name, self.config_dir().display())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fake::{Call, FakeHost};
    use std::path::Path;

    struct Fixture {
        dir: tempfile::TempDir,
        plan: Plan,
    }

    impl Fixture {
        /// Working directory with the three examples, an invoking home with
        /// `homelab/README.md`, and an sshd config, all under one temp dir
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path();

            let work = root.join("work");
            for sub in ["n8n", "watchtower", "caddy/caddyfile"] {
                fs::create_dir_all(work.join(sub)).unwrap();
            }
            fs::write(work.join("n8n/example.env"), "N8N_PORT=5678\n").unwrap();
            fs::write(work.join("watchtower/example.env"), "WATCHTOWER_CLEANUP=true\n").unwrap();
            fs::write(
                work.join("caddy/caddyfile/Caddyfile.example"),
                ":80 {\n  respond \"ok\"\n}\n",
            )
            .unwrap();

            fs::create_dir_all(root.join("invoker/homelab")).unwrap();
            fs::write(root.join("invoker/homelab/README.md"), "# homelab\n").unwrap();

            fs::create_dir_all(root.join("etc/ssh")).unwrap();
            fs::write(root.join("etc/ssh/sshd_config"), "Port 22\n").unwrap();

            let mut plan = Plan {
                home_root: root.join("home"),
                workdir: Some(work),
                ..Plan::default()
            };
            plan.homelab.source_root = Some(root.join("invoker"));
            plan.ssh.config_path = root.join("etc/ssh/sshd_config");
            plan.ssh.drop_in_dir = root.join("etc/ssh/sshd_config.d");

            Self { dir, plan }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.dir.path().join(rel)
        }

        fn run(&self, host: &FakeHost, options: RunOptions) -> Result<Report, StepFailure> {
            Provisioner::new(&self.plan, host, "alice", options)
                .unwrap()
                .run()
        }
    }

    fn same_content(a: &Path, b: &Path) -> bool {
        fs::read(a).unwrap() == fs::read(b).unwrap()
    }

    #[test]
    fn provisions_alice_end_to_end() {
        let fx = Fixture::new();
        let host = FakeHost::default();

        let report = fx.run(&host, RunOptions::default()).unwrap();

        assert!(report.steps.iter().all(|(_, o)| *o == Outcome::Done));
        assert!(host.users.borrow().contains("alice"));
        assert_eq!(
            fs::read_to_string(fx.path("home/alice/homelab/README.md")).unwrap(),
            "# homelab\n"
        );
        assert!(!fx.path("invoker/homelab").exists());
        assert!(fx.path("home/alice/.config").is_dir());

        assert!(same_content(
            &fx.path("work/n8n/example.env"),
            &fx.path("work/n8n/.env")
        ));
        assert!(same_content(
            &fx.path("work/watchtower/example.env"),
            &fx.path("work/watchtower/.env")
        ));
        assert!(same_content(
            &fx.path("work/caddy/caddyfile/Caddyfile.example"),
            &fx.path("work/caddy/caddyfile/Caddyfile")
        ));

        assert!(fs::read_to_string(fx.path("etc/ssh/sshd_config"))
            .unwrap()
            .contains("AllowUsers alice"));

        assert_eq!(
            host.calls(),
            vec![
                Call::CreateUser("alice".into()),
                Call::CheckSshd(fx.path("etc/ssh/sshd_config")),
                Call::ReloadSshd(None),
                Call::Chown(fx.path("home/alice/homelab"), "alice:alice".into()),
                Call::Chown(fx.path("home/alice/.config"), "alice:alice".into()),
            ]
        );
    }

    #[test]
    fn dry_run_changes_nothing() {
        let fx = Fixture::new();
        let host = FakeHost::default();
        let options = RunOptions {
            dry_run: true,
            ..RunOptions::default()
        };

        let report = fx.run(&host, options).unwrap();

        assert_eq!(report.steps.len(), Step::ALL.len());
        assert!(report
            .steps
            .iter()
            .all(|(_, o)| matches!(o, Outcome::Planned(_))));
        assert!(host.calls().is_empty());
        assert!(!fx.path("home").exists());
        assert!(!fx.path("work/n8n/.env").exists());
        assert!(fx.path("invoker/homelab/README.md").exists());
        assert_eq!(
            fs::read_to_string(fx.path("etc/ssh/sshd_config")).unwrap(),
            "Port 22\n"
        );

        let Some(Outcome::Planned(moved)) = report.outcome(Step::RelocateHomelab) else {
            panic!("relocation not planned");
        };
        assert!(moved.ends_with("home/alice/homelab"), "{}", moved);
    }

    #[test]
    fn existing_user_fails_before_any_mutation() {
        let fx = Fixture::new();
        let host = FakeHost::default().with_user("alice");

        let failure = fx.run(&host, RunOptions::default()).unwrap_err();

        assert_eq!(failure.step, Step::CreateUser);
        assert_eq!(failure.index, 1);
        assert!(matches!(failure.error, ProvisionError::UserExists { .. }));
        assert!(host.calls().is_empty());
        assert!(!fx.path("work/n8n/.env").exists());
        assert!(fx.path("invoker/homelab").exists());
        assert_eq!(
            fs::read_to_string(fx.path("etc/ssh/sshd_config")).unwrap(),
            "Port 22\n"
        );
    }

    #[test]
    fn missing_homelab_stops_before_ownership() {
        let fx = Fixture::new();
        fs::remove_dir_all(fx.path("invoker/homelab")).unwrap();
        let host = FakeHost::default();

        let failure = fx.run(&host, RunOptions::default()).unwrap_err();

        assert_eq!(failure.step, Step::RelocateHomelab);
        assert_eq!(failure.index, 5);
        assert!(host.chowned().is_empty());
        assert!(!fx.path("home/alice/.config").exists());
    }

    #[test]
    fn missing_template_names_the_step() {
        let fx = Fixture::new();
        fs::remove_file(fx.path("work/caddy/caddyfile/Caddyfile.example")).unwrap();
        let host = FakeHost::default();

        let failure = fx.run(&host, RunOptions::default()).unwrap_err();

        assert_eq!(failure.step, Step::SeedTemplates);
        assert!(matches!(
            failure.error,
            ProvisionError::MissingTemplate { .. }
        ));
        assert!(fx.path("invoker/homelab").exists());
    }

    #[test]
    fn ssh_failure_stops_the_run() {
        let fx = Fixture::new();
        let host = FakeHost::default().failing("check_sshd_config");

        let failure = fx.run(&host, RunOptions::default()).unwrap_err();

        assert_eq!(failure.step, Step::HardenSsh);
        assert!(matches!(failure.error, ProvisionError::SshHardening { .. }));
        assert!(!fx.path("work/n8n/.env").exists());
    }

    #[test]
    fn ssh_can_be_disabled() {
        let mut fx = Fixture::new();
        fx.plan.ssh.enabled = false;
        let host = FakeHost::default();

        let report = fx.run(&host, RunOptions::default()).unwrap();

        assert!(matches!(
            report.outcome(Step::HardenSsh),
            Some(Outcome::Skipped(_))
        ));
        assert!(!host
            .calls()
            .iter()
            .any(|c| matches!(c, Call::ReloadSshd(_) | Call::CheckSshd(_))));
    }

    #[test]
    fn existing_config_dir_fails_loudly() {
        let fx = Fixture::new();
        let host = FakeHost::default();
        fs::create_dir_all(fx.path("home/alice/.config")).unwrap();

        let failure = fx.run(&host, RunOptions::default()).unwrap_err();

        assert_eq!(failure.step, Step::CreateConfigDir);
        assert!(matches!(failure.error, ProvisionError::AlreadyExists { .. }));
        assert_eq!(host.chowned(), vec![fx.path("home/alice/homelab")]);
    }

    #[test]
    fn rerun_with_reuse_converges() {
        let mut fx = Fixture::new();
        fx.plan.policy.existing = ExistingPolicy::Reuse;
        let host = FakeHost::default();

        fx.run(&host, RunOptions::default()).unwrap();
        let config_after_first = fs::read_to_string(fx.path("etc/ssh/sshd_config")).unwrap();

        let report = fx.run(&host, RunOptions::default()).unwrap();

        assert!(matches!(
            report.outcome(Step::CreateUser),
            Some(Outcome::Skipped(_))
        ));
        assert!(matches!(
            report.outcome(Step::RelocateHomelab),
            Some(Outcome::Skipped(_))
        ));
        assert!(matches!(
            report.outcome(Step::CreateConfigDir),
            Some(Outcome::Skipped(_))
        ));
        assert_eq!(
            fs::read_to_string(fx.path("etc/ssh/sshd_config")).unwrap(),
            config_after_first
        );
        assert!(fx.path("home/alice/homelab/README.md").exists());
        assert!(!fx.path("home/alice/homelab/homelab").exists());
    }

    #[test]
    fn invalid_username_fails_even_in_dry_run() {
        let fx = Fixture::new();
        let host = FakeHost::default();
        let options = RunOptions {
            dry_run: true,
            ..RunOptions::default()
        };

        let failure = Provisioner::new(&fx.plan, &host, "Bad Name", options)
            .unwrap()
            .run()
            .unwrap_err();

        assert_eq!(failure.step, Step::CreateUser);
        assert!(matches!(
            failure.error,
            ProvisionError::InvalidUsername { .. }
        ));
    }

    #[test]
    fn step_ids_are_unique() {
        let mut ids: Vec<_> = Step::ALL.iter().map(Step::id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), Step::ALL.len());
    }
}
