use anyhow::{bail, Result};
use std::env;
use std::process;
use tracing_subscriber::EnvFilter;

use provision::cli::{self, Args, Command};
use provision::paths;
use provision::plan;
use provision::prompt;
use provision::{Provisioner, RunOptions, SystemHost};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();

    let command = match cli::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("error: {:#}\n", e);
            eprint!("{}", cli::USAGE);
            process::exit(2);
        }
    };

    match command {
        Command::Help => print!("{}", cli::USAGE),
        Command::Provision(args) => {
            if let Err(e) = run(args) {
                eprintln!("error: {:#}", e);
                process::exit(1);
            }
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut plan = plan::load(&args.plan_source())?;
    args.apply_to(&mut plan);

    let username = cli::resolve_username(&plan, env::var(paths::USERNAME_ENV).ok())?;

    if !args.dry_run {
        if !nix::unistd::geteuid().is_root() {
            bail!("homelab-provision must be run as root (use sudo), or pass --dry-run");
        }

        let missing = SystemHost::preflight(&plan, args.set_password);
        if !missing.is_empty() {
            bail!("Required tools not found: {}", missing.join(", "));
        }
    }

    let password = if args.set_password && !args.dry_run {
        Some(prompt::prompt_password_confirm(&format!(
            "Password for {}",
            username
        ))?)
    } else {
        None
    };

    println!("\n=== homelab provisioning ===\n");
    println!("  User:      {}", username);
    println!("  Home:      {}", plan.home_dir(&username).display());
    println!("  Existing:  {:?}", plan.policy.existing);
    println!("  Templates: {:?}", plan.policy.overwrite);

    let host = SystemHost::new();
    let options = RunOptions {
        dry_run: args.dry_run,
        password,
    };
    Provisioner::new(&plan, &host, username, options)?.run()?;

    println!("\n=== Provisioning complete ===\n");

    Ok(())
}
