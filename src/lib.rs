//! Single-host homelab provisioner.
//!
//! Creates the service account, hardens SSH for it, seeds the live config
//! files for n8n, watchtower and caddy from their examples, and moves the
//! `homelab` tree into the new home with the right ownership.

pub mod cli;
pub mod cmd;
pub mod error;
pub mod host;
pub mod ownership;
pub mod paths;
pub mod plan;
pub mod prompt;
pub mod provisioner;
pub mod relocate;
pub mod ssh;
pub mod templates;
pub mod user;

pub use error::{ProvisionError, StepFailure};
pub use host::{Host, SystemHost};
pub use plan::Plan;
pub use provisioner::{Provisioner, Report, RunOptions, Step};
