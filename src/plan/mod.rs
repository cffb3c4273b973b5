mod schema;

pub use schema::*;

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Where the provisioning plan comes from
#[derive(Debug, Clone)]
pub enum PlanSource {
    File(PathBuf),
    Url(String),
    Stdin,
    Builtin,
}

impl PlanSource {
    /// Parse from command line argument
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            None => Self::Builtin,
            Some("-") => Self::Stdin,
            Some(s) if s.starts_with("http://") || s.starts_with("https://") => {
                Self::Url(s.to_string())
            }
            Some(s) => Self::File(PathBuf::from(s)),
        }
    }
}

pub fn load(source: &PlanSource) -> Result<Plan> {
    match source {
        PlanSource::File(path) => load_from_file(path),
        PlanSource::Url(url) => load_from_url(url),
        PlanSource::Stdin => load_from_stdin(),
        PlanSource::Builtin => Ok(Plan::default()),
    }
}

fn load_from_file(path: &Path) -> Result<Plan> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan: {}", path.display()))?;

    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "yaml" | "yml" => parse_yaml(&content),
        "json" => parse_json(&content),
        "toml" => parse_toml(&content),
        _ => parse_auto(&content),
    }
}

fn load_from_url(url: &str) -> Result<Plan> {
    let response = ureq::get(url)
        .call()
        .with_context(|| format!("Failed to fetch plan from URL: {}", url))?;

    let content = response
        .into_string()
        .context("Failed to read response body")?;

    if url.ends_with(".toml") {
        parse_toml(&content)
    } else {
        parse_auto(&content)
    }
}

fn load_from_stdin() -> Result<Plan> {
    let mut content = String::new();
    io::stdin()
        .read_to_string(&mut content)
        .context("Failed to read plan from stdin")?;

    parse_auto(&content)
}

fn parse_yaml(content: &str) -> Result<Plan> {
    serde_yaml::from_str(content).context("Failed to parse YAML plan")
}

fn parse_json(content: &str) -> Result<Plan> {
    serde_json::from_str(content).context("Failed to parse JSON plan")
}

fn parse_toml(content: &str) -> Result<Plan> {
    toml::from_str(content).context("Failed to parse TOML plan")
}

/// JSON if it starts with a brace, TOML if it opens with a table header or
/// `key = value`, YAML otherwise
fn parse_auto(content: &str) -> Result<Plan> {
    let trimmed = content.trim_start();

    if trimmed.starts_with('{') {
        parse_json(content)
    } else if trimmed.starts_with('[') || looks_like_toml(trimmed) {
        parse_toml(content)
    } else {
        parse_yaml(content)
    }
}

fn looks_like_toml(content: &str) -> bool {
    content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.contains(" = ") && !l.contains(": "))
        .unwrap_or(false)
}
