use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::io::Write;
use std::process::{Command, Output, Stdio};

const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

fn command_line<S: AsRef<OsStr>>(program: &str, args: &[S]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.as_ref().to_string_lossy());
    }
    line
}

fn echo(line: &str) {
    println!("{}> {}{}", CYAN, line, RESET);
    tracing::debug!(command = %line, "running");
}

/// Run a command, inheriting stdio; fails on non-zero exit
pub fn run<I, S>(program: &str, args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<S> = args.into_iter().collect();
    echo(&command_line(program, &args));

    let status = Command::new(program)
        .args(&args)
        .status()
        .with_context(|| format!("Failed to run {}", program))?;

    if !status.success() {
        anyhow::bail!("{} failed with exit code {:?}", program, status.code());
    }

    Ok(())
}

/// Run a command feeding `input` on stdin. The input is never echoed.
pub fn run_with_stdin<I, S>(program: &str, args: I, input: &[u8]) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<S> = args.into_iter().collect();
    echo(&command_line(program, &args));

    let mut child = Command::new(program)
        .args(&args)
        .stdin(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to run {}", program))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input)
            .with_context(|| format!("Failed to write stdin of {}", program))?;
    }

    let status = child.wait()?;
    if !status.success() {
        anyhow::bail!("{} failed with exit code {:?}", program, status.code());
    }

    Ok(())
}

/// Run a command capturing its output; a non-zero exit carries stderr in the error
pub fn run_captured<I, S>(program: &str, args: I) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<S> = args.into_iter().collect();
    echo(&command_line(program, &args));

    let output = Command::new(program)
        .args(&args)
        .output()
        .with_context(|| format!("Failed to run {}", program))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "{} failed with exit code {:?}: {}",
            program,
            output.status.code(),
            stderr.trim()
        );
    }

    Ok(output)
}
