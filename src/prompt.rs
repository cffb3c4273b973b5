use anyhow::{anyhow, bail, Result};
use std::io::{self, BufRead, Write};

fn read_answer<R: BufRead>(input: &mut R) -> Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("Unexpected end of input. Is stdin connected to a terminal?");
    }
    Ok(line.trim().to_lowercase())
}

fn parse_yes_no(answer: &str, default: bool) -> bool {
    match answer {
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default,
    }
}

/// Ask a yes/no question on stdin
pub fn prompt_yes_no(prompt: &str, default: bool) -> Result<bool> {
    let hint = if default { "Y/n" } else { "y/N" };
    print!("{} [{}]: ", prompt, hint);
    io::stdout().flush()?;

    let answer = read_answer(&mut io::stdin().lock())?;
    Ok(parse_yes_no(&answer, default))
}

/// Read a password twice without echo until both entries match
pub fn prompt_password_confirm(prompt: &str) -> Result<String> {
    loop {
        let first = rpassword::prompt_password(format!("{}: ", prompt))
            .map_err(|e| anyhow!("Failed to read password: {}", e))?;

        if first.is_empty() {
            println!("Password cannot be empty");
            continue;
        }

        let second = rpassword::prompt_password(format!("Confirm {}: ", prompt.to_lowercase()))
            .map_err(|e| anyhow!("Failed to read password: {}", e))?;

        if first != second {
            println!("Passwords do not match");
            continue;
        }

        return Ok(first);
    }
}
