//! Interactive menu and confirmation prompts. Real and destructive modes
//! gate on exact typed tokens; anything else cancels with no action taken.

use std::io::BufRead;
use tenantctl_core::Error;

/// Token required before any real (mutating) run.
pub const CONFIRM_APPLY: &str = "SI";
/// First token required before a deletion run; `CONFIRM_APPLY` follows.
pub const CONFIRM_DELETE: &str = "ELIMINAR";

/// Print a numbered menu and return the 1-based selection. An out-of-range
/// or non-numeric answer is an `InvalidChoice` error (exit code 1).
pub fn choose(title: &str, options: &[&str]) -> anyhow::Result<usize> {
    let stdin = std::io::stdin();
    let mut lock = stdin.lock();
    choose_from(&mut lock, title, options)
}

pub fn choose_from(
    input: &mut impl BufRead,
    title: &str,
    options: &[&str],
) -> anyhow::Result<usize> {
    println!("{title}");
    println!("{}", "=".repeat(60));
    for (i, option) in options.iter().enumerate() {
        println!("{}. {option}", i + 1);
    }
    println!("{}", "=".repeat(60));
    println!("Select a mode (1-{}):", options.len());

    let answer = read_trimmed(input)?;
    match answer.parse::<usize>() {
        Ok(n) if n >= 1 && n <= options.len() => Ok(n),
        _ => Err(Error::InvalidChoice(answer).into()),
    }
}

/// Ask for an exact token. Returns `false` (cancel) on any other input.
pub fn confirm(prompt: &str, token: &str) -> anyhow::Result<bool> {
    let stdin = std::io::stdin();
    let mut lock = stdin.lock();
    confirm_from(&mut lock, prompt, token)
}

pub fn confirm_from(
    input: &mut impl BufRead,
    prompt: &str,
    token: &str,
) -> anyhow::Result<bool> {
    println!("{prompt} (type '{token}' to confirm):");
    let answer = read_trimmed(input)?;
    Ok(answer == token)
}

/// Single confirmation for a real mutating run.
pub fn confirm_apply() -> anyhow::Result<bool> {
    confirm("This will modify real Google Cloud resources. Continue?", CONFIRM_APPLY)
}

/// Double confirmation for project deletion; both tokens must match.
pub fn confirm_deletion() -> anyhow::Result<bool> {
    let stdin = std::io::stdin();
    let mut lock = stdin.lock();
    confirm_deletion_from(&mut lock)
}

pub fn confirm_deletion_from(input: &mut impl BufRead) -> anyhow::Result<bool> {
    let first = confirm_from(
        input,
        "This will DELETE tenant projects. The deletion cannot be undone.",
        CONFIRM_DELETE,
    )?;
    if !first {
        return Ok(false);
    }
    confirm_from(input, "Are you completely sure?", CONFIRM_APPLY)
}

/// Prompt for an expiration window in days; empty input takes the default.
/// Re-prompts until the answer parses as a positive number.
pub fn prompt_days(default_days: u32) -> anyhow::Result<u32> {
    let stdin = std::io::stdin();
    let mut lock = stdin.lock();
    prompt_days_from(&mut lock, default_days)
}

pub fn prompt_days_from(input: &mut impl BufRead, default_days: u32) -> anyhow::Result<u32> {
    loop {
        println!("Expiration in days (Enter for {default_days}):");
        let answer = read_trimmed(input)?;
        if answer.is_empty() {
            return Ok(default_days);
        }
        match answer.parse::<u32>() {
            Ok(days) if days > 0 => return Ok(days),
            _ => println!("Enter a number greater than 0."),
        }
    }
}

fn read_trimmed(input: &mut impl BufRead) -> anyhow::Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}
