use anyhow::Context;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_row.join("  "));

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", cells.join("  "));
    }
}

/// Progress stream: every line goes to stdout and, when a log file was
/// requested, to the file with a local timestamp prefix.
pub struct Progress {
    log: Option<std::fs::File>,
}

impl Progress {
    pub fn new(log_path: Option<&Path>) -> anyhow::Result<Progress> {
        let log = match log_path {
            Some(path) => Some(
                std::fs::File::create(path)
                    .with_context(|| format!("cannot create log file {}", path.display()))?,
            ),
            None => None,
        };
        Ok(Progress { log })
    }

    pub fn line(&mut self, text: &str) {
        println!("{text}");
        if let Some(file) = &mut self.log {
            let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            // Log writes are advisory; a full disk must not kill the run.
            let _ = writeln!(file, "[{stamp}] {text}");
        }
    }

    pub fn rule(&mut self) {
        self.line(&"-".repeat(72));
    }
}
