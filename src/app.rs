use crate::config::YamlConfig;

use anyhow::{anyhow, bail, Context, Result};
use folder_scanner::{
    compile_filter, list_matching, load, EndReason, FileEntry, FolderScanner, ScanError,
    ScanOptions, ScanSummary, DEFAULT_INTERVAL,
};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;

pub const DEFAULT_FILTER: &str = "*";

pub struct AppConfig {
    pub directory: PathBuf,
    pub filter: String,
    pub interval: Duration,
    pub json: bool,
}

/// Command line wins over the config file; the directory has no default.
pub fn resolve(
    file: YamlConfig,
    dir: Option<PathBuf>,
    filter: Option<String>,
    interval_secs: Option<u64>,
    json: bool,
) -> Result<AppConfig> {
    let directory = dir.or(file.directory).ok_or_else(|| {
        anyhow!("no directory to scan (pass --dir or set `directory` in the config file)")
    })?;

    let interval = match interval_secs.or(file.interval_secs) {
        Some(0) => bail!("interval_secs must be at least 1"),
        Some(secs) => Duration::from_secs(secs),
        None => DEFAULT_INTERVAL,
    };

    Ok(AppConfig {
        directory,
        filter: filter
            .or(file.filter)
            .unwrap_or_else(|| DEFAULT_FILTER.to_string()),
        interval,
        json,
    })
}

/* =========================
   Output
   ========================= */

#[derive(Debug, Serialize)]
struct EntryLine {
    event: &'static str,
    path: String,
    size: u64,
    modified_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    lines: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ErrorLine {
    event: &'static str,
    fatal: bool,
    message: String,
}

fn entry_line(event: &'static str, entry: &FileEntry, lines: Option<usize>) -> Result<EntryLine> {
    Ok(EntryLine {
        event,
        path: entry.path.display().to_string(),
        size: entry.size,
        modified_at: entry.modified_at.format(&Rfc3339)?,
        lines,
    })
}

fn print_entry(line: &EntryLine, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(line)?);
    } else {
        match line.lines {
            Some(n) => println!(
                "{:<6} {} ({} bytes, {} lines, modified {})",
                line.event, line.path, line.size, n, line.modified_at
            ),
            None => println!(
                "{:<6} {} ({} bytes, modified {})",
                line.event, line.path, line.size, line.modified_at
            ),
        }
    }
    Ok(())
}

fn print_error(err: &ScanError, json: bool) {
    if json {
        let line = ErrorLine {
            event: "error",
            fatal: err.is_fatal(),
            message: format!("{:#}", err),
        };
        if let Ok(s) = serde_json::to_string(&line) {
            println!("{}", s);
        }
    } else {
        eprintln!("ERROR: {}", err);
    }
}

fn count_lines(entry: &FileEntry) -> Result<usize> {
    load(&entry.path, |r| {
        let mut buf = Vec::new();
        r.read_to_end(&mut buf)?;
        Ok(buf.iter().filter(|b| **b == b'\n').count())
    })
}

/* =========================
   Commands
   ========================= */

pub fn list(cfg: &AppConfig) -> Result<()> {
    let filter = compile_filter(&cfg.filter)?;
    let snapshot = list_matching(&cfg.directory, &filter)?;

    if !cfg.json {
        println!(
            "{} entries matching {:?} in {}",
            snapshot.len(),
            cfg.filter,
            cfg.directory.display()
        );
    }
    for entry in &snapshot {
        print_entry(&entry_line("entry", entry, None)?, cfg.json)?;
    }
    Ok(())
}

/// Scan until Ctrl-C or a listing fault.
pub fn watch(cfg: &AppConfig) -> Result<ScanSummary> {
    let json = cfg.json;

    let options = ScanOptions {
        interval: cfg.interval,
    };

    let handle = FolderScanner::new(cfg.directory.clone(), cfg.filter.clone())
        .with_options(options)
        .start(
            move |entry| {
                let lines = count_lines(&entry)?;
                print_entry(&entry_line("added", &entry, Some(lines))?, json)
            },
            move |err| print_error(&err, json),
        )?;

    let stop = handle.stop_flag();
    let interval = cfg.interval;
    ctrlc::set_handler(move || {
        if !stop.is_stopped() {
            eprintln!("Stopping (takes up to {:?})...", interval);
        }
        stop.stop();
    })
    .context("install Ctrl-C handler")?;

    if !json {
        println!(
            "Watching {} for {:?} every {:?} (Ctrl-C to stop)",
            cfg.directory.display(),
            cfg.filter,
            cfg.interval
        );
    }

    let summary = handle
        .join()
        .map_err(|_| anyhow!("scanner thread panicked"))?;

    if summary.ended_by == EndReason::ListingFault {
        bail!(
            "scan of {} stopped: directory could not be listed",
            cfg.directory.display()
        );
    }

    if !json {
        println!(
            "DONE: delivered={}, callback_errors={}",
            summary.invoked - summary.callback_faults, summary.callback_faults
        );
    }
    Ok(summary)
}
