//! Command handlers for CLI subcommands.

use std::io::Read;
use std::path::Path;

use keepfile_persistence::{HistoryEntry, Source, Storage, StoreConfig};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::cli::{Commands, OutputFormat};

/// Result type for command operations.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Execute a CLI command.
pub async fn execute(command: Commands, config: StoreConfig) -> Result<()> {
    match command {
        Commands::Write { path, value } => {
            let raw = match value.as_deref() {
                None | Some("-") => read_stdin()?,
                Some(raw) => raw.to_string(),
            };
            cmd_write(&path, &raw, config).await
        }
        Commands::Read {
            path,
            compact,
            fallback,
        } => {
            let output = cmd_read(&path, fallback.as_deref(), compact, config).await?;
            println!("{}", output);
            Ok(())
        }
        Commands::Delete { path } => cmd_delete(&path, config).await,
        Commands::History { path, format } => {
            let output = cmd_history(&path, format, config).await?;
            print!("{}", output);
            Ok(())
        }
    }
}

/// Parses a JSON value given on the command line.
pub fn parse_value(raw: &str) -> Result<Value> {
    serde_json::from_str(raw.trim()).map_err(|e| format!("invalid JSON value: {}", e).into())
}

fn read_stdin() -> Result<String> {
    let mut raw = String::new();
    std::io::stdin().read_to_string(&mut raw)?;
    Ok(raw)
}

fn open(path: &Path, fallback: Value, config: StoreConfig) -> Storage<Value> {
    Storage::with_config(path, fallback, config)
}

pub async fn cmd_write(path: &Path, raw: &str, config: StoreConfig) -> Result<()> {
    let value = parse_value(raw)?;
    let store = open(path, Value::Object(Map::new()), config);

    store.write(value).await?;
    store.flush().await;

    info!(path = %store.path().display(), "value written");
    Ok(())
}

/// Reads the stored value and renders it as JSON.
pub async fn cmd_read(
    path: &Path,
    fallback: Option<&str>,
    compact: bool,
    config: StoreConfig,
) -> Result<String> {
    let fallback = match fallback {
        Some(raw) => parse_value(raw)?,
        None => Value::Object(Map::new()),
    };
    let store = open(path, fallback, config);

    let recovered = store.read_recovered().await;
    match recovered.source {
        Source::Primary => {}
        Source::History(sequence) => {
            warn!(path = %store.path().display(), sequence = sequence, "restored from history")
        }
        Source::Fallback => {
            info!(path = %store.path().display(), "nothing stored, printing fallback")
        }
    }

    let rendered = if compact {
        serde_json::to_string(&recovered.value)?
    } else {
        serde_json::to_string_pretty(&recovered.value)?
    };
    Ok(rendered)
}

pub async fn cmd_delete(path: &Path, config: StoreConfig) -> Result<()> {
    let store = open(path, Value::Null, config);
    store.delete().await?;
    info!(path = %store.path().display(), "value deleted");
    Ok(())
}

/// Lists history entries in the requested format.
pub async fn cmd_history(path: &Path, format: OutputFormat, config: StoreConfig) -> Result<String> {
    let store = open(path, Value::Null, config);
    let entries = store.history().await?;
    render_history(&entries, format)
}

fn render_history(entries: &[HistoryEntry], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let rows: Vec<Value> = entries
                .iter()
                .map(|entry| {
                    json!({
                        "sequence": entry.sequence(),
                        "written_at": entry.written_at().map(|t| t.to_rfc3339()),
                        "path": entry.path().display().to_string(),
                    })
                })
                .collect();
            Ok(format!("{}\n", serde_json::to_string_pretty(&rows)?))
        }
        OutputFormat::Table => {
            if entries.is_empty() {
                return Ok("No history entries.\n".to_string());
            }
            let mut out = format!("{:<16} {:<32} {}\n", "SEQUENCE", "WRITTEN AT", "PATH");
            for entry in entries {
                let written_at = entry
                    .written_at()
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                out.push_str(&format!(
                    "{:<16} {:<32} {}\n",
                    entry.sequence(),
                    written_at,
                    entry.path().display()
                ));
            }
            Ok(out)
        }
    }
}
