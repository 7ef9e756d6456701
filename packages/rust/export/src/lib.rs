//! Export collaborators: persist the final recipient list.
//!
//! Every exporter deduplicates and sorts before writing, creates missing
//! parent directories, and writes atomically (temp file, then rename).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use mailsift_shared::{MailsiftError, Result};

/// Column header of CSV exports.
pub const CSV_HEADER: &str = "recipient_email";

/// What an export wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub count: usize,
}

/// Persists a deduplicated recipient list to a destination.
pub trait RecipientExporter: Send + Sync {
    /// Tool name shown in progress events.
    fn name(&self) -> &str;

    fn export(&self, addresses: &[String], destination: &Path) -> Result<ExportSummary>;
}

/// Pick an exporter from the destination's extension (`.json` → JSON,
/// anything else → CSV).
pub fn exporter_for(destination: &Path) -> Box<dyn RecipientExporter> {
    let is_json = destination
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        Box::new(JsonExporter)
    } else {
        Box::new(CsvExporter)
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// One address per row under a `recipient_email` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvExporter;

impl RecipientExporter for CsvExporter {
    fn name(&self) -> &str {
        "CSV"
    }

    #[instrument(skip_all, fields(destination = %destination.display()))]
    fn export(&self, addresses: &[String], destination: &Path) -> Result<ExportSummary> {
        let unique = unique_sorted(addresses);

        let mut content = String::from(CSV_HEADER);
        content.push('\n');
        for address in &unique {
            content.push_str(&csv_field(address));
            content.push('\n');
        }

        write_atomic(destination, &content)?;
        info!(count = unique.len(), "recipients exported as CSV");

        Ok(ExportSummary {
            path: destination.to_path_buf(),
            count: unique.len(),
        })
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// `{"generated_at": ..., "count": n, "recipients": [...]}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExporter;

#[derive(Serialize)]
struct JsonDocument<'a> {
    generated_at: DateTime<Utc>,
    count: usize,
    recipients: &'a [&'a str],
}

impl RecipientExporter for JsonExporter {
    fn name(&self) -> &str {
        "JSON"
    }

    #[instrument(skip_all, fields(destination = %destination.display()))]
    fn export(&self, addresses: &[String], destination: &Path) -> Result<ExportSummary> {
        let unique = unique_sorted(addresses);
        let document = JsonDocument {
            generated_at: Utc::now(),
            count: unique.len(),
            recipients: &unique,
        };

        let content = serde_json::to_string_pretty(&document)
            .map_err(|e| MailsiftError::Export(format!("serialize recipients: {e}")))?;

        write_atomic(destination, &content)?;
        info!(count = unique.len(), "recipients exported as JSON");

        Ok(ExportSummary {
            path: destination.to_path_buf(),
            count: unique.len(),
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn unique_sorted(addresses: &[String]) -> Vec<&str> {
    addresses
        .iter()
        .map(String::as_str)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn write_atomic(destination: &Path, content: &str) -> Result<()> {
    let file_name = destination
        .file_name()
        .ok_or_else(|| MailsiftError::Export(format!("{} is not a file path", destination.display())))?;

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| MailsiftError::io(parent, e))?;
    }

    let temp = destination.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));
    std::fs::write(&temp, content).map_err(|e| MailsiftError::io(&temp, e))?;
    std::fs::rename(&temp, destination).map_err(|e| MailsiftError::io(destination, e))?;

    debug!(path = %destination.display(), size = content.len(), "wrote export");
    Ok(())
}
