//! Recipient sources: where the fetch step gets raw addresses from.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use mailsift_shared::{MailsiftError, Result};

use crate::address::parse_address_list;

/// Headers whose addresses count as recipients.
const RECIPIENT_HEADERS: [&str; 3] = ["to", "cc", "bcc"];

/// Produces the raw recipient addresses of every message a sender sent.
///
/// Implementations own their deadlines: `fetch` must return, never hang.
pub trait RecipientSource: Send + Sync {
    /// Tool name shown in progress events.
    fn name(&self) -> &str;

    /// Every recipient address (duplicates included) of messages whose
    /// sender matches `sender_filter`.
    fn fetch(&self, sender_filter: &str) -> Result<Vec<String>>;
}

// ---------------------------------------------------------------------------
// StaticSource
// ---------------------------------------------------------------------------

/// Fixed address list, independent of the sender filter.
#[derive(Debug, Clone)]
pub struct StaticSource {
    name: String,
    addresses: Vec<String>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, addresses: Vec<String>) -> Self {
        Self {
            name: name.into(),
            addresses,
        }
    }

    /// Sample mailbox for trying the pipeline without real mail.
    pub fn demo() -> Self {
        let addresses = [
            "alice@company.com",
            "bob@company.com",
            "alice.smith@company.com",
            "bob.jones@example.org",
            "carol@startup.io",
            "charlie.brown@startup.io",
            "david@tech.io",
            "eve@research.org",
            "frank@consulting.com",
        ];
        Self::new(
            "Demo Mailbox",
            addresses.iter().map(|a| a.to_string()).collect(),
        )
    }
}

impl RecipientSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, _sender_filter: &str) -> Result<Vec<String>> {
        Ok(self.addresses.clone())
    }
}

// ---------------------------------------------------------------------------
// MboxSource
// ---------------------------------------------------------------------------

/// Reads messages from a local mbox file.
#[derive(Debug, Clone)]
pub struct MboxSource {
    path: PathBuf,
}

impl MboxSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecipientSource for MboxSource {
    fn name(&self) -> &str {
        "mbox"
    }

    #[instrument(skip_all, fields(path = %self.path.display(), sender = sender_filter))]
    fn fetch(&self, sender_filter: &str) -> Result<Vec<String>> {
        let raw = std::fs::read(&self.path).map_err(|e| MailsiftError::io(&self.path, e))?;
        let content = String::from_utf8_lossy(&raw);

        let sender = sender_filter.to_lowercase();
        let mut matched = 0usize;
        let mut recipients = Vec::new();

        let messages = split_messages(&content);
        for (index, message) in messages.iter().enumerate() {
            let headers = parse_headers(message);
            if headers.is_empty() {
                warn!(index, "message without headers, skipping");
                continue;
            }

            let from_matches = headers
                .iter()
                .any(|(name, value)| name == "from" && value.to_lowercase().contains(&sender));
            if !from_matches {
                continue;
            }
            matched += 1;

            for (name, value) in &headers {
                if RECIPIENT_HEADERS.contains(&name.as_str()) {
                    recipients.extend(parse_address_list(value));
                }
            }
        }

        info!(
            messages = messages.len(),
            matched,
            recipients = recipients.len(),
            "mbox scanned"
        );

        Ok(recipients)
    }
}

/// Split mbox content on `From ` separator lines.
fn split_messages(content: &str) -> Vec<&str> {
    let mut messages = Vec::new();
    let mut start: Option<usize> = None;
    let mut offset = 0usize;

    for line in content.split_inclusive('\n') {
        if line.starts_with("From ") {
            if let Some(begin) = start {
                messages.push(&content[begin..offset]);
            }
            start = Some(offset + line.len());
        }
        offset += line.len();
    }
    if let Some(begin) = start {
        messages.push(&content[begin..]);
    }

    debug!(count = messages.len(), "split mbox");
    messages
}

/// Unfolded `(lowercase name, value)` header pairs of one message.
fn parse_headers(message: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();

    for line in message.lines() {
        if line.trim().is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_lowercase(), value.trim().to_string()));
        }
    }

    headers
}
