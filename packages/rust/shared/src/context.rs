//! Shared state threaded through every step of one pipeline run.
//!
//! Steps read whatever earlier steps wrote and only ever set or overwrite
//! fields; nothing is removed mid-run. Which step writes which field:
//!
//! | Field | Written by |
//! |-------|-----------|
//! | `sender_filter`, `output_destination`, `account` | caller (inputs) |
//! | `recipient_addresses`, `fetched_count` | fetch |
//! | `verification_failures` | verify (also narrows `recipient_addresses`) |
//! | `recipient_addresses`, `resolved_count`, `clusters` | resolve |
//! | `export_path`, `exported_count` | export |

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{MailsiftError, Result};
use crate::types::{AddressCluster, RunId};

/// Mutable context for one pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunContext {
    /// Identifier of this run.
    pub run_id: RunId,

    // --- inputs ---
    /// Only messages from this sender are considered.
    pub sender_filter: Option<String>,
    /// Where the export step persists the final list.
    pub output_destination: Option<PathBuf>,
    /// Mailbox owner address, excluded from recipients.
    pub account: Option<String>,

    // --- fetch ---
    /// Ordered recipient addresses; overwritten by verify and resolve.
    pub recipient_addresses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_count: Option<usize>,

    // --- verify ---
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub verification_failures: Vec<String>,

    // --- resolve ---
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_count: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<AddressCluster>,

    // --- export ---
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exported_count: Option<usize>,
}

impl RunContext {
    /// Build a context with the two required inputs set.
    pub fn new(sender_filter: impl Into<String>, output_destination: impl Into<PathBuf>) -> Self {
        Self {
            sender_filter: Some(sender_filter.into()),
            output_destination: Some(output_destination.into()),
            ..Self::default()
        }
    }

    /// Set the mailbox owner's address.
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// The sender filter, or a config error when missing or blank.
    pub fn require_sender_filter(&self) -> Result<&str> {
        match self.sender_filter.as_deref().map(str::trim) {
            Some(sender) if !sender.is_empty() => Ok(sender),
            _ => Err(MailsiftError::config("sender_filter not provided in context")),
        }
    }

    /// The export destination, or a config error when missing or blank.
    pub fn require_output_destination(&self) -> Result<&Path> {
        match self.output_destination.as_deref() {
            Some(path) if !path.as_os_str().is_empty() => Ok(path),
            _ => Err(MailsiftError::config(
                "output_destination not provided in context",
            )),
        }
    }
}
