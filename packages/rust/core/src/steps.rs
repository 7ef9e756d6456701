//! Step actions wrapping the mailbox, identity, and export collaborators.
//!
//! Each action writes only its own context fields and overwrites them
//! wholesale, so a retried attempt never sees duplicates from an earlier one.

use std::collections::HashMap;

use tracing::{debug, info, instrument, warn};

use mailsift_events::{EventBus, EventStatus};
use mailsift_export::{RecipientExporter, exporter_for};
use mailsift_identity::IdentityResolver;
use mailsift_mailbox::{DomainVerifier, RecipientSource, domain_of};
use mailsift_shared::{Result, RunContext};

use crate::engine::StepAction;

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

/// Reads `sender_filter` and `account`; writes `recipient_addresses` and
/// `fetched_count`.
pub struct FetchStep {
    source: Box<dyn RecipientSource>,
}

impl FetchStep {
    pub fn new(source: Box<dyn RecipientSource>) -> Self {
        Self { source }
    }
}

impl StepAction for FetchStep {
    #[instrument(skip_all, fields(source = self.source.name()))]
    fn run(&mut self, ctx: &mut RunContext) -> Result<()> {
        let sender = ctx.require_sender_filter()?.to_string();
        let mut addresses = self.source.fetch(&sender)?;
        let fetched = addresses.len();

        if let Some(account) = ctx.account.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            addresses.retain(|address| !address.eq_ignore_ascii_case(account));
            if addresses.len() < fetched {
                debug!(
                    dropped = fetched - addresses.len(),
                    "dropped mailbox owner's own address"
                );
            }
        }

        info!(fetched, kept = addresses.len(), "recipients fetched");
        ctx.fetched_count = Some(addresses.len());
        ctx.recipient_addresses = addresses;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Verify
// ---------------------------------------------------------------------------

/// Narrows `recipient_addresses` to reachable domains; writes
/// `verification_failures`.
///
/// Addresses without a domain fail verification outright. A verifier error
/// fails the attempt so the engine can retry it.
pub struct VerifyStep {
    verifier: Box<dyn DomainVerifier>,
}

impl VerifyStep {
    pub fn new(verifier: Box<dyn DomainVerifier>) -> Self {
        Self { verifier }
    }
}

impl StepAction for VerifyStep {
    #[instrument(skip_all, fields(verifier = self.verifier.name()))]
    fn run(&mut self, ctx: &mut RunContext) -> Result<()> {
        let mut verdicts: HashMap<String, bool> = HashMap::new();
        let mut kept = Vec::with_capacity(ctx.recipient_addresses.len());
        let mut failures = Vec::new();

        for address in &ctx.recipient_addresses {
            let domain = domain_of(address).to_lowercase();
            if domain.is_empty() {
                warn!(%address, "recipient has no domain");
                failures.push(address.clone());
                continue;
            }
            let reachable = match verdicts.get(&domain) {
                Some(known) => *known,
                None => {
                    let verdict = self.verifier.verify(&domain)?;
                    verdicts.insert(domain.clone(), verdict);
                    verdict
                }
            };
            if reachable {
                kept.push(address.clone());
            } else {
                warn!(%address, %domain, "recipient domain unreachable");
                failures.push(address.clone());
            }
        }

        info!(
            domains = verdicts.len(),
            kept = kept.len(),
            failed = failures.len(),
            "recipient domains verified"
        );
        ctx.recipient_addresses = kept;
        ctx.verification_failures = failures;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Resolve
// ---------------------------------------------------------------------------

impl StepAction for IdentityResolver {
    fn run(&mut self, ctx: &mut RunContext) -> Result<()> {
        self.apply(ctx)
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Tool name used when no exporter was injected and none has been picked yet.
const EXPORT_TOOL: &str = "Exporter";

/// Persists `recipient_addresses` to `output_destination`; writes
/// `export_path` and `exported_count`.
///
/// Without an injected exporter the format follows the destination's
/// extension.
pub struct ExportStep {
    exporter: Option<Box<dyn RecipientExporter>>,
    bus: EventBus,
    order: u32,
}

impl ExportStep {
    pub fn new(exporter: Option<Box<dyn RecipientExporter>>, bus: EventBus, order: u32) -> Self {
        Self {
            exporter,
            bus,
            order,
        }
    }

    /// Tool name of the injected exporter, if any.
    pub fn tool_name(&self) -> &str {
        self.exporter.as_deref().map_or(EXPORT_TOOL, |e| e.name())
    }
}

impl StepAction for ExportStep {
    #[instrument(skip_all)]
    fn run(&mut self, ctx: &mut RunContext) -> Result<()> {
        let destination = ctx.require_output_destination()?.to_path_buf();

        let fallback;
        let exporter: &dyn RecipientExporter = match self.exporter.as_deref() {
            Some(exporter) => exporter,
            None => {
                fallback = exporter_for(&destination);
                &*fallback
            }
        };
        let tool = exporter.name().to_string();

        self.bus.emit(
            self.order,
            "Saving recipients - preparing file",
            &tool,
            EventStatus::Started,
        );

        match exporter.export(&ctx.recipient_addresses, &destination) {
            Ok(summary) => {
                info!(path = %summary.path.display(), count = summary.count, "recipients saved");
                ctx.export_path = Some(summary.path);
                ctx.exported_count = Some(summary.count);
                self.bus.emit(
                    self.order,
                    "Saving recipients - completed write",
                    &tool,
                    EventStatus::Success,
                );
                Ok(())
            }
            Err(err) => {
                self.bus.emit(
                    self.order,
                    "Saving recipients - failed write",
                    &tool,
                    EventStatus::Failed(err.to_string()),
                );
                Err(err)
            }
        }
    }
}
