//! Pipeline assembly: fetch → (verify) → (resolve) → export.
//!
//! Options decide which steps exist and how often each may retry; the
//! collaborators decide where addresses come from and where they go.

use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use mailsift_events::{Event, EventBus};
use mailsift_export::RecipientExporter;
use mailsift_identity::{IdentityPolicy, IdentityResolver, TOOL_NAME as RESOLVER_TOOL};
use mailsift_mailbox::{DnsVerifier, DomainVerifier, RecipientSource};
use mailsift_shared::{AppConfig, MailsiftError, RunContext};

use crate::engine::{Pipeline, Step};
use crate::steps::{ExportStep, FetchStep, VerifyStep};

pub const FETCH_STEP: &str = "Fetching Recipient Addresses";
pub const VERIFY_STEP: &str = "Verifying Recipient Domains";
pub const RESOLVE_STEP: &str = "Resolving Duplicate Identities";
pub const EXPORT_STEP: &str = "Saving Recipients";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// What the assembled pipeline does, independent of any one run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Include the identity resolution step.
    pub enable_resolution: bool,
    /// Include the domain verification step.
    pub verify_domains: bool,
    pub fetch_retries: u32,
    pub verify_retries: u32,
    pub resolve_retries: u32,
    pub export_retries: u32,
    /// Delay between attempts of the same step.
    pub backoff: Duration,
    pub identity: IdentityPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            enable_resolution: config.defaults.enable_resolution,
            verify_domains: config.defaults.verify_domains,
            fetch_retries: config.retries.fetch,
            verify_retries: config.retries.verify,
            resolve_retries: config.retries.resolve,
            export_retries: config.retries.export,
            backoff: Duration::from_millis(config.retries.backoff_ms),
            identity: IdentityPolicy::from(&config.identity),
        }
    }
}

/// External collaborators the steps delegate to.
pub struct Collaborators {
    pub source: Box<dyn RecipientSource>,
    /// Used when `verify_domains` is set; [`DnsVerifier`] when absent.
    pub verifier: Option<Box<dyn DomainVerifier>>,
    /// Chosen from the destination's extension when absent.
    pub exporter: Option<Box<dyn RecipientExporter>>,
}

impl Collaborators {
    pub fn new(source: Box<dyn RecipientSource>) -> Self {
        Self {
            source,
            verifier: None,
            exporter: None,
        }
    }

    pub fn with_verifier(mut self, verifier: Box<dyn DomainVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_exporter(mut self, exporter: Box<dyn RecipientExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Compose the step list. Orders are assigned 1..n in execution order.
pub fn build_pipeline(
    bus: &EventBus,
    options: &PipelineOptions,
    collaborators: Collaborators,
) -> Pipeline {
    let Collaborators {
        source,
        verifier,
        exporter,
    } = collaborators;

    let mut pipeline = Pipeline::new(bus.clone()).with_backoff(options.backoff);
    let mut order = 0u32;
    let mut next_order = || {
        order += 1;
        order
    };

    let fetch_tool = source.name().to_string();
    pipeline.add_step(
        Step::new(next_order(), FETCH_STEP, fetch_tool, FetchStep::new(source))
            .with_retries(options.fetch_retries),
    );

    if options.verify_domains {
        let verifier = verifier.unwrap_or_else(|| Box::new(DnsVerifier));
        let verify_tool = verifier.name().to_string();
        pipeline.add_step(
            Step::new(next_order(), VERIFY_STEP, verify_tool, VerifyStep::new(verifier))
                .with_retries(options.verify_retries),
        );
    }

    if options.enable_resolution {
        let order = next_order();
        let resolver = IdentityResolver::new(options.identity.clone(), bus.clone(), order);
        pipeline.add_step(
            Step::new(order, RESOLVE_STEP, RESOLVER_TOOL, resolver)
                .with_retries(options.resolve_retries),
        );
    }

    let order = next_order();
    let export = ExportStep::new(exporter, bus.clone(), order);
    let export_tool = export.tool_name().to_string();
    pipeline.add_step(
        Step::new(order, EXPORT_STEP, export_tool, export).with_retries(options.export_retries),
    );

    pipeline
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Outcome of [`run_pipeline`].
#[derive(Debug)]
pub struct PipelineRun {
    pub success: bool,
    /// The step that gave up, when `success` is false.
    pub failure: Option<MailsiftError>,
    /// Context as the last step left it, partial writes included.
    pub context: RunContext,
    /// Every event of the run, oldest first.
    pub events: Vec<Event>,
    pub elapsed: Duration,
}

/// Build and run a pipeline on a fresh trail: the bus is cleared first and
/// drained afterwards.
#[instrument(skip_all, fields(run_id = %context.run_id))]
pub fn run_pipeline(
    bus: &EventBus,
    mut context: RunContext,
    options: &PipelineOptions,
    collaborators: Collaborators,
) -> PipelineRun {
    let start = Instant::now();
    bus.clear();

    let mut pipeline = build_pipeline(bus, options, collaborators);
    info!(steps = pipeline.len(), "starting pipeline run");

    let failure = pipeline.execute(&mut context).err();
    let elapsed = start.elapsed();

    match &failure {
        None => info!(
            exported = context.exported_count.unwrap_or(0),
            elapsed_ms = elapsed.as_millis() as u64,
            "pipeline run succeeded"
        ),
        Some(err) => warn!(error = %err, "pipeline run failed"),
    }

    PipelineRun {
        success: failure.is_none(),
        failure,
        context,
        events: bus.drain(),
        elapsed,
    }
}
