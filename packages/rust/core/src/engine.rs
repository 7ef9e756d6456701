//! Sequential step engine with bounded per-step retries.
//!
//! Steps run one at a time, in registration order, against a single
//! [`RunContext`]. Each attempt is reported on the [`EventBus`]:
//!
//! ```text
//! PENDING → STARTED → SUCCESS
//!                   → RETRIED → STARTED → ...
//!                   → FAILED
//! ```
//!
//! A step that exhausts its retries stops the run; later steps never start.
//! Context writes made by a failed attempt are kept.

use std::time::Duration;

use tracing::{error, info, instrument, warn};

use mailsift_events::{EventBus, EventStatus};
use mailsift_shared::{MailsiftError, Result, RunContext};

// ---------------------------------------------------------------------------
// StepAction
// ---------------------------------------------------------------------------

/// The body of a step.
///
/// May read any context field; must document which fields it writes. An
/// action that can be retried should tolerate its own earlier partial writes.
pub trait StepAction: Send {
    fn run(&mut self, ctx: &mut RunContext) -> Result<()>;
}

impl<F> StepAction for F
where
    F: FnMut(&mut RunContext) -> Result<()> + Send,
{
    fn run(&mut self, ctx: &mut RunContext) -> Result<()> {
        self(ctx)
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// One named unit of pipeline work.
pub struct Step {
    order: u32,
    name: String,
    tool_name: String,
    max_retries: u32,
    action: Box<dyn StepAction>,
}

impl Step {
    /// A step with no retries. `order` is a display label only.
    pub fn new(
        order: u32,
        name: impl Into<String>,
        tool_name: impl Into<String>,
        action: impl StepAction + 'static,
    ) -> Self {
        Self {
            order,
            name: name.into(),
            tool_name: tool_name.into(),
            max_retries: 0,
            action: Box::new(action),
        }
    }

    /// Allow `max_retries` extra attempts after the first failure.
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("order", &self.order)
            .field("name", &self.name)
            .field("tool_name", &self.tool_name)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Ordered list of steps plus the bus their progress goes to.
#[derive(Debug)]
pub struct Pipeline {
    bus: EventBus,
    steps: Vec<Step>,
    backoff: Duration,
}

impl Pipeline {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            steps: Vec::new(),
            backoff: Duration::ZERO,
        }
    }

    /// Sleep this long between attempts of the same step.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Append a step. Steps execute in the order they are added, whatever
    /// their `order` labels say.
    pub fn add_step(&mut self, step: Step) -> &mut Self {
        self.steps.push(step);
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Run every step; `true` when all of them succeeded.
    pub fn run(&mut self, ctx: &mut RunContext) -> bool {
        self.execute(ctx).is_ok()
    }

    /// Like [`Pipeline::run`], but a failed run reports which step gave up
    /// as [`MailsiftError::RetryExhausted`].
    #[instrument(skip_all, fields(run_id = %ctx.run_id, steps = self.steps.len()))]
    pub fn execute(&mut self, ctx: &mut RunContext) -> Result<()> {
        for step in self.steps.iter_mut() {
            run_step(&self.bus, self.backoff, step, ctx)?;
        }
        info!("pipeline completed");
        Ok(())
    }
}

fn run_step(bus: &EventBus, backoff: Duration, step: &mut Step, ctx: &mut RunContext) -> Result<()> {
    let mut attempt: u32 = 1;

    loop {
        bus.emit(step.order, &step.name, &step.tool_name, EventStatus::Started);

        let err = match step.action.run(ctx) {
            Ok(()) => {
                bus.emit(step.order, &step.name, &step.tool_name, EventStatus::Success);
                info!(step = %step.name, attempt, "step succeeded");
                return Ok(());
            }
            Err(err) => err,
        };

        let reason = err.to_string();
        if attempt <= step.max_retries {
            warn!(step = %step.name, attempt, error = %reason, "step failed, retrying");
            bus.emit(step.order, &step.name, &step.tool_name, EventStatus::Retried);
            attempt += 1;
            if !backoff.is_zero() {
                std::thread::sleep(backoff);
            }
            continue;
        }

        error!(step = %step.name, attempts = attempt, error = %reason, "step failed");
        bus.emit(
            step.order,
            &step.name,
            &step.tool_name,
            EventStatus::Failed(reason.clone()),
        );
        return Err(MailsiftError::RetryExhausted {
            step: step.name.clone(),
            attempts: attempt,
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use mailsift_events::Event;

    use super::*;

    fn ok_step(order: u32, name: &str) -> Step {
        Step::new(order, name, "test", |_: &mut RunContext| -> Result<()> { Ok(()) })
    }

    fn failing_step(order: u32, name: &str, calls: Arc<AtomicU32>) -> Step {
        Step::new(order, name, "test", move |_: &mut RunContext| -> Result<()> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(MailsiftError::Source("mailbox unreachable".into()))
        })
    }

    fn count(events: &[Event], status: &EventStatus) -> usize {
        events.iter().filter(|e| &e.status == status).count()
    }

    #[test]
    fn all_success_emits_one_pair_per_step() {
        let bus = EventBus::new();
        let mut pipeline = Pipeline::new(bus.clone());
        pipeline
            .add_step(ok_step(1, "fetch"))
            .add_step(ok_step(2, "resolve"))
            .add_step(ok_step(3, "export"));

        assert!(pipeline.run(&mut RunContext::default()));

        let trail: Vec<(String, EventStatus)> = bus
            .drain()
            .into_iter()
            .map(|e| (e.step_name, e.status))
            .collect();
        let expected: Vec<(String, EventStatus)> = ["fetch", "resolve", "export"]
            .iter()
            .flat_map(|name| {
                [
                    (name.to_string(), EventStatus::Started),
                    (name.to_string(), EventStatus::Success),
                ]
            })
            .collect();
        assert_eq!(trail, expected);
    }

    #[test]
    fn exhausted_retries_fail_fast() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicU32::new(0));
        let later = Arc::new(AtomicU32::new(0));
        let later_calls = later.clone();

        let mut pipeline = Pipeline::new(bus.clone());
        pipeline
            .add_step(failing_step(1, "fetch", calls.clone()).with_retries(2))
            .add_step(Step::new(2, "export", "test", move |_: &mut RunContext| -> Result<()> {
                later_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));

        let err = pipeline
            .execute(&mut RunContext::default())
            .expect_err("step must give up");
        match err {
            MailsiftError::RetryExhausted { step, attempts, reason } => {
                assert_eq!(step, "fetch");
                assert_eq!(attempts, 3);
                assert_eq!(reason, "source error: mailbox unreachable");
            }
            other => panic!("unexpected error: {other}"),
        }

        let events = bus.drain();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(later.load(Ordering::SeqCst), 0);
        assert_eq!(count(&events, &EventStatus::Started), 3);
        assert_eq!(count(&events, &EventStatus::Retried), 2);
        assert_eq!(
            events.last().map(|e| &e.status),
            Some(&EventStatus::Failed("source error: mailbox unreachable".into()))
        );
        assert!(events.iter().all(|e| e.step_name == "fetch"));
    }

    #[test]
    fn zero_retries_fails_on_first_error() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicU32::new(0));
        let mut pipeline = Pipeline::new(bus.clone());
        pipeline.add_step(failing_step(1, "fetch", calls.clone()));

        assert!(!pipeline.run(&mut RunContext::default()));

        let statuses: Vec<String> = bus.drain().iter().map(|e| e.status.to_string()).collect();
        assert_eq!(
            statuses,
            vec!["STARTED", "FAILED: source error: mailbox unreachable"]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retry_then_success() {
        let bus = EventBus::new();
        let mut remaining_failures = 1;
        let mut pipeline = Pipeline::new(bus.clone());
        pipeline.add_step(
            Step::new(1, "flaky", "test", move |ctx: &mut RunContext| -> Result<()> {
                ctx.recipient_addresses.push("partial@x.com".into());
                if remaining_failures > 0 {
                    remaining_failures -= 1;
                    return Err(MailsiftError::Source("timeout".into()));
                }
                Ok(())
            })
            .with_retries(3),
        );

        let mut ctx = RunContext::default();
        assert!(pipeline.run(&mut ctx));

        let statuses: Vec<EventStatus> = bus.drain().into_iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                EventStatus::Started,
                EventStatus::Retried,
                EventStatus::Started,
                EventStatus::Success,
            ]
        );
        // Writes from the failed attempt are not rolled back.
        assert_eq!(ctx.recipient_addresses.len(), 2);
    }

    #[test]
    fn registration_order_wins_over_order_label() {
        let bus = EventBus::new();
        let mut pipeline = Pipeline::new(bus.clone());
        pipeline
            .add_step(ok_step(3, "registered-first"))
            .add_step(ok_step(1, "registered-second"));

        assert!(pipeline.run(&mut RunContext::default()));

        let events = bus.drain();
        assert_eq!(events[0].step_name, "registered-first");
        assert_eq!(events[0].order, 3);
        assert_eq!(events[2].step_name, "registered-second");
        assert_eq!(events[2].order, 1);
    }

    #[test]
    fn failed_step_keeps_partial_context() {
        let mut pipeline = Pipeline::new(EventBus::new());
        pipeline.add_step(Step::new(1, "fetch", "test", |ctx: &mut RunContext| -> Result<()> {
            ctx.fetched_count = Some(4);
            Err(MailsiftError::config("sender_filter not provided in context"))
        }));

        let mut ctx = RunContext::default();
        assert!(!pipeline.run(&mut ctx));
        assert_eq!(ctx.fetched_count, Some(4));
    }

    #[test]
    fn empty_pipeline_succeeds_silently() {
        let bus = EventBus::new();
        let mut pipeline = Pipeline::new(bus.clone());
        assert!(pipeline.is_empty());
        assert!(pipeline.run(&mut RunContext::default()));
        assert!(bus.is_empty());
    }

    #[test]
    fn backoff_delays_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut pipeline =
            Pipeline::new(EventBus::new()).with_backoff(Duration::from_millis(20));
        pipeline.add_step(failing_step(1, "fetch", calls).with_retries(2));

        let started = std::time::Instant::now();
        assert!(!pipeline.run(&mut RunContext::default()));
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
