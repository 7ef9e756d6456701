//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use mailsift_core::{Collaborators, PipelineOptions, PipelineRun, run_pipeline};
use mailsift_events::{Event, EventBus};
use mailsift_identity::{IdentityPolicy, resolve};
use mailsift_mailbox::{MboxSource, RecipientSource, StaticSource};
use mailsift_shared::{AppConfig, RunContext, init_config, load_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// mailsift: find everyone a sender has emailed, minus the duplicates.
#[derive(Parser)]
#[command(
    name = "mailsift",
    version,
    about = "Extract, deduplicate, and export the recipients a sender has emailed.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the fetch → resolve → export pipeline for one sender.
    Run(RunArgs),

    /// Cluster the given addresses and print the identities found.
    Resolve {
        /// Addresses to resolve.
        #[arg(required = true)]
        addresses: Vec<String>,

        /// Override the configured merge threshold.
        #[arg(long)]
        threshold: Option<f64>,

        /// Print the clusters as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments of `mailsift run`.
#[derive(clap::Args, Debug)]
pub(crate) struct RunArgs {
    /// Only messages sent by this address are considered.
    #[arg(short, long)]
    pub sender: String,

    /// Local mbox file to read (defaults to `mailbox.mbox_path`).
    #[arg(long)]
    pub mbox: Option<PathBuf>,

    /// Use the built-in sample mailbox instead of real mail.
    #[arg(long, conflicts_with = "mbox")]
    pub demo: bool,

    /// Mailbox owner's address, excluded from the results.
    #[arg(long)]
    pub account: Option<String>,

    /// Export destination; `.json` selects JSON, anything else CSV.
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Skip identity resolution.
    #[arg(long)]
    pub no_resolve: bool,

    /// Drop recipients whose domain does not resolve.
    #[arg(long)]
    pub verify_domains: bool,

    /// Write the run's event trail as JSON lines.
    #[arg(long)]
    pub events_json: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "mailsift=warn",
        1 => "mailsift=debug",
        _ => "mailsift=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::Resolve {
            addresses,
            threshold,
            json,
        } => cmd_resolve(&addresses, threshold, json),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(args: RunArgs) -> Result<()> {
    let config = load_config()?;
    let options = run_options(&config, &args);
    let source = select_source(&config, &args)?;

    let out = args
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.defaults.output_path));
    let mut context = RunContext::new(args.sender.clone(), out);
    if let Some(account) = args.account.clone().or_else(|| config.mailbox.account.clone()) {
        context = context.with_account(account);
    }

    info!(
        run_id = %context.run_id,
        sender = %args.sender,
        source = source.name(),
        resolve = options.enable_resolution,
        verify = options.verify_domains,
        "starting run"
    );

    let bus = EventBus::new();
    let run = run_observed(&bus, context, options, Collaborators::new(source)).await?;

    print_events(&run.events);
    if let Some(path) = &args.events_json {
        write_event_trail(path, &run.events)?;
        println!("  Events written to {}", path.display());
    }

    print_outcome(&run);
    match run.failure {
        None => Ok(()),
        Some(err) => Err(err).wrap_err("pipeline run failed"),
    }
}

/// Config values, overridden by flags.
fn run_options(config: &AppConfig, args: &RunArgs) -> PipelineOptions {
    let mut options = PipelineOptions::from(config);
    if args.no_resolve {
        options.enable_resolution = false;
    }
    if args.verify_domains {
        options.verify_domains = true;
    }
    options
}

fn select_source(config: &AppConfig, args: &RunArgs) -> Result<Box<dyn RecipientSource>> {
    if args.demo {
        return Ok(Box::new(StaticSource::demo()));
    }
    let path = args
        .mbox
        .clone()
        .or_else(|| config.mailbox.mbox_path.as_ref().map(PathBuf::from))
        .ok_or_else(|| eyre!("no mailbox to read: pass --mbox <path> or --demo"))?;
    Ok(Box::new(MboxSource::new(path)))
}

/// Run the pipeline on a blocking thread while the bus is polled into a
/// spinner.
async fn run_observed(
    bus: &EventBus,
    context: RunContext,
    options: PipelineOptions,
    collaborators: Collaborators,
) -> Result<PipelineRun> {
    let spinner = spinner()?;

    let worker_bus = bus.clone();
    let mut worker = tokio::task::spawn_blocking(move || {
        run_pipeline(&worker_bus, context, &options, collaborators)
    });

    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    let run = loop {
        tokio::select! {
            joined = &mut worker => {
                break joined.wrap_err("pipeline task did not complete")?;
            }
            _ = ticker.tick() => {
                if let Some(event) = bus.snapshot().last() {
                    spinner.set_message(format!(
                        "[{}] {} - {}",
                        event.order, event.step_name, event.status
                    ));
                }
            }
        }
    };

    spinner.finish_and_clear();
    Ok(run)
}

fn spinner() -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .wrap_err("invalid spinner template")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message("Starting pipeline");
    spinner.enable_steady_tick(Duration::from_millis(80));
    Ok(spinner)
}

fn print_events(events: &[Event]) {
    println!();
    println!(
        "  {:<3} {:<12} {:<44} {:<18} STATUS",
        "#", "TIME", "STEP", "TOOL"
    );
    for event in events {
        println!(
            "  {:<3} {:<12} {:<44} {:<18} {}",
            event.order,
            event.timestamp.format("%H:%M:%S%.3f"),
            event.step_name,
            event.tool_name,
            event.status
        );
    }
    println!();
}

fn print_outcome(run: &PipelineRun) {
    let ctx = &run.context;
    let count = |value: Option<usize>| value.map_or_else(|| "-".to_string(), |n| n.to_string());

    if run.success {
        println!("  Recipients saved successfully!");
    } else {
        println!("  Pipeline failed.");
    }
    println!("  Run:        {}", ctx.run_id);
    println!("  Fetched:    {}", count(ctx.fetched_count));
    if !ctx.verification_failures.is_empty() {
        println!("  Unreachable: {}", ctx.verification_failures.len());
    }
    println!("  Identities: {}", count(ctx.resolved_count));
    println!("  Exported:   {}", count(ctx.exported_count));
    if let Some(path) = &ctx.export_path {
        println!("  Path:       {}", path.display());
    }
    println!("  Time:       {:.1}s", run.elapsed.as_secs_f64());
    println!();
}

fn write_event_trail(path: &Path, events: &[Event]) -> Result<()> {
    let mut content = String::new();
    for event in events {
        content.push_str(&event.to_json_line()?);
        content.push('\n');
    }
    std::fs::write(path, content)
        .wrap_err_with(|| format!("failed to write events to {}", path.display()))
}

// ---------------------------------------------------------------------------
// resolve
// ---------------------------------------------------------------------------

fn cmd_resolve(addresses: &[String], threshold: Option<f64>, json: bool) -> Result<()> {
    let config = load_config()?;
    let policy = resolve_policy(&config, threshold)?;

    let resolution = resolve(addresses, &policy)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&resolution.clusters)?);
        return Ok(());
    }

    println!();
    for cluster in &resolution.clusters {
        println!(
            "  [{}] {} (feature {:.1})",
            cluster.label, cluster.representative, cluster.feature
        );
        for member in &cluster.members {
            println!("      {member}");
        }
    }
    println!();
    println!(
        "  {} address(es) → {} identit{}",
        addresses.len(),
        resolution.identity_count(),
        if resolution.identity_count() == 1 { "y" } else { "ies" }
    );
    for representative in &resolution.representatives {
        println!("  {representative}");
    }
    println!();

    Ok(())
}

/// Configured policy with the `--threshold` override applied and checked.
fn resolve_policy(config: &AppConfig, threshold: Option<f64>) -> Result<IdentityPolicy> {
    let mut policy = IdentityPolicy::from(&config.identity);
    if let Some(threshold) = threshold {
        policy.distance_threshold = threshold;
    }
    policy.validate().wrap_err("invalid --threshold")?;
    Ok(policy)
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_run(argv: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(argv).expect("valid arguments");
        match cli.command {
            Command::Run(args) => args,
            _ => panic!("expected run subcommand"),
        }
    }

    #[test]
    fn flags_override_config() {
        let args = parse_run(&[
            "mailsift",
            "run",
            "--sender",
            "boss@company.com",
            "--demo",
            "--no-resolve",
            "--verify-domains",
        ]);
        let options = run_options(&AppConfig::default(), &args);
        assert!(!options.enable_resolution);
        assert!(options.verify_domains);
    }

    #[test]
    fn demo_and_mbox_conflict() {
        let parsed = Cli::try_parse_from([
            "mailsift", "run", "--sender", "a@b.com", "--demo", "--mbox", "inbox.mbox",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn source_falls_back_to_configured_mbox() {
        let args = parse_run(&["mailsift", "run", "--sender", "boss@company.com"]);
        assert!(select_source(&AppConfig::default(), &args).is_err());

        let mut config = AppConfig::default();
        config.mailbox.mbox_path = Some("inbox.mbox".into());
        let source = select_source(&config, &args).expect("configured mbox");
        assert_eq!(source.name(), "mbox");
    }

    #[test]
    fn threshold_override_is_validated() {
        let config = AppConfig::default();
        assert!(resolve_policy(&config, Some(f64::NAN)).is_err());
        assert!(resolve_policy(&config, Some(-5.0)).is_err());
        assert!(resolve_policy(&config, Some(f64::INFINITY)).is_err());

        let policy = resolve_policy(&config, Some(40.0)).expect("valid threshold");
        assert_eq!(policy.distance_threshold, 40.0);
        assert_eq!(resolve_policy(&config, None).expect("default").distance_threshold, 25.0);
    }

    #[tokio::test]
    async fn observed_demo_run_completes() {
        let out = std::env::temp_dir()
            .join(format!("mailsift-cli-{}", mailsift_shared::RunId::new()))
            .join("recipients.csv");
        let bus = EventBus::new();

        let run = run_observed(
            &bus,
            RunContext::new("boss@company.com", &out),
            PipelineOptions::default(),
            Collaborators::new(Box::new(StaticSource::demo())),
        )
        .await
        .expect("run completes");
        if let Some(dir) = out.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }

        assert!(run.success);
        assert_eq!(run.context.exported_count, Some(7));
    }
}
