//! `cadence` CLI: validate schedule plans and preview a participant's schedule.
//!
//! ## Usage
//!
//! ```sh
//! # Check that a plan file parses and validates
//! cadence validate -i plans.json
//!
//! # Also check criteria groups against the study's declared data groups
//! cadence validate -i plans.json --data-groups group1,group2
//!
//! # Expand plans for one participant (no persistence)
//! cadence expand -i plans.json --events events.json \
//!     --now 2015-04-12T14:20:56-07:00 --until 2015-04-14T14:20:56-07:00 \
//!     --zone America/Los_Angeles --os "iPhone OS" --app-version 4
//!
//! # Run the full read-materialize-merge pipeline against in-memory stores
//! cadence reconcile -i plans.json --events events.json --zone Europe/Berlin
//!
//! # Load scheduler settings and log at debug level
//! cadence --config cadence.toml -v expand -i plans.json --events events.json
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Read};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use cadence_engine::{
    expand_plan, ClientInfo, EventKey, EventStore, InMemoryActivityStore, Reconciler, ScheduleContext,
    ScheduledActivity, SchedulePlan, SchedulerConfig, Window,
};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cadence", version, about = "Participant activity scheduling CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Scheduler config file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log engine decisions to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate schedule plans
    Validate {
        /// Plans JSON file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Comma-separated data groups the study declares
        #[arg(long)]
        data_groups: Option<String>,
    },
    /// Expand plans into occurrence candidates for one participant
    Expand {
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Reconcile candidates against in-memory stores (twice) and print the result
    Reconcile {
        #[command(flatten)]
        request: RequestArgs,
    },
}

#[derive(Args)]
struct RequestArgs {
    /// Plans JSON file (reads from stdin if omitted)
    #[arg(short, long)]
    input: Option<String>,
    /// Output file (writes to stdout if omitted)
    #[arg(short, long)]
    output: Option<String>,
    /// Events JSON file: an object of event key to RFC 3339 timestamp
    #[arg(long)]
    events: Option<String>,
    /// Participant identifier
    #[arg(long, default_value = "participant")]
    owner: String,
    /// Start of the window (RFC 3339). Defaults to the current time.
    #[arg(long, value_parser = parse_instant)]
    now: Option<DateTime<Utc>>,
    /// End of the window (RFC 3339). Defaults to four days after --now.
    #[arg(long, value_parser = parse_instant)]
    until: Option<DateTime<Utc>>,
    /// IANA time zone used to interpret local times
    #[arg(long, default_value = "UTC", value_parser = parse_zone)]
    zone: Tz,
    /// Client operating system name
    #[arg(long)]
    os: Option<String>,
    /// Client app version
    #[arg(long, requires = "os")]
    app_version: Option<u32>,
    /// Comma-separated participant data groups
    #[arg(long)]
    groups: Option<String>,
    /// Comma-separated preferred languages
    #[arg(long)]
    language: Option<String>,
    /// Fallback enrollment time (RFC 3339) when no enrollment event exists
    #[arg(long, value_parser = parse_instant)]
    account_created_on: Option<DateTime<Utc>>,
    /// Keep expanding recurring schedules until this many times exist
    #[arg(long, default_value_t = 0)]
    minimum: u32,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match cli.config.as_deref() {
        Some(path) => {
            SchedulerConfig::load(path).with_context(|| format!("Failed to load config: {}", path))?
        }
        None => SchedulerConfig::default(),
    };

    match cli.command {
        Commands::Validate { input, data_groups } => {
            let plans = read_plans(input.as_deref())?;
            let declared = data_groups.as_deref().map(|raw| split_list(raw).into_iter().collect::<BTreeSet<_>>());
            for plan in &plans {
                if let Some(declared) = &declared {
                    plan.validate_data_groups(declared)
                        .with_context(|| format!("Plan {} failed validation", plan.guid()))?;
                }
                println!(
                    "{}: {} schedule(s)",
                    plan.guid(),
                    plan.strategy().all_possible_schedules().len()
                );
            }
            info!(plans = plans.len(), "validated schedule plans");
        }
        Commands::Expand { request } => {
            let plans = read_plans(request.input.as_deref())?;
            let mut events = read_events(request.events.as_deref())?;
            let context = build_context(&request)?;
            if let Some(created_on) = context.account_created_on {
                events.entry(cadence_engine::event_key::ENROLLMENT.to_string()).or_insert(created_on);
            }

            let window = Window::of(&context);
            let mut occurrences: Vec<ScheduledActivity> = plans
                .iter()
                .flat_map(|plan| expand_plan(plan, &events, window, &context, &config))
                .collect();
            occurrences.sort_by(ScheduledActivity::display_order);

            write_occurrences(request.output.as_deref(), &occurrences, &context, &config)?;
        }
        Commands::Reconcile { request } => {
            let plans = read_plans(request.input.as_deref())?;
            let events = read_events(request.events.as_deref())?;
            let context = build_context(&request)?;

            let event_store = EventStore::in_memory(&config).context("Invalid automatic custom events")?;
            for (key, timestamp) in &events {
                let key: EventKey = key.parse().with_context(|| format!("Invalid event key: {}", key))?;
                event_store.publish(&context.owner_id, &key, *timestamp)?;
            }

            let reconciler = Reconciler::new(
                Arc::new(InMemoryActivityStore::new()),
                event_store,
                Arc::new(plans),
                config.clone(),
            );
            let first = reconciler.get_occurrences(&context).context("Reconcile failed")?;
            let second = reconciler.get_occurrences(&context).context("Reconcile failed")?;
            if first != second {
                bail!("Repeated reconcile produced different occurrences");
            }
            debug!(count = second.len(), "repeated reconcile converged");

            write_occurrences(request.output.as_deref(), &second, &context, &config)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(io::stderr)
        .init();
}

fn build_context(request: &RequestArgs) -> Result<ScheduleContext> {
    let now = request.now.unwrap_or_else(Utc::now);
    let until = request.until.unwrap_or(now + Duration::days(4));
    if until < now {
        bail!("--until must not be before --now");
    }

    let client = match (&request.os, request.app_version) {
        (Some(os), Some(version)) => ClientInfo::new(os.as_str(), version),
        (Some(os), None) => ClientInfo {
            os_name: Some(os.clone()),
            app_version: None,
        },
        _ => ClientInfo::unknown(),
    };

    let mut builder = ScheduleContext::builder(request.owner.as_str())
        .zone(request.zone)
        .now(now)
        .window_end(until)
        .client(client)
        .data_groups(request.groups.as_deref().map(split_list).unwrap_or_default())
        .languages(request.language.as_deref().map(split_list).unwrap_or_default())
        .minimum_per_schedule(request.minimum);
    if let Some(created_on) = request.account_created_on {
        builder = builder.account_created_on(created_on);
    }
    Ok(builder.build())
}

fn read_plans(path: Option<&str>) -> Result<Vec<SchedulePlan>> {
    let json = read_input(path)?;
    serde_json::from_str(&json).context("Failed to parse schedule plans")
}

fn read_events(path: Option<&str>) -> Result<BTreeMap<String, DateTime<Utc>>> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))?;
            serde_json::from_str(&json).context("Failed to parse events")
        }
        None => Ok(BTreeMap::new()),
    }
}

fn write_occurrences(
    path: Option<&str>,
    occurrences: &[ScheduledActivity],
    context: &ScheduleContext,
    config: &SchedulerConfig,
) -> Result<()> {
    let views: Vec<_> = occurrences
        .iter()
        .map(|o| o.to_view(context.now, config.dst_policy))
        .collect();
    let mut json = serde_json::to_string_pretty(&views)?;
    json.push('\n');
    write_output(path, &json)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_instant(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

fn parse_zone(raw: &str) -> std::result::Result<Tz, String> {
    raw.parse::<Tz>()
        .map_err(|_| format!("unknown IANA time zone: {}", raw))
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn write_output(path: Option<&str>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write file: {}", path))?;
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}
