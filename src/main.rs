mod browser;
mod card;
mod config;
mod contact;
mod db;
mod error;
mod feed;
mod lead;
mod scraper;

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::browser::BrowserSession;
use crate::contact::PhoneKind;
use crate::error::ScrapeError;
use crate::lead::{EventCounter, FanOut, JsonLinesSink, LeadSink, UsageMeter};
use crate::scraper::{ScanPlan, ScanSummary};

#[derive(Parser)]
#[command(name = "leadscan", about = "Google Maps business leads with WhatsApp links")]
struct Cli {
    /// Config file (toml, json, yaml...). Defaults to ./leadscan.* if present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// SQLite database for runs and leads
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the map, scroll the result feed and emit leads
    Run {
        /// Search query, e.g. "Dentistas em Praia Grande, SP"
        #[arg(short, long)]
        search: Option<String>,
        /// Number of listings to collect
        #[arg(short = 'n', long)]
        max_items: Option<usize>,
        /// JSON lines output file ("-" for stdout)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Stored leads table
    Leads {
        /// Filter by phone kind (landline, mobile_whatsapp, indeterminate, invalid)
        #[arg(short, long)]
        kind: Option<PhoneKind>,
        /// Only leads from this run id
        #[arg(short, long)]
        run: Option<i64>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Recent runs
    Runs {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Lead counts per phone kind
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = config::load(cli.config.as_deref())?;
    let mut overrides = config::Overrides {
        db_path: cli.db,
        ..config::Overrides::default()
    };

    let result = match cli.command {
        Commands::Run {
            search,
            max_items,
            output,
        } => {
            overrides.search = search;
            overrides.max_items = max_items;
            overrides.output = output;
            settings.apply_overrides(overrides)?;
            run_scan(&settings).await
        }
        Commands::Leads { kind, run, limit } => {
            settings.apply_overrides(overrides)?;
            let conn = open_store(&settings)?;
            let rows = db::fetch_leads(&conn, kind, run, limit)?;
            if rows.is_empty() {
                println!("No leads found.");
                return Ok(());
            }

            println!(
                "{:>4} | {:>3} | {:<28} | {:<16} | {:<11} | {}",
                "Run", "#", "Name", "Kind", "Phone", "WhatsApp"
            );
            println!("{}", "-".repeat(100));
            for r in &rows {
                let link = if r.messaging_link.is_empty() {
                    "-"
                } else {
                    r.messaging_link.as_str()
                };
                println!(
                    "{:>4} | {:>3} | {:<28} | {:<16} | {:<11} | {}",
                    r.run_id,
                    r.rank,
                    truncate(&r.name, 28),
                    r.kind.label(),
                    r.cleaned_phone,
                    link
                );
            }

            let unparsed: Vec<_> = rows
                .iter()
                .filter(|r| r.kind == PhoneKind::Invalid && r.raw_phone.is_some())
                .collect();
            if !unparsed.is_empty() {
                println!("\n--- Unrecognized numbers ---");
                for r in &unparsed {
                    println!(
                        "  {}: {}",
                        truncate(&r.name, 28),
                        r.raw_phone.as_deref().unwrap_or_default()
                    );
                }
            }

            println!("\n{} leads", rows.len());
            Ok(())
        }
        Commands::Runs { limit } => {
            settings.apply_overrides(overrides)?;
            let conn = open_store(&settings)?;
            let runs = db::fetch_runs(&conn, limit)?;
            if runs.is_empty() {
                println!("No runs yet. Start one with 'run'.");
                return Ok(());
            }

            println!(
                "{:>4} | {:<19} | {:<32} | {:>6} | {:>7} | {:>4} | {:>7} | {:>7} | {}",
                "Id", "Started", "Query", "Target", "Emitted", "WA", "Skipped", "Scrolls", "Outcome"
            );
            println!("{}", "-".repeat(120));
            for r in &runs {
                let count = |n: Option<usize>| n.map(|n| n.to_string()).unwrap_or_else(|| "-".into());
                let outcome = match (&r.error, &r.stop_reason) {
                    (Some(e), _) => format!("failed: {}", truncate(e, 40)),
                    (None, Some(stop)) => stop.clone(),
                    (None, None) => "unfinished".to_string(),
                };
                println!(
                    "{:>4} | {:<19} | {:<32} | {:>6} | {:>7} | {:>4} | {:>7} | {:>7} | {}",
                    r.id,
                    r.started_at,
                    truncate(&r.query, 32),
                    r.target,
                    count(r.emitted),
                    count(r.whatsapp),
                    count(r.skipped),
                    count(r.rounds),
                    outcome
                );
            }
            Ok(())
        }
        Commands::Stats => {
            settings.apply_overrides(overrides)?;
            let conn = open_store(&settings)?;
            let s = db::get_stats(&conn)?;
            println!("Runs:  {}", s.runs);
            println!("Leads: {}", s.leads);
            for (kind, n) in &s.by_kind {
                println!("  {:<18} {}", kind.label(), n);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_store(settings: &config::Settings) -> anyhow::Result<Connection> {
    let path = settings
        .output
        .db_path
        .as_deref()
        .unwrap_or_else(|| Path::new(db::DEFAULT_DB_PATH));
    let conn = db::connect(path).with_context(|| format!("Failed to open {}", path.display()))?;
    db::init_schema(&conn)?;
    Ok(conn)
}

async fn run_scan(settings: &config::Settings) -> anyhow::Result<()> {
    let plan = ScanPlan {
        query: settings.search.clone(),
        target: settings.max_items,
        missing_phone: settings.missing_phone,
        pagination: settings.pagination.clone(),
    };

    // Open the file before the run row exists, so a bad path leaves no trace.
    let jsonl = open_jsonl(&settings.output.jsonl)?;

    let store = match &settings.output.db_path {
        Some(_) => {
            let conn = open_store(settings)?;
            let run_id = db::start_run(&conn, &plan.query, plan.target)?;
            info!("Recording run #{}", run_id);
            Some((conn, run_id))
        }
        None => None,
    };

    let mut sinks: Vec<Box<dyn LeadSink + '_>> = Vec::new();
    if let Some(jsonl) = jsonl {
        sinks.push(jsonl);
    }
    if let Some((conn, run_id)) = &store {
        sinks.push(Box::new(db::SqliteSink::new(conn, *run_id)));
    }
    let mut sink = FanOut::new(sinks);
    if sink.is_empty() {
        warn!("No output configured; leads will only be counted");
    }
    let mut meter = EventCounter::default();

    eprintln!("Scanning \"{}\" for up to {} listings...", plan.query, plan.target);
    let session =
        match BrowserSession::open(&settings.browser, settings.pagination.scroll_px).await {
            Ok(session) => session,
            Err(e) => {
                mark_failed(&store, &e);
                return Err(e.into());
            }
        };

    let result = scan(&session, &plan, &mut sink, &mut meter).await;
    session.close().await;

    match result {
        Ok(summary) => {
            if let Some((conn, run_id)) = &store {
                db::finish_run(conn, *run_id, &summary)?;
            }
            eprintln!(
                "Done: {} leads ({} WhatsApp, {} skipped) from {} cards in {} scrolls, stopped on {}.",
                summary.emitted,
                summary.whatsapp,
                summary.skipped,
                summary.collected,
                summary.rounds,
                summary.stop
            );
            eprintln!("Metered events: {}", meter.whatsapp);
            Ok(())
        }
        Err(e) => {
            mark_failed(&store, &e);
            Err(e.into())
        }
    }
}

async fn scan<K, M>(
    session: &BrowserSession,
    plan: &ScanPlan,
    sink: &mut K,
    meter: &mut M,
) -> Result<ScanSummary, ScrapeError>
where
    K: LeadSink + ?Sized,
    M: UsageMeter + ?Sized,
{
    session.open_results(&plan.query).await?;
    scraper::harvest(session, plan, sink, meter).await
}

/// JSON lines destination: `-` is stdout, empty disables it, anything else is a file.
fn open_jsonl(target: &str) -> anyhow::Result<Option<Box<dyn LeadSink>>> {
    let sink: Box<dyn LeadSink> = match target {
        "" => return Ok(None),
        "-" => Box::new(JsonLinesSink::new(io::stdout().lock())),
        path => {
            let file = File::create(path).with_context(|| format!("Failed to create {}", path))?;
            Box::new(JsonLinesSink::new(BufWriter::new(file)))
        }
    };
    Ok(Some(sink))
}

fn mark_failed(store: &Option<(Connection, i64)>, err: &ScrapeError) {
    if let Some((conn, run_id)) = store {
        if let Err(e) = db::fail_run(conn, *run_id, &err.to_string()) {
            warn!("Failed to record run failure: {}", e);
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
