use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use profilebase::enrichment::format_queue_status;
use profilebase::ingestion::{Collector, ProfileSighting};
use profilebase::review::{BrowseMode, ViewFilter};
use profilebase::workspace::backend_label;
use profilebase::{PageContext, Tier, Workspace};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let command = CliArgs::parse()?;
    let mut workspace = Workspace::open()?;
    init_tracing(workspace.config.log_filter());

    match command {
        Command::Status => status(&mut workspace),
        Command::View { mode, search } => view(&mut workspace, mode, search.as_deref()),
        Command::Collect { keys } => collect(&mut workspace, &keys),
        Command::Dedup => {
            let opened = workspace.open_record_store()?;
            if opened.dedup.is_empty() {
                println!("No duplicate keys found.");
            } else {
                for (from, to) in &opened.dedup.merged {
                    println!("Merged {from} into {to}");
                }
            }
            for key in &opened.dedup.unresolvable {
                println!("Left in place (not a valid key): {key}");
            }
            Ok(())
        }
        Command::Export { path } => {
            let opened = workspace.open_record_store()?;
            let (path, snapshot) = workspace.export_to(&opened.store, path.as_deref())?;
            println!(
                "Exported {} records to {} (digest {}).",
                snapshot.stats.total,
                path.display(),
                snapshot.digest
            );
            Ok(())
        }
        Command::Import { path } => {
            let opened = workspace.open_record_store()?;
            let summary = workspace.import_from(&opened.store, &path)?;
            println!(
                "Imported {} records and {} decisions ({} skipped).",
                summary.records,
                summary.preferences,
                summary.skipped.len()
            );
            Ok(())
        }
        Command::ResetBackend => {
            if workspace.reset_backend_preference()? {
                println!("Structured backend will be tried again on next start.");
            } else {
                println!("No fallback decision was recorded.");
            }
            Ok(())
        }
        Command::QueueStatus => {
            let state = workspace.queue_slot().load()?;
            println!("{}", format_queue_status(state.as_ref()));
            Ok(())
        }
        Command::QueueStop => {
            let opened = workspace.open_record_store()?;
            let log = workspace.event_log();
            let stopped = workspace.work_queue(&opened.store, &log).stop()?;
            println!("{}", if stopped { "Queue stopped." } else { "Queue was idle." });
            Ok(())
        }
    }
}

fn init_tracing(default_filter: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn status(workspace: &mut Workspace) -> Result<()> {
    let opened = workspace.open_record_store()?;
    let store = &opened.store;
    let classifier = workspace.classifier();
    let records = store.get_all()?;
    println!(
        "Backend: {}{}",
        backend_label(store.backend_kind()),
        if workspace.config.storage.fallback_locked {
            " (fallback locked, run reset-backend to retry)"
        } else {
            ""
        }
    );
    println!("Records: {}", records.len());
    for tier in Tier::ALL {
        let count = records
            .iter()
            .filter(|record| classifier.tier(record) == tier)
            .count();
        println!("  {:<13} {count}", tier.as_str());
    }
    let counts = workspace.preferences()?.counts();
    println!(
        "Decisions: accepted {}, rejected {}, contacted {}",
        counts.accepted, counts.rejected, counts.contacted
    );
    let state = workspace.queue_slot().load()?;
    println!("{}", format_queue_status(state.as_ref()));
    Ok(())
}

fn view(workspace: &mut Workspace, mode: BrowseMode, search: Option<&str>) -> Result<()> {
    let opened = workspace.open_record_store()?;
    let preferences = workspace.preferences()?;
    let classifier = workspace.classifier();
    let filter = ViewFilter::new(&opened.store, &preferences).with_classifier(classifier);
    let records = filter.view(mode, search)?;
    for record in &records {
        let classification = classifier.classify(record);
        println!(
            "{:<30} {:<14} {}",
            record.key, classification.label, classification.detail
        );
    }
    println!("{} shown.", records.len());
    Ok(())
}

fn collect(workspace: &mut Workspace, keys: &[String]) -> Result<()> {
    let opened = workspace.open_record_store()?;
    let log = workspace.event_log();
    let settings = workspace.config.pages.for_context(PageContext::List).clone();
    let sightings: Vec<ProfileSighting> = keys.iter().map(ProfileSighting::new).collect();
    let mut collector = Collector::new(&opened.store)
        .with_page_settings(&settings)
        .with_event_log(&log);
    let mut summary = collector.collect(&sightings)?;
    if collector.buffered() > 0 {
        // Nothing else will flush a one-shot command.
        let flushed = collector.flush()?;
        summary.created = flushed.created;
    }
    println!("{}", summary.describe());
    Ok(())
}

enum Command {
    Status,
    View {
        mode: BrowseMode,
        search: Option<String>,
    },
    Collect {
        keys: Vec<String>,
    },
    Dedup,
    Export {
        path: Option<PathBuf>,
    },
    Import {
        path: PathBuf,
    },
    ResetBackend,
    QueueStatus,
    QueueStop,
}

struct CliArgs;

impl CliArgs {
    fn parse() -> Result<Command> {
        let mut args = env::args().skip(1);
        let Some(command) = args.next() else {
            print_usage();
            std::process::exit(0);
        };
        let command = match command.as_str() {
            "status" => Command::Status,
            "view" => {
                let mode = match args.next() {
                    Some(value) => BrowseMode::parse(&value)
                        .with_context(|| format!("Unknown view mode '{value}'"))?,
                    None => BrowseMode::Pending,
                };
                let rest: Vec<String> = args.by_ref().collect();
                let search = (!rest.is_empty()).then(|| rest.join(" "));
                Command::View { mode, search }
            }
            "collect" => Command::Collect {
                keys: args.by_ref().collect(),
            },
            "dedup" => Command::Dedup,
            "export" => Command::Export {
                path: args.next().map(PathBuf::from),
            },
            "import" => Command::Import {
                path: args
                    .next()
                    .map(PathBuf::from)
                    .context("Expected a snapshot path after import")?,
            },
            "reset-backend" => Command::ResetBackend,
            "queue-status" => Command::QueueStatus,
            "queue-stop" => Command::QueueStop,
            "--help" | "-h" | "help" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                return Err(anyhow!(
                    "Unknown command '{other}'. Run with --help for usage instructions."
                ));
            }
        };
        if let Some(extra) = args.next() {
            return Err(anyhow!("Unexpected argument '{extra}'."));
        }
        Ok(command)
    }
}

fn print_usage() {
    println!("ProfileBase");
    println!("Usage: profilebase <command> [args]");
    println!("  status                      backend, tier counts, decisions, queue");
    println!("  view [mode] [search text]   pending|accepted|rejected|contacted|search");
    println!("  collect <key>...            record sightings as basic records");
    println!("  dedup                       merge records stored under unnormalized keys");
    println!("  export [path]               write a snapshot (default: exports/)");
    println!("  import <path>               load a snapshot");
    println!("  reset-backend               retry the structured store on next start");
    println!("  queue-status | queue-stop");
    println!("Workspace root: $PROFILEBASE_HOME or the OS data directory.");
}
