use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mnemos::config::MnemosConfig;
use mnemos::engine::MemoryEngine;
use mnemos::memory::snapshot::Snapshot;
use mnemos::memory::types::{LinkType, TrajectoryOutcome};

#[derive(Parser)]
#[command(name = "mnemos", version, about = "Self-learning semantic memory for AI agents")]
struct Cli {
    /// Config file path (default: ~/.mnemos/config.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Namespace override for this invocation
    #[arg(long, short = 'n', global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a new pattern
    Store {
        /// Short human-readable title
        #[arg(long)]
        title: String,
        /// Pattern body; this is what gets embedded
        content: String,
        /// Optional domain tag (e.g. "rust", "sql")
        #[arg(long)]
        domain: Option<String>,
    },
    /// Retrieve the patterns most relevant to a query
    Query {
        text: String,
        /// Number of results
        #[arg(long, short)]
        k: Option<usize>,
        /// Exclude patterns below this confidence (default from config)
        #[arg(long)]
        min_confidence: Option<f64>,
    },
    /// Report a success or failure outcome for a pattern
    Outcome {
        pattern_id: String,
        /// "success" or "failure"
        outcome: String,
    },
    /// Link two patterns with a typed edge
    Link {
        source_id: String,
        target_id: String,
        /// causes | requires | conflicts | enhances | alternative
        link_type: String,
        #[arg(long, default_value_t = 0.5)]
        strength: f64,
    },
    /// Show all edges touching a pattern
    Links { pattern_id: String },
    /// Show a pattern by id
    Show { pattern_id: String },
    /// Delete a pattern and its edges
    Delete { pattern_id: String },
    /// Manage task trajectories
    Trajectory {
        #[command(subcommand)]
        action: TrajectoryAction,
    },
    /// Export the store (or one namespace via -n) as JSON to stdout or a file
    Export {
        #[arg(long)]
        out: Option<String>,
    },
    /// Import a JSON snapshot, skipping ids that already exist
    Import { path: String },
    /// Prune weak patterns and merge near-duplicates
    Consolidate {
        /// Prune below this confidence for this pass (default from config)
        #[arg(long)]
        floor: Option<f64>,
    },
    /// Namespace statistics
    Stats,
    /// List all namespaces
    Namespaces,
}

#[derive(Subcommand)]
enum TrajectoryAction {
    /// Open a new trajectory
    Start { task_id: String },
    /// Append a step to an open trajectory
    Step { task_id: String, content: String },
    /// Seal a trajectory with "success" or "failure"
    End { task_id: String, outcome: String },
    /// Show a trajectory with its steps
    Show { task_id: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MnemosConfig::load_from(path)?,
        None => MnemosConfig::load()?,
    };

    // Log to stderr so stdout stays clean JSON.
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let engine = MemoryEngine::open(config)?;
    let namespace = cli.namespace.as_deref();

    match cli.command {
        Command::Store {
            title,
            content,
            domain,
        } => {
            let pattern = engine.store(namespace, &title, &content, domain.as_deref())?;
            print_json(&pattern)?;
        }
        Command::Query {
            text,
            k,
            min_confidence,
        } => {
            let hits = engine.query(&text, namespace, k, min_confidence)?;
            print_json(&hits)?;
        }
        Command::Outcome {
            pattern_id,
            outcome,
        } => {
            let success = parse_outcome_flag(&outcome)?;
            let confidence = engine.report_outcome(&pattern_id, success)?;
            print_json(&serde_json::json!({
                "pattern_id": pattern_id,
                "confidence": confidence,
            }))?;
        }
        Command::Link {
            source_id,
            target_id,
            link_type,
            strength,
        } => {
            let link_type: LinkType = link_type
                .parse()
                .map_err(|_| anyhow::anyhow!("unknown link type: {link_type}"))?;
            let result = engine.link(&source_id, &target_id, link_type, strength)?;
            print_json(&result)?;
        }
        Command::Links { pattern_id } => {
            let links = engine.links_of(&pattern_id)?;
            print_json(&links)?;
        }
        Command::Show { pattern_id } => {
            let pattern = engine.get(&pattern_id)?;
            print_json(&pattern)?;
        }
        Command::Delete { pattern_id } => {
            engine.delete(&pattern_id)?;
            print_json(&serde_json::json!({"deleted": pattern_id}))?;
        }
        Command::Trajectory { action } => match action {
            TrajectoryAction::Start { task_id } => {
                engine.trajectory_start(&task_id)?;
                print_json(&serde_json::json!({"task_id": task_id, "outcome": "open"}))?;
            }
            TrajectoryAction::Step { task_id, content } => {
                let seq = engine.trajectory_step(&task_id, &content)?;
                print_json(&serde_json::json!({"task_id": task_id, "seq": seq}))?;
            }
            TrajectoryAction::End { task_id, outcome } => {
                let outcome: TrajectoryOutcome = outcome
                    .parse()
                    .map_err(|_| anyhow::anyhow!("outcome must be success or failure"))?;
                let confidence = engine.trajectory_end(&task_id, outcome)?;
                print_json(&serde_json::json!({
                    "task_id": task_id,
                    "confidence": confidence,
                }))?;
            }
            TrajectoryAction::Show { task_id } => {
                let trajectory = engine.trajectory_get(&task_id)?;
                print_json(&trajectory)?;
            }
        },
        Command::Export { out } => {
            let snapshot = engine.export(namespace)?;
            let json = serde_json::to_string_pretty(&snapshot)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json).with_context(|| format!("writing {path}"))?;
                    eprintln!("exported to {path}");
                }
                None => println!("{json}"),
            }
        }
        Command::Import { path } => {
            let json =
                std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            let snapshot: Snapshot = serde_json::from_str(&json)
                .with_context(|| format!("parsing snapshot {path}"))?;
            let result = engine.import(&snapshot)?;
            print_json(&result)?;
        }
        Command::Consolidate { floor } => {
            let result = engine.consolidate(namespace, floor)?;
            print_json(&result)?;
        }
        Command::Stats => {
            let stats = engine.stats(namespace)?;
            print_json(&stats)?;
        }
        Command::Namespaces => {
            let namespaces = engine.namespaces()?;
            print_json(&namespaces)?;
        }
    }

    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_outcome_flag(raw: &str) -> Result<bool> {
    match raw {
        "success" => Ok(true),
        "failure" => Ok(false),
        other => anyhow::bail!("outcome must be success or failure, got {other}"),
    }
}
