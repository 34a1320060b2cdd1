use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use marova_core::{
    AssessmentInput, DnaProfileInput, DreamCategory, DreamRequest, FeedProfile, MarovaConfig, MemoryLogInput,
    SleepCycleRequest,
};
use marova_memory::{LogNotifier, OrganismCoordinator};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod table;

const TELEMETRY_COLUMNS: &[&str] = &[
    "hunger",
    "metabolism",
    "dream_energy",
    "toxicity_level",
    "sleep_hours",
    "sleep_phase",
    "dream_debt",
];

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "marova.toml")]
    config: String,

    /// Path to the organism database (overrides the config)
    #[arg(short, long)]
    db: Option<String>,

    /// Print raw JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show organism vitals
    State {
        /// Restrict output to these fields
        #[arg(long = "field")]
        fields: Vec<String>,
    },
    /// Show recent telemetry samples
    Stats {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Restrict output to these metrics
        #[arg(long = "metric")]
        metrics: Vec<String>,
    },
    /// Feed the organism a sensory meal
    Feed {
        #[arg(long, default_value_t = 0.5)]
        intensity: f64,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        tone: f64,
        #[arg(long, default_value_t = 0.0)]
        motion: f64,
        #[arg(long, default_value_t = 1.0)]
        volume: f64,
    },
    /// Run a manual sleep cycle
    Sleep {
        #[arg(long, default_value_t = 6.0)]
        hours: f64,
        #[arg(long, default_value_t = 0.6)]
        quality: f64,
        #[arg(long)]
        abrupt: bool,
    },
    /// Attempt a dream
    Dream {
        #[arg(long)]
        force: bool,
        #[arg(long)]
        max_energy: Option<f64>,
        /// happy, neutral or nightmare
        #[arg(long)]
        category: Option<DreamCategory>,
    },
    /// Manage users
    #[command(subcommand)]
    User(UserCommand),
    /// Record a biological profile from a JSON file
    Dna {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        input: String,
    },
    /// Record a personality assessment from a JSON file
    Assess {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        input: String,
    },
    /// Memory uplinks and the token ledger
    #[command(subcommand)]
    Memory(MemoryCommand),
    /// Turn scheduled sleep on or off
    AutoSleep { toggle: Toggle },
    /// Set the nightly sleep window
    Schedule {
        /// Local hour sleep begins (0-23)
        #[arg(long)]
        hour: u32,
        #[arg(long, default_value_t = 7.0)]
        hours: f64,
    },
    /// Show where the sleep scheduler stands
    Status,
    /// List recorded dreams
    Dreams,
    /// List recent sleep cycles
    Cycles {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    Add { name: String },
    List,
}

#[derive(Subcommand, Debug)]
enum MemoryCommand {
    /// Submit a memory
    Log {
        #[arg(long)]
        user: Uuid,
        #[arg(long, allow_hyphen_values = true)]
        valence: f64,
        #[arg(long)]
        strength: f64,
        #[arg(long, default_value_t = 0.0)]
        toxicity: f64,
        /// Comma-separated embedding values
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        embedding: Vec<f64>,
        #[arg(long)]
        text: String,
    },
    List {
        #[arg(long)]
        user: Option<Uuid>,
    },
    Tokens {
        #[arg(long)]
        user: Option<Uuid>,
    },
    Summary {
        #[arg(long)]
        user: Option<Uuid>,
    },
    Spend {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        points: f64,
    },
    /// Mark a token spent or unspent
    Mark {
        #[arg(long)]
        token: Uuid,
        spent: Toggle,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn enabled(self) -> bool {
        matches!(self, Toggle::On)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let args = Args::parse();
    let mut config = MarovaConfig::load_or_default(&args.config);
    if let Some(db) = &args.db {
        config.organism.db_path = db.clone();
    }
    info!("Opening organism at {}", config.organism.db_path);

    let coordinator = OrganismCoordinator::with_sqlite(config)
        .await?
        .with_notifier(Arc::new(LogNotifier));

    run(&coordinator, args.command, args.json).await
}

async fn run(coordinator: &OrganismCoordinator, command: Command, json: bool) -> Result<()> {
    match command {
        Command::State { fields } => {
            let state = coordinator.get_state().await?;
            show_fields(&state, &fields, json)
        }
        Command::Stats { limit, metrics } => {
            let report = coordinator.get_telemetry(limit).await?;
            if json {
                return print_json(&report);
            }
            let columns = pick_columns(&metrics, TELEMETRY_COLUMNS)?;
            let mut headers = vec!["timestamp"];
            headers.extend(columns.iter().copied());
            let entries = to_values(&report.entries)?;
            println!("{}", table::render(&headers, &table::project(&entries, &headers)));
            Ok(())
        }
        Command::Feed { intensity, tone, motion, volume } => {
            let state = coordinator
                .feed(FeedProfile {
                    sensory_intensity: intensity,
                    emotional_tone: tone,
                    ambient_motion: motion,
                    data_volume: volume,
                })
                .await?;
            show_fields(&state, &[], json)
        }
        Command::Sleep { hours, quality, abrupt } => {
            let report = coordinator
                .run_sleep_cycle(SleepCycleRequest {
                    duration_hours: hours,
                    quality,
                    abrupt_wake: abrupt,
                })
                .await?;
            if json {
                return print_json(&report);
            }
            show_fields(&report.organism_state, &[], false)
        }
        Command::Dream { force, max_energy, category } => {
            let dream = coordinator
                .generate_dream(DreamRequest {
                    max_energy,
                    force,
                    preferred_category: category,
                })
                .await?;
            show_fields(&dream, &[], json)
        }
        Command::User(UserCommand::Add { name }) => {
            let user = coordinator.register_user(&name).await?;
            show_fields(&user, &[], json)
        }
        Command::User(UserCommand::List) => {
            let users = coordinator.list_users().await?;
            show_list(&users, &["id", "name", "created_at"], json)
        }
        Command::Dna { user, input } => {
            let input: DnaProfileInput = read_json(&input)?;
            let profile = coordinator.record_dna_profile(user, input).await?;
            show_fields(&profile, &[], json)
        }
        Command::Assess { user, input } => {
            let input: AssessmentInput = read_json(&input)?;
            let report = coordinator.record_assessment(user, input).await?;
            if json {
                return print_json(&report);
            }
            show_fields(&report.dna_token, &[], false)
        }
        Command::Memory(command) => run_memory(coordinator, command, json).await,
        Command::AutoSleep { toggle } => {
            let state = coordinator.set_auto_sleep(toggle.enabled()).await?;
            show_fields(&state, &["auto_sleep_enabled".into(), "sleep_phase".into()], json)
        }
        Command::Schedule { hour, hours } => {
            let state = coordinator.set_sleep_schedule(hour, hours).await?;
            let fields = ["sleep_schedule_hour", "wake_schedule_hour", "sleep_duration_hours"];
            show_fields(&state, &fields.map(String::from), json)
        }
        Command::Status => {
            let status = coordinator.scheduler_status().await?;
            println!("{}", status.as_str());
            Ok(())
        }
        Command::Dreams => {
            let dreams = coordinator.list_dreams().await?;
            show_list(
                &dreams,
                &["timestamp", "category", "outcome", "intensity", "energy_used", "memory_tokens_consumed"],
                json,
            )
        }
        Command::Cycles { limit } => {
            let cycles = coordinator.list_sleep_cycles(limit).await?;
            show_list(&cycles, &["occurred_at", "duration_hours", "quality", "abrupt_wake"], json)
        }
    }
}

async fn run_memory(coordinator: &OrganismCoordinator, command: MemoryCommand, json: bool) -> Result<()> {
    match command {
        MemoryCommand::Log { user, valence, strength, toxicity, embedding, text } => {
            let ingested = coordinator
                .record_memory_log(
                    user,
                    MemoryLogInput {
                        timestamp: None,
                        valence,
                        strength,
                        toxicity,
                        embedding,
                        text,
                    },
                )
                .await?;
            if json {
                return print_json(&ingested);
            }
            show_fields(&ingested.token, &[], false)
        }
        MemoryCommand::List { user } => {
            let logs = coordinator.list_memory_logs(user).await?;
            show_list(&logs, &["timestamp", "user_id", "valence", "strength", "toxicity", "text"], json)
        }
        MemoryCommand::Tokens { user } => {
            let tokens = coordinator.list_memory_tokens(user).await?;
            show_list(&tokens, &["id", "user_id", "amount", "spent", "created_at"], json)
        }
        MemoryCommand::Summary { user } => {
            let summary = coordinator.ledger_summary(user).await?;
            show_fields(&summary, &[], json)
        }
        MemoryCommand::Spend { user, points } => {
            let spent = coordinator.spend_memory_points(user, points).await?;
            println!("{spent}");
            Ok(())
        }
        MemoryCommand::Mark { token, spent } => {
            let token = coordinator.update_memory_token_status(token, spent.enabled()).await?;
            show_fields(&token, &[], json)
        }
    }
}

// ============================================================================
// Rendering
// ============================================================================

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn to_values<T: Serialize>(items: &[T]) -> Result<Vec<Value>> {
    items
        .iter()
        .map(|item| serde_json::to_value(item).context("Failed to serialize record"))
        .collect()
}

/// Validate requested columns against `known`; empty means all of them.
fn pick_columns<'a>(requested: &'a [String], known: &[&'a str]) -> Result<Vec<&'a str>> {
    if requested.is_empty() {
        return Ok(known.to_vec());
    }
    for name in requested {
        if !known.contains(&name.as_str()) {
            bail!("Unknown field '{}'. Available: {}", name, known.join(", "));
        }
    }
    Ok(requested.iter().map(String::as_str).collect())
}

/// One record as a two-column Field/Value table.
fn show_fields<T: Serialize>(record: &T, fields: &[String], json: bool) -> Result<()> {
    let value = serde_json::to_value(record).context("Failed to serialize record")?;
    let map = match value {
        Value::Object(map) => map,
        other => {
            println!("{}", table::stringify(&other));
            return Ok(());
        }
    };
    let known: Vec<&str> = map.keys().map(String::as_str).collect();
    let selected = pick_columns(fields, &known)?;

    if json {
        let subset: serde_json::Map<String, Value> = selected
            .iter()
            .filter_map(|k| map.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect();
        return print_json(&subset);
    }
    let rows: Vec<Vec<String>> = selected
        .iter()
        .map(|k| vec![k.to_string(), table::stringify(map.get(*k).unwrap_or(&Value::Null))])
        .collect();
    println!("{}", table::render(&["Field", "Value"], &rows));
    Ok(())
}

fn show_list<T: Serialize>(items: &[T], columns: &[&str], json: bool) -> Result<()> {
    if json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("(none)");
        return Ok(());
    }
    let values = to_values(items)?;
    println!("{}", table::render(columns, &table::project(&values, columns)));
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {path}"))
}
