use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use log::{error, info};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

use reminder_bridge::core::{BackendChoice, Config, ReminderError};
use reminder_bridge::features::reminders::{AccessStatus, BackendKind, FilterSpec, ReminderService};

#[derive(Parser)]
#[command(name = "reminders")]
#[command(version)]
#[command(about = "List and create reminders in the system reminder store")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML config file layered over the environment
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend: auto, scripting, object-graph, event-store
    #[arg(long, global = true)]
    backend: Option<BackendChoice>,

    /// YAML fixture for the in-process store
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List reminders, optionally filtered by field equality
    List {
        #[arg(long)]
        completed: Option<String>,

        #[arg(long)]
        flagged: Option<String>,

        #[arg(long)]
        priority: Option<String>,

        /// Extra `key=value` constraint; repeatable
        #[arg(long = "filter", value_name = "KEY=VALUE")]
        filters: Vec<String>,

        /// Constraints as a JSON object, e.g. '{"completed": true}'
        #[arg(long = "where", value_name = "JSON")]
        where_json: Option<String>,
    },

    /// Create a reminder in the default list
    Create {
        name: String,
        body: Option<String>,
    },

    /// Resolve reminder access and report it
    Access,
}

#[derive(Serialize)]
struct AccessReport {
    backend: BackendKind,
    access: AccessStatus,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_env()?;
    if let Some(path) = &cli.config {
        config = config.merge_file(path)?;
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(fixture) = &cli.fixture {
        config.fixture_path = Some(fixture.clone());
    }
    config.validate()?;
    Ok(config)
}

fn build_filter(
    completed: Option<String>,
    flagged: Option<String>,
    priority: Option<String>,
    filters: &[String],
    where_json: Option<&str>,
) -> Result<Option<FilterSpec>> {
    let mut pairs = Vec::new();
    if let Some(value) = completed {
        pairs.push(("completed".to_string(), value));
    }
    if let Some(value) = flagged {
        pairs.push(("flagged".to_string(), value));
    }
    if let Some(value) = priority {
        pairs.push(("priority".to_string(), value));
    }
    for arg in filters {
        pairs.push(FilterSpec::parse_pair(arg)?);
    }

    let mut spec = FilterSpec::from_pairs(pairs)?;
    if let Some(json) = where_json {
        let value: serde_json::Value =
            serde_json::from_str(json).context("--where is not valid JSON")?;
        let extra = FilterSpec::from_json(&value)?;
        spec.completed = extra.completed.or(spec.completed);
        spec.flagged = extra.flagged.or(spec.flagged);
        spec.priority = extra.priority.or(spec.priority);
    }

    Ok((!spec.is_empty()).then_some(spec))
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}

/// Returns whether the command succeeded
async fn run(cli: Cli) -> Result<bool> {
    let config = load_config(&cli)?;
    let service = ReminderService::from_config(&config)?;
    info!("Reminders CLI using {} backend", service.backend_kind());

    match cli.command {
        Commands::List {
            completed,
            flagged,
            priority,
            filters,
            where_json,
        } => {
            let filter = build_filter(completed, flagged, priority, &filters, where_json.as_deref())?;
            let records = service.list(filter.as_ref()).await?;
            print_json(&records, cli.pretty)?;
            Ok(true)
        }
        Commands::Create { name, body } => {
            let record = service.create(&name, body.as_deref()).await?;
            print_json(&record, cli.pretty)?;
            Ok(true)
        }
        Commands::Access => {
            let granted = service.ensure_access().await;
            print_json(
                &AccessReport {
                    backend: service.backend_kind(),
                    access: service.access_status(),
                },
                cli.pretty,
            )?;
            Ok(granted)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            let kind = e
                .downcast_ref::<ReminderError>()
                .map_or("error", ReminderError::kind);
            error!("{}: {:#}", kind, e);
            eprintln!("{}: {:#}", kind, e);
            ExitCode::FAILURE
        }
    }
}
