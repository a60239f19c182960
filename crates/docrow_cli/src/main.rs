//! Command-line adapter over `docrow_core`.
//!
//! # Responsibility
//! - Parse arguments and config, open the database, dispatch one operation.
//! - Print records as pretty JSON on stdout.
//!
//! Without `--db`, `DOCROW_DB_PATH` or a configured path, the database is
//! in-memory and lives only for this invocation.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use docrow_core::{
    core_version, init_from_config, open_from_config, AppConfig, Book, Database, EntityService,
    Filter, Patch, Person, Record, TxContext,
};
use log::info;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docrow")]
#[command(about = "Document-row store over SQLite", version)]
struct Cli {
    /// JSON config file. Missing files fall back to defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Database file, overriding config and environment.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Operate on one record type.
    Record {
        #[arg(value_enum)]
        kind: Kind,
        #[command(subcommand)]
        action: Action,
    },
    /// Print version and effective configuration.
    Info,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Book,
    Person,
}

#[derive(Subcommand)]
enum Action {
    /// Create a record from a JSON object.
    Create { json: String },
    Get { id: String },
    /// List records, optionally those containing a JSON filter object.
    List {
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        count: bool,
    },
    /// Overwrite the named fields of a record.
    Patch { id: String, json: String },
    /// Replace a record. The JSON must carry its `id`.
    Update { json: String },
    /// Delete by id. Absent ids succeed with `removed: false`.
    Delete { id: String },
    /// Insert generated sample records in one transaction.
    Seed {
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;
    config
        .apply_env()
        .context("invalid environment override")?;
    if let Some(path) = cli.db {
        config.database.path = Some(path);
    }
    init_from_config(&config.log).context("failed to start logging")?;

    match cli.command {
        Command::Info => {
            println!("docrow_core version={}", core_version());
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Record { kind, action } => {
            let db = open_from_config(&config.database).context("failed to open database")?;
            match kind {
                Kind::Book => run_action(&db, action, Book::sample),
                Kind::Person => run_action(&db, action, Person::sample),
            }
        }
    }
}

fn run_action<R: Record>(db: &Database, action: Action, sample: fn(usize) -> R) -> Result<()> {
    db.register::<R>()
        .with_context(|| format!("failed to prepare table for {}", R::KIND))?;
    let service = EntityService::<R>::new(db.clone());
    let mut ctx = TxContext::new();

    match action {
        Action::Create { json } => {
            let record: R = parse(&json, "record")?;
            print_json(&service.create(&mut ctx, record)?)
        }
        Action::Get { id } => match service.get_by_id(&mut ctx, &id)? {
            Some(record) => print_json(&record),
            None => Err(anyhow!("no {} with id {}", R::KIND, id)),
        },
        Action::List { filter, count } => {
            let filter: Option<Filter> = filter
                .as_deref()
                .map(|raw| parse(raw, "filter"))
                .transpose()?;
            if count {
                println!("{}", service.count(&mut ctx, filter.as_ref())?);
                Ok(())
            } else {
                print_json(&service.list(&mut ctx, filter.as_ref())?)
            }
        }
        Action::Patch { id, json } => {
            let patch: Patch = parse(&json, "patch")?;
            print_json(&service.partial_update(&mut ctx, &id, &patch)?)
        }
        Action::Update { json } => {
            let record: R = parse(&json, "record")?;
            print_json(&service.update(&mut ctx, record)?)
        }
        Action::Delete { id } => {
            let removed = service.delete_by_id(&mut ctx, &id)?;
            println!("{}", serde_json::json!({ "id": id, "removed": removed }));
            Ok(())
        }
        Action::Seed { count } => {
            let created = service.seed(&mut ctx, (0..count).map(sample))?;
            info!(
                "event=cli_seed module=cli status=ok kind={} count={}",
                R::KIND,
                created.len()
            );
            let ids: Vec<&str> = created.iter().map(|record| record.id()).collect();
            print_json(&ids)
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(raw: &str, what: &str) -> Result<T> {
    serde_json::from_str(raw).with_context(|| format!("invalid {what} JSON"))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
