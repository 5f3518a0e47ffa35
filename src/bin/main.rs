//! starkeys CLI - Resolve surrogate keys for dimension and fact batches
//!
//! Usage:
//!   starkeys dimension --table <name> --input <batch.json> [--db <file>] [--bk-columns a,b]
//!   starkeys fact --table <name> --input <batch.json> --dimension <name>... [--allow-missing]
//!
//! Examples:
//!   starkeys dimension --db warehouse.db --table customer --input customers.json --bk-columns email
//!   starkeys dimension --db warehouse.db --table customer --input customers.json --new-only
//!   starkeys fact --db warehouse.db --table sales --input sales.json -d customer -d product

use clap::{Parser, Subcommand};
use starkeys::prelude::*;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "starkeys")]
#[command(about = "starkeys - Surrogate key resolution for star-schema dimensions and facts")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to STARKEYS_CONFIG, ./starkeys.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite key store (overrides [store] path from settings)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a dimension batch, assigning keys to new business keys
    Dimension {
        /// Dimension table name
        #[arg(short, long)]
        table: String,

        /// Path to the batch JSON ({"columns": [...], "rows": [[...]]})
        #[arg(short, long)]
        input: PathBuf,

        /// Build the business key from these source columns first
        #[arg(long, value_delimiter = ',')]
        bk_columns: Vec<String>,

        /// Business key column (defaults to bk_<table>)
        #[arg(long)]
        bk_column: Option<String>,

        /// Surrogate key column (defaults to key_<table>)
        #[arg(long)]
        pk_column: Option<String>,

        /// SQL condition narrowing the persisted key pairs
        #[arg(long)]
        filter: Option<String>,

        /// Print only the rows that need inserting
        #[arg(long)]
        new_only: bool,
    },

    /// Replace a fact batch's dimension business keys with surrogate keys
    Fact {
        /// Fact table name
        #[arg(short, long)]
        table: String,

        /// Path to the batch JSON
        #[arg(short, long)]
        input: PathBuf,

        /// Dimensions to resolve, in order (bk_<name> -> key_<name>)
        #[arg(short, long = "dimension", required = true)]
        dimensions: Vec<String>,

        /// Write the sentinel key instead of failing on unknown references
        #[arg(long)]
        allow_missing: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&settings);

    let result = match cli.command {
        Commands::Dimension {
            table,
            input,
            bk_columns,
            bk_column,
            pk_column,
            filter,
            new_only,
        } => cmd_dimension(
            &settings,
            cli.db,
            DimensionArgs {
                table,
                input,
                bk_columns,
                bk_column,
                pk_column,
                filter,
                new_only,
            },
        ),
        Commands::Fact {
            table,
            input,
            dimensions,
            allow_missing,
        } => cmd_fact(&settings, cli.db, table, input, dimensions, allow_missing),
    };

    match result {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings, Box<dyn Error>> {
    let settings = match path {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load()?,
    };
    Ok(settings)
}

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(settings: &Settings, db: Option<PathBuf>) -> Result<SqliteKeyStore, Box<dyn Error>> {
    let path = match db {
        Some(path) => path,
        None => settings
            .store
            .resolved_path()?
            .ok_or("no key store given; pass --db or set [store] path in settings")?,
    };
    Ok(SqliteKeyStore::open(path)?)
}

fn read_batch(path: &Path) -> Result<RecordBatch, Box<dyn Error>> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Error reading file '{}': {}", path.display(), e))?;
    Ok(serde_json::from_str(&content)?)
}

struct DimensionArgs {
    table: String,
    input: PathBuf,
    bk_columns: Vec<String>,
    bk_column: Option<String>,
    pk_column: Option<String>,
    filter: Option<String>,
    new_only: bool,
}

fn cmd_dimension(
    settings: &Settings,
    db: Option<PathBuf>,
    args: DimensionArgs,
) -> Result<String, Box<dyn Error>> {
    let store = open_store(settings, db)?;
    let mut batch = read_batch(&args.input)?;
    let config = settings.keys.clone();

    let bk_column = args
        .bk_column
        .unwrap_or_else(|| config.bk_column_for(&args.table));
    if !args.bk_columns.is_empty() {
        BusinessKeyBuilder::with_config(&args.bk_columns, &config).attach(&mut batch, &bk_column)?;
    }

    let mut options = DimensionOptions::default()
        .config(config)
        .bk_column(bk_column);
    if let Some(pk) = args.pk_column {
        options = options.pk_column(pk);
    }
    if let Some(filter) = args.filter {
        options = options.filter(filter);
    }

    let mut dim = DimensionKeyAssigner::with_options(&args.table, &batch, &store, options)?;
    dim.process()?;
    let output = if args.new_only {
        dim.new_rows()?
    } else {
        dim.into_batch()?
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

fn cmd_fact(
    settings: &Settings,
    db: Option<PathBuf>,
    table: String,
    input: PathBuf,
    dimensions: Vec<String>,
    allow_missing: bool,
) -> Result<String, Box<dyn Error>> {
    let store = open_store(settings, db)?;
    let batch = read_batch(&input)?;

    let mut fact = FactKeyMapper::new(table, &batch, &store)
        .with_config(settings.keys.clone())
        .fail_on_missing(!allow_missing);
    fact.register_all(&dimensions);

    let output = fact.into_batch()?;
    Ok(serde_json::to_string_pretty(&output)?)
}
