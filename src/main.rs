use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use noorm::codegen::{generate, TypeScriptGenerator};
use noorm::commit::commit;
use noorm::config::resolve::resolve;
use noorm::config::{write_scaffold, NoormConfig, Settings, DEFAULT_CONFIG_PATH};
use noorm::introspect::SchemaFilter;
use noorm::report::{Reporter, TracingReporter};
use noorm::schema::SchemaMetadata;

#[derive(Parser, Debug)]
#[command(name = "noorm")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a starter configuration file
    Init {
        /// Where to write the configuration
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config_path: PathBuf,

        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Introspect the database and generate TypeScript modules
    Generate {
        /// Configuration file (optional, defaults apply when missing)
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config_path: PathBuf,

        /// Path to .env file for connection config
        #[arg(long, default_value = "./.env")]
        env_file: PathBuf,

        /// Comma-separated list of schemas to include (default: all)
        #[arg(long, value_delimiter = ',')]
        schemas: Option<Vec<String>>,

        /// Comma-separated list of schemas to exclude
        #[arg(long, value_delimiter = ',')]
        exclude_schemas: Option<Vec<String>>,
    },
}

fn main() {
    if let Err(e) = run() {
        TracingReporter.error(e.as_ref());
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    info!("noorm v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Init { config_path, force } => {
            write_scaffold(&config_path, force)
                .with_context(|| format!("Failed to write {}", config_path.display()))?;
            info!(path = ?config_path, "Configuration written");
            Ok(())
        }
        Command::Generate {
            config_path,
            env_file,
            schemas,
            exclude_schemas,
        } => run_generate(
            &config_path,
            &env_file,
            SchemaFilter {
                include: schemas,
                exclude: exclude_schemas,
            },
        ),
    }
}

fn run_generate(config_path: &Path, env_file: &Path, filter: SchemaFilter) -> Result<()> {
    let config = if config_path.exists() {
        NoormConfig::load(config_path).context("Failed to load configuration")?
    } else {
        debug!(path = ?config_path, "No configuration file, using defaults");
        NoormConfig::default()
    };

    let settings = Settings::load(&config, env_file).context("Failed to load settings")?;

    if filter.include.is_some() || filter.exclude.is_some() {
        debug!(filter = ?filter, "Schema filter configured");
    }

    let metadata = introspect_postgres(&settings, &filter)?;

    if metadata.schemas.is_empty() {
        warn!("No schemas found after filtering");
    }

    for schema in &metadata.schemas {
        debug!(
            schema = ?schema.name,
            tables = ?schema.tables.len(),
            enums = ?schema.enums.len(),
            "Schema"
        );
    }

    let reporter = TracingReporter;
    let resolved = resolve(config.database_schema_config.as_ref(), &metadata, &reporter)
        .context("Invalid database_schema_config")?;

    let generator = TypeScriptGenerator::new();
    let summary = commit(&settings.output_directory, |staging| {
        for file in generate(&metadata, &resolved, &generator, &reporter)? {
            staging.write(&file.path, &file.contents)?;
        }
        Ok(())
    })
    .with_context(|| {
        format!(
            "Failed to generate into {}",
            settings.output_directory.display()
        )
    })?;

    info!(
        output = ?summary.target,
        files = ?summary.files.len(),
        replaced = ?summary.replaced,
        "Generation finished"
    );

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

#[cfg(feature = "postgres")]
fn introspect_postgres(settings: &Settings, filter: &SchemaFilter) -> Result<SchemaMetadata> {
    use noorm::introspect::Introspector;
    use noorm::PostgresIntrospector;
    use postgres::NoTls;

    info!(connection = ?settings.redacted_connection_string(), "Connecting to PostgreSQL");

    let mut client = postgres::Client::connect(&settings.connection_string, NoTls)
        .with_context(|| {
            format!(
                "Failed to connect to PostgreSQL at {}",
                settings.redacted_connection_string()
            )
        })?;

    info!("Connected to database");

    let mut introspector = PostgresIntrospector::new(&mut client);
    let metadata = introspector
        .introspect(filter)
        .context("Failed to introspect database")?;

    Ok(metadata)
}

#[cfg(not(feature = "postgres"))]
fn introspect_postgres(_settings: &Settings, _filter: &SchemaFilter) -> Result<SchemaMetadata> {
    bail!("PostgreSQL support not enabled. Rebuild with --features postgres")
}
