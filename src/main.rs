use clap::{Parser, Subcommand};
use log::info;
use statsink::cluster::directory::NodeDirectory;
use statsink::config::{Config, ConfigError};
use statsink::sql::mysql::MySqlConnector;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "statsink")]
#[command(about = "Batched metrics write path into distributed SQL clusters")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover and print the cluster's current writable nodes
    Nodes {
        /// Path to configuration file
        #[arg(short, long, default_value = "config/statsink.toml")]
        config: PathBuf,
    },
    /// Generate an example configuration file
    Config {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Validate configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Nodes { config } => {
            show_nodes(config).await?;
        }
        Commands::Config { output } => {
            generate_config(output)?;
        }
        Commands::Validate { config } => {
            validate_config(config)?;
        }
        Commands::Version => {
            show_version();
        }
    }

    Ok(())
}

async fn show_nodes(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_from_file(&config_path)
        .map_err(|e| format!("Failed to load config from {:?}: {}", config_path, e))?;

    init_logging(&config);

    let coordinator = config.coordinator();
    info!("querying coordinator {}", coordinator.endpoint());

    let directory = NodeDirectory::new(MySqlConnector::new(), coordinator);
    directory.refresh_direct().await?;

    let nodes = directory.nodes().await;
    println!("{} writable node(s):", nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        println!("  {}: {}", i + 1, node.endpoint());
    }

    Ok(())
}

fn generate_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    println!("Generating configuration file: {:?}", output);

    Config::create_example_config(&output)
        .map_err(|e| format!("Failed to generate config: {}", e))?;

    println!("Configuration file generated successfully!");
    println!("Edit the file to match your cluster and run:");
    println!("  statsink nodes --config {:?}", output);

    Ok(())
}

fn validate_config(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration file: {:?}", config_path);

    match Config::load_from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration file is valid");
            println!("  Coordinator: {}", config.coordinator().endpoint());
            println!("  Database: {}", config.cluster.database);
            println!("  Max connections: {}", config.pool.max_connections);
            println!(
                "  Batch sizes: {} dimension rows, {} fact rows",
                config.writer.dimension_batch, config.writer.fact_batch
            );
        }
        Err(e) => {
            eprintln!("✗ Configuration file validation failed:");
            match &e {
                ConfigError::IoError(msg) => eprintln!("  File error: {}", msg),
                ConfigError::ParseError(msg) => eprintln!("  Parse error: {}", msg),
                ConfigError::ValidationError(msg) => eprintln!("  Validation error: {}", msg),
                ConfigError::SerializeError(msg) => eprintln!("  Serialization error: {}", msg),
            }
            return Err(Box::new(e));
        }
    }

    Ok(())
}

fn show_version() {
    println!("statsink v{}", env!("CARGO_PKG_VERSION"));
    println!("Batched metrics write path into distributed SQL clusters");
    println!();
    println!("Features:");
    println!("  • Node discovery through a coordinator with automatic refresh");
    println!("  • Bounded connection pool with random-node failover");
    println!("  • Batched fact inserts with content-addressed dimension dedup");
}

fn init_logging(config: &Config) {
    let log_level = match config.logging.level.as_str() {
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();
}
