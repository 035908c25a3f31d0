use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use cirrus::ResourceKind;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "cirrus")]
#[command(about = "Cirrus - export and import storage account snapshots")]
#[command(version)]
struct Cli {
    /// Environment (storage account) to talk to
    #[arg(short, long, default_value = "development", env = "CIRRUS_ENV")]
    env: String,

    /// Migration profile name
    #[arg(short, long, default_value = "myconfig")]
    config: String,

    /// Directory holding `<profile>.toml` files
    #[arg(long, default_value = "./config")]
    config_dir: PathBuf,

    /// Environments file
    #[arg(long, default_value = "./environments.yaml")]
    environments: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy remote resources into the local snapshot
    Export {
        #[arg(value_enum)]
        target: Target,
    },

    /// Restore the local snapshot into the remote account
    Import {
        #[arg(value_enum)]
        target: Target,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Target {
    Tables,
    Blobs,
    Queues,
    All,
}

impl Target {
    fn kinds(self) -> Vec<ResourceKind> {
        match self {
            Target::Tables => vec![ResourceKind::Tables],
            Target::Blobs => vec![ResourceKind::Blobs],
            Target::Queues => vec![ResourceKind::Queues],
            Target::All => ResourceKind::ALL.to_vec(),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Pretty,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,cirrus=debug".into()),
    );

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let ctx = commands::RunContext::load(
        &cli.config_dir,
        &cli.config,
        &cli.environments,
        &cli.env,
    )?;

    match cli.command {
        Commands::Export { target } => commands::run_export(&ctx, &target.kinds()).await,
        Commands::Import { target } => commands::run_import(&ctx, &target.kinds()).await,
    }
}
