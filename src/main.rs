//! Binary entry point: CLI surface (`clap::Parser`, as the teacher's
//! coordinator binaries use) plus local-operator subcommands that stand in
//! for the out-of-scope HTTP/admin surface (SPEC_FULL.md §5).

use clap::{Parser, Subcommand};
use endpoint_monitor::{Services, StartupConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "endpoint-monitor", version, about = "Distributed endpoint-availability monitor")]
struct Cli {
    /// Path to the sqlite database file.
    #[arg(long)]
    db_path: Option<String>,

    /// Port the sync server listens on when running as primary.
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the monitor (default if no subcommand is given).
    Run,
    /// Print current role and instance identity, then exit.
    Status,
    /// Print the most recent application log entries, then exit.
    Logs {
        #[arg(long, default_value_t = endpoint_monitor::logger::DEFAULT_RECENT_LIMIT)]
        n: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = StartupConfig::from_env();
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let (store, logger) = Services::connect(&config.db_path).await?;
    init_tracing(logger.clone());

    let services = Services::bootstrap(config, store, logger).await?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            services.run().await?;
            tokio::signal::ctrl_c().await?;
        }
        Command::Status => {
            let role = services.role.role().await;
            println!("instance_id: {}", services.instance_id);
            println!("role: {:?}", role);
        }
        Command::Logs { n } => {
            for row in services.logger.recent(n).await? {
                println!("[{}] {} {} {}", row.timestamp, row.level, row.component, row.message);
            }
        }
    }

    Ok(())
}

fn init_tracing(logger: std::sync::Arc<endpoint_monitor::logger::Logger>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let persist = endpoint_monitor::logger::PersistLayer::new(logger, tokio::runtime::Handle::current());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(persist)
        .init();
}
