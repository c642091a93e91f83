use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chantier_server::serve;

/// Chantier pipeline toolchain.
#[derive(Parser)]
#[command(name = "chantier", version, about = "Chantier pipeline server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP JSON API server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { port } => {
            if let Err(e) = serve::start_server(port).await {
                tracing::error!("server error: {e}");
                process::exit(1);
            }
        }
    }
}
