//! Stream proxy CLI
//!
//! The main binary provides both the HTTP server and a one-shot resolve mode
//! through a unified command-line interface using subcommands.
//!
//! # Usage
//!
//! ## Server Mode
//! ```bash
//! stream-proxy server --port 8888 --host 0.0.0.0
//! ```
//!
//! ## Resolve Mode
//! ```bash
//! stream-proxy --id 550 --verbose
//! ```

use clap::{Parser, Subcommand};

use stream_proxy::cli::{
    resolve::{ResolveArgs, run_resolve_mode},
    server::{ServerArgs, run_server_mode},
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "stream-proxy")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    // Resolve mode options (when no subcommand is provided)
    /// Content id to resolve once and print as JSON
    #[arg(short, long, value_name = "CONTENT_ID", allow_hyphen_values = true)]
    id: Option<String>,

    /// Configuration file path
    #[arg(long)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP server mode
    Server {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Externally visible base URL for rewritten manifests
        #[arg(long)]
        public_url: Option<String>,

        /// Configuration file path
        #[arg(long)]
        config: Option<String>,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Server {
            port,
            host,
            public_url,
            config,
            verbose,
        }) => {
            let args = ServerArgs {
                port,
                host,
                public_url,
                config,
                verbose,
            };
            run_server_mode(args).await
        }
        None => {
            let Some(id) = cli.id else {
                anyhow::bail!("Either --id <CONTENT_ID> or the `server` subcommand is required");
            };
            let args = ResolveArgs {
                id,
                config: cli.config,
                verbose: cli.verbose,
            };
            run_resolve_mode(args).await
        }
    }
}
