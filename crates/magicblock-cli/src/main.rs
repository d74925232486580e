use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

#[derive(Parser)]
#[command(name = "magicblock-cli", version, about = "Magic Block CLI")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Focus timer control
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Blocked domain management
    Gate {
        #[command(subcommand)]
        action: commands::gate::GateAction,
    },
    /// Question dataset management
    Dataset {
        #[command(subcommand)]
        action: commands::dataset::DatasetAction,
    },
    /// Grade the pending question
    Answer {
        #[command(subcommand)]
        action: commands::answer::AnswerAction,
    },
    /// Report a completed navigation and print whether it is intercepted
    Navigate {
        /// Navigated URL
        url: String,
        /// Frame the navigation happened in (0 = top level)
        #[arg(long, default_value_t = 0)]
        frame_id: i64,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Serve JSON requests from stdin, one per line
    Serve,
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Logs go to stderr; stdout carries JSON only.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "magicblock_core=info,magicblock_cli=info".into()),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Session { action } => commands::session::run(action).await,
        Commands::Gate { action } => commands::gate::run(action).await,
        Commands::Dataset { action } => commands::dataset::run(action).await,
        Commands::Answer { action } => commands::answer::run(action).await,
        Commands::Navigate { url, frame_id } => commands::navigate::run(url, frame_id).await,
        Commands::Config { action } => commands::config::run(action),
        Commands::Serve => commands::serve::run().await,
        Commands::Completions { shell } => commands::completions::run(shell),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
