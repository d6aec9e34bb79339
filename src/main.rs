use clap::Parser;
use lsp_facilitator::cli::{commands::Cli, run_cli};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Logs go to stderr so the chat REPL keeps stdout to itself.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lsp_facilitator=info,warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run_cli(cli.command, cli.config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
