use anyhow::Result;
use attestor::{Cli, Commands, Config, app};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { offline, port } => app::run(config, offline, port).await,
        Commands::CreateTask {
            contents,
            score_difference,
        } => app::create_task(config, &contents, score_difference).await,
    }
}
