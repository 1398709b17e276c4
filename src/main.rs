use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feedrelay::app::AppContext;
use feedrelay::cli::{commands, Cli, Commands};
use feedrelay::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let ctx = AppContext::new(config)?;

    match cli.command {
        Commands::Run => {
            commands::run(&ctx).await?;
        }
        Commands::Subscribe { user, url } => {
            commands::subscribe(&ctx, user, &url).await?;
        }
        Commands::Unsubscribe { user, url } => {
            commands::unsubscribe(&ctx, user, &url)?;
        }
        Commands::List { user } => {
            commands::list(&ctx, user)?;
        }
        Commands::Tick => {
            commands::tick(&ctx).await?;
        }
    }

    Ok(())
}
