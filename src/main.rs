use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feedmill::app::AppContext;
use feedmill::cli::{commands, Cli, Commands};
use feedmill::config::Config;
use feedmill::store::ItemQuery;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(workers) = cli.workers {
        config.fetch.workers = workers;
    }

    let ctx = AppContext::new(config)?;

    match cli.command {
        Commands::Update { user, feed } => {
            commands::update_feeds(&ctx, user, feed).await?;
        }
        Commands::Fetch { feed_id } => {
            commands::fetch_feed(&ctx, feed_id).await?;
        }
        Commands::Subscribe { url, user, folder } => {
            commands::subscribe(&ctx, &user, &url, folder).await?;
        }
        Commands::Folder { name, user, parent } => {
            commands::create_folder(&ctx, &user, &name, parent)?;
        }
        Commands::Feeds { user } => {
            commands::list_feeds(&ctx, &user)?;
        }
        Commands::Items {
            user,
            feed,
            all,
            starred,
            limit,
        } => {
            let query = ItemQuery {
                user_id: user,
                feed_id: feed,
                show_all: all,
                starred_only: starred,
                limit: Some(limit),
                ..Default::default()
            };
            commands::list_items(&ctx, &query)?;
        }
        Commands::Daemon {
            interval,
            no_initial_update,
        } => {
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "cannot listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            };
            commands::run_daemon(&ctx, &interval, no_initial_update, shutdown).await?;
        }
    }

    Ok(())
}
