use std::sync::Arc;

use poise::serenity_prelude as serenity;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use riftwatch::config::Config;
use riftwatch::discord::{Data, create_framework};
use riftwatch::error::AppError;
use riftwatch::logging;
use riftwatch::registry::{AccountRegistry, GuildConfigRegistry};
use riftwatch::riot::RiotGateway;

#[tokio::main]
async fn main() {
    logging::init();

    if let Err(e) = run().await {
        error!(error = %e, "🐙 ❌ Fatal error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let config = Config::from_env()?;

    info!(
        data_dir = %config.data_dir.display(),
        polling_interval_secs = config.polling_interval_secs,
        track_tft = config.track_tft,
        "🐙 Starting riftwatch"
    );

    let accounts = Arc::new(AccountRegistry::open(config.accounts_path()).await);
    let guilds = Arc::new(GuildConfigRegistry::open(config.guilds_path()).await);
    let riot = Arc::new(RiotGateway::new(
        config.riot_api_key.clone(),
        config.gateway_config(),
    ));

    let cancel = CancellationToken::new();
    tokio::spawn(riot.metrics().log_loop(cancel.clone()));

    let framework = create_framework(
        Data {
            accounts,
            guilds,
            riot,
            cancel: cancel.clone(),
        },
        config.poller_config(),
    );

    let intents = serenity::GatewayIntents::non_privileged();
    let mut client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("🐙 Shutdown requested");
        cancel.cancel();
        shard_manager.shutdown_all().await;
    });

    client.start().await?;

    info!("🐙 Stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "🐙 ❌ Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "🐙 ❌ Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
