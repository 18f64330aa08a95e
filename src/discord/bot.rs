use std::sync::Arc;

use poise::serenity_prelude as serenity;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::alert::{AlertDispatcher, SvgRenderer};
use crate::error::AppError;
use crate::poller::{PollerConfig, ResultPoller};
use crate::registry::{AccountRegistry, GuildConfigRegistry};
use crate::riot::RiotGateway;

use super::commands;
use super::transport::DiscordTransport;

/// Shared data accessible in all commands
#[derive(Debug)]
pub struct Data {
    pub accounts: Arc<AccountRegistry>,
    pub guilds: Arc<GuildConfigRegistry>,
    pub riot: Arc<RiotGateway>,
    pub cancel: CancellationToken,
}

pub type Context<'a> = poise::Context<'a, Data, AppError>;

pub fn create_framework(data: Data, poller: PollerConfig) -> poise::Framework<Data, AppError> {
    poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::track(),
                commands::untrack(),
                commands::list(),
                commands::config(),
            ],
            on_error: |error| {
                Box::pin(async move {
                    handle_error(error).await;
                })
            },
            event_handler: |ctx, event, _framework, data| {
                Box::pin(async move { handle_event(ctx, event, data).await })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                info!(
                    bot_name = %ready.user.name,
                    guild_count = ready.guilds.len(),
                    "🎮 Bot is ready"
                );

                // Alerts need a connected HTTP client, so polling starts here.
                let dispatcher = AlertDispatcher::new(
                    SvgRenderer::new(),
                    DiscordTransport::new(ctx.http.clone()),
                    data.guilds.clone(),
                );
                Arc::new(ResultPoller::new(
                    data.riot.clone(),
                    Arc::new(dispatcher),
                    data.accounts.clone(),
                    poller,
                ))
                .start(data.cancel.clone());

                Ok(data)
            })
        })
        .build()
}

async fn handle_event(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    data: &Data,
) -> Result<(), AppError> {
    if let serenity::FullEvent::GuildDelete { incomplete, .. } = event {
        // `unavailable` means a Discord outage, not a removal.
        if incomplete.unavailable {
            warn!(guild_id = %incomplete.id, "🎮 ⚠️ Guild became unavailable");
            return Ok(());
        }

        let purged = data.accounts.purge_guild(incomplete.id).await?;
        data.guilds.remove(incomplete.id).await?;
        info!(
            guild_id = %incomplete.id,
            accounts = purged,
            "🎮 Removed from guild, configuration purged"
        );
    }

    Ok(())
}

async fn handle_error(error: poise::FrameworkError<'_, Data, AppError>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            let command_name = ctx.command().name.as_str();
            error!(
                error = ?error,
                command = command_name,
                user_id = %ctx.author().id,
                "🎮 ❌ Command execution failed"
            );
            let _ = ctx.say(format!("Error: {}", error)).await;
        }
        poise::FrameworkError::ArgumentParse { error, ctx, .. } => {
            warn!(
                error = %error,
                command = ctx.command().name.as_str(),
                "🎮 ⚠️ Invalid command argument"
            );
            let _ = ctx.say(format!("Invalid argument: {}", error)).await;
        }
        poise::FrameworkError::MissingUserPermissions {
            missing_permissions,
            ctx,
            ..
        } => {
            if let Some(perms) = missing_permissions {
                warn!(
                    permissions = %perms,
                    user_id = %ctx.author().id,
                    command = ctx.command().name.as_str(),
                    "🎮 ⚠️ User missing permissions"
                );
                let _ = ctx
                    .say(format!("You need these permissions: {}", perms))
                    .await;
            }
        }
        poise::FrameworkError::EventHandler { error, event, .. } => {
            error!(
                error = %error,
                event = event.snake_case_name(),
                "🎮 ❌ Event handler failed"
            );
        }
        other => {
            error!(error = ?other, "🎮 ❌ Unhandled framework error");
        }
    }
}
