use poise::serenity_prelude as serenity;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::discord::bot::Context;
use crate::error::AppError;
use crate::registry::{Registration, TrackedAccount};
use crate::riot::{GameMode, Platform, RiotGateway};

/// Link your Riot account to this server
#[poise::command(slash_command, guild_only)]
#[instrument(
    skip(ctx),
    fields(
        guild_id,
        user_id = %ctx.author().id,
        riot_id = %format!("{}#{}", game_name, tag_line),
        region = %region
    )
)]
pub async fn track(
    ctx: Context<'_>,
    #[description = "Game name (before the #)"] game_name: String,
    #[description = "Tag line (after the #)"] tag_line: String,
    #[description = "Server region"] region: Platform,
) -> Result<(), AppError> {
    let guild_id = ctx
        .guild_id()
        .ok_or(AppError::Config("Must be used in a guild".into()))?;
    let user_id = ctx.author().id;

    tracing::Span::current().record("guild_id", guild_id.get());

    // Defer response since API calls might take a moment
    ctx.defer().await?;

    let data = ctx.data();
    let mut account =
        resolve_account(&data.riot, region, &game_name, &tag_line, &data.cancel).await?;

    // Watermarks of an account already linked by this user are kept as is.
    let relinking = data
        .accounts
        .get(user_id)
        .await
        .is_some_and(|existing| existing.puuid == account.puuid);
    if !relinking {
        account = seed_watermarks(&data.riot, account, &data.cancel).await?;
    }

    let riot_id = account.riot_id();
    let outcome = data.accounts.register(user_id, account, guild_id).await?;

    let description = match &outcome {
        Registration::Created => format!(
            "Now tracking **{}** on **{}**",
            riot_id,
            region.display_name()
        ),
        Registration::GuildAdded => format!("**{}** is now also tracked in this server", riot_id),
        Registration::AlreadyRegistered => {
            ctx.say(format!(
                "**{}** is already being tracked in this server.",
                riot_id
            ))
            .await?;
            return Ok(());
        }
        Registration::Replaced { previous } => format!(
            "Now tracking **{}** instead of **{}**",
            riot_id,
            previous.riot_id()
        ),
    };

    let embed = serenity::CreateEmbed::new()
        .title("Player Tracked")
        .description(description)
        .color(0x00ff00)
        .field("Region", region.to_string(), true);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;

    info!(outcome = ?outcome, "Player tracked successfully");

    Ok(())
}

/// Looks the Riot id up and returns the account under its canonical spelling.
pub(crate) async fn resolve_account(
    riot: &RiotGateway,
    platform: Platform,
    game_name: &str,
    tag_line: &str,
    cancel: &CancellationToken,
) -> Result<TrackedAccount, AppError> {
    let dto = riot
        .get_account_by_riot_id(platform.to_region(), game_name, tag_line, cancel)
        .await?
        .ok_or_else(|| AppError::PlayerNotFound {
            game_name: game_name.to_string(),
            tag_line: tag_line.to_string(),
        })?;

    Ok(TrackedAccount::new(
        dto.puuid,
        dto.game_name.unwrap_or_else(|| game_name.to_string()),
        dto.tag_line.unwrap_or_else(|| tag_line.to_string()),
        platform,
    ))
}

/// Sets every watermark to the latest known match so past games are never
/// alerted. An account without games keeps an empty watermark.
pub(crate) async fn seed_watermarks(
    riot: &RiotGateway,
    mut account: TrackedAccount,
    cancel: &CancellationToken,
) -> Result<TrackedAccount, AppError> {
    for mode in GameMode::ALL {
        let latest = riot
            .get_last_match_id(mode, account.platform, &account.puuid, cancel)
            .await?;
        debug!(%mode, latest = ?latest, "Seeded watermark");
        account.set_watermark(mode, latest);
    }

    Ok(account)
}
