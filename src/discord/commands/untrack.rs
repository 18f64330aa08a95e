use poise::serenity_prelude as serenity;
use tracing::{info, instrument};

use crate::discord::bot::Context;
use crate::error::AppError;

/// Stop posting your matches in this server
#[poise::command(slash_command, guild_only)]
#[instrument(skip(ctx), fields(guild_id, user_id = %ctx.author().id))]
pub async fn untrack(ctx: Context<'_>) -> Result<(), AppError> {
    let guild_id = ctx
        .guild_id()
        .ok_or(AppError::Config("Must be used in a guild".into()))?;
    tracing::Span::current().record("guild_id", guild_id.get());

    let user_id = ctx.author().id;
    let account = ctx.data().accounts.get(user_id).await;

    if !ctx
        .data()
        .accounts
        .remove_from_guild(user_id, guild_id)
        .await?
    {
        return Err(AppError::NotTracked);
    }

    let riot_id = account
        .map(|a| a.riot_id())
        .unwrap_or_else(|| "your account".to_string());

    let embed = serenity::CreateEmbed::new()
        .title("Player Untracked")
        .description(format!("Stopped tracking **{}** in this server", riot_id))
        .color(0xff6600);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;

    info!("Player untracked successfully");

    Ok(())
}
