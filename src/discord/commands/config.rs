use poise::serenity_prelude::{self as serenity, Mentionable};
use tracing::{info, instrument};

use crate::discord::bot::Context;
use crate::error::AppError;

/// Configure match alerts for this server
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    subcommands("channel", "show")
)]
pub async fn config(_ctx: Context<'_>) -> Result<(), AppError> {
    Ok(())
}

/// Set the channel where match results are posted
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
#[instrument(
    skip(ctx),
    fields(
        guild_id,
        user_id = %ctx.author().id,
        channel_id = %channel.id
    )
)]
pub async fn channel(
    ctx: Context<'_>,
    #[description = "Channel for match alerts"]
    #[channel_types("Text")]
    channel: serenity::GuildChannel,
) -> Result<(), AppError> {
    let guild_id = ctx
        .guild_id()
        .ok_or(AppError::Config("Must be used in a guild".into()))?;
    tracing::Span::current().record("guild_id", guild_id.get());

    ctx.data()
        .guilds
        .set_alert_channel(guild_id, channel.id)
        .await?;

    let embed = serenity::CreateEmbed::new()
        .title("Alert Channel Updated")
        .description(format!(
            "Match results will now be posted in {}",
            channel.mention()
        ))
        .color(0x00ff00);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;

    info!("Alert channel configured");

    Ok(())
}

/// Show where match results are posted
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn show(ctx: Context<'_>) -> Result<(), AppError> {
    let guild_id = ctx
        .guild_id()
        .ok_or(AppError::Config("Must be used in a guild".into()))?;

    let data = ctx.data();
    let tracked = data.accounts.accounts_in_guild(guild_id).await.len();
    let channel = match data.guilds.alert_channel(guild_id).await {
        Some(channel) => channel.mention().to_string(),
        None => "not set, use `/config channel`".to_string(),
    };

    let embed = serenity::CreateEmbed::new()
        .title("Server Configuration")
        .field("Alert channel", channel, false)
        .field("Tracked players", tracked.to_string(), true)
        .color(0x0099ff);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;

    Ok(())
}
