use poise::serenity_prelude::{self as serenity, Mentionable};

use crate::discord::bot::Context;
use crate::error::AppError;

/// List all tracked players in this server
#[poise::command(slash_command, guild_only)]
pub async fn list(ctx: Context<'_>) -> Result<(), AppError> {
    let guild_id = ctx
        .guild_id()
        .ok_or(AppError::Config("Must be used in a guild".into()))?;

    let accounts = ctx.data().accounts.accounts_in_guild(guild_id).await;

    if accounts.is_empty() {
        ctx.say("No players are being tracked in this server.\nUse `/track` to add players.")
            .await?;
        return Ok(());
    }

    let mut description = String::new();
    for (user, account) in &accounts {
        description.push_str(&format!(
            "- **{}** ({}) linked by {}\n",
            account.riot_id(),
            account.platform,
            user.mention()
        ));
    }

    let embed = serenity::CreateEmbed::new()
        .title(format!("Tracked Players ({})", accounts.len()))
        .description(description)
        .color(0x0099ff);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;

    Ok(())
}
