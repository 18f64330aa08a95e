//! [`Transport`] over the serenity HTTP client.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use poise::serenity_prelude::{
    self as serenity, ChannelId, ChannelType, CreateAttachment, CreateMessage, GuildId,
};
use tracing::debug;

use crate::alert::{Transport, TransportError};

const IMAGE_NAME: &str = "match.png";

#[derive(Debug, Clone)]
pub struct DiscordTransport {
    http: Arc<serenity::Http>,
}

impl DiscordTransport {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }

    async fn say(&self, channel: ChannelId, message: &str) -> serenity::Result<()> {
        channel.say(&self.http, message).await.map(|_| ())
    }
}

fn is_not_found(err: &serenity::Error) -> bool {
    matches!(
        err,
        serenity::Error::Http(serenity::http::HttpError::UnsuccessfulRequest(res))
            if res.status_code.as_u16() == 404
    )
}

#[async_trait]
impl Transport for DiscordTransport {
    async fn channel_exists(&self, channel: ChannelId) -> Result<bool, TransportError> {
        match self.http.get_channel(channel).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn send(
        &self,
        channel: ChannelId,
        image: Bytes,
        caption: &str,
    ) -> Result<(), TransportError> {
        let message = CreateMessage::new()
            .content(caption)
            .add_file(CreateAttachment::bytes(image.to_vec(), IMAGE_NAME));

        channel.send_message(&self.http, message).await?;
        Ok(())
    }

    /// Tries the system channel, then every text channel in display order,
    /// then a DM to the owner.
    async fn notify_admin(&self, guild: GuildId, message: &str) -> Result<(), TransportError> {
        let partial = self.http.get_guild(guild).await?;

        if let Some(system) = partial.system_channel_id {
            match self.say(system, message).await {
                Ok(()) => return Ok(()),
                Err(e) => debug!(%guild, error = %e, "📣 System channel refused the notice"),
            }
        }

        let mut channels: Vec<_> = guild
            .channels(&self.http)
            .await?
            .into_values()
            .filter(|c| c.kind == ChannelType::Text)
            .collect();
        channels.sort_by_key(|c| c.position);

        for channel in channels {
            if self.say(channel.id, message).await.is_ok() {
                return Ok(());
            }
        }

        let dm = partial.owner_id.create_dm_channel(&self.http).await?;
        self.say(dm.id, message)
            .await
            .map_err(|_| TransportError::Unreachable(guild))
    }
}
