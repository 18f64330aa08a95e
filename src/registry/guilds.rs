use std::{collections::BTreeMap, path::PathBuf};

use poise::serenity_prelude::{ChannelId, GuildId};
use tracing::info;

use super::{
    RegistryError,
    models::GuildRecord,
    store::{self, Store},
};

type Channels = BTreeMap<GuildId, ChannelId>;

fn encode(channels: &Channels) -> serde_json::Result<Vec<u8>> {
    let records: Vec<GuildRecord> = channels
        .iter()
        .map(|(guild, channel)| GuildRecord {
            guild_id: guild.get(),
            alert_channel_id: Some(channel.get()),
        })
        .collect();
    serde_json::to_vec_pretty(&records)
}

/// Alert channel configured by each guild.
#[derive(Debug)]
pub struct GuildConfigRegistry {
    store: Store<Channels>,
}

impl GuildConfigRegistry {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records: Vec<GuildRecord> = store::load(&path).await.unwrap_or_default();
        let channels: Channels = records
            .into_iter()
            .filter_map(GuildRecord::into_entry)
            .collect();

        info!(guilds = channels.len(), "📜 Guild config registry loaded");

        Self {
            store: Store::new(path, channels, encode),
        }
    }

    pub async fn set_alert_channel(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<(), RegistryError> {
        self.store
            .mutate(move |channels| {
                let previous = channels.insert(guild, channel);
                ((), previous != Some(channel))
            })
            .await
    }

    pub async fn alert_channel(&self, guild: GuildId) -> Option<ChannelId> {
        self.store.read().await.get(&guild).copied()
    }

    /// Forgets the guild configuration. Returns `false` if none was stored.
    pub async fn remove(&self, guild: GuildId) -> Result<bool, RegistryError> {
        self.store
            .mutate(move |channels| {
                let removed = channels.remove(&guild).is_some();
                (removed, removed)
            })
            .await
    }
}
