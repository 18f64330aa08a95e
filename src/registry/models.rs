use std::collections::BTreeSet;

use poise::serenity_prelude::{ChannelId, GuildId, UserId};
use serde::{Deserialize, Serialize};

use crate::riot::{GameMode, Platform};

/// A Riot account linked by a Discord user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedAccount {
    pub puuid: String,
    pub game_name: String,
    pub tag_line: String,
    pub platform: Platform,
    /// Last LoL match already notified.
    pub last_match_id: Option<String>,
    /// Last TFT match already notified.
    pub last_tft_match_id: Option<String>,
    /// Guilds receiving this account's alerts. Never empty once stored.
    pub guilds: BTreeSet<GuildId>,
}

impl TrackedAccount {
    pub fn new(
        puuid: impl Into<String>,
        game_name: impl Into<String>,
        tag_line: impl Into<String>,
        platform: Platform,
    ) -> Self {
        Self {
            puuid: puuid.into(),
            game_name: game_name.into(),
            tag_line: tag_line.into(),
            platform,
            last_match_id: None,
            last_tft_match_id: None,
            guilds: BTreeSet::new(),
        }
    }

    pub fn riot_id(&self) -> String {
        format!("{}#{}", self.game_name, self.tag_line)
    }

    pub fn watermark(&self, mode: GameMode) -> Option<&str> {
        match mode {
            GameMode::Lol => self.last_match_id.as_deref(),
            GameMode::Tft => self.last_tft_match_id.as_deref(),
        }
    }

    pub fn set_watermark(&mut self, mode: GameMode, match_id: Option<String>) {
        match mode {
            GameMode::Lol => self.last_match_id = match_id,
            GameMode::Tft => self.last_tft_match_id = match_id,
        }
    }

    /// Builder used when seeding watermarks before registration.
    pub fn with_watermark(mut self, mode: GameMode, match_id: Option<String>) -> Self {
        self.set_watermark(mode, match_id);
        self
    }
}

/// Outcome of [`AccountRegistry::register`](super::AccountRegistry::register).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Created,
    GuildAdded,
    AlreadyRegistered,
    /// The user linked a different Riot account; it replaced the previous one.
    Replaced { previous: TrackedAccount },
}

// Persisted forms. Ids are stored as plain integers; zero ids are dropped on
// load since Discord never issues them.

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccountRecord {
    pub user_id: u64,
    pub puuid: String,
    pub game_name: String,
    pub tag_line: String,
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_match_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tft_match_id: Option<String>,
    pub guilds: Vec<u64>,
}

impl AccountRecord {
    pub(crate) fn from_account(user_id: UserId, account: &TrackedAccount) -> Self {
        Self {
            user_id: user_id.get(),
            puuid: account.puuid.clone(),
            game_name: account.game_name.clone(),
            tag_line: account.tag_line.clone(),
            platform: account.platform,
            last_match_id: account.last_match_id.clone(),
            last_tft_match_id: account.last_tft_match_id.clone(),
            guilds: account.guilds.iter().map(|g| g.get()).collect(),
        }
    }

    pub(crate) fn into_account(self) -> Option<(UserId, TrackedAccount)> {
        if self.user_id == 0 {
            return None;
        }

        let guilds: BTreeSet<GuildId> = self
            .guilds
            .into_iter()
            .filter(|id| *id != 0)
            .map(GuildId::new)
            .collect();

        if guilds.is_empty() {
            return None;
        }

        Some((
            UserId::new(self.user_id),
            TrackedAccount {
                puuid: self.puuid,
                game_name: self.game_name,
                tag_line: self.tag_line,
                platform: self.platform,
                last_match_id: self.last_match_id,
                last_tft_match_id: self.last_tft_match_id,
                guilds,
            },
        ))
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GuildRecord {
    pub guild_id: u64,
    pub alert_channel_id: Option<u64>,
}

impl GuildRecord {
    pub(crate) fn into_entry(self) -> Option<(GuildId, ChannelId)> {
        match (self.guild_id, self.alert_channel_id) {
            (0, _) | (_, None) | (_, Some(0)) => None,
            (guild, Some(channel)) => Some((GuildId::new(guild), ChannelId::new(channel))),
        }
    }
}
