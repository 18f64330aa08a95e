use std::{
    collections::{BTreeMap, BTreeSet, btree_map::Entry},
    path::PathBuf,
};

use poise::serenity_prelude::{GuildId, UserId};
use tracing::{debug, info, warn};

use super::{
    RegistryError,
    models::{AccountRecord, Registration, TrackedAccount},
    store::{self, Store},
};
use crate::riot::GameMode;

type Accounts = BTreeMap<UserId, TrackedAccount>;

fn encode(accounts: &Accounts) -> serde_json::Result<Vec<u8>> {
    let records: Vec<AccountRecord> = accounts
        .iter()
        .map(|(user, account)| AccountRecord::from_account(*user, account))
        .collect();
    serde_json::to_vec_pretty(&records)
}

/// Discord user → tracked Riot account, persisted to a single JSON file.
#[derive(Debug)]
pub struct AccountRegistry {
    store: Store<Accounts>,
}

impl AccountRegistry {
    /// Loads the registry from `path`. A missing or malformed file starts an
    /// empty registry; a leftover `<file>.tmp` from an interrupted write is
    /// never read.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records: Vec<AccountRecord> = store::load(&path).await.unwrap_or_default();
        let total = records.len();

        let accounts: Accounts = records
            .into_iter()
            .filter_map(AccountRecord::into_account)
            .collect();

        if accounts.len() < total {
            warn!(
                dropped = total - accounts.len(),
                "📜 ⚠️ Skipped account records without a user or guild"
            );
        }
        if store::temp_path(&path).exists() {
            debug!(path = %path.display(), "📜 Ignoring leftover temporary registry file");
        }
        info!(accounts = accounts.len(), "📜 Account registry loaded");

        Self {
            store: Store::new(path, accounts, encode),
        }
    }

    /// Links `account` to `user` for `guild`.
    ///
    /// Watermarks of an already linked account are never touched; the ones
    /// carried by `account` are only used when it becomes the stored account.
    pub async fn register(
        &self,
        user: UserId,
        account: TrackedAccount,
        guild: GuildId,
    ) -> Result<Registration, RegistryError> {
        self.store
            .mutate(move |accounts| match accounts.entry(user) {
                Entry::Vacant(slot) => {
                    let mut account = account;
                    account.guilds = BTreeSet::from([guild]);
                    slot.insert(account);
                    (Registration::Created, true)
                }
                Entry::Occupied(mut slot) if slot.get().puuid == account.puuid => {
                    let existing = slot.get_mut();
                    let renamed = existing.game_name != account.game_name
                        || existing.tag_line != account.tag_line;
                    existing.game_name = account.game_name;
                    existing.tag_line = account.tag_line;

                    if existing.guilds.insert(guild) {
                        (Registration::GuildAdded, true)
                    } else {
                        (Registration::AlreadyRegistered, renamed)
                    }
                }
                Entry::Occupied(mut slot) => {
                    let mut account = account;
                    account.guilds = slot.get().guilds.clone();
                    account.guilds.insert(guild);
                    let previous = slot.insert(account);
                    (Registration::Replaced { previous }, true)
                }
            })
            .await
    }

    /// Moves the watermark of `mode` forward, but only while `user` is still
    /// linked to `puuid`. Returns `false` when the user is gone or now tracks
    /// another Riot account.
    pub async fn update_watermark(
        &self,
        user: UserId,
        puuid: &str,
        mode: GameMode,
        match_id: String,
    ) -> Result<bool, RegistryError> {
        let puuid = puuid.to_string();
        self.store
            .mutate(move |accounts| match accounts.get_mut(&user) {
                Some(account) if account.puuid != puuid => (false, false),
                Some(account) if account.watermark(mode) != Some(match_id.as_str()) => {
                    account.set_watermark(mode, Some(match_id));
                    (true, true)
                }
                Some(_) => (true, false),
                None => (false, false),
            })
            .await
    }

    /// Unlinks `user` from `guild`, deleting the account once no guild is left.
    /// Returns `false` when there was nothing to remove.
    pub async fn remove_from_guild(
        &self,
        user: UserId,
        guild: GuildId,
    ) -> Result<bool, RegistryError> {
        self.store
            .mutate(move |accounts| {
                let Some(account) = accounts.get_mut(&user) else {
                    return (false, false);
                };
                if !account.guilds.remove(&guild) {
                    return (false, false);
                }
                if account.guilds.is_empty() {
                    accounts.remove(&user);
                }
                (true, true)
            })
            .await
    }

    /// Removes `guild` from every account. Returns how many accounts were affected.
    pub async fn purge_guild(&self, guild: GuildId) -> Result<usize, RegistryError> {
        self.store
            .mutate(move |accounts| {
                let mut affected = 0;
                accounts.retain(|_, account| {
                    if account.guilds.remove(&guild) {
                        affected += 1;
                    }
                    !account.guilds.is_empty()
                });
                (affected, affected > 0)
            })
            .await
    }

    pub async fn get(&self, user: UserId) -> Option<TrackedAccount> {
        self.store.read().await.get(&user).cloned()
    }

    /// Point-in-time copy of every linked account, ordered by user id.
    pub async fn snapshot(&self) -> Vec<(UserId, TrackedAccount)> {
        self.store
            .read()
            .await
            .iter()
            .map(|(user, account)| (*user, account.clone()))
            .collect()
    }

    pub async fn accounts_in_guild(&self, guild: GuildId) -> Vec<(UserId, TrackedAccount)> {
        self.store
            .read()
            .await
            .iter()
            .filter(|(_, account)| account.guilds.contains(&guild))
            .map(|(user, account)| (*user, account.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    pub fn path(&self) -> &std::path::Path {
        self.store.path()
    }
}
