//! Periodic detection of newly finished matches.
//!
//! The poller only talks to a [`MatchSource`] and a [`MatchNotifier`], so the
//! Riot gateway and the Discord fan-out can be swapped for fakes in tests.

mod match_poller;

use async_trait::async_trait;
use poise::serenity_prelude::UserId;
use tokio_util::sync::CancellationToken;

use crate::registry::TrackedAccount;
use crate::riot::{GameMode, MatchDetail, RiotApiResponse, RiotGateway};

pub use match_poller::{PollerConfig, PollerState, ResultPoller};

/// Where match ids and match details come from.
#[async_trait]
pub trait MatchSource: Send + Sync {
    /// When true the poller skips the whole tick.
    fn is_in_cooldown(&self) -> bool;

    async fn latest_match_id(
        &self,
        mode: GameMode,
        account: &TrackedAccount,
        cancel: &CancellationToken,
    ) -> RiotApiResponse<Option<String>>;

    async fn match_detail(
        &self,
        mode: GameMode,
        account: &TrackedAccount,
        match_id: &str,
        cancel: &CancellationToken,
    ) -> RiotApiResponse<Option<MatchDetail>>;
}

/// Consumer of newly detected matches. Called after the watermark moved, so a
/// failure here never causes the same match to be reported twice.
#[async_trait]
pub trait MatchNotifier: Send + Sync {
    async fn on_new_match(
        &self,
        user: UserId,
        account: &TrackedAccount,
        detail: MatchDetail,
        cancel: &CancellationToken,
    );
}

#[async_trait]
impl MatchSource for RiotGateway {
    fn is_in_cooldown(&self) -> bool {
        RiotGateway::is_in_cooldown(self)
    }

    async fn latest_match_id(
        &self,
        mode: GameMode,
        account: &TrackedAccount,
        cancel: &CancellationToken,
    ) -> RiotApiResponse<Option<String>> {
        self.get_last_match_id(mode, account.platform, &account.puuid, cancel)
            .await
    }

    async fn match_detail(
        &self,
        mode: GameMode,
        account: &TrackedAccount,
        match_id: &str,
        cancel: &CancellationToken,
    ) -> RiotApiResponse<Option<MatchDetail>> {
        self.get_match(mode, account.platform, match_id, cancel)
            .await
    }
}
