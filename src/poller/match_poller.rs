use std::{sync::Arc, time::Duration};

use poise::serenity_prelude::UserId;
use thiserror::Error;
use tokio::{
    sync::{Semaphore, watch},
    task::JoinSet,
    time::{MissedTickBehavior, interval, sleep},
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::{MatchNotifier, MatchSource};
use crate::registry::{AccountRegistry, RegistryError, TrackedAccount};
use crate::riot::{GameMode, RiotApiError};

#[derive(Debug, Error)]
enum PollerError {
    #[error(transparent)]
    Riot(#[from] RiotApiError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("Match {match_id} is listed but its detail is not available yet")]
    DetailMissing { match_id: String },
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub startup_delay: Duration,
    /// Accounts polled at the same time within a tick.
    pub concurrency: usize,
    /// Time budget per account; spawns are spaced by `account_pacing / concurrency`.
    pub account_pacing: Duration,
    pub modes: Vec<GameMode>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            startup_delay: Duration::from_secs(10),
            concurrency: 3,
            account_pacing: Duration::from_millis(1200),
            modes: GameMode::ALL.to_vec(),
        }
    }
}

impl PollerConfig {
    fn spawn_spacing(&self) -> Duration {
        self.account_pacing / self.concurrency.max(1) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Scanning,
    Stopped,
}

pub struct ResultPoller<S, N> {
    source: Arc<S>,
    notifier: Arc<N>,
    accounts: Arc<AccountRegistry>,
    config: PollerConfig,
    state: watch::Sender<PollerState>,
}

impl<S, N> ResultPoller<S, N>
where
    S: MatchSource + 'static,
    N: MatchNotifier + 'static,
{
    pub fn new(
        source: Arc<S>,
        notifier: Arc<N>,
        accounts: Arc<AccountRegistry>,
        config: PollerConfig,
    ) -> Self {
        let (state, _) = watch::channel(PollerState::Idle);

        Self {
            source,
            notifier,
            accounts,
            config,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PollerState> {
        self.state.subscribe()
    }

    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Ticks until `cancel` fires. Only cancellation moves the poller to
    /// [`PollerState::Stopped`], and a stopped poller never runs again.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        if *self.state.borrow() == PollerState::Stopped {
            warn!("🔄 Result poller already stopped, ignoring restart");
            return;
        }

        info!(
            interval_secs = self.config.interval.as_secs(),
            startup_delay_secs = self.config.startup_delay.as_secs(),
            modes = ?self.config.modes,
            "🔄 Result poller started"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            _ = sleep(self.config.startup_delay) => {
                let mut ticker = interval(self.config.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                    self.poll_once(&cancel).await;
                }
            }
        }

        self.state.send_replace(PollerState::Stopped);
        info!("🔄 Result poller stopped");
    }

    /// One polling cycle over a snapshot of the registry.
    pub async fn poll_once(self: &Arc<Self>, cancel: &CancellationToken) {
        if self.source.is_in_cooldown() {
            debug!("🔄 Riot API cooling down, skipping poll cycle");
            return;
        }

        let snapshot = self.accounts.snapshot().await;
        if snapshot.is_empty() {
            debug!("🔄 No accounts tracked, skipping poll cycle");
            return;
        }

        self.state.send_replace(PollerState::Scanning);
        info!(count = snapshot.len(), "🔄 Polling {} account(s)", snapshot.len());

        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let spacing = self.config.spawn_spacing();
        let mut tasks = JoinSet::new();

        for (i, (user, account)) in snapshot.into_iter().enumerate() {
            if i > 0 && !spacing.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = sleep(spacing) => {}
                }
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let span = info_span!("account", user = %user, riot_id = %account.riot_id());
            let this = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(
                async move {
                    let _permit = permit;
                    this.poll_account(user, &account, &cancel).await;
                }
                .instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined
                && e.is_panic()
            {
                error!(error = %e, "🔄 ❌ Account polling task panicked");
            }
        }

        if !cancel.is_cancelled() {
            self.state.send_replace(PollerState::Idle);
        }
    }

    async fn poll_account(&self, user: UserId, account: &TrackedAccount, cancel: &CancellationToken) {
        for &mode in &self.config.modes {
            if cancel.is_cancelled() {
                return;
            }

            match self.check_mode(user, account, mode, cancel).await {
                Ok(()) => {}
                Err(PollerError::Riot(e)) if e.is_cancelled() => return,
                Err(PollerError::Riot(e)) if e.is_unavailable() => {
                    debug!(%mode, error = %e, "🔄 Riot API unavailable, retrying next cycle");
                }
                Err(e) => {
                    warn!(%mode, puuid = %account.puuid, error = %e, "🔄 ⚠️ Failed to check account");
                }
            }
        }
    }

    async fn check_mode(
        &self,
        user: UserId,
        account: &TrackedAccount,
        mode: GameMode,
        cancel: &CancellationToken,
    ) -> Result<(), PollerError> {
        let Some(latest) = self.source.latest_match_id(mode, account, cancel).await? else {
            debug!(%mode, "🔄 No matches found");
            return Ok(());
        };

        if account.watermark(mode) == Some(latest.as_str()) {
            debug!(%mode, "🔄 No new match");
            return Ok(());
        }

        let Some(detail) = self
            .source
            .match_detail(mode, account, &latest, cancel)
            .await?
        else {
            return Err(PollerError::DetailMissing { match_id: latest });
        };

        let applied = self
            .accounts
            .update_watermark(user, &account.puuid, mode, latest.clone())
            .await?;
        if !applied {
            debug!(%mode, "🔄 Account untracked or replaced during the cycle, skipping alert");
            return Ok(());
        }

        info!(
            %mode,
            match_id = %latest,
            queue = detail.queue_name(),
            "🔄 ✅ New match detected"
        );

        // Deliver to the guilds registered now, not the ones in the snapshot.
        let Some(current) = self
            .accounts
            .get(user)
            .await
            .filter(|current| current.puuid == account.puuid)
        else {
            debug!("🔄 Account untracked or replaced during the cycle, skipping alert");
            return Ok(());
        };

        self.notifier
            .on_new_match(user, &current, detail, cancel)
            .await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use poise::serenity_prelude::GuildId;
    use reqwest::StatusCode;

    use super::*;
    use crate::riot::{MatchDetail, Platform, RiotApiResponse};
    use crate::testing::{lol_match, tft_match};

    const G1: GuildId = GuildId::new(1);

    #[derive(Default)]
    struct FakeSource {
        latest: Mutex<HashMap<(String, GameMode), String>>,
        failing: Mutex<HashSet<(String, GameMode)>>,
        missing_detail: Mutex<HashSet<String>>,
        cooldown: AtomicBool,
        calls: AtomicUsize,
        relink_on_detail: Mutex<Option<(Arc<AccountRegistry>, UserId, TrackedAccount)>>,
    }

    impl FakeSource {
        fn set_latest(&self, puuid: &str, mode: GameMode, id: &str) {
            self.latest
                .lock()
                .unwrap()
                .insert((puuid.to_string(), mode), id.to_string());
        }

        fn fail(&self, puuid: &str, mode: GameMode) {
            self.failing
                .lock()
                .unwrap()
                .insert((puuid.to_string(), mode));
        }
    }

    #[async_trait]
    impl MatchSource for FakeSource {
        fn is_in_cooldown(&self) -> bool {
            self.cooldown.load(Ordering::SeqCst)
        }

        async fn latest_match_id(
            &self,
            mode: GameMode,
            account: &TrackedAccount,
            _cancel: &CancellationToken,
        ) -> RiotApiResponse<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let key = (account.puuid.clone(), mode);
            if self.failing.lock().unwrap().contains(&key) {
                return Err(RiotApiError::Status(StatusCode::INTERNAL_SERVER_ERROR));
            }
            Ok(self.latest.lock().unwrap().get(&key).cloned())
        }

        async fn match_detail(
            &self,
            mode: GameMode,
            account: &TrackedAccount,
            match_id: &str,
            _cancel: &CancellationToken,
        ) -> RiotApiResponse<Option<MatchDetail>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let relink = self.relink_on_detail.lock().unwrap().take();
            if let Some((accounts, user, account)) = relink {
                accounts.register(user, account, G1).await.unwrap();
            }
            if self.missing_detail.lock().unwrap().contains(match_id) {
                return Ok(None);
            }
            Ok(Some(match mode {
                GameMode::Lol => lol_match(match_id, &account.puuid, true),
                GameMode::Tft => tft_match(match_id, &account.puuid, 2),
            }))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<(UserId, GameMode, String)>>,
    }

    impl RecordingNotifier {
        fn seen(&self) -> Vec<(UserId, GameMode, String)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MatchNotifier for RecordingNotifier {
        async fn on_new_match(
            &self,
            user: UserId,
            _account: &TrackedAccount,
            detail: MatchDetail,
            _cancel: &CancellationToken,
        ) {
            self.seen
                .lock()
                .unwrap()
                .push((user, detail.mode(), detail.match_id().to_string()));
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        source: Arc<FakeSource>,
        notifier: Arc<RecordingNotifier>,
        accounts: Arc<AccountRegistry>,
        poller: Arc<ResultPoller<FakeSource, RecordingNotifier>>,
    }

    async fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let accounts = Arc::new(AccountRegistry::open(dir.path().join("accounts.json")).await);
        let source = Arc::new(FakeSource::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let config = PollerConfig {
            interval: Duration::from_millis(50),
            startup_delay: Duration::ZERO,
            account_pacing: Duration::ZERO,
            ..Default::default()
        };
        let poller = Arc::new(ResultPoller::new(
            source.clone(),
            notifier.clone(),
            accounts.clone(),
            config,
        ));

        Harness {
            _dir: dir,
            source,
            notifier,
            accounts,
            poller,
        }
    }

    async fn track(h: &Harness, user: u64, puuid: &str, lol: Option<&str>) {
        let account = TrackedAccount::new(puuid, "Player", "EUW", Platform::EUW1)
            .with_watermark(GameMode::Lol, lol.map(str::to_string));
        h.accounts
            .register(UserId::new(user), account, G1)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn new_match_is_reported_exactly_once() {
        let h = harness().await;
        let cancel = CancellationToken::new();
        track(&h, 1, "p1", Some("EUW1_1")).await;

        h.source.set_latest("p1", GameMode::Lol, "EUW1_1");
        h.poller.poll_once(&cancel).await;
        assert!(h.notifier.seen().is_empty());

        h.source.set_latest("p1", GameMode::Lol, "EUW1_2");
        h.poller.poll_once(&cancel).await;
        h.poller.poll_once(&cancel).await;

        assert_eq!(
            h.notifier.seen(),
            vec![(UserId::new(1), GameMode::Lol, "EUW1_2".to_string())]
        );
        let stored = h.accounts.get(UserId::new(1)).await.unwrap();
        assert_eq!(stored.watermark(GameMode::Lol), Some("EUW1_2"));
    }

    #[tokio::test]
    async fn empty_watermark_treats_any_match_as_new() {
        let h = harness().await;
        let cancel = CancellationToken::new();
        track(&h, 1, "p1", None).await;
        h.source.set_latest("p1", GameMode::Lol, "EUW1_1");

        h.poller.poll_once(&cancel).await;

        assert_eq!(h.notifier.seen().len(), 1);
    }

    #[tokio::test]
    async fn cooldown_skips_the_whole_cycle() {
        let h = harness().await;
        let cancel = CancellationToken::new();
        track(&h, 1, "p1", None).await;
        h.source.set_latest("p1", GameMode::Lol, "EUW1_1");
        h.source.cooldown.store(true, Ordering::SeqCst);

        h.poller.poll_once(&cancel).await;

        assert_eq!(h.source.calls.load(Ordering::SeqCst), 0);
        assert!(h.notifier.seen().is_empty());
    }

    #[tokio::test]
    async fn modes_are_checked_independently() {
        let h = harness().await;
        let cancel = CancellationToken::new();
        track(&h, 1, "p1", Some("EUW1_1")).await;
        h.source.set_latest("p1", GameMode::Lol, "EUW1_2");
        h.source.fail("p1", GameMode::Lol);
        h.source.set_latest("p1", GameMode::Tft, "EUW1_T1");

        h.poller.poll_once(&cancel).await;

        assert_eq!(
            h.notifier.seen(),
            vec![(UserId::new(1), GameMode::Tft, "EUW1_T1".to_string())]
        );
        let stored = h.accounts.get(UserId::new(1)).await.unwrap();
        assert_eq!(stored.watermark(GameMode::Lol), Some("EUW1_1"));
        assert_eq!(stored.watermark(GameMode::Tft), Some("EUW1_T1"));
    }

    #[tokio::test]
    async fn failing_account_does_not_block_others() {
        let h = harness().await;
        let cancel = CancellationToken::new();
        track(&h, 1, "p1", None).await;
        track(&h, 2, "p2", None).await;
        h.source.fail("p1", GameMode::Lol);
        h.source.set_latest("p2", GameMode::Lol, "EUW1_5");

        h.poller.poll_once(&cancel).await;

        assert_eq!(
            h.notifier.seen(),
            vec![(UserId::new(2), GameMode::Lol, "EUW1_5".to_string())]
        );
    }

    #[tokio::test]
    async fn missing_detail_keeps_the_watermark() {
        let h = harness().await;
        let cancel = CancellationToken::new();
        track(&h, 1, "p1", Some("EUW1_1")).await;
        h.source.set_latest("p1", GameMode::Lol, "EUW1_2");
        h.source
            .missing_detail
            .lock()
            .unwrap()
            .insert("EUW1_2".to_string());

        h.poller.poll_once(&cancel).await;

        assert!(h.notifier.seen().is_empty());
        let stored = h.accounts.get(UserId::new(1)).await.unwrap();
        assert_eq!(stored.watermark(GameMode::Lol), Some("EUW1_1"));
    }

    #[tokio::test]
    async fn disabled_mode_is_never_queried() {
        let dir = tempfile::tempdir().unwrap();
        let accounts = Arc::new(AccountRegistry::open(dir.path().join("accounts.json")).await);
        let source = Arc::new(FakeSource::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let poller = Arc::new(ResultPoller::new(
            source.clone(),
            notifier.clone(),
            accounts.clone(),
            PollerConfig {
                modes: vec![GameMode::Lol],
                account_pacing: Duration::ZERO,
                ..Default::default()
            },
        ));
        accounts
            .register(
                UserId::new(1),
                TrackedAccount::new("p1", "Player", "EUW", Platform::EUW1),
                G1,
            )
            .await
            .unwrap();
        source.set_latest("p1", GameMode::Tft, "EUW1_T1");

        poller.poll_once(&CancellationToken::new()).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(notifier.seen().is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_the_poller() {
        let h = harness().await;
        track(&h, 1, "p1", None).await;
        h.source.set_latest("p1", GameMode::Lol, "EUW1_1");
        let cancel = CancellationToken::new();
        let mut state = h.poller.subscribe();

        let handle = h.poller.clone().start(cancel.clone());
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(*state.borrow_and_update(), PollerState::Stopped);
        assert_eq!(h.notifier.seen().len(), 1);

        let calls = h.source.calls.load(Ordering::SeqCst);
        h.poller.clone().start(CancellationToken::new()).await.unwrap();

        assert_eq!(*state.borrow_and_update(), PollerState::Stopped);
        assert_eq!(h.source.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn relinking_mid_cycle_keeps_the_new_accounts_watermark() {
        let h = harness().await;
        let cancel = CancellationToken::new();
        track(&h, 1, "p1", Some("EUW1_1")).await;
        h.source.set_latest("p1", GameMode::Lol, "EUW1_2");
        h.source.set_latest("p2", GameMode::Lol, "EUW1_50");
        let relinked = TrackedAccount::new("p2", "Smurf", "EUW", Platform::EUW1)
            .with_watermark(GameMode::Lol, Some("EUW1_50".into()));
        *h.source.relink_on_detail.lock().unwrap() =
            Some((h.accounts.clone(), UserId::new(1), relinked));

        h.poller.poll_once(&cancel).await;
        h.poller.poll_once(&cancel).await;

        assert!(h.notifier.seen().is_empty());
        let stored = h.accounts.get(UserId::new(1)).await.unwrap();
        assert_eq!(stored.puuid, "p2");
        assert_eq!(stored.watermark(GameMode::Lol), Some("EUW1_50"));
    }

    #[derive(Default)]
    struct SlowSource {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl MatchSource for SlowSource {
        fn is_in_cooldown(&self) -> bool {
            false
        }

        async fn latest_match_id(
            &self,
            _mode: GameMode,
            _account: &TrackedAccount,
            _cancel: &CancellationToken,
        ) -> RiotApiResponse<Option<String>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn match_detail(
            &self,
            _mode: GameMode,
            _account: &TrackedAccount,
            _match_id: &str,
            _cancel: &CancellationToken,
        ) -> RiotApiResponse<Option<MatchDetail>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn concurrency_is_capped_and_spawns_are_spaced() {
        let dir = tempfile::tempdir().unwrap();
        let accounts = Arc::new(AccountRegistry::open(dir.path().join("accounts.json")).await);
        let source = Arc::new(SlowSource::default());
        let poller = Arc::new(ResultPoller::new(
            source.clone(),
            Arc::new(RecordingNotifier::default()),
            accounts.clone(),
            PollerConfig {
                concurrency: 3,
                account_pacing: Duration::from_millis(30),
                modes: vec![GameMode::Lol],
                ..Default::default()
            },
        ));
        for user in 1..=8 {
            let account =
                TrackedAccount::new(format!("p{user}"), "Player", "EUW", Platform::EUW1);
            accounts
                .register(UserId::new(user), account, G1)
                .await
                .unwrap();
        }

        let started = tokio::time::Instant::now();
        poller.poll_once(&CancellationToken::new()).await;

        let peak = source.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in flight was {peak}");
        assert!(peak > 1, "accounts were never polled in parallel");
        // Seven 10ms gaps between the eight spawns.
        assert!(started.elapsed() >= Duration::from_millis(70));
        assert_eq!(source.in_flight.load(Ordering::SeqCst), 0);
    }
}
