//! Fan-out of a detected match to every guild tracking the player.

mod render;

use std::{ops::ControlFlow, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use poise::serenity_prelude::{self as serenity, ChannelId, GuildId, UserId};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::poller::MatchNotifier;
use crate::registry::{GuildConfigRegistry, TrackedAccount};
use crate::riot::MatchDetail;

pub use render::SvgRenderer;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{riot_id} is not a participant of match {match_id}")]
    NotInMatch { riot_id: String, match_id: String },
    #[error("Failed to parse SVG: {0}")]
    Svg(String),
    #[error("Failed to create a {width}x{height} pixmap")]
    Pixmap { width: u32, height: u32 },
    #[error("Failed to encode PNG: {0}")]
    Encode(String),
    #[error("Render task interrupted: {0}")]
    Interrupted(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Discord error: {0}")]
    Discord(Box<serenity::Error>),
    #[error("No reachable channel or owner in guild {0}")]
    Unreachable(GuildId),
}

impl From<serenity::Error> for TransportError {
    fn from(err: serenity::Error) -> Self {
        TransportError::Discord(Box::new(err))
    }
}

/// Produces the image attached to an alert.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        account: &TrackedAccount,
        detail: &MatchDetail,
    ) -> Result<Vec<u8>, RenderError>;
}

/// The chat side of the fan-out.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `Ok(false)` only when the channel is definitively gone.
    async fn channel_exists(&self, channel: ChannelId) -> Result<bool, TransportError>;

    async fn send(
        &self,
        channel: ChannelId,
        image: Bytes,
        caption: &str,
    ) -> Result<(), TransportError>;

    /// Best-effort message to whoever administers the guild.
    async fn notify_admin(&self, guild: GuildId, message: &str) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn channel_exists(&self, channel: ChannelId) -> Result<bool, TransportError> {
        (**self).channel_exists(channel).await
    }

    async fn send(
        &self,
        channel: ChannelId,
        image: Bytes,
        caption: &str,
    ) -> Result<(), TransportError> {
        (**self).send(channel, image, caption).await
    }

    async fn notify_admin(&self, guild: GuildId, message: &str) -> Result<(), TransportError> {
        (**self).notify_admin(guild, message).await
    }
}

/// Renders each new match once and posts it to the alert channel of every
/// guild the account is registered in.
#[derive(Debug)]
pub struct AlertDispatcher<R, T> {
    renderer: R,
    transport: T,
    guilds: Arc<GuildConfigRegistry>,
}

impl<R, T> AlertDispatcher<R, T>
where
    R: Renderer,
    T: Transport,
{
    pub fn new(renderer: R, transport: T, guilds: Arc<GuildConfigRegistry>) -> Self {
        Self {
            renderer,
            transport,
            guilds,
        }
    }

    async fn deliver(
        &self,
        guild: GuildId,
        image: &Bytes,
        caption: &str,
        cancel: &CancellationToken,
    ) -> ControlFlow<()> {
        let Some(channel) = self.guilds.alert_channel(guild).await else {
            debug!(%guild, "📣 Guild has no alert channel, skipping");
            return ControlFlow::Continue(());
        };

        let exists = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ControlFlow::Break(()),
            exists = self.transport.channel_exists(channel) => exists,
        };

        match exists {
            Ok(true) => {}
            Ok(false) => return self.forget_stale_channel(guild, channel, cancel).await,
            Err(e) => {
                warn!(%guild, %channel, error = %e, "📣 ⚠️ Could not check alert channel");
                return ControlFlow::Continue(());
            }
        }

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ControlFlow::Break(()),
            sent = self.transport.send(channel, image.clone(), caption) => sent,
        };

        match sent {
            Ok(()) => info!(%guild, %channel, "📣 ✅ Alert sent"),
            Err(e) => error!(%guild, %channel, error = %e, "📣 ❌ Failed to send alert"),
        }

        ControlFlow::Continue(())
    }

    async fn forget_stale_channel(
        &self,
        guild: GuildId,
        channel: ChannelId,
        cancel: &CancellationToken,
    ) -> ControlFlow<()> {
        warn!(%guild, %channel, "📣 ⚠️ Alert channel no longer exists, removing guild config");

        let notice = format!(
            "The channel configured for match alerts (<#{channel}>) no longer exists. \
             Use `/config channel` to choose a new one."
        );
        if let Err(e) = self.guilds.remove(guild).await {
            error!(%guild, error = %e, "📣 ❌ Failed to remove stale guild config");
        }

        let notified = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ControlFlow::Break(()),
            notified = self.transport.notify_admin(guild, &notice) => notified,
        };
        if let Err(e) = notified {
            debug!(%guild, error = %e, "📣 Could not notify guild administrators");
        }

        ControlFlow::Continue(())
    }
}

#[async_trait]
impl<R, T> MatchNotifier for AlertDispatcher<R, T>
where
    R: Renderer,
    T: Transport,
{
    #[instrument(
        skip_all,
        fields(riot_id = %account.riot_id(), match_id = %detail.match_id())
    )]
    async fn on_new_match(
        &self,
        user: UserId,
        account: &TrackedAccount,
        detail: MatchDetail,
        cancel: &CancellationToken,
    ) {
        if account.guilds.is_empty() {
            warn!(%user, "📣 ⚠️ Account has no guild to alert");
            return;
        }
        debug!(%user, guilds = account.guilds.len(), "📣 Dispatching match alert");

        let rendered = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            rendered = self.renderer.render(account, &detail) => rendered,
        };
        let image = match rendered {
            Ok(png) => Bytes::from(png),
            Err(e) => {
                error!(error = %e, "📣 ❌ Failed to render match image");
                return;
            }
        };

        let caption = caption(account, &detail);

        for &guild in &account.guilds {
            if cancel.is_cancelled()
                || self.deliver(guild, &image, &caption, cancel).await.is_break()
            {
                debug!("📣 Fan-out cancelled");
                return;
            }
        }
    }
}

/// Message text posted with the image.
pub fn caption(account: &TrackedAccount, detail: &MatchDetail) -> String {
    let player = format!("**{}**", account.riot_id());

    match detail {
        MatchDetail::Lol(m) => {
            let queue = m.info.queue_name();
            match m.participant(&account.puuid) {
                _ if m.info.game_ended_in_early_surrender => {
                    format!("{player} played a remake in {queue}")
                }
                Some(p) if p.win => format!("{player} won a {queue} game"),
                Some(_) => format!("{player} lost a {queue} game"),
                None => format!("{player} finished a {queue} game"),
            }
        }
        MatchDetail::Tft(m) => {
            let queue = m.info.queue_name();
            match m.participant(&account.puuid) {
                Some(p) => format!("{player} finished {} in {queue}", p.placement_ordinal()),
                None => format!("{player} finished a {queue} game"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::riot::Platform;
    use crate::testing::{lol_match, tft_match};

    #[derive(Default)]
    struct CountingRenderer {
        renders: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Renderer for CountingRenderer {
        async fn render(
            &self,
            _account: &TrackedAccount,
            _detail: &MatchDetail,
        ) -> Result<Vec<u8>, RenderError> {
            self.renders.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RenderError::Svg("broken".into()));
            }
            Ok(vec![1, 2, 3])
        }
    }

    #[derive(Default)]
    struct DummyTransport {
        missing: HashSet<ChannelId>,
        failing: HashSet<ChannelId>,
        sent: Mutex<Vec<(ChannelId, Bytes, String)>>,
        notices: Mutex<Vec<GuildId>>,
        cancel_on_send: Option<CancellationToken>,
        stall_notices: bool,
    }

    #[async_trait]
    impl Transport for DummyTransport {
        async fn channel_exists(&self, channel: ChannelId) -> Result<bool, TransportError> {
            Ok(!self.missing.contains(&channel))
        }

        async fn send(
            &self,
            channel: ChannelId,
            image: Bytes,
            caption: &str,
        ) -> Result<(), TransportError> {
            if let Some(cancel) = &self.cancel_on_send {
                cancel.cancel();
            }
            if self.failing.contains(&channel) {
                return Err(serenity::Error::Other("fail").into());
            }
            self.sent
                .lock()
                .unwrap()
                .push((channel, image, caption.to_string()));
            Ok(())
        }

        async fn notify_admin(&self, guild: GuildId, _message: &str) -> Result<(), TransportError> {
            self.notices.lock().unwrap().push(guild);
            if self.stall_notices {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    fn account(guilds: &[u64]) -> TrackedAccount {
        let mut account = TrackedAccount::new("p1", "Name", "Tag", Platform::EUW1);
        account.guilds = guilds.iter().copied().map(GuildId::new).collect::<BTreeSet<_>>();
        account
    }

    async fn guild_config(dir: &tempfile::TempDir, entries: &[(u64, u64)]) -> Arc<GuildConfigRegistry> {
        let registry = GuildConfigRegistry::open(dir.path().join("guilds.json")).await;
        for &(guild, channel) in entries {
            registry
                .set_alert_channel(GuildId::new(guild), ChannelId::new(channel))
                .await
                .unwrap();
        }
        Arc::new(registry)
    }

    fn sent_channels(transport: &DummyTransport) -> Vec<u64> {
        transport
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(c, _, _)| c.get())
            .collect()
    }

    #[tokio::test]
    async fn one_failing_guild_does_not_stop_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let guilds = guild_config(&dir, &[(1, 10), (2, 20), (3, 30)]).await;
        let transport = DummyTransport {
            failing: HashSet::from([ChannelId::new(20)]),
            ..Default::default()
        };
        let dispatcher = AlertDispatcher::new(CountingRenderer::default(), transport, guilds);

        dispatcher
            .on_new_match(
                UserId::new(1),
                &account(&[1, 2, 3]),
                lol_match("EUW1_2", "p1", true),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(dispatcher.renderer.renders.load(Ordering::SeqCst), 1);
        assert_eq!(sent_channels(&dispatcher.transport), vec![10, 30]);
        let sent = dispatcher.transport.sent.lock().unwrap();
        assert_eq!(sent[0].1, sent[1].1);
        assert_eq!(sent[0].2, "**Name#Tag** won a Ranked Solo/Duo game");
    }

    #[tokio::test]
    async fn guild_without_channel_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let guilds = guild_config(&dir, &[(2, 20)]).await;
        let dispatcher =
            AlertDispatcher::new(CountingRenderer::default(), DummyTransport::default(), guilds);

        dispatcher
            .on_new_match(
                UserId::new(1),
                &account(&[1, 2]),
                lol_match("EUW1_2", "p1", true),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(sent_channels(&dispatcher.transport), vec![20]);
    }

    #[tokio::test]
    async fn stale_channel_is_forgotten_and_admin_notified() {
        let dir = tempfile::tempdir().unwrap();
        let guilds = guild_config(&dir, &[(1, 10), (2, 20)]).await;
        let transport = DummyTransport {
            missing: HashSet::from([ChannelId::new(10)]),
            ..Default::default()
        };
        let dispatcher = AlertDispatcher::new(CountingRenderer::default(), transport, guilds.clone());

        dispatcher
            .on_new_match(
                UserId::new(1),
                &account(&[1, 2]),
                tft_match("EUW1_9", "p1", 3),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(sent_channels(&dispatcher.transport), vec![20]);
        assert_eq!(
            *dispatcher.transport.notices.lock().unwrap(),
            vec![GuildId::new(1)]
        );
        assert_eq!(guilds.alert_channel(GuildId::new(1)).await, None);
        assert_eq!(
            guilds.alert_channel(GuildId::new(2)).await,
            Some(ChannelId::new(20))
        );
    }

    #[tokio::test]
    async fn slow_admin_notice_yields_to_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let guilds = guild_config(&dir, &[(1, 10), (2, 20)]).await;
        let transport = DummyTransport {
            missing: HashSet::from([ChannelId::new(10)]),
            stall_notices: true,
            ..Default::default()
        };
        let dispatcher = AlertDispatcher::new(CountingRenderer::default(), transport, guilds.clone());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let finished = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            dispatcher.on_new_match(
                UserId::new(1),
                &account(&[1, 2]),
                lol_match("EUW1_2", "p1", true),
                &cancel,
            ),
        )
        .await;

        assert!(finished.is_ok());
        assert!(sent_channels(&dispatcher.transport).is_empty());
        assert_eq!(guilds.alert_channel(GuildId::new(1)).await, None);
    }

    #[tokio::test]
    async fn render_failure_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let guilds = guild_config(&dir, &[(1, 10)]).await;
        let renderer = CountingRenderer {
            fail: true,
            ..Default::default()
        };
        let dispatcher = AlertDispatcher::new(renderer, DummyTransport::default(), guilds);

        dispatcher
            .on_new_match(
                UserId::new(1),
                &account(&[1]),
                lol_match("EUW1_2", "p1", true),
                &CancellationToken::new(),
            )
            .await;

        assert!(sent_channels(&dispatcher.transport).is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_the_fan_out() {
        let dir = tempfile::tempdir().unwrap();
        let guilds = guild_config(&dir, &[(1, 10), (2, 20)]).await;
        let cancel = CancellationToken::new();
        let transport = DummyTransport {
            cancel_on_send: Some(cancel.clone()),
            ..Default::default()
        };
        let dispatcher = AlertDispatcher::new(CountingRenderer::default(), transport, guilds);

        dispatcher
            .on_new_match(
                UserId::new(1),
                &account(&[1, 2]),
                lol_match("EUW1_2", "p1", true),
                &cancel,
            )
            .await;

        assert_eq!(sent_channels(&dispatcher.transport), vec![10]);
    }

    #[test]
    fn captions_describe_the_result() {
        let acc = account(&[1]);

        assert_eq!(
            caption(&acc, &lol_match("EUW1_1", "p1", false)),
            "**Name#Tag** lost a Ranked Solo/Duo game"
        );
        assert_eq!(
            caption(&acc, &tft_match("EUW1_2", "p1", 3)),
            "**Name#Tag** finished 3rd in Ranked TFT"
        );
    }
}
