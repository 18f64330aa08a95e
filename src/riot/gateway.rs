//! Single entry point for every Riot API call made by the bot.
//!
//! All requests share one [`RiotGateway`]: requests are dispatched one at a
//! time, spaced by a minimum interval, and a `429` puts the whole gateway in a
//! cooldown window derived from the `Retry-After` header.

use std::{
    num::NonZeroU32,
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::{StatusCode, header::RETRY_AFTER};
use serde::de::DeserializeOwned;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use super::metrics::RequestMetrics;
use super::region::{Platform, Region};
use super::types::{
    AccountDto, GameMode, MatchDetail, MatchDto, RiotApiError, RiotApiResponse, TftMatchDto,
};

/// What to do with a request issued while the gateway is cooling down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownPolicy {
    /// Sleep until the cooldown deadline, then send.
    Wait,
    /// Fail fast with [`RiotApiError::CoolingDown`] without touching the network.
    Reject,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub min_request_interval: Duration,
    pub cooldown_fallback: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub cooldown_policy: CooldownPolicy,
    /// Overrides the regional `*.api.riotgames.com` hosts.
    pub base_url: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            min_request_interval: Duration::from_millis(1200),
            cooldown_fallback: Duration::from_secs(60),
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
            cooldown_policy: CooldownPolicy::Reject,
            base_url: None,
        }
    }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub struct RiotGateway {
    client: reqwest::Client,
    /// Riot API Key
    key: String,
    config: GatewayConfig,
    /// One cell per `min_request_interval`, no burst.
    limiter: Option<DirectLimiter>,
    /// Single-flight gate: at most one request on the wire.
    gate: tokio::sync::Mutex<()>,
    cooldown_until: Mutex<Option<Instant>>,
    metrics: Arc<RequestMetrics>,
}

impl std::fmt::Debug for RiotGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiotGateway")
            .field("config", &self.config)
            .field("cooldown_until", &self.cooldown_until)
            .finish_non_exhaustive()
    }
}

impl RiotGateway {
    pub fn new(key: String, config: GatewayConfig) -> Self {
        let limiter = Quota::with_period(config.min_request_interval)
            .map(|q| RateLimiter::direct(q.allow_burst(NonZeroU32::MIN)));

        Self {
            client: reqwest::Client::new(),
            key,
            config,
            limiter,
            gate: tokio::sync::Mutex::new(()),
            cooldown_until: Mutex::new(None),
            metrics: RequestMetrics::new(),
        }
    }

    pub fn metrics(&self) -> Arc<RequestMetrics> {
        self.metrics.clone()
    }

    /// Cheap check for callers that want to skip work while throttled.
    pub fn is_in_cooldown(&self) -> bool {
        self.cooldown_remaining().is_some()
    }

    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let deadline = (*self.cooldown_until.lock().unwrap_or_else(|e| e.into_inner()))?;
        let now = Instant::now();
        (deadline > now).then(|| deadline - now)
    }

    fn enter_cooldown(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let mut guard = self.cooldown_until.lock().unwrap_or_else(|e| e.into_inner());
        // Never shorten a cooldown another request already extended.
        if guard.is_none_or(|current| current < deadline) {
            *guard = Some(deadline);
        }
    }

    fn route(&self, region: Region) -> String {
        match &self.config.base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => region.host(),
        }
    }

    // Account-V1 endpoint
    pub async fn get_account_by_riot_id(
        &self,
        region: Region,
        game_name: &str,
        tag_line: &str,
        cancel: &CancellationToken,
    ) -> RiotApiResponse<Option<AccountDto>> {
        trace!("[RIOT::GATEWAY] get_account_by_riot_id {game_name}#{tag_line}");

        let url = format!(
            "{}/riot/account/v1/accounts/by-riot-id/{}/{}",
            self.route(region.account_route()),
            urlencoding::encode(game_name),
            urlencoding::encode(tag_line),
        );

        self.request(url, cancel).await
    }

    // Match-V5 / TFT-Match-V1 endpoints
    pub async fn get_last_match_id(
        &self,
        mode: GameMode,
        platform: Platform,
        puuid: &str,
        cancel: &CancellationToken,
    ) -> RiotApiResponse<Option<String>> {
        trace!("[RIOT::GATEWAY] get_last_match_id {mode} {puuid} in {platform}");

        let url = format!(
            "{}{}",
            self.route(platform.to_region()),
            mode.match_ids_path(puuid)
        );

        let ids: Option<Vec<String>> = self.request(url, cancel).await?;
        Ok(ids.and_then(|ids| ids.into_iter().next()))
    }

    pub async fn get_match(
        &self,
        mode: GameMode,
        platform: Platform,
        match_id: &str,
        cancel: &CancellationToken,
    ) -> RiotApiResponse<Option<MatchDetail>> {
        trace!("[RIOT::GATEWAY] get_match {mode} {match_id} in {platform}");

        let url = format!(
            "{}{}",
            self.route(platform.to_region()),
            mode.match_path(match_id)
        );

        Ok(match mode {
            GameMode::Lol => self
                .request::<MatchDto>(url, cancel)
                .await?
                .map(MatchDetail::Lol),
            GameMode::Tft => self
                .request::<TftMatchDto>(url, cancel)
                .await?
                .map(MatchDetail::Tft),
        })
    }

    /// Sends a GET with bounded retries. `Ok(None)` means the resource does not exist.
    async fn request<T: DeserializeOwned>(
        &self,
        url: String,
        cancel: &CancellationToken,
    ) -> RiotApiResponse<Option<T>> {
        let mut attempt = 1;

        loop {
            match self.send_once(&url, cancel).await {
                Ok(Some(body)) => return Ok(Some(serde_json::from_slice(&body)?)),
                Ok(None) => return Ok(None),
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    let backoff = self.config.backoff_base * 2u32.pow(attempt - 1);
                    debug!(
                        error = %e,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "🛰️ Retrying Riot API request"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(RiotApiError::Cancelled),
                        _ = sleep(backoff) => {}
                    }
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        warn!(error = %e, attempts = attempt, "🛰️ ⚠️ Riot API request failed");
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn send_once(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> RiotApiResponse<Option<Bytes>> {
        // Waiting callers do not queue on the gate while the cooldown lasts.
        self.wait_out_cooldown(cancel).await?;

        let _gate = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RiotApiError::Cancelled),
            guard = self.gate.lock() => guard,
        };

        // The request holding the gate before us may have been throttled.
        self.wait_out_cooldown(cancel).await?;

        if let Some(limiter) = &self.limiter {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RiotApiError::Cancelled),
                _ = limiter.until_ready() => {}
            }
        }

        self.metrics.inc();

        let res = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RiotApiError::Cancelled),
            res = self.client.get(url).header("X-Riot-Token", &self.key).send() => res?,
        };

        match res.status() {
            status if status.is_success() => {
                let body = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(RiotApiError::Cancelled),
                    body = res.bytes() => body?,
                };
                Ok(Some(body))
            }
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = res
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(self.config.cooldown_fallback);

                self.enter_cooldown(retry_after);
                self.metrics.inc_throttled();
                warn!(
                    retry_after_secs = retry_after.as_secs(),
                    "🛰️ ⏳ Rate limited by Riot, entering cooldown"
                );
                Err(RiotApiError::Throttled(retry_after))
            }
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                error!(
                    status = status.as_u16(),
                    "🛰️ ❌ Riot API key is invalid or lacks access, check RIOT_API_KEY"
                );
                Err(RiotApiError::Forbidden(status))
            }
            status => Err(RiotApiError::Status(status)),
        }
    }

    async fn wait_out_cooldown(&self, cancel: &CancellationToken) -> RiotApiResponse<()> {
        let Some(remaining) = self.cooldown_remaining() else {
            return Ok(());
        };

        match self.config.cooldown_policy {
            CooldownPolicy::Reject => {
                debug!(
                    remaining_ms = remaining.as_millis() as u64,
                    "🛰️ Request rejected during cooldown"
                );
                Err(RiotApiError::CoolingDown)
            }
            CooldownPolicy::Wait => {
                debug!(
                    remaining_ms = remaining.as_millis() as u64,
                    "🛰️ Waiting for cooldown to end"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(RiotApiError::Cancelled),
                    _ = sleep_until(Instant::now() + remaining) => Ok(()),
                }
            }
        }
    }
}
