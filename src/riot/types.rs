use std::{fmt, time::Duration};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum RiotApiError {
    #[error("Rate limited by Riot, cooling down for {}s", .0.as_secs())]
    Throttled(Duration),

    #[error("Riot API gateway is cooling down after a rate limit")]
    CoolingDown,

    #[error("Riot API rejected the API key: {0}")]
    Forbidden(StatusCode),

    #[error("HTTP status error: {0}")]
    Status(StatusCode),

    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Decoding raw response error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Request cancelled")]
    Cancelled,
}

impl RiotApiError {
    /// Throttling and cooldown are expected: callers skip the work and try
    /// again on the next cycle.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Throttled(_) | Self::CoolingDown)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the gateway may try the same request again after a backoff.
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, Self::Status(_) | Self::Reqwest(_))
    }
}

/// A call to Riot API can either result in a success with the success type or fail with a [`RiotApiError`].
pub type RiotApiResponse<T> = Result<T, RiotApiError>;

// ============================================================================
// Game modes
// ============================================================================

/// Game modes watched by the poller. Each mode has its own match id space,
/// its own endpoints and its own watermark on a tracked account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameMode {
    Lol,
    Tft,
}

impl GameMode {
    pub const ALL: [GameMode; 2] = [GameMode::Lol, GameMode::Tft];

    pub(crate) fn match_ids_path(&self, puuid: &str) -> String {
        match self {
            Self::Lol => format!("/lol/match/v5/matches/by-puuid/{puuid}/ids?start=0&count=1"),
            Self::Tft => format!("/tft/match/v1/matches/by-puuid/{puuid}/ids?start=0&count=1"),
        }
    }

    pub(crate) fn match_path(&self, match_id: &str) -> String {
        match self {
            Self::Lol => format!("/lol/match/v5/matches/{match_id}"),
            Self::Tft => format!("/tft/match/v1/matches/{match_id}"),
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lol => write!(f, "LoL"),
            Self::Tft => write!(f, "TFT"),
        }
    }
}

// ============================================================================
// Account-v1
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDto {
    pub puuid: String,
    pub game_name: Option<String>,
    pub tag_line: Option<String>,
}

// ============================================================================
// Match-v5
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataDto {
    // TFT-Match-v1 keeps snake_case metadata.
    #[serde(alias = "match_id")]
    pub match_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDto {
    pub metadata: MetadataDto,
    pub info: InfoDto,
}

impl MatchDto {
    pub fn participant(&self, puuid: &str) -> Option<&ParticipantDto> {
        self.info.participants.iter().find(|p| p.puuid == puuid)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoDto {
    pub game_creation: i64,
    pub game_duration: i64,
    #[serde(default)]
    pub game_ended_in_early_surrender: bool,
    pub participants: Vec<ParticipantDto>,
    pub queue_id: i32,
}

impl InfoDto {
    pub fn duration_formatted(&self) -> String {
        let minutes = self.game_duration / 60;
        let seconds = self.game_duration % 60;
        format!("{}:{:02}", minutes, seconds)
    }

    pub fn queue_name(&self) -> &'static str {
        match self.queue_id {
            400 => "Normal Draft",
            420 => "Ranked Solo/Duo",
            430 => "Normal Blind",
            440 => "Ranked Flex",
            450 => "ARAM",
            490 => "Quickplay",
            1700 => "Arena",
            _ => "Custom",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDto {
    pub puuid: String,
    #[serde(default)]
    pub team_position: String,
    pub champion_name: String,
    pub kills: i32,
    pub deaths: i32,
    pub assists: i32,
    #[serde(default)]
    pub total_minions_killed: i32,
    #[serde(default)]
    pub neutral_minions_killed: i32,
    pub win: bool,
}

impl ParticipantDto {
    pub fn kda_ratio(&self) -> f64 {
        if self.deaths == 0 {
            (self.kills + self.assists) as f64
        } else {
            (self.kills + self.assists) as f64 / self.deaths as f64
        }
    }

    pub fn cs_total(&self) -> i32 {
        self.total_minions_killed + self.neutral_minions_killed
    }

    pub fn position_display(&self) -> &'static str {
        match self.team_position.as_str() {
            "TOP" => "Top",
            "JUNGLE" => "Jungle",
            "MIDDLE" => "Mid",
            "BOTTOM" => "ADC",
            "UTILITY" => "Support",
            _ => "",
        }
    }
}

// ============================================================================
// TFT-Match-v1
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct TftMatchDto {
    pub metadata: MetadataDto,
    pub info: TftInfoDto,
}

impl TftMatchDto {
    pub fn participant(&self, puuid: &str) -> Option<&TftParticipantDto> {
        self.info.participants.iter().find(|p| p.puuid == puuid)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TftInfoDto {
    pub game_datetime: i64,
    pub game_length: f64,
    pub queue_id: i32,
    #[serde(default)]
    pub tft_set_number: i32,
    pub participants: Vec<TftParticipantDto>,
}

impl TftInfoDto {
    pub fn duration_formatted(&self) -> String {
        let total = self.game_length.max(0.0) as i64;
        format!("{}:{:02}", total / 60, total % 60)
    }

    pub fn queue_name(&self) -> &'static str {
        match self.queue_id {
            1090 => "Normal TFT",
            1100 => "Ranked TFT",
            1130 => "Hyper Roll",
            1160 => "Double Up",
            _ => "TFT",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TftParticipantDto {
    pub puuid: String,
    pub placement: u8,
    pub level: u8,
    pub last_round: u16,
    #[serde(default)]
    pub total_damage_to_players: u32,
}

impl TftParticipantDto {
    pub fn placement_ordinal(&self) -> String {
        let suffix = match self.placement {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        };
        format!("{}{}", self.placement, suffix)
    }

    /// Top four is a win in TFT.
    pub fn is_top_four(&self) -> bool {
        self.placement <= 4
    }
}

// ============================================================================
// Unified match detail
// ============================================================================

/// Full detail of a finished match, whatever the mode.
#[derive(Debug, Clone)]
pub enum MatchDetail {
    Lol(MatchDto),
    Tft(TftMatchDto),
}

impl MatchDetail {
    pub fn mode(&self) -> GameMode {
        match self {
            Self::Lol(_) => GameMode::Lol,
            Self::Tft(_) => GameMode::Tft,
        }
    }

    pub fn match_id(&self) -> &str {
        match self {
            Self::Lol(m) => &m.metadata.match_id,
            Self::Tft(m) => &m.metadata.match_id,
        }
    }

    pub fn queue_name(&self) -> &'static str {
        match self {
            Self::Lol(m) => m.info.queue_name(),
            Self::Tft(m) => m.info.queue_name(),
        }
    }
}
