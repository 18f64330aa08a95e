use thiserror::Error;

use crate::registry::RegistryError;
use crate::riot::RiotApiError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Riot API error: {0}")]
    RiotApi(RiotApiError),

    #[error("The Riot API is busy right now, please try again in a minute")]
    RiotUnavailable,

    #[error("Discord error: {0}")]
    Discord(Box<serenity::Error>),

    #[error("Player not found: {game_name}#{tag_line}")]
    PlayerNotFound { game_name: String, tag_line: String },

    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("You are not tracking any account in this server")]
    NotTracked,
}

impl From<serenity::Error> for AppError {
    fn from(err: serenity::Error) -> Self {
        AppError::Discord(Box::new(err))
    }
}

impl From<RiotApiError> for AppError {
    fn from(err: RiotApiError) -> Self {
        if err.is_unavailable() {
            AppError::RiotUnavailable
        } else {
            AppError::RiotApi(err)
        }
    }
}
