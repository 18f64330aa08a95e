//! Persistent registries: which Discord user tracks which Riot account, and
//! where each guild wants its alerts.

mod accounts;
mod guilds;
mod models;
mod store;

use std::{io, path::PathBuf};

use thiserror::Error;

pub use accounts::AccountRegistry;
pub use guilds::GuildConfigRegistry;
pub use models::{Registration, TrackedAccount};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to persist {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to encode registry: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Registry write interrupted: {0}")]
    Interrupted(String),
}
