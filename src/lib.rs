//! Discord bot posting League of Legends and TFT match results of tracked
//! players.

pub mod alert;
pub mod config;
pub mod discord;
pub mod error;
pub mod logging;
pub mod poller;
pub mod registry;
pub mod riot;

#[cfg(test)]
pub(crate) mod testing;
