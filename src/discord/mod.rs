mod bot;
pub mod commands;
mod transport;

pub use bot::{Context, Data, create_framework};
pub use transport::DiscordTransport;
