mod config;
mod list;
mod track;
mod untrack;

pub use config::config;
pub use list::list;
pub use track::track;
pub use untrack::untrack;
