pub mod bot;
pub mod commands;
pub mod config;
pub mod error;
pub mod render;
pub mod responses;
pub mod session;
pub mod strategy;

pub use bot::{BotEvent, IncomingMessage, NoteBot, Reply};
pub use config::{load_settings, Settings};
pub use error::{BotError, BotResult};
pub use render::{HtmlFileRenderer, HtmlRenderer};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
