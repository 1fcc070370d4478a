use blinko_client::BlinkoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Blinko(#[from] BlinkoError),
    #[error("nothing to save for user {0}")]
    EmptySession(String),
}

pub type BotResult<T> = Result<T, BotError>;
