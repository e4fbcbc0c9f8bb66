use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Telegram error: {0}")]
    Telegram(String),

    #[error("command error: {0}")]
    Command(String),

    #[error("relay error: {0}")]
    Relay(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
