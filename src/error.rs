use poise::serenity_prelude as serenity;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("verification token expired")]
    Expired,

    #[error("verification token invalid")]
    InvalidToken,

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("external service failure: {0}")]
    ExternalService(String),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Discord API error: {0}")]
    Discord(#[from] serenity::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BotError {
    /// Message shown to the requester when a command surfaces this error.
    pub fn user_message(&self) -> String {
        match self {
            BotError::NotFound(what) => format!("❌ {} was not found.", what),
            BotError::Expired => {
                "❌ That verification code has expired. Start over to get a new one.".to_string()
            }
            BotError::InvalidToken => {
                "❌ That verification code is not valid for your pending request.".to_string()
            }
            BotError::AlreadyExists(what) => format!("❌ {}.", what),
            BotError::PermissionDenied(what) => format!("❌ You are not allowed to {}.", what),
            BotError::ExternalService(_) | BotError::Http(_) => {
                "❌ An external service is unavailable right now. Please try again later."
                    .to_string()
            }
            BotError::Database(_) | BotError::Discord(_) => {
                "❌ Something went wrong on our side. Please try again.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
