use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("role is required to record a message")]
    MissingRole,

    #[error("content is required to record a message")]
    MissingContent,

    #[error("no segment is in progress")]
    NoActiveSegment,

    #[error("chat completion failed: {0}")]
    ChatCompletion(String),
}

pub type SessionResult<T> = Result<T, SessionError>;
