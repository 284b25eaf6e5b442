use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("api call rejected: {0}")]
    Api(String),

    #[error("file upload failed: {0}")]
    Upload(String),

    #[error("message send failed: {0}")]
    SendFailed(String),

    #[error("response parse error: {0}")]
    ParseError(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}
