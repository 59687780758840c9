use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpotexError {
    #[error("no valid credentials: {0}")]
    Credentials(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("http request failed: {0}")]
    Http(String),
    #[error("provider api error {code}: {message}")]
    Api { code: String, message: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("internal error: {0}")]
    InternalError(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SpotexError {
    /// Short machine-readable kind, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Credentials(_) => "credentials",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Http(_) => "http",
            Self::Api { .. } => "api",
            Self::Decode(_) => "decode",
            Self::InternalError(_) => "internal",
            Self::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, SpotexError>;
