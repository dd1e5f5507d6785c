use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("No element found: {0}")]
    NoElementFound(String),

    #[error("Transport timeout on {route} after {attempts} attempts")]
    TransportTimeout { route: String, attempts: u32 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote failure: {0}")]
    RemoteFailure(String),

    #[error("Stale element handle: {0}")]
    StaleHandle(String),

    #[error("Unsupported by driver: {0}")]
    Unsupported(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template cache error: {0}")]
    Cache(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Could not locate '{label}': {message}")]
    Exhausted { label: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl LocatorError {
    /// Timeouts and dropped connections are worth another attempt; everything
    /// else is surfaced to the caller as-is.
    pub fn is_retryable(&self) -> bool {
        match self {
            LocatorError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || is_connection_drop(e)
            }
            LocatorError::TransportTimeout { .. } => true,
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            LocatorError::Http(e) => e.is_timeout(),
            LocatorError::TransportTimeout { .. } => true,
            _ => false,
        }
    }
}

/// Reset, aborted or half-read connections anywhere in the source chain.
fn is_connection_drop(e: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(e);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        source = err.source();
    }
    false
}

impl From<image::ImageError> for LocatorError {
    fn from(e: image::ImageError) -> Self {
        LocatorError::Image(e.to_string())
    }
}

impl serde::Serialize for LocatorError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type LocatorResult<T> = Result<T, LocatorError>;
