use thiserror::Error as ThisError;

/// Errors raised while talking to a server's integration API.
#[derive(ThisError, Debug)]
pub enum IntegrationError {
    #[error("Connection refused: {0}")]
    Connect(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("I/O error during request: {0}")]
    Io(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Server returned HTTP {status}")]
    Http { status: u16 },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Server rejected request: {0}")]
    Rejected(String),
}

impl IntegrationError {
    /// Connection refused or timed out. The server is likely unreachable.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout(_))
    }

    /// Failures that leave registration state untouched and are retried on
    /// the next pass.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::Timeout(_) | Self::Io(_) | Self::Cancelled
        )
    }
}

impl From<reqwest::Error> for IntegrationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Http {
                status: status.as_u16(),
            }
        } else if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Io(e.to_string())
        }
    }
}

/// Errors raised by a sensor manager while computing a value.
#[derive(ThisError, Debug)]
pub enum SensorError {
    #[error("Failed to read sensor source: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse sensor value: {0}")]
    Parse(String),

    #[error("Sensor store error: {0}")]
    Store(String),
}

impl From<SyncError> for SensorError {
    fn from(e: SyncError) -> Self {
        Self::Store(e.to_string())
    }
}

#[derive(ThisError, Debug)]
pub enum SyncError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unknown server: {0}")]
    UnknownServer(u32),

    #[error("Unknown sensor: {0}")]
    UnknownSensor(String),

    #[error(transparent)]
    Integration(#[from] IntegrationError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
