use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClerkError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid instance reference: {0}")]
    InvalidInstance(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Received non-success status {status} while fetching backup")]
    FetchStatus { status: u16 },

    #[error("Export of backup {backup_id} failed: {message}")]
    Export { backup_id: String, message: String },

    #[error("Export of backup {backup_id} not ready after {attempts} status checks")]
    ExportTimeout { backup_id: String, attempts: u32 },

    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

impl ClerkError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClerkError::Cancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, ClerkError>;
