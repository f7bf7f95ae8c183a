use thiserror::Error;

/// Everything that can go wrong while talking to the catalog.
///
/// Nothing is retried internally; an empty listing is `Ok(vec![])`, never an error.
#[derive(Debug, Error)]
pub enum MubiError {
    /// The login form or the page after submitting it did not look as expected.
    #[error("login failed: {0}")]
    Auth(String),

    /// A page or JSON document no longer has the shape the parser relies on.
    #[error("unexpected response shape: {0}")]
    Scrape(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("film {0} is not available to watch in this region")]
    NotAvailable(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for MubiError {
    fn from(err: serde_json::Error) -> Self {
        MubiError::Scrape(format!("malformed JSON: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, MubiError>;
