use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClamberError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
