use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpoolError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Invalid scenario: {0}")]
    ScenarioError(String),
    #[error("Slot pool error: {0}")]
    PoolError(#[from] slotpool::Error),
}

impl From<toml::de::Error> for SpoolError {
    fn from(error: toml::de::Error) -> Self {
        Self::DeserializationError(error.to_string())
    }
}

impl From<String> for SpoolError {
    fn from(e: String) -> Self {
        Self::ScenarioError(e)
    }
}
