use onetrick_settings::SettingsError;
use onetrick_store::StoreError;

/// Failure reported by an upstream collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("malformed provider data: {0}")]
    Malformed(String),

    #[error("not found upstream: {0}")]
    NotFound(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("startup failed: {0}")]
    Startup(String),

    #[error("{0}")]
    Internal(String),
}
