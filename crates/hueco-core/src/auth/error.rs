use thiserror::Error;

/// Failure reading or writing persisted tokens.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Token file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Token file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Keychain access failed: {0}")]
    Keychain(#[from] keyring::Error),

    #[error("Token storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Why a refresh-token exchange did not produce a new access token.
///
/// These never reach API callers; the coordinator clears the session and the
/// original 401 is what surfaces.
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("Refresh endpoint rejected the token with status {0}")]
    Rejected(reqwest::StatusCode),

    #[error("Refresh request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("Failed to persist refreshed token: {0}")]
    Persist(#[from] StoreError),
}
