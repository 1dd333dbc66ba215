use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::store::{Credentials, TokenStorage};
use super::StoreError;

/// Token file name in the data directory
const TOKEN_FILE: &str = "tokens.json";

#[derive(Debug, Serialize, Deserialize)]
struct TokenFile {
    access_token: Option<String>,
    refresh_token: Option<String>,
    updated_at: DateTime<Utc>,
}

/// Persists the token pair as JSON in the app data directory.
pub struct FileTokenStorage {
    data_dir: PathBuf,
}

impl FileTokenStorage {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// When the tokens were last written, if a token file exists.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        let contents = std::fs::read_to_string(self.token_path()).ok()?;
        let file: TokenFile = serde_json::from_str(&contents).ok()?;
        Some(file.updated_at)
    }

    fn token_path(&self) -> PathBuf {
        self.data_dir.join(TOKEN_FILE)
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self) -> Result<Credentials, StoreError> {
        let path = self.token_path();
        if !path.exists() {
            return Ok(Credentials::default());
        }

        let contents = std::fs::read_to_string(&path)?;
        let file: TokenFile = serde_json::from_str(&contents)?;
        Ok(Credentials::new(file.access_token, file.refresh_token))
    }

    fn persist(&mut self, credentials: &Credentials) -> Result<(), StoreError> {
        let path = self.token_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = TokenFile {
            access_token: credentials.access.clone(),
            refresh_token: credentials.refresh.clone(),
            updated_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&file)?;

        // Write-then-rename so a crash never leaves half a token file
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(tmp, path)?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        let path = self.token_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}
