//! BodyStore configuration with environment variable and file-based loading.
//!
//! Environment variables:
//! - `RELAY_BODYSTORE_PATH`: base path for staged bodies
//!
//! Default path: `~/.relay/bodystore`

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyStoreConfig {
    /// Base path; requests stored under `{base}/requests/`, responses under
    /// `{base}/responses/`.
    pub base_path: PathBuf,
}

impl Default for BodyStoreConfig {
    fn default() -> Self {
        Self {
            base_path: default_bodystore_path(),
        }
    }
}

fn default_bodystore_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".relay").join("bodystore"))
        .unwrap_or_else(|| PathBuf::from(".relay/bodystore"))
}

impl BodyStoreConfig {
    pub fn from_env() -> Self {
        let base_path = env::var("RELAY_BODYSTORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_bodystore_path());
        Self { base_path }
    }

    pub fn with_base_path(path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: path.into(),
        }
    }

    pub fn requests_dir(&self) -> PathBuf {
        self.base_path.join("requests")
    }

    pub fn responses_dir(&self) -> PathBuf {
        self.base_path.join("responses")
    }
}
