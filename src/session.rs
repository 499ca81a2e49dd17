//src/session.rs
//! Tokens and the device identifier kept between runs.
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

const SESSION_FILE_NAME: &str = "session.toml";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("I/O error accessing session file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse session file (TOML): {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize session data (TOML): {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// The session file lives next to the config file.
pub fn session_path_for(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map_or_else(|| PathBuf::from(SESSION_FILE_NAME), |dir| dir.join(SESSION_FILE_NAME))
}

/// Tokens are readable by the owner only.
fn owner_only_options() -> fs::OpenOptions {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}

impl Session {
    /// A signed-out session with a newly generated device id.
    pub fn create() -> Self {
        Self {
            device_id: Uuid::new_v4().to_string(),
            access_token: None,
            refresh_token: None,
        }
    }

    /// Reads the session file, creating and saving a new one when absent.
    /// The device id is generated once and reused afterwards.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let mut session: Self = toml::from_str(&content)?;
            if session.device_id.trim().is_empty() {
                session.device_id = Uuid::new_v4().to_string();
                session.save(path)?;
            }
            debug!(authenticated = session.is_authenticated(), "loaded session");
            Ok(session)
        } else {
            let session = Self::create();
            info!(device_id = %session.device_id, "created new device session");
            session.save(path)?;
            Ok(session)
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        if let Some(parent_dir) = path.parent() {
            if !parent_dir.exists() {
                fs::create_dir_all(parent_dir)?;
            }
        }
        let content = toml::to_string_pretty(self)?;
        let mut file = owner_only_options().open(path)?;
        // mode() above only applies when the file is created
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(content.as_bytes())?;
        Ok(())
    }

    pub fn set_tokens(&mut self, access_token: String, refresh_token: String) {
        self.access_token = Some(access_token);
        self.refresh_token = Some(refresh_token);
    }

    /// Signs out. The device id survives.
    pub fn clear(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
    }

    pub const fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }
}
