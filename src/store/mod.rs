//! Persisted user state (profile, generation history, chat sessions).

pub mod types;

pub use types::*;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::LiveError;

/// Fixed key the user-state blob is stored under.
pub const STATE_KEY: &str = "deepberg_user";

/// Storage abstraction for the user-state blob.
///
/// Missing or unreadable state loads as `None`; it is never fatal.
pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<Option<UserState>, LiveError>;
    fn save(&self, state: &UserState) -> Result<(), LiveError>;
    fn clear(&self) -> Result<(), LiveError>;

    /// Save a signed-in state, or clear storage for a signed-out one.
    fn persist(&self, state: &UserState) -> Result<(), LiveError> {
        if state.is_logged_in {
            self.save(state)
        } else {
            self.clear()
        }
    }
}

/// JSON file store at `<dir>/deepberg_user.json`.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{STATE_KEY}.json")),
        }
    }

    /// Store under the default state directory (`~/.deepberg`).
    pub fn new_default() -> Self {
        Self::new(crate::config::default_state_dir())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<Option<UserState>, LiveError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(LiveError::Io(err)),
        };
        match serde_json::from_str::<UserState>(&raw) {
            Ok(mut state) => {
                // Only signed-in state is ever written.
                state.is_logged_in = true;
                Ok(Some(state))
            }
            Err(error) => {
                warn!(path = %self.path.display(), error = %error, "ignoring unreadable user state");
                Ok(None)
            }
        }
    }

    fn save(&self, state: &UserState) -> Result<(), LiveError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, serialized)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), LiveError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(LiveError::Io(err)),
        }
    }
}
