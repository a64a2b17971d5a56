//! Persistence of the conversation thread id between runs.
//!
//! The id is stored as a single line of text. With no path configured the
//! store is a no-op and every run starts a new conversation.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{AppError, Result};

/// File-backed holder of the current thread id.
#[derive(Debug, Clone, Default)]
pub struct ThreadStore {
    path: Option<PathBuf>,
}

impl ThreadStore {
    /// Store backed by `path`, or a no-op store when `None`.
    #[must_use]
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the persisted id. A missing or blank file yields `None`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if the file exists but cannot be read.
    pub fn load(&self) -> Result<Option<String>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };

        match fs::read_to_string(path) {
            Ok(raw) => {
                let id = raw.trim();
                Ok((!id.is_empty()).then(|| id.to_owned()))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(AppError::Io(format!(
                "failed to read thread file {}: {err}",
                path.display()
            ))),
        }
    }

    /// Persist `thread_id`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if the file cannot be written.
    pub fn save(&self, thread_id: &str) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                AppError::Io(format!("failed to create {}: {err}", parent.display()))
            })?;
        }

        fs::write(path, format!("{thread_id}\n")).map_err(|err| {
            AppError::Io(format!("failed to write thread file {}: {err}", path.display()))
        })?;
        debug!(path = %path.display(), thread_id, "thread id saved");
        Ok(())
    }

    /// Remove the persisted id. Removing a missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AppError::Io(format!(
                "failed to remove thread file {}: {err}",
                path.display()
            ))),
        }
    }
}
