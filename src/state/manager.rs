//! Durable checkpoint store, one JSON file per (provider, organization)

use std::path::{Path, PathBuf};

use super::error::StateError;
use super::run_state::{RunSettings, RunState};
use crate::utils::atomic_write;

const STATE_EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct StateManager {
    dir: PathBuf,
}

impl StateManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Checkpoint file for `provider`/`organization`
    ///
    /// The two parts are joined with `@`, which [`sanitize`] never emits.
    pub fn path_for(&self, provider: &str, organization: &str) -> PathBuf {
        self.dir.join(format!(
            "{}@{}.{STATE_EXTENSION}",
            sanitize(provider),
            sanitize(organization)
        ))
    }

    /// Builds a fresh running state; nothing is written until [`StateManager::save`]
    pub fn create(
        &self,
        provider: &str,
        organization: &str,
        target_path: &Path,
        settings: RunSettings,
        repositories: Vec<String>,
    ) -> RunState {
        RunState::new(provider, organization, target_path, settings, repositories)
    }

    pub fn load(&self, provider: &str, organization: &str) -> Result<RunState, StateError> {
        let path = self.path_for(provider, organization);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::NotFound {
                    provider: provider.to_string(),
                    organization: organization.to_string(),
                });
            }
            Err(source) => return Err(StateError::Io { path, source }),
        };
        let state = serde_json::from_str(&text).map_err(|source| StateError::Corrupt {
            path: path.clone(),
            source,
        })?;
        tracing::debug!("loaded checkpoint {}", path.display());
        Ok(state)
    }

    /// Persists `state` atomically
    pub fn save(&self, state: &RunState) -> Result<(), StateError> {
        let path = self.path_for(&state.provider, &state.organization);
        let json = serde_json::to_vec_pretty(state).map_err(StateError::Encode)?;
        atomic_write(&path, &json).map_err(|source| StateError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(
            pending = state.pending.len(),
            completed = state.completed.len(),
            failed = state.failed.len(),
            "saved checkpoint {}",
            path.display()
        );
        Ok(())
    }

    pub fn has(&self, provider: &str, organization: &str) -> bool {
        self.path_for(provider, organization).is_file()
    }

    /// Removes a checkpoint; removing a missing one is not an error
    pub fn delete(&self, provider: &str, organization: &str) -> Result<(), StateError> {
        let path = self.path_for(provider, organization);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("deleted checkpoint {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StateError::Io { path, source }),
        }
    }

    /// Every readable checkpoint in the directory; unreadable files are skipped
    pub fn list(&self) -> Result<Vec<RunState>, StateError> {
        let mut states = Vec::new();
        for path in self.checkpoint_files()? {
            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|text| serde_json::from_str::<RunState>(&text).map_err(|e| e.to_string()));
            match parsed {
                Ok(state) => states.push(state),
                Err(e) => tracing::warn!("skipping unreadable checkpoint {}: {e}", path.display()),
            }
        }
        states.sort_by(|a, b| (&a.provider, &a.organization).cmp(&(&b.provider, &b.organization)));
        Ok(states)
    }

    /// Deletes every checkpoint file; returns how many were removed
    pub fn clean_all(&self) -> Result<usize, StateError> {
        let files = self.checkpoint_files()?;
        for path in &files {
            std::fs::remove_file(path).map_err(|source| StateError::Io {
                path: path.clone(),
                source,
            })?;
        }
        Ok(files.len())
    }

    fn checkpoint_files(&self) -> Result<Vec<PathBuf>, StateError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StateError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().is_some_and(|ext| ext == STATE_EXTENSION)
                    && !path
                        .file_name()
                        .is_some_and(|name| name.to_string_lossy().starts_with('.'))
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}
