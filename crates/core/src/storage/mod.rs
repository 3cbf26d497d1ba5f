pub mod codec;
pub mod repair;

use crate::domain::Document;
use crate::history::PriorState;
use anyhow::Context;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Outcome of reading the persisted document at the start of a run.
#[derive(Debug)]
pub enum LoadedState {
    /// No file yet: first run.
    Fresh,
    /// The file was read; `repaired` counts the anomalies that were recovered.
    Existing { state: PriorState, repaired: usize },
}

impl LoadedState {
    pub fn prior(&self) -> Option<&PriorState> {
        match self {
            LoadedState::Fresh => None,
            LoadedState::Existing { state, .. } => Some(state),
        }
    }
}

/// Single-file home of the persisted document.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    path: PathBuf,
}

impl DocumentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the prior state. Never fails: unreadable or damaged files degrade to an
    /// empty history and are logged as warnings.
    pub fn load(&self) -> LoadedState {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no persisted document; starting fresh");
                return LoadedState::Fresh;
            }
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to read persisted document; treating history as empty"
                );
                return LoadedState::Existing {
                    state: PriorState::default(),
                    repaired: 1,
                };
            }
        };

        let recovered = repair::recover_history(&bytes);
        for issue in &recovered.issues {
            tracing::warn!(path = %self.path.display(), error = %issue, "recovered persisted state");
        }

        LoadedState::Existing {
            state: recovered.state,
            repaired: recovered.issues.len(),
        }
    }

    /// Replaces the persisted document atomically.
    ///
    /// The bytes go to a temp file in the target directory which is synced and then
    /// renamed over the target, so readers see either the old or the new document.
    pub fn save(&self, document: &Document) -> anyhow::Result<()> {
        let bytes = codec::serialize(document)?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".document-")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .with_context(|| format!("failed to create temp file in {}", dir.display()))?;

        tmp.write_all(&bytes).context("failed to write temp document")?;
        tmp.as_file()
            .sync_all()
            .context("failed to sync temp document")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))
                .context("failed to set document permissions")?;
        }

        tmp.persist(&self.path)
            .map_err(|err| err.error)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;

        tracing::debug!(path = %self.path.display(), bytes = bytes.len(), "document written");
        Ok(())
    }
}
