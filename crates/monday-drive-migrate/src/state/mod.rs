//! Durable progress cursor.
//!
//! The cursor is a single integer in a text file: the count of items from
//! the start of the board whose migration is fully committed. A missing or
//! unparseable file means 0. Writes go through a temp file and an atomic
//! rename so a crash can never leave a torn value; a stale (lower) cursor
//! only costs re-scanning, never data loss, because the duplicate registry
//! absorbs already-migrated items on the next run.

use crate::error::{MigrateError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Count of contiguously committed items, persisted across runs.
pub struct ProgressCursor {
    path: PathBuf,
    offset: usize,
}

impl ProgressCursor {
    /// Load the cursor from `path`. A missing or unparseable file starts
    /// the run from 0; the registry makes restarting from 0 safe, so a
    /// hand-edited or corrupted file degrades to a full re-scan instead of
    /// blocking the run.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let offset = match std::fs::read_to_string(&path) {
            Ok(raw) => match raw.trim().parse::<usize>() {
                Ok(offset) => offset,
                Err(_) => {
                    warn!(
                        path = %path.display(),
                        "State file is not a number, starting from 0"
                    );
                    0
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        if offset > 0 {
            info!(offset, path = %path.display(), "Resuming from saved progress");
        }
        Ok(Self { path, offset })
    }

    /// Current committed-prefix length.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Persist a new committed-prefix length. The cursor is monotonic
    /// within a run; moving it backwards is a logic error upstream and is
    /// rejected rather than silently losing progress.
    pub fn advance_to(&mut self, offset: usize) -> Result<()> {
        if offset < self.offset {
            return Err(MigrateError::State(format!(
                "cursor moved backwards: {} -> {}",
                self.offset, offset
            )));
        }
        if offset == self.offset {
            return Ok(());
        }

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, format!("{}\n", offset))?;
        std::fs::rename(&tmp, &self.path)?;

        debug!(from = self.offset, to = offset, "Advanced progress cursor");
        self.offset = offset;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
