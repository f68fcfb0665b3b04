// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable, insertion-ordered table of learner rows, keyed by learner name.
//!
//! Each row is a single line of JSON so operators can inspect the file
//! with ordinary tools. Row order matches the init-time learner list and
//! determines claim priority. Every mutation is rewritten atomically
//! (write to `.tmp`, fsync, rename, fsync directory) before it is
//! acknowledged, so an acknowledged write survives a crash.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use stint_core::{JobId, LearnerEntry, LearnerName};
use thiserror::Error;
use tracing::debug;

/// Errors from ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger at {} already exists; pass overwrite to recreate it", .0.display())]
    AlreadyInitialized(PathBuf),

    #[error("no ledger at {}; initialize it first", .0.display())]
    Uninitialized(PathBuf),

    #[error("corrupt ledger row at {}:{}: {}", path.display(), line, message)]
    Corrupt {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The durable learner table.
///
/// All mutations go through [`Ledger::update`], which persists before
/// returning. The caller is responsible for serialising writers; the
/// ledger itself only guarantees crash consistency.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    rows: IndexMap<LearnerName, LearnerEntry>,
}

impl Ledger {
    /// Create a new ledger with one fresh row per name, in the given order.
    ///
    /// Fails with [`LedgerError::AlreadyInitialized`] if the backing file
    /// already holds data and `overwrite` is false.
    pub fn init(
        path: impl Into<PathBuf>,
        fnames: &[LearnerName],
        overwrite: bool,
    ) -> Result<Self, LedgerError> {
        let path = path.into();

        if !overwrite {
            if let Ok(meta) = fs::metadata(&path) {
                if meta.len() > 0 {
                    return Err(LedgerError::AlreadyInitialized(path));
                }
            }
        }

        let rows = fnames
            .iter()
            .map(|fname| (fname.clone(), LearnerEntry::fresh(fname.clone())))
            .collect();

        let ledger = Self { path, rows };
        ledger.persist()?;
        debug!(path = %ledger.path.display(), rows = ledger.rows.len(), "ledger initialized");
        Ok(ledger)
    }

    /// Open a ledger written by a previous run and resume against it.
    ///
    /// A row that fails to parse is not recoverable: the error names the
    /// offending line so the operator can repair or recreate the file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(LedgerError::Uninitialized(path));
            }
            Err(e) => return Err(e.into()),
        };

        let mut rows = IndexMap::new();
        for (idx, raw) in contents.lines().enumerate() {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            let entry: LearnerEntry =
                serde_json::from_str(trimmed).map_err(|e| LedgerError::Corrupt {
                    path: path.clone(),
                    line: idx + 1,
                    message: e.to_string(),
                })?;
            rows.insert(entry.fname.clone(), entry);
        }

        debug!(path = %path.display(), rows = rows.len(), "ledger opened");
        Ok(Self { path, rows })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows, in insertion order.
    pub fn entries(&self) -> Vec<LearnerEntry> {
        self.rows.values().cloned().collect()
    }

    pub fn get(&self, fname: &LearnerName) -> Option<&LearnerEntry> {
        self.rows.get(fname)
    }

    /// First row with no owner and not done, in insertion order.
    pub fn find_first_free(&self) -> Option<&LearnerEntry> {
        self.rows.values().find(|entry| entry.is_free())
    }

    /// The row currently claimed by `job_id`, if any.
    pub fn find_by_job(&self, job_id: &JobId) -> Option<&LearnerEntry> {
        self.rows
            .values()
            .find(|entry| entry.job_id.as_ref() == Some(job_id))
    }

    /// Apply a mutation to the row with the given key and flush it.
    ///
    /// Returns `false` without touching the file when no row matches.
    /// On success the change is durable before this returns; on a failed
    /// flush the row is restored, so an error reply never leaves a
    /// half-applied claim behind.
    pub fn update(
        &mut self,
        fname: &LearnerName,
        apply: impl FnOnce(&mut LearnerEntry),
    ) -> Result<bool, LedgerError> {
        let Some(entry) = self.rows.get_mut(fname) else {
            return Ok(false);
        };
        let backup = entry.clone();
        apply(entry);
        if let Err(e) = self.persist() {
            if let Some(entry) = self.rows.get_mut(fname) {
                *entry = backup;
            }
            return Err(e);
        }
        Ok(true)
    }

    /// Count of finished learners.
    pub fn n_done(&self) -> usize {
        self.rows.values().filter(|entry| entry.is_done).count()
    }

    /// Rows that ran at least once but were released without finishing —
    /// the learners whose jobs crashed or were killed.
    pub fn failed(&self) -> Vec<LearnerEntry> {
        self.rows
            .values()
            .filter(|entry| entry.was_claimed && !entry.is_done && entry.job_id.is_none())
            .cloned()
            .collect()
    }

    /// Rewrite the backing file atomically: tmp write, fsync, rename,
    /// directory fsync. The rename is the commit point.
    fn persist(&self) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            for entry in self.rows.values() {
                serde_json::to_writer(&mut writer, entry)?;
                writer.write_all(b"\n")?;
            }
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                File::open(parent)?.sync_all()?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "ledger_tests.rs"]
mod tests;
