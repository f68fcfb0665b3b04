// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Learner state-file names.

use serde::{Deserialize, Serialize};

/// Name of a learner's state file, the ledger's primary key.
///
/// A learner is keyed either by a single path or by an ordered group of
/// paths (composite learners spanning several state files). The distinction
/// is preserved through the ledger and over the wire: whatever form was
/// used at init is the form handed back to the worker that claims it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LearnerName {
    /// A single state file.
    Single(String),
    /// An ordered group of state files forming one unit of work.
    Group(Vec<String>),
}

impl LearnerName {
    /// All paths behind this name, in order.
    pub fn paths(&self) -> &[String] {
        match self {
            LearnerName::Single(path) => std::slice::from_ref(path),
            LearnerName::Group(paths) => paths,
        }
    }
}

impl std::fmt::Display for LearnerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LearnerName::Single(path) => write!(f, "{path}"),
            LearnerName::Group(paths) => write!(f, "[{}]", paths.join(", ")),
        }
    }
}

impl From<String> for LearnerName {
    fn from(path: String) -> Self {
        LearnerName::Single(path)
    }
}

impl From<&str> for LearnerName {
    fn from(path: &str) -> Self {
        LearnerName::Single(path.to_string())
    }
}

impl From<Vec<String>> for LearnerName {
    fn from(paths: Vec<String>) -> Self {
        LearnerName::Group(paths)
    }
}

impl From<&[&str]> for LearnerName {
    fn from(paths: &[&str]) -> Self {
        LearnerName::Group(paths.iter().map(|p| p.to_string()).collect())
    }
}

#[cfg(test)]
#[path = "fname_tests.rs"]
mod tests;
