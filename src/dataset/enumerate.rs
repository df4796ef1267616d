//! Work enumeration over the dataset tree.
//!
//! Units live exactly two levels below the root
//! (`<root>/<TASK>/<TASK>_<TOPIC>_<ordinal>/`). Enumeration is lazy, finite,
//! restartable and in lexical order so repeated sweeps visit units in the
//! same sequence.

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use super::store::UnitDir;
use crate::categories::TaskCode;

/// Walks the dataset root and yields unit directories.
#[derive(Debug, Clone)]
pub struct WorkEnumerator {
    root: PathBuf,
    tasks: Option<Vec<TaskCode>>,
}

impl WorkEnumerator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tasks: None,
        }
    }

    /// Restricts the walk to the given task-category directories.
    pub fn with_tasks(mut self, tasks: Vec<TaskCode>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns a fresh lazy iterator over unit directories.
    ///
    /// Each call restarts from the top of the tree. Category directories
    /// are visited (and pruned by the task filter) but never yielded.
    /// Unreadable entries are logged and skipped.
    pub fn units(&self) -> impl Iterator<Item = UnitDir> + '_ {
        WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| entry.depth() != 1 || self.accepts_category(entry))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(error) => {
                    warn!(error = %error, "Skipping unreadable dataset entry");
                    None
                }
            })
            .filter(|entry| entry.depth() == 2 && entry.file_type().is_dir())
            .map(|entry| UnitDir::new(entry.into_path()))
    }

    fn accepts_category(&self, entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() {
            return false;
        }
        match &self.tasks {
            None => true,
            Some(tasks) => {
                let name = entry.file_name().to_string_lossy();
                tasks.iter().any(|task| task.code() == name)
            }
        }
    }
}
