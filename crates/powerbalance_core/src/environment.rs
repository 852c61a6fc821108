//! Ownership of scratch directories created during a session.
//!
//! Rewritten model sources and extended model directories live in temporary
//! directories that must outlive the builds using them. The environment keeps
//! each one alive until it is dropped, at which point they are removed.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

#[derive(Debug, Default)]
pub struct Environment {
    scratch: Vec<TempDir>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new scratch directory and return its path
    pub fn scratch_dir(&mut self, prefix: &str) -> io::Result<PathBuf> {
        let dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
        let path = dir.path().to_path_buf();
        tracing::debug!("created scratch directory {}", path.display());
        self.scratch.push(dir);
        Ok(path)
    }

    /// Number of scratch directories currently held
    pub fn scratch_count(&self) -> usize {
        self.scratch.len()
    }

    pub fn scratch_paths(&self) -> impl Iterator<Item = &Path> {
        self.scratch.iter().map(TempDir::path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_directories_are_removed_on_drop() {
        let mut env = Environment::new();
        let path = env.scratch_dir("pbm_test_").unwrap();
        assert!(path.is_dir());
        assert_eq!(env.scratch_count(), 1);

        drop(env);
        assert!(!path.exists());
    }
}
