//! Testing utilities and fixtures for shale's cloud storage layer
//!
//! This crate provides common testing utilities, fixtures, and helpers
//! for exercising cloud environments and storage providers hermetically.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub mod fixtures;

/// Creates a temporary test directory with cleanup on drop
pub struct TestDir {
    dir: TempDir,
}

impl TestDir {
    /// Creates a new temporary test directory
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    /// Returns the path to the temporary directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Creates a file with the given name and content in the test directory
    pub fn create_file(&self, name: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Reads a file from the test directory
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.dir.path().join(name))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_dir() {
        let test_dir = TestDir::new().unwrap();
        assert!(test_dir.path().exists());
    }

    #[test]
    fn test_create_and_read_file() {
        let test_dir = TestDir::new().unwrap();
        let file_path = test_dir.create_file("a/b.txt", b"Hello, World!").unwrap();
        assert!(file_path.exists());
        assert_eq!(test_dir.read_file("a/b.txt").unwrap(), b"Hello, World!");
    }
}
