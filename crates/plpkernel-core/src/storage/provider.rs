use std::fmt::Debug;
use std::path::{Path, PathBuf};

use crate::kernel::error::Result;

/// Filesystem operations the kernel and its bootstrap services rely on
pub trait StorageProvider: Send + Sync + Debug {
    /// Get the name of this provider
    fn name(&self) -> &str;

    /// Check if a path exists
    fn exists(&self, path: &Path) -> bool;

    /// Check if a path is a file
    fn is_file(&self, path: &Path) -> bool;

    /// Check if a path is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Create a directory and all its parent directories
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read a file to a string
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Replace the contents of a file, creating it if needed
    fn write_string(&self, path: &Path, contents: &str) -> Result<()>;

    /// Append to a file, creating it if needed
    fn append_string(&self, path: &Path, contents: &str) -> Result<()>;

    /// Size of a file in bytes
    fn file_len(&self, path: &Path) -> Result<u64>;

    /// List all entries in a directory
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
}
