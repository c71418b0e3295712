pub mod setting;

use anyhow::{Context, Result};
use std::path::PathBuf;
use which::which;

/// Finds the mysqldump executable in the system PATH.
pub fn find_mysqldump_executable() -> Result<PathBuf> {
    which("mysqldump").context("mysqldump executable not found in PATH. Please ensure MySQL client tools are installed and in your PATH.")
}
