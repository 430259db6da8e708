//! Utility functions for text cleanup, logging and the file system.
//!
//! - String truncation and whitespace normalization for logs and scraped text
//! - Output directory validation
//! - [`SessionLock`], which keeps two crawl runs from overlapping

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::error::LockError;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a char boundary) with
/// `"…(+N bytes)"` appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn normalize_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

/// A held lock file. Only one crawl run may hold it at a time.
///
/// The file holds the owning process id and is removed when the lock is
/// dropped. A crashed run leaves the file behind; delete it by hand.
#[derive(Debug)]
pub struct SessionLock {
    path: PathBuf,
}

impl SessionLock {
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let path = path.as_ref().to_path_buf();
        let file = stdfs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path);
        match file {
            Ok(mut file) => {
                use std::io::Write;
                if let Err(e) = writeln!(file, "{}", std::process::id()) {
                    warn!(error = %e, "Could not record pid in lock file");
                }
                debug!("Acquired session lock");
                Ok(Self { path })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(LockError::Held(path)),
            Err(e) => Err(LockError::Io(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Err(e) = stdfs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Could not remove lock file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        // "ư" is two bytes; cutting at 3 would split it.
        let result = truncate_for_log("Thư viện", 3);
        assert_eq!(result, "Th…(+9 bytes)");
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  Storm \n\t reaches   coast "), "Storm reaches coast");
        assert_eq!(normalize_whitespace("   "), "");
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("out").join("nested");
        ensure_writable_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_session_lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("newsdesk.lock");

        let lock = SessionLock::acquire(&path).unwrap();
        assert!(lock.path().exists());
        assert!(matches!(SessionLock::acquire(&path), Err(LockError::Held(_))));

        drop(lock);
        assert!(!path.exists());
        let again = SessionLock::acquire(&path).unwrap();
        drop(again);
    }
}
