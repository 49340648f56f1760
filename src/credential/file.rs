//! File-backed credential store for native front ends.
//!
//! The record mirrors a browser cookie: name, value, path and an absolute
//! expiry. The medium enforces that expiry on read.

#[cfg(test)]
#[path = "file_test.rs"]
mod file_test;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{CredentialStore, SignedToken, StorageError};

#[derive(Debug, Serialize, Deserialize)]
struct CookieRecord {
    name: String,
    value: String,
    path: String,
    /// Seconds since the Unix epoch.
    expires_at: i64,
}

#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    cookie_name: String,
    cookie_path: String,
    /// Serializes file access within this process.
    io: Mutex<()>,
}

impl FileCredentialStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, cookie_name: &str, cookie_path: &str) -> Self {
        Self {
            path: path.into(),
            cookie_name: cookie_name.to_owned(),
            cookie_path: cookie_path.to_owned(),
            io: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_at(&self, now: OffsetDateTime) -> Result<Option<SignedToken>, StorageError> {
        let _guard = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: CookieRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable credential record");
                return Ok(None);
            }
        };
        if record.name != self.cookie_name || record.value.is_empty() {
            return Ok(None);
        }
        if record.expires_at <= now.unix_timestamp() {
            tracing::debug!(path = %self.path.display(), "stored credential expired");
            return Ok(None);
        }
        Ok(Some(SignedToken::new(record.value)))
    }

    fn write_at(&self, token: &SignedToken, ttl: Duration, now: OffsetDateTime) -> Result<(), StorageError> {
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let record = CookieRecord {
            name: self.cookie_name.clone(),
            value: token.as_str().to_owned(),
            path: self.cookie_path.clone(),
            expires_at: now.unix_timestamp().saturating_add(ttl_secs),
        };
        let body = serde_json::to_vec_pretty(&record)?;

        let _guard = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a crash never leaves a half-written record.
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn put(&self, token: &SignedToken, ttl: Duration) -> Result<(), StorageError> {
        self.write_at(token, ttl, OffsetDateTime::now_utc())
    }

    fn get(&self) -> Result<Option<SignedToken>, StorageError> {
        self.read_at(OffsetDateTime::now_utc())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
