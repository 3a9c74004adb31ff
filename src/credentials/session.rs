//! Session cache for the portal's login cookies.
//!
//! Cookies captured after a successful login are replayed on the next run so
//! the portal skips straight past the login form while the session lasts.
//! This is local-only state and lives under the data directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sessions older than this are reported as expired rather than replayed.
pub const SESSION_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Captured portal session state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    /// Session cookies (name -> value).
    #[serde(default)]
    pub cookies: HashMap<String, String>,

    /// When the session was captured.
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
}

impl SessionData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cookie.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn with_captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = Some(at);
        self
    }

    /// True when the session was captured long enough ago that the portal
    /// will almost certainly bounce it back to the login form.
    pub fn is_expired(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match self.captured_at {
            Some(captured_at) => {
                let age = now.signed_duration_since(captured_at);
                age.num_seconds() < 0 || age.num_seconds() as u64 > max_age.as_secs()
            }
            // Unknown capture time: treat as expired so we re-login.
            None => true,
        }
    }
}

/// File-backed cache for session data.
pub struct SessionCache {
    cache_dir: PathBuf,
}

impl SessionCache {
    /// Create a session cache rooted at the given directory.
    pub fn with_path(cache_dir: impl AsRef<Path>) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create session cache dir: {cache_dir:?}"))?;
        Ok(Self { cache_dir })
    }

    fn session_file(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.json"))
    }

    /// Load session data for a key.
    pub fn get(&self, key: &str) -> Result<Option<SessionData>> {
        let path = self.session_file(key);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read session file: {path:?}"))?;

        let session: SessionData = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {path:?}"))?;

        Ok(Some(session))
    }

    /// Save session data for a key.
    pub fn set(&self, key: &str, session: &SessionData) -> Result<()> {
        let path = self.session_file(key);
        let content =
            serde_json::to_string_pretty(session).context("Failed to serialize session")?;

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write session file: {path:?}"))?;

        Ok(())
    }

    /// Delete session data for a key.
    pub fn delete(&self, key: &str) -> Result<()> {
        let path = self.session_file(key);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete session file: {path:?}"))?;
        }
        Ok(())
    }
}
