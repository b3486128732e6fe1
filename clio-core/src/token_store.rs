//! On-disk token cache.
//!
//! A single JSON file holds the last known Clio token:
//!
//! ```json
//! { "token": "eyJhbGciOi...", "expires_at": "2026-11-01T00:00:00Z" }
//! ```
//!
//! # Storage Location
//!
//! `~/.config/clio/token.json` on Linux, the platform equivalent elsewhere,
//! or whatever `CLIO_TOKEN_FILE` points at.
//!
//! # Process-wide default
//!
//! [`default_store()`] is initialized on first access and lives for the rest
//! of the process. [`set_token()`] writes through it, and every client using
//! the cached strategy without an explicit path reads from it, so a token set
//! once is seen by all of them. Separate processes share the file, not the
//! in-memory state; the last writer wins.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tempfile::NamedTempFile;

use crate::credential::{Credential, parse_token};
use crate::error::TokenStoreError;

/// Environment variable overriding the token file location.
pub const TOKEN_FILE_ENV: &str = "CLIO_TOKEN_FILE";

const TOKEN_FILE_NAME: &str = "token.json";

static DEFAULT_STORE: OnceLock<TokenStore> = OnceLock::new();

/// File-backed store for a single cached [`Credential`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Store backed by an explicit file path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the default storage path for the token file.
    ///
    /// Honors `CLIO_TOKEN_FILE`, then the platform configuration directory,
    /// then `.clio/token.json` relative to the working directory.
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(TOKEN_FILE_ENV) {
            return PathBuf::from(path);
        }

        directories::ProjectDirs::from("org", "janelia", "clio")
            .map(|dirs| dirs.config_dir().join(TOKEN_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(".clio").join(TOKEN_FILE_NAME))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached credential.
    ///
    /// Returns `None` when the file is missing or unreadable as a token.
    /// Malformed content is treated as absent rather than fatal.
    pub fn load(&self) -> Option<Credential> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No cached token at {:?}", self.path);
                return None;
            }
            Err(e) => {
                tracing::warn!("Failed to read token file {:?}: {}", self.path, e);
                return None;
            }
        };

        let trimmed = contents.trim();
        if trimmed.starts_with('{') {
            match serde_json::from_str::<Credential>(trimmed) {
                Ok(credential) if !credential.token.is_empty() => Some(credential),
                Ok(_) => {
                    tracing::warn!("Token file {:?} holds an empty token, ignoring it", self.path);
                    None
                }
                Err(e) => {
                    tracing::warn!("Token file {:?} is malformed, ignoring it: {}", self.path, e);
                    None
                }
            }
        } else {
            // Older clients wrote the bare token string.
            parse_token(trimmed).map(Credential::new)
        }
    }

    /// Persist a credential, replacing any previous one.
    ///
    /// Parent directories are created on demand. The file is written to a
    /// uniquely named temp file in the same directory and renamed into place,
    /// so concurrent savers never see a partial file and the last rename wins.
    pub fn save(&self, credential: &Credential) -> Result<(), TokenStoreError> {
        if credential.token.is_empty() {
            return Err(TokenStoreError::EmptyToken);
        }

        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(|source| TokenStoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
                parent
            }
            None => Path::new("."),
        };

        let contents = serde_json::to_string_pretty(credential)?;
        // NamedTempFile is created with mode 0600 on unix.
        let mut tmp = NamedTempFile::new_in(dir).map_err(|source| TokenStoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        tmp.write_all(contents.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|source| TokenStoreError::Io {
                path: tmp.path().to_path_buf(),
                source,
            })?;
        tmp.persist(&self.path).map_err(|e| TokenStoreError::Io {
            path: self.path.clone(),
            source: e.error,
        })?;

        tracing::debug!("Saved token to {:?}", self.path);
        Ok(())
    }

    /// Remove the cached token, if any.
    pub fn clear(&self) -> Result<(), TokenStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(TokenStoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// The process-wide token store, initialized on first access.
pub fn default_store() -> &'static TokenStore {
    DEFAULT_STORE.get_or_init(|| {
        let store = TokenStore::at(TokenStore::default_path());
        tracing::debug!("Initialized default token store at {:?}", store.path());
        store
    })
}

/// Save a token to the process-wide store.
///
/// Accepts the bare token or the JSON document copied from the Clio web UI.
/// Every client using the cached strategy with the default store picks the
/// new token up on its next first use.
pub fn set_token(token: &str) -> Result<(), TokenStoreError> {
    let secret = parse_token(token).ok_or(TokenStoreError::EmptyToken)?;
    default_store().save(&Credential::new(secret))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn temp_store() -> (TokenStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::at(dir.path().join("nested").join("token.json"));
        (store, dir)
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let (store, _dir) = temp_store();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_save_creates_directories_and_round_trips() {
        let (store, _dir) = temp_store();
        let expires = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let credential = Credential::new("tok-1").with_expiry(expires);

        store.save(&credential).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.token.expose(), "tok-1");
        assert_eq!(loaded.expires_at, Some(expires));
    }

    #[test]
    fn test_save_overwrites_previous_entry() {
        let (store, _dir) = temp_store();
        store.save(&Credential::new("old")).unwrap();
        store.save(&Credential::new("new")).unwrap();

        assert_eq!(store.load().unwrap().token.expose(), "new");
        let entries: Vec<_> = fs::read_dir(store.path().parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, ["token.json"]);
    }

    #[test]
    fn test_concurrent_saves_do_not_collide() {
        let (store, _dir) = temp_store();
        store.save(&Credential::new("seed")).unwrap();

        let writers: Vec<_> = (0..4)
            .map(|writer| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .filter(|i| {
                            store
                                .save(&Credential::new(format!("tok-{}-{}", writer, i)))
                                .is_err()
                        })
                        .count()
                })
            })
            .collect();
        let failures: usize = writers.into_iter().map(|w| w.join().unwrap()).sum();

        assert_eq!(failures, 0);
        let last = store.load().unwrap();
        assert!(last.token.expose().starts_with("tok-"));
        assert_eq!(fs::read_dir(store.path().parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_malformed_file_is_treated_as_absent() {
        let (store, _dir) = temp_store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{\"token\": ").unwrap();

        assert!(store.load().is_none());
    }

    #[test]
    fn test_legacy_plain_token_file() {
        let (store, _dir) = temp_store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "\"legacy-token\"\n").unwrap();

        assert_eq!(store.load().unwrap().token.expose(), "legacy-token");
    }

    #[test]
    fn test_save_rejects_empty_token() {
        let (store, _dir) = temp_store();
        let result = store.save(&Credential::new(""));
        assert!(matches!(result, Err(TokenStoreError::EmptyToken)));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (store, _dir) = temp_store();
        store.save(&Credential::new("tok")).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let (store, _dir) = temp_store();
        store.save(&Credential::new("tok")).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
