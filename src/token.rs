use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{Error, Result};

/// A persisted bearer credential with its expiry metadata.
///
/// `expires_at` is computed once when the record is created from a token
/// response and persisted alongside the rest of the record; it is never
/// recomputed from `issued_at` afterwards, so clock skew between calls
/// cannot drift the expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix timestamp in milliseconds.
    pub issued_at: i64,
    /// Lifetime reported by the service, in seconds.
    pub expires_in: i64,
    /// Unix timestamp in milliseconds: `issued_at + expires_in * 1000`.
    pub expires_at: i64,
}

impl TokenRecord {
    /// Build a record from a token-endpoint response.
    ///
    /// Requires `access_token` and `expires_in`; anything else is a
    /// malformed token response carrying the raw payload as detail.
    /// `expires_in` is accepted as a JSON number or a numeric string,
    /// matching what the authentication servers in the wild return.
    pub fn from_payload(payload: &Value, issued_at: i64) -> Result<Self> {
        let access_token = payload
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MalformedResponse {
                message: "token response missing access_token".to_string(),
                payload: payload.clone(),
            })?;

        let expires_in = match payload.get("expires_in") {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
        .ok_or_else(|| Error::MalformedResponse {
            message: "token response missing expires_in".to_string(),
            payload: payload.clone(),
        })?;

        let refresh_token = payload
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            access_token: access_token.to_string(),
            refresh_token,
            issued_at,
            expires_in,
            expires_at: issued_at + expires_in * 1000,
        })
    }

    /// True iff the record has not expired at `now_ms` (strict comparison:
    /// a token is invalid at exactly its expiry instant).
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        self.expires_at > now_ms
    }
}

/// The two independent credential kinds the store tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Guest,
    Access,
}

impl TokenKind {
    /// Fixed, well-known storage key for this kind.
    pub fn storage_key(self) -> &'static str {
        match self {
            TokenKind::Guest => "guest-token",
            TokenKind::Access => "access-token",
        }
    }
}

/// Durable key/value persistence for token records.
///
/// Records are serialized as one JSON unit per kind, so a reader never
/// observes a partially written record. Corrupt or foreign data reads back
/// as absent rather than failing, which sends the session manager down the
/// re-acquisition path.
pub trait TokenStore: Send + Sync {
    fn get(&self, kind: TokenKind) -> Option<TokenRecord>;
    fn set(&self, kind: TokenKind, record: &TokenRecord) -> Result<()>;
    fn clear(&self, kind: TokenKind) -> Result<()>;
}

/// File-backed store: one JSON file per kind under a root directory
/// (`~/.printcloud` by default).
pub struct FileTokenStore {
    root: PathBuf,
}

impl FileTokenStore {
    /// Store rooted at `~/.printcloud`.
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            Error::Io(std::io::Error::other("failed to determine home directory"))
        })?;
        Ok(Self::with_root(home.join(".printcloud")))
    }

    /// Store rooted at an explicit directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, kind: TokenKind) -> PathBuf {
        self.root.join(format!("{}.json", kind.storage_key()))
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, kind: TokenKind) -> Option<TokenRecord> {
        let path = self.path_for(kind);
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(
                    "Ignoring unreadable token record at {}: {}",
                    path.display(),
                    err
                );
                None
            }
        }
    }

    fn set(&self, kind: TokenKind, record: &TokenRecord) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let content = serde_json::to_string(record)?;
        fs::write(self.path_for(kind), content)?;
        debug!("Stored {} record", kind.storage_key());
        Ok(())
    }

    fn clear(&self, kind: TokenKind) -> Result<()> {
        let path = self.path_for(kind);
        if path.exists() {
            fs::remove_file(&path)?;
            debug!("Cleared {} record", kind.storage_key());
        }
        Ok(())
    }
}

/// In-memory store for tests and embedders that manage persistence
/// themselves.
#[derive(Default)]
pub struct MemoryTokenStore {
    records: Mutex<HashMap<TokenKind, TokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, kind: TokenKind) -> Option<TokenRecord> {
        self.records.lock().unwrap().get(&kind).cloned()
    }

    fn set(&self, kind: TokenKind, record: &TokenRecord) -> Result<()> {
        self.records.lock().unwrap().insert(kind, record.clone());
        Ok(())
    }

    fn clear(&self, kind: TokenKind) -> Result<()> {
        self.records.lock().unwrap().remove(&kind);
        Ok(())
    }
}
