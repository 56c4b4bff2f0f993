use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::debug;

/// Bearer token plus the id of the user it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub user_id: i64,
    pub token: String,
}

/// Source of the current user's credential. Asked on every call, the
/// returned value is never cached by callers.
pub trait CredentialProvider: Send + Sync {
    fn credential(&self) -> Option<Credential>;

    fn is_authenticated(&self) -> bool {
        self.credential().is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    credential: Option<Credential>,
}

impl StaticCredentials {
    pub fn new(user_id: i64, token: impl Into<String>) -> Self {
        Self {
            credential: Some(Credential {
                user_id,
                token: token.into(),
            }),
        }
    }
}

impl CredentialProvider for StaticCredentials {
    fn credential(&self) -> Option<Credential> {
        self.credential.clone()
    }
}

#[derive(Deserialize)]
struct StoredSession {
    token: String,
    user: StoredUser,
}

#[derive(Deserialize)]
struct StoredUser {
    id: i64,
}

/// Reads the session stored by the login flow, e.g.
/// `{"token": "...", "user": {"id": 7, "name": "..."}}`.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CredentialProvider for SessionFile {
    fn credential(&self) -> Option<Credential> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) => {
                debug!("No session at {:?}: {e}", self.path);
                return None;
            }
        };
        match serde_json::from_str::<StoredSession>(&text) {
            Ok(session) if !session.token.trim().is_empty() => Some(Credential {
                user_id: session.user.id,
                token: session.token,
            }),
            Ok(_) => None,
            Err(e) => {
                debug!("Ignoring unreadable session {:?}: {e}", self.path);
                None
            }
        }
    }
}
