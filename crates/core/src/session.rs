//! Explicit session state and its persistence.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Credentials and cached settings of the signed-in user.
///
/// A session is handed to the controller when it is built. Nothing reads
/// it from ambient storage; loading and saving go through a
/// [`SessionStore`].
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Bearer token sent with every completion request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// The signed-in user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Cached connection settings, keyed by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub connections: BTreeMap<String, String>,
}

impl SessionContext {
    /// Creates a session authenticated with `token`.
    #[inline]
    pub fn with_access_token<S: Into<String>>(token: S) -> Self {
        Self {
            access_token: Some(token.into()),
            ..Default::default()
        }
    }

    /// Returns `true` if requests will carry credentials.
    #[inline]
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    /// Forgets the credentials and the user, keeping cached connections.
    #[inline]
    pub fn sign_out(&mut self) {
        self.access_token = None;
        self.user_id = None;
    }
}

impl Debug for SessionContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .field("user_id", &self.user_id)
            .field("connections", &self.connections.keys())
            .finish()
    }
}

/// The error type for session persistence.
#[derive(Debug)]
pub struct SessionError {
    message: String,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl SessionError {
    fn new<E>(message: &str, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: message.to_owned(),
            source: Some(Box::new(source)),
        }
    }

    fn poisoned() -> Self {
        Self {
            message: "session store lock poisoned".to_owned(),
            source: None,
        }
    }
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {source}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl StdError for SessionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn StdError + 'static))
    }
}

/// A place where sessions live between runs.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads the saved session, if there is one.
    async fn load(&self) -> Result<Option<SessionContext>, SessionError>;

    /// Saves the session, replacing the previous one.
    async fn save(&self, session: &SessionContext) -> Result<(), SessionError>;
}

/// An in-process store, mostly useful in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    session: Mutex<Option<SessionContext>>,
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self) -> Result<Option<SessionContext>, SessionError> {
        let session = self.session.lock().map_err(|_| SessionError::poisoned())?;
        Ok(session.clone())
    }

    async fn save(&self, session: &SessionContext) -> Result<(), SessionError> {
        let mut slot =
            self.session.lock().map_err(|_| SessionError::poisoned())?;
        *slot = Some(session.clone());
        Ok(())
    }
}

/// A store backed by a pretty-printed JSON file.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Creates a store for the file at `path`.
    ///
    /// The file does not need to exist yet.
    #[inline]
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn load(&self) -> Result<Option<SessionContext>, SessionError> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("no session file at {}", self.path.display());
                return Ok(None);
            }
            Err(err) => {
                return Err(SessionError::new("failed to read session", err));
            }
        };
        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|err| SessionError::new("malformed session file", err))
    }

    async fn save(&self, session: &SessionContext) -> Result<(), SessionError> {
        let parent = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            tokio::fs::create_dir_all(parent).await.map_err(|err| {
                SessionError::new("failed to create session directory", err)
            })?;
        }
        let content = serde_json::to_vec_pretty(session)
            .map_err(|err| SessionError::new("failed to encode session", err))?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|err| SessionError::new("failed to write session", err))?;
        debug!("saved session to {}", self.path.display());
        Ok(())
    }
}
