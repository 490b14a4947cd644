//! Conversation sessions.
//!
//! A session groups the turns of one chat and keeps their event transcript
//! plus a small JSON state map. Sessions are keyed by
//! `(app_name, user_id, id)` and stored by a [`SessionService`]: in memory by
//! default, or in SQLite when a database URL is configured.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

use crate::error::{AgentError, Result};
use crate::event::Event;

/// One chat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    #[serde(default)]
    pub state: Map<String, Value>,
    #[serde(default)]
    pub events: Vec<Event>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    fn new(app_name: &str, user_id: &str, id: String, state: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id,
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            state,
            events: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Events belonging to the last `max_invocations` invocations.
    pub fn recent_events(&self, max_invocations: usize) -> &[Event] {
        if max_invocations == 0 {
            return &[];
        }

        let mut seen = 0;
        let mut start = self.events.len();
        let mut current: Option<&str> = None;

        for (idx, event) in self.events.iter().enumerate().rev() {
            if current != Some(event.invocation_id.as_str()) {
                if seen == max_invocations {
                    break;
                }
                seen += 1;
                current = Some(event.invocation_id.as_str());
            }
            start = idx;
        }

        &self.events[start..]
    }

    /// Record `event` locally: push it and merge its state delta.
    fn apply(&mut self, event: Event) {
        for (key, value) in &event.actions.state_delta {
            self.state.insert(key.clone(), value.clone());
        }
        self.updated_at = event.timestamp.max(self.updated_at);
        self.events.push(event);
    }
}

/// Storage for chat sessions.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Get a session by key.
    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>>;

    /// Create a session, generating an id when none is given.
    ///
    /// Creating an id that is already stored returns the stored session, so
    /// concurrent first requests for one chat share a single session.
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<&str>,
        state: Map<String, Value>,
    ) -> Result<Session>;

    /// Append an event to a stored session and to the local copy.
    async fn append_event(&self, session: &mut Session, event: Event) -> Result<()>;

    /// Fetch the session when `session_id` names an existing one, otherwise
    /// create it (under that id, or a fresh one).
    async fn get_or_create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<&str>,
    ) -> Result<Session> {
        let session_id = session_id.filter(|id| !id.is_empty());

        if let Some(id) = session_id {
            if let Some(session) = self.get_session(app_name, user_id, id).await? {
                return Ok(session);
            }
        }

        self.create_session(app_name, user_id, session_id, Map::new())
            .await
    }
}

fn new_session_id(session_id: Option<&str>) -> String {
    session_id
        .filter(|id| !id.is_empty())
        .map(String::from)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

// ============================================================================
// In-memory
// ============================================================================

type SessionKey = (String, String, String);

/// Process-local session storage.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionService {
    sessions: Arc<RwLock<HashMap<SessionKey, Session>>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(app_name: &str, user_id: &str, session_id: &str) -> SessionKey {
    (
        app_name.to_string(),
        user_id.to_string(),
        session_id.to_string(),
    )
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&key(app_name, user_id, session_id)).cloned())
    }

    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<&str>,
        state: Map<String, Value>,
    ) -> Result<Session> {
        let id = new_session_id(session_id);
        let mut sessions = self.sessions.write().await;

        let session = sessions
            .entry(key(app_name, user_id, &id))
            .or_insert_with(|| {
                tracing::debug!(session_id = %id, user_id = %user_id, "Session created");
                Session::new(app_name, user_id, id.clone(), state)
            });
        Ok(session.clone())
    }

    async fn append_event(&self, session: &mut Session, event: Event) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(&key(&session.app_name, &session.user_id, &session.id))
            .ok_or_else(|| AgentError::SessionNotFound(session.id.clone()))?;

        stored.apply(event.clone());
        session.apply(event);
        Ok(())
    }
}

// ============================================================================
// SQLite
// ============================================================================

/// SQLite-backed session storage.
#[derive(Clone)]
pub struct SqliteSessionService {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSessionService {
    /// Open (or create) the session database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| AgentError::Storage(format!("{}: {e}", parent.display())))?;
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(include_str!("session_schema.sql"))?;

        tracing::info!(path = %db_path.display(), "SQLite session store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AgentError::Storage(format!("connection lock poisoned: {e}")))
    }

    fn load_events(
        conn: &Connection,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<Event>> {
        let mut stmt = conn.prepare(
            r"
            SELECT payload FROM session_events
            WHERE app_name = ?1 AND user_id = ?2 AND session_id = ?3
            ORDER BY seq
            ",
        )?;
        let payloads = stmt
            .query_map(params![app_name, user_id, session_id], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(AgentError::from))
            .collect()
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl SessionService for SqliteSessionService {
    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>> {
        let conn = self.lock()?;

        let row = conn
            .query_row(
                r"
                SELECT state, created_at, updated_at FROM sessions
                WHERE app_name = ?1 AND user_id = ?2 AND id = ?3
                ",
                params![app_name, user_id, session_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((state, created_at, updated_at)) = row else {
            return Ok(None);
        };

        Ok(Some(Session {
            id: session_id.to_string(),
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            state: serde_json::from_str(&state)?,
            events: Self::load_events(&conn, app_name, user_id, session_id)?,
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        }))
    }

    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<&str>,
        state: Map<String, Value>,
    ) -> Result<Session> {
        let session = Session::new(app_name, user_id, new_session_id(session_id), state);

        let inserted = {
            let conn = self.lock()?;
            conn.execute(
                r"
                INSERT INTO sessions (app_name, user_id, id, state, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT (app_name, user_id, id) DO NOTHING
                ",
                params![
                    session.app_name,
                    session.user_id,
                    session.id,
                    serde_json::to_string(&session.state)?,
                    session.created_at.to_rfc3339(),
                    session.updated_at.to_rfc3339(),
                ],
            )?
        };

        if inserted == 0 {
            return self
                .get_session(app_name, user_id, &session.id)
                .await?
                .ok_or_else(|| AgentError::SessionNotFound(session.id.clone()));
        }

        tracing::debug!(session_id = %session.id, user_id = %user_id, "Session created");
        Ok(session)
    }

    async fn append_event(&self, session: &mut Session, event: Event) -> Result<()> {
        let mut updated = session.clone();
        updated.apply(event.clone());

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let rows = tx.execute(
            r"
            UPDATE sessions SET state = ?1, updated_at = ?2
            WHERE app_name = ?3 AND user_id = ?4 AND id = ?5
            ",
            params![
                serde_json::to_string(&updated.state)?,
                updated.updated_at.to_rfc3339(),
                session.app_name,
                session.user_id,
                session.id,
            ],
        )?;
        if rows == 0 {
            return Err(AgentError::SessionNotFound(session.id.clone()));
        }

        tx.execute(
            r"
            INSERT INTO session_events
                (id, app_name, user_id, session_id, invocation_id, payload, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                event.id,
                session.app_name,
                session.user_id,
                session.id,
                event.invocation_id,
                serde_json::to_string(&event)?,
                event.timestamp.to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        *session = updated;
        Ok(())
    }
}

/// Pick the session backend for the storage configuration.
///
/// A configured database that cannot be opened falls back to in-memory
/// storage with a warning.
pub fn session_service_from_config(
    storage: &pitch_common::StorageConfig,
) -> Arc<dyn SessionService> {
    let Some(path) = storage.database_path() else {
        tracing::info!("No DATABASE_URL, using in-memory session service");
        return Arc::new(InMemorySessionService::new());
    };

    match SqliteSessionService::open(&path) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Database session service failed, using in-memory"
            );
            Arc::new(InMemorySessionService::new())
        }
    }
}
