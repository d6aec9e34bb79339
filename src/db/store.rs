//! The session/message store as the facilitator sees it.

use duckdb::Connection;
use std::sync::MutexGuard;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::db::models::{
    CommittedTurn, Message, NewImage, NewMessage, Role, Session, SessionImage, UserTurn,
};
use crate::db::service::DbService;
use crate::db::DbPool;
use crate::phase::Phase;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] duckdb::Error),
    #[error("session {0} not found")]
    SessionNotFound(Uuid),
    #[error("message {0} not found")]
    MessageNotFound(Uuid),
    #[error("image {0} not found")]
    ImageNotFound(Uuid),
    #[error("database lock poisoned")]
    LockPoisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait SessionStore: Send + Sync {
    fn create_session(&self, name: &str) -> StoreResult<Session>;
    fn get_session(&self, id: Uuid) -> StoreResult<Option<Session>>;
    /// Most recently updated first.
    fn list_sessions(&self) -> StoreResult<Vec<Session>>;
    fn rename_session(&self, id: Uuid, name: &str) -> StoreResult<()>;
    /// Removes the session with its messages and images.
    fn delete_session(&self, id: Uuid) -> StoreResult<()>;

    fn append_message(&self, session_id: Uuid, role: Role, content: &str) -> StoreResult<Message>;
    fn set_phase(&self, session_id: Uuid, phase: Phase) -> StoreResult<()>;
    fn get_messages(&self, session_id: Uuid) -> StoreResult<Vec<Message>>;
    /// The last `limit` messages in conversation order.
    fn recent_messages(&self, session_id: Uuid, limit: usize) -> StoreResult<Vec<Message>>;

    /// Stores the user message with its attachments on its own, for a turn the
    /// collaborator never answered.
    fn append_user_turn(&self, session_id: Uuid, turn: &UserTurn) -> StoreResult<Message>;

    /// Stores a whole turn atomically: the user message and its attachments,
    /// the model message and the phase update. Either all of it lands or none.
    fn commit_turn(
        &self,
        session_id: Uuid,
        turn: &UserTurn,
        model_content: &str,
        phase: Option<Phase>,
    ) -> StoreResult<CommittedTurn>;

    /// Creates a session with its messages in one transaction.
    fn import_session(
        &self,
        name: &str,
        phase: Option<Phase>,
        messages: &[NewMessage],
    ) -> StoreResult<Session>;

    fn toggle_insight(&self, message_id: Uuid) -> StoreResult<Message>;
    fn list_insights(&self, session_id: Uuid) -> StoreResult<Vec<Message>>;

    fn add_image(&self, image: NewImage) -> StoreResult<SessionImage>;
    /// Newest first.
    fn list_images(&self, session_id: Uuid) -> StoreResult<Vec<SessionImage>>;
    fn get_image(&self, id: Uuid) -> StoreResult<Option<SessionImage>>;
    fn delete_image(&self, id: Uuid) -> StoreResult<()>;
}

/// `SessionStore` over a shared DuckDB connection.
#[derive(Clone)]
pub struct DuckDbStore {
    pool: DbPool,
}

impl DuckDbStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.pool.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn require_session(conn: &Connection, id: Uuid) -> StoreResult<()> {
        match DbService::get_session(conn, id)? {
            Some(_) => Ok(()),
            None => Err(StoreError::SessionNotFound(id)),
        }
    }
}

impl SessionStore for DuckDbStore {
    fn create_session(&self, name: &str) -> StoreResult<Session> {
        let conn = self.conn()?;
        let session = DbService::insert_session(&conn, name)?;
        info!(session_id = %session.id, name, "session created");
        Ok(session)
    }

    fn get_session(&self, id: Uuid) -> StoreResult<Option<Session>> {
        let conn = self.conn()?;
        Ok(DbService::get_session(&conn, id)?)
    }

    fn list_sessions(&self) -> StoreResult<Vec<Session>> {
        let conn = self.conn()?;
        Ok(DbService::list_sessions(&conn)?)
    }

    fn rename_session(&self, id: Uuid, name: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        match DbService::rename_session(&conn, id, name)? {
            0 => Err(StoreError::SessionNotFound(id)),
            _ => Ok(()),
        }
    }

    fn delete_session(&self, id: Uuid) -> StoreResult<()> {
        let conn = self.conn()?;
        match DbService::delete_session(&conn, id)? {
            0 => Err(StoreError::SessionNotFound(id)),
            _ => {
                info!(session_id = %id, "session deleted");
                Ok(())
            }
        }
    }

    fn append_message(&self, session_id: Uuid, role: Role, content: &str) -> StoreResult<Message> {
        let conn = self.conn()?;
        Self::require_session(&conn, session_id)?;
        Ok(DbService::insert_message(&conn, session_id, role, content)?)
    }

    fn set_phase(&self, session_id: Uuid, phase: Phase) -> StoreResult<()> {
        let conn = self.conn()?;
        match DbService::set_phase(&conn, session_id, phase)? {
            0 => Err(StoreError::SessionNotFound(session_id)),
            _ => Ok(()),
        }
    }

    fn get_messages(&self, session_id: Uuid) -> StoreResult<Vec<Message>> {
        let conn = self.conn()?;
        Self::require_session(&conn, session_id)?;
        Ok(DbService::get_messages(&conn, session_id)?)
    }

    fn recent_messages(&self, session_id: Uuid, limit: usize) -> StoreResult<Vec<Message>> {
        let conn = self.conn()?;
        Self::require_session(&conn, session_id)?;
        Ok(DbService::get_recent_messages(&conn, session_id, limit)?)
    }

    fn append_user_turn(&self, session_id: Uuid, turn: &UserTurn) -> StoreResult<Message> {
        let conn = self.conn()?;
        Self::require_session(&conn, session_id)?;

        Ok(DbService::in_transaction(&conn, |conn| {
            DbService::insert_user_turn(conn, session_id, turn)
        })?)
    }

    fn commit_turn(
        &self,
        session_id: Uuid,
        turn: &UserTurn,
        model_content: &str,
        phase: Option<Phase>,
    ) -> StoreResult<CommittedTurn> {
        let conn = self.conn()?;
        Self::require_session(&conn, session_id)?;

        let committed = DbService::in_transaction(&conn, |conn| {
            let user_message = DbService::insert_user_turn(conn, session_id, turn)?;
            let model_message = DbService::insert_message(conn, session_id, Role::Model, model_content)?;
            if let Some(phase) = phase {
                DbService::set_phase(conn, session_id, phase)?;
            }
            Ok(CommittedTurn {
                user_message,
                model_message,
            })
        })?;
        Ok(committed)
    }

    fn import_session(
        &self,
        name: &str,
        phase: Option<Phase>,
        messages: &[NewMessage],
    ) -> StoreResult<Session> {
        let conn = self.conn()?;

        let session = DbService::in_transaction(&conn, |conn| {
            let session = DbService::insert_session(conn, name)?;
            for m in messages {
                let stored = DbService::insert_message(conn, session.id, m.role, &m.content)?;
                if m.is_insight {
                    DbService::set_insight(conn, stored.id, true)?;
                }
            }
            if let Some(phase) = phase {
                DbService::set_phase(conn, session.id, phase)?;
            }
            DbService::get_session(conn, session.id)?.ok_or(duckdb::Error::QueryReturnedNoRows)
        })?;
        info!(session_id = %session.id, messages = messages.len(), "session imported");
        Ok(session)
    }

    fn toggle_insight(&self, message_id: Uuid) -> StoreResult<Message> {
        let conn = self.conn()?;
        if DbService::toggle_insight(&conn, message_id)? == 0 {
            return Err(StoreError::MessageNotFound(message_id));
        }
        DbService::get_message(&conn, message_id)?.ok_or(StoreError::MessageNotFound(message_id))
    }

    fn list_insights(&self, session_id: Uuid) -> StoreResult<Vec<Message>> {
        let conn = self.conn()?;
        Self::require_session(&conn, session_id)?;
        Ok(DbService::list_insights(&conn, session_id)?)
    }

    fn add_image(&self, image: NewImage) -> StoreResult<SessionImage> {
        let conn = self.conn()?;
        Self::require_session(&conn, image.session_id)?;
        if let Some(message_id) = image.message_id {
            match DbService::get_message(&conn, message_id)? {
                Some(m) if m.session_id == image.session_id => {}
                _ => return Err(StoreError::MessageNotFound(message_id)),
            }
        }
        Ok(DbService::insert_image(&conn, &image)?)
    }

    fn list_images(&self, session_id: Uuid) -> StoreResult<Vec<SessionImage>> {
        let conn = self.conn()?;
        Self::require_session(&conn, session_id)?;
        Ok(DbService::list_images(&conn, session_id)?)
    }

    fn get_image(&self, id: Uuid) -> StoreResult<Option<SessionImage>> {
        let conn = self.conn()?;
        Ok(DbService::get_image(&conn, id)?)
    }

    fn delete_image(&self, id: Uuid) -> StoreResult<()> {
        let conn = self.conn()?;
        match DbService::delete_image(&conn, id)? {
            0 => Err(StoreError::ImageNotFound(id)),
            _ => Ok(()),
        }
    }
}
