use crate::db::models::{Message, NewImage, Role, Session, SessionImage, UserTurn};
use crate::phase::Phase;
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::types::Type;
use duckdb::{params, Connection, Result as DbResult, Row};
use uuid::Uuid;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const SESSION_COLUMNS: &str =
    "id, name, current_phase, CAST(created_at AS VARCHAR), CAST(updated_at AS VARCHAR)";
const MESSAGE_COLUMNS: &str =
    "id, session_id, role, content, is_insight, order_index, CAST(created_at AS VARCHAR)";
const IMAGE_COLUMNS: &str =
    "id, session_id, message_id, title, mime_type, data, CAST(created_at AS VARCHAR)";

pub struct DbService;

fn conversion_error(idx: usize, err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> duckdb::Error {
    duckdb::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn now() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

// Timestamps are selected AS VARCHAR so the duckdb chrono feature is not needed.
fn get_timestamp(row: &Row, idx: usize) -> DbResult<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| conversion_error(idx, e))
}

fn get_uuid(row: &Row, idx: usize) -> DbResult<Uuid> {
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion_error(idx, e))
}

impl DbService {
    fn row_to_session(row: &Row) -> DbResult<Session> {
        let phase: i32 = row.get(2)?;
        let current_phase = Phase::from_number(i64::from(phase))
            .ok_or_else(|| conversion_error(2, format!("phase out of range: {phase}")))?;

        Ok(Session {
            id: get_uuid(row, 0)?,
            name: row.get(1)?,
            current_phase,
            created_at: get_timestamp(row, 3)?,
            updated_at: get_timestamp(row, 4)?,
        })
    }

    fn row_to_message(row: &Row) -> DbResult<Message> {
        let role: String = row.get(2)?;
        Ok(Message {
            id: get_uuid(row, 0)?,
            session_id: get_uuid(row, 1)?,
            role: role.parse().map_err(|e: String| conversion_error(2, e))?,
            content: row.get(3)?,
            is_insight: row.get(4)?,
            order_index: row.get(5)?,
            created_at: get_timestamp(row, 6)?,
        })
    }

    fn row_to_image(row: &Row) -> DbResult<SessionImage> {
        let message_id: Option<String> = row.get(2)?;
        let message_id = message_id
            .map(|s| s.parse::<Uuid>().map_err(|e| conversion_error(2, e)))
            .transpose()?;

        Ok(SessionImage {
            id: get_uuid(row, 0)?,
            session_id: get_uuid(row, 1)?,
            message_id,
            title: row.get(3)?,
            mime_type: row.get(4)?,
            data: row.get(5)?,
            created_at: get_timestamp(row, 6)?,
        })
    }

    /// Runs `f` inside a transaction, rolling back if it fails.
    pub fn in_transaction<T>(
        conn: &Connection,
        f: impl FnOnce(&Connection) -> DbResult<T>,
    ) -> DbResult<T> {
        conn.execute_batch("BEGIN TRANSACTION")?;
        match f(conn) {
            Ok(value) => {
                conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    // --- Session Operations ---

    pub fn insert_session(conn: &Connection, name: &str) -> DbResult<Session> {
        let id = Uuid::new_v4();
        let ts = now();

        conn.execute(
            "INSERT INTO sessions (id, name, current_phase, created_at, updated_at)
             VALUES (?, ?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))",
            params![id.to_string(), name, i32::from(Phase::INITIAL.number()), ts, ts],
        )?;

        Self::get_session(conn, id)?.ok_or(duckdb::Error::QueryReturnedNoRows)
    }

    pub fn get_session(conn: &Connection, id: Uuid) -> DbResult<Option<Session>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id.to_string()], Self::row_to_session)?;

        rows.next().transpose()
    }

    pub fn list_sessions(conn: &Connection) -> DbResult<Vec<Session>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY updated_at DESC, created_at DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![], Self::row_to_session)?;

        rows.collect()
    }

    /// Returns the number of sessions touched (0 when the id is unknown).
    pub fn rename_session(conn: &Connection, id: Uuid, name: &str) -> DbResult<usize> {
        conn.execute(
            "UPDATE sessions SET name = ?, updated_at = CAST(? AS TIMESTAMP) WHERE id = ?",
            params![name, now(), id.to_string()],
        )
    }

    pub fn set_phase(conn: &Connection, id: Uuid, phase: Phase) -> DbResult<usize> {
        conn.execute(
            "UPDATE sessions SET current_phase = ?, updated_at = CAST(? AS TIMESTAMP) WHERE id = ?",
            params![i32::from(phase.number()), now(), id.to_string()],
        )
    }

    pub fn touch_session(conn: &Connection, id: Uuid) -> DbResult<usize> {
        conn.execute(
            "UPDATE sessions SET updated_at = CAST(? AS TIMESTAMP) WHERE id = ?",
            params![now(), id.to_string()],
        )
    }

    /// Deletes the session together with its messages and images.
    pub fn delete_session(conn: &Connection, id: Uuid) -> DbResult<usize> {
        let id_str = id.to_string();
        Self::in_transaction(conn, |conn| {
            conn.execute("DELETE FROM images WHERE session_id = ?", params![id_str])?;
            conn.execute("DELETE FROM messages WHERE session_id = ?", params![id_str])?;
            conn.execute("DELETE FROM sessions WHERE id = ?", params![id_str])
        })
    }

    // --- Message Operations ---

    pub fn insert_message(
        conn: &Connection,
        session_id: Uuid,
        role: Role,
        content: &str,
    ) -> DbResult<Message> {
        let id = Uuid::new_v4();
        let session_str = session_id.to_string();

        let order_index: i64 = conn.query_row(
            "SELECT CAST(COALESCE(MAX(order_index), -1) + 1 AS BIGINT) FROM messages WHERE session_id = ?",
            params![session_str],
            |row| row.get(0),
        )?;

        conn.execute(
            "INSERT INTO messages (id, session_id, role, content, is_insight, order_index, created_at)
             VALUES (?, ?, ?, ?, FALSE, ?, CAST(? AS TIMESTAMP))",
            params![id.to_string(), session_str, role.as_str(), content, order_index, now()],
        )?;

        Self::touch_session(conn, session_id)?;

        Self::get_message(conn, id)?.ok_or(duckdb::Error::QueryReturnedNoRows)
    }

    pub fn get_message(conn: &Connection, id: Uuid) -> DbResult<Option<Message>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id.to_string()], Self::row_to_message)?;

        rows.next().transpose()
    }

    pub fn get_messages(conn: &Connection, session_id: Uuid) -> DbResult<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = ? ORDER BY order_index ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![session_id.to_string()], Self::row_to_message)?;

        rows.collect()
    }

    /// The most recent `limit` messages, still in conversation order.
    pub fn get_recent_messages(conn: &Connection, session_id: Uuid, limit: usize) -> DbResult<Vec<Message>> {
        let sql = format!(
            "SELECT * FROM (
                SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = ? ORDER BY order_index DESC LIMIT ?
             ) ORDER BY 6 ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![session_id.to_string(), limit as i64], Self::row_to_message)?;

        rows.collect()
    }

    /// Inserts the user message and its attachments, linked to it.
    pub fn insert_user_turn(conn: &Connection, session_id: Uuid, turn: &UserTurn) -> DbResult<Message> {
        let message = Self::insert_message(conn, session_id, Role::User, &turn.content)?;
        for attachment in &turn.attachments {
            Self::insert_image(
                conn,
                &NewImage {
                    session_id,
                    message_id: Some(message.id),
                    title: attachment.title.clone(),
                    mime_type: attachment.mime_type.clone(),
                    data: attachment.data.clone(),
                },
            )?;
        }
        Ok(message)
    }

    pub fn set_insight(conn: &Connection, id: Uuid, is_insight: bool) -> DbResult<usize> {
        conn.execute(
            "UPDATE messages SET is_insight = ? WHERE id = ?",
            params![is_insight, id.to_string()],
        )
    }

    pub fn toggle_insight(conn: &Connection, id: Uuid) -> DbResult<usize> {
        conn.execute(
            "UPDATE messages SET is_insight = NOT is_insight WHERE id = ?",
            params![id.to_string()],
        )
    }

    pub fn list_insights(conn: &Connection, session_id: Uuid) -> DbResult<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = ? AND is_insight ORDER BY order_index ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![session_id.to_string()], Self::row_to_message)?;

        rows.collect()
    }

    // --- Image Operations ---

    pub fn insert_image(conn: &Connection, image: &NewImage) -> DbResult<SessionImage> {
        let id = Uuid::new_v4();

        conn.execute(
            "INSERT INTO images (id, session_id, message_id, title, mime_type, data, created_at)
             VALUES (?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))",
            params![
                id.to_string(),
                image.session_id.to_string(),
                image.message_id.map(|m| m.to_string()),
                image.title,
                image.mime_type,
                image.data,
                now()
            ],
        )?;

        Self::touch_session(conn, image.session_id)?;

        Self::get_image(conn, id)?.ok_or(duckdb::Error::QueryReturnedNoRows)
    }

    pub fn get_image(conn: &Connection, id: Uuid) -> DbResult<Option<SessionImage>> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = ?");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id.to_string()], Self::row_to_image)?;

        rows.next().transpose()
    }

    pub fn list_images(conn: &Connection, session_id: Uuid) -> DbResult<Vec<SessionImage>> {
        let sql = format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE session_id = ? ORDER BY created_at DESC, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![session_id.to_string()], Self::row_to_image)?;

        rows.collect()
    }

    pub fn delete_image(conn: &Connection, id: Uuid) -> DbResult<usize> {
        conn.execute("DELETE FROM images WHERE id = ?", params![id.to_string()])
    }
}
