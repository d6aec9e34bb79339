use crate::config::DatabaseConfig;
use duckdb::{Connection, Result as DbResult};
use std::sync::{Arc, Mutex};
use tracing::info;

pub type DbPool = Arc<Mutex<Connection>>;

pub const IN_MEMORY: &str = ":memory:";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id VARCHAR PRIMARY KEY,
    name VARCHAR NOT NULL,
    current_phase INTEGER NOT NULL DEFAULT 1 CHECK (current_phase BETWEEN 1 AND 6),
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id VARCHAR PRIMARY KEY,
    session_id VARCHAR NOT NULL,
    role VARCHAR NOT NULL CHECK (role IN ('user', 'model')),
    content TEXT NOT NULL,
    is_insight BOOLEAN NOT NULL DEFAULT FALSE,
    order_index BIGINT NOT NULL,
    created_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS images (
    id VARCHAR PRIMARY KEY,
    session_id VARCHAR NOT NULL,
    message_id VARCHAR,
    title VARCHAR NOT NULL,
    mime_type VARCHAR NOT NULL,
    data BLOB NOT NULL,
    created_at TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, order_index);
CREATE INDEX IF NOT EXISTS idx_images_session ON images(session_id);
"#;

pub fn get_connection(config: &DatabaseConfig) -> DbResult<DbPool> {
    info!("Opening DuckDB at {}", config.path);
    let conn = if config.path == IN_MEMORY {
        Connection::open_in_memory()?
    } else {
        Connection::open(&config.path)?
    };

    init_schema(&conn)?;

    Ok(Arc::new(Mutex::new(conn)))
}

pub fn init_schema(conn: &Connection) -> DbResult<()> {
    info!("Initializing database schema");
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
