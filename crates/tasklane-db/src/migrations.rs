use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (todos, push subscriptions)");
        // Timestamps are unix milliseconds so range scans compare integers.
        conn.execute_batch(
            "
            CREATE TABLE todos (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                description TEXT NOT NULL,
                date        INTEGER NOT NULL,
                priority    TEXT NOT NULL CHECK (priority IN ('Extreme', 'Moderate', 'Low')),
                completed   INTEGER NOT NULL DEFAULT 0,
                expire_at   INTEGER,
                status      TEXT NOT NULL DEFAULT 'Pending'
                            CHECK (status IN ('Pending', 'Completed', 'Expired')),
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );

            -- sweep and reminder scans filter on status and range over expiry
            CREATE INDEX idx_todos_status_expire ON todos(status, expire_at);
            CREATE INDEX idx_todos_date ON todos(date DESC);

            CREATE TABLE push_subscriptions (
                endpoint    TEXT PRIMARY KEY,
                p256dh      TEXT NOT NULL,
                auth        TEXT NOT NULL,
                user_id     TEXT,
                created_at  INTEGER NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            "
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (reminder stamps)");
        conn.execute_batch(
            "
            ALTER TABLE todos ADD COLUMN reminded_at INTEGER;

            INSERT INTO schema_version (version) VALUES (2);
            "
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
