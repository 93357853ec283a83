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
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                  TEXT PRIMARY KEY,
                username            TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password            TEXT NOT NULL,
                role                TEXT NOT NULL DEFAULT 'USER',
                is_premium          INTEGER NOT NULL DEFAULT 0,
                bio                 TEXT,
                daily_goal_minutes  INTEGER NOT NULL DEFAULT 15,
                utc_offset_minutes  INTEGER NOT NULL DEFAULT 0,
                suspended_until     TEXT,
                deleted_at          TEXT,
                created_at          TEXT NOT NULL
            );

            CREATE TABLE books (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                author      TEXT NOT NULL,
                added_by    TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_books_title ON books(title COLLATE NOCASE);

            CREATE TABLE reading_sessions (
                id                TEXT PRIMARY KEY,
                user_id           TEXT NOT NULL REFERENCES users(id),
                book_id           TEXT NOT NULL REFERENCES books(id),
                duration_minutes  INTEGER NOT NULL,
                started_at        TEXT NOT NULL,
                ended_at          TEXT NOT NULL,
                created_at        TEXT NOT NULL
            );

            CREATE INDEX idx_sessions_user ON reading_sessions(user_id, ended_at);

            CREATE TABLE user_streaks (
                user_id            TEXT PRIMARY KEY REFERENCES users(id),
                current_streak     INTEGER NOT NULL DEFAULT 0,
                longest_streak     INTEGER NOT NULL DEFAULT 0,
                last_goal_date     TEXT,
                freezes_available  INTEGER NOT NULL DEFAULT 1,
                updated_at         TEXT NOT NULL
            );

            CREATE TABLE daily_progress (
                user_id      TEXT NOT NULL REFERENCES users(id),
                date         TEXT NOT NULL,
                minutes      INTEGER NOT NULL DEFAULT 0,
                goal_met     INTEGER NOT NULL DEFAULT 0,
                freeze_used  INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, date)
            );

            CREATE TABLE follows (
                follower_id   TEXT NOT NULL REFERENCES users(id),
                following_id  TEXT NOT NULL REFERENCES users(id),
                created_at    TEXT NOT NULL,
                PRIMARY KEY (follower_id, following_id)
            );

            CREATE INDEX idx_follows_following ON follows(following_id);

            CREATE TABLE kudos (
                id           TEXT PRIMARY KEY,
                giver_id     TEXT NOT NULL REFERENCES users(id),
                receiver_id  TEXT NOT NULL REFERENCES users(id),
                session_id   TEXT NOT NULL REFERENCES reading_sessions(id),
                created_at   TEXT NOT NULL,
                UNIQUE(giver_id, session_id)
            );

            CREATE INDEX idx_kudos_session ON kudos(session_id);

            CREATE TABLE rooms (
                id           TEXT PRIMARY KEY,
                name         TEXT NOT NULL,
                description  TEXT,
                owner_id     TEXT NOT NULL REFERENCES users(id),
                deleted_at   TEXT,
                created_at   TEXT NOT NULL
            );

            CREATE TABLE moderation_items (
                id                TEXT PRIMARY KEY,
                content_type      TEXT NOT NULL,
                content_id        TEXT NOT NULL,
                reporter_id       TEXT NOT NULL REFERENCES users(id),
                reported_user_id  TEXT NOT NULL REFERENCES users(id),
                reason            TEXT NOT NULL,
                details           TEXT,
                status            TEXT NOT NULL DEFAULT 'PENDING',
                reviewer_id       TEXT REFERENCES users(id),
                review_notes      TEXT,
                reviewed_at       TEXT,
                created_at        TEXT NOT NULL,
                UNIQUE(reporter_id, content_type, content_id)
            );

            CREATE INDEX idx_moderation_status ON moderation_items(status, created_at);

            CREATE TABLE content_removals (
                id                  TEXT PRIMARY KEY,
                moderation_item_id  TEXT NOT NULL REFERENCES moderation_items(id),
                content_type        TEXT NOT NULL,
                content_id          TEXT NOT NULL,
                user_id             TEXT NOT NULL REFERENCES users(id),
                original_content    TEXT,
                violation_type      TEXT NOT NULL,
                removed_by          TEXT NOT NULL REFERENCES users(id),
                removed_at          TEXT NOT NULL,
                restored_at         TEXT,
                restored_by         TEXT REFERENCES users(id)
            );

            CREATE TABLE admin_actions (
                id           TEXT PRIMARY KEY,
                admin_id     TEXT REFERENCES users(id),
                action       TEXT NOT NULL,
                target_type  TEXT NOT NULL,
                target_id    TEXT NOT NULL,
                details      TEXT NOT NULL DEFAULT '{}',
                created_at   TEXT NOT NULL
            );

            CREATE INDEX idx_admin_actions_created ON admin_actions(created_at);

            -- The audit log is append-only.
            CREATE TRIGGER admin_actions_no_update BEFORE UPDATE ON admin_actions
            BEGIN
                SELECT RAISE(ABORT, 'admin_actions is append-only');
            END;

            CREATE TRIGGER admin_actions_no_delete BEFORE DELETE ON admin_actions
            BEGIN
                SELECT RAISE(ABORT, 'admin_actions is append-only');
            END;

            CREATE TABLE payments (
                id           TEXT PRIMARY KEY,
                checkout_id  TEXT NOT NULL UNIQUE,
                user_id      TEXT REFERENCES users(id),
                amount       INTEGER NOT NULL DEFAULT 0,
                currency     TEXT NOT NULL DEFAULT 'usd',
                status       TEXT NOT NULL,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            );

            CREATE TABLE notifications (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id),
                kind        TEXT NOT NULL,
                payload     TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                read_at     TEXT
            );

            CREATE INDEX idx_notifications_user ON notifications(user_id, created_at);

            CREATE TABLE experiment_assignments (
                experiment   TEXT NOT NULL,
                user_id      TEXT NOT NULL REFERENCES users(id),
                variant      TEXT NOT NULL,
                converted    INTEGER NOT NULL DEFAULT 0,
                assigned_at  TEXT NOT NULL,
                PRIMARY KEY (experiment, user_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
