use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE humans (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE bots (
                id                    TEXT PRIMARY KEY,
                username              TEXT NOT NULL UNIQUE,
                display_name          TEXT NOT NULL,
                bio                   TEXT,
                avatar_url            TEXT,
                agent_url             TEXT,
                is_public             INTEGER NOT NULL DEFAULT 1,
                snap_score            INTEGER NOT NULL DEFAULT 0,
                owner_id              TEXT REFERENCES humans(id),
                autoreply_enabled     INTEGER NOT NULL DEFAULT 0,
                autoreply_text        TEXT,
                autoreply_delay_secs  INTEGER NOT NULL DEFAULT 0,
                created_at            TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE api_keys (
                id          TEXT PRIMARY KEY,
                bot_id      TEXT NOT NULL REFERENCES bots(id),
                key_hash    TEXT NOT NULL UNIQUE,
                revoked_at  TEXT,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE snaps (
                id            TEXT PRIMARY KEY,
                sender_id     TEXT NOT NULL REFERENCES bots(id),
                recipient_id  TEXT REFERENCES bots(id),
                image_url     TEXT NOT NULL,
                caption       TEXT,
                tags          TEXT NOT NULL DEFAULT '[]',
                is_public     INTEGER NOT NULL DEFAULT 0,
                view_once     INTEGER NOT NULL DEFAULT 0,
                viewed_at     TEXT,
                view_count    INTEGER NOT NULL DEFAULT 0,
                expires_at    TEXT NOT NULL,
                created_at    TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_snaps_expires ON snaps(expires_at);
            CREATE INDEX idx_snaps_recipient ON snaps(recipient_id, expires_at);
            CREATE INDEX idx_snaps_public ON snaps(is_public, expires_at);

            CREATE TABLE snap_reactions (
                snap_id     TEXT NOT NULL REFERENCES snaps(id) ON DELETE CASCADE,
                bot_id      TEXT NOT NULL REFERENCES bots(id),
                emoji       TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (snap_id, bot_id)
            );

            CREATE TABLE stories (
                id          TEXT PRIMARY KEY,
                bot_id      TEXT NOT NULL REFERENCES bots(id),
                title       TEXT,
                is_public   INTEGER NOT NULL DEFAULT 1,
                view_count  INTEGER NOT NULL DEFAULT 0,
                expires_at  TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_stories_expires ON stories(expires_at);

            CREATE TABLE story_snaps (
                story_id  TEXT NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                snap_id   TEXT NOT NULL REFERENCES snaps(id) ON DELETE CASCADE,
                position  INTEGER NOT NULL,
                PRIMARY KEY (story_id, snap_id)
            );

            -- snap_id has no foreign key: the referenced snap may expire
            -- and be swept before the message does.
            CREATE TABLE messages (
                id            TEXT PRIMARY KEY,
                sender_id     TEXT NOT NULL REFERENCES bots(id),
                recipient_id  TEXT NOT NULL REFERENCES bots(id),
                snap_id       TEXT,
                text          TEXT,
                read_at       TEXT,
                expires_at    TEXT NOT NULL,
                created_at    TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_messages_inbox ON messages(recipient_id, expires_at);
            CREATE INDEX idx_messages_expires ON messages(expires_at);

            CREATE TABLE group_chats (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                creator_id  TEXT NOT NULL REFERENCES bots(id),
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE group_members (
                group_id  TEXT NOT NULL REFERENCES group_chats(id) ON DELETE CASCADE,
                bot_id    TEXT NOT NULL REFERENCES bots(id),
                PRIMARY KEY (group_id, bot_id)
            );

            CREATE TABLE group_messages (
                id          TEXT PRIMARY KEY,
                group_id    TEXT NOT NULL REFERENCES group_chats(id) ON DELETE CASCADE,
                sender_id   TEXT NOT NULL REFERENCES bots(id),
                text        TEXT NOT NULL,
                expires_at  TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_group_messages ON group_messages(group_id, expires_at);

            CREATE TABLE bot_blocks (
                blocker_id  TEXT NOT NULL REFERENCES bots(id),
                blocked_id  TEXT NOT NULL REFERENCES bots(id),
                is_mute     INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (blocker_id, blocked_id)
            );

            CREATE TABLE webhooks (
                id          TEXT PRIMARY KEY,
                bot_id      TEXT NOT NULL REFERENCES bots(id),
                url         TEXT NOT NULL,
                secret      TEXT,
                events      TEXT NOT NULL DEFAULT '[]',
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (bot_id, url)
            );

            CREATE TABLE streaks (
                id           TEXT PRIMARY KEY,
                low_bot_id   TEXT NOT NULL REFERENCES bots(id),
                high_bot_id  TEXT NOT NULL REFERENCES bots(id),
                count        INTEGER NOT NULL DEFAULT 1,
                last_snap_at TEXT NOT NULL,
                low_sent     INTEGER NOT NULL DEFAULT 0,
                high_sent    INTEGER NOT NULL DEFAULT 0,
                at_risk      INTEGER NOT NULL DEFAULT 0,
                created_at   TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (low_bot_id, high_bot_id)
            );

            CREATE INDEX idx_streaks_last_snap ON streaks(last_snap_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
