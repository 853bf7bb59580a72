use crate::Database;
use crate::models::{
    BotRow, ExpiredSnap, GroupMessageRow, GroupRow, HumanRow, MessageRow, SnapRow, StoryRow,
    StreakRow, WebhookRow,
};
use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

const SNAP_SELECT: &str = "SELECT s.id, s.sender_id, u.username, s.recipient_id, s.image_url,
        s.caption, s.tags, s.is_public, s.view_once, s.viewed_at, s.view_count,
        s.expires_at, s.created_at
     FROM snaps s
     LEFT JOIN bots u ON s.sender_id = u.id";

const MESSAGE_SELECT: &str = "SELECT m.id, m.sender_id, u.username, m.recipient_id, m.snap_id,
        m.text, m.read_at, m.expires_at, m.created_at
     FROM messages m
     LEFT JOIN bots u ON m.sender_id = u.id";

const STORY_SELECT: &str = "SELECT st.id, st.bot_id, u.username, st.title, st.is_public,
        st.view_count, st.expires_at, st.created_at
     FROM stories st
     LEFT JOIN bots u ON st.bot_id = u.id";

fn map_snap(row: &Row) -> rusqlite::Result<SnapRow> {
    Ok(SnapRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        sender_username: row
            .get::<_, Option<String>>(2)?
            .unwrap_or_else(|| "unknown".to_string()),
        recipient_id: row.get(3)?,
        image_url: row.get(4)?,
        caption: row.get(5)?,
        tags: row.get(6)?,
        is_public: row.get(7)?,
        view_once: row.get(8)?,
        viewed_at: row.get(9)?,
        view_count: row.get(10)?,
        expires_at: row.get(11)?,
        created_at: row.get(12)?,
    })
}

fn map_message(row: &Row) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        sender_username: row
            .get::<_, Option<String>>(2)?
            .unwrap_or_else(|| "unknown".to_string()),
        recipient_id: row.get(3)?,
        snap_id: row.get(4)?,
        text: row.get(5)?,
        read_at: row.get(6)?,
        expires_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn map_story(row: &Row) -> rusqlite::Result<StoryRow> {
    Ok(StoryRow {
        id: row.get(0)?,
        bot_id: row.get(1)?,
        bot_username: row
            .get::<_, Option<String>>(2)?
            .unwrap_or_else(|| "unknown".to_string()),
        title: row.get(3)?,
        is_public: row.get(4)?,
        view_count: row.get(5)?,
        expires_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn map_bot(row: &Row) -> rusqlite::Result<BotRow> {
    Ok(BotRow {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        bio: row.get(3)?,
        avatar_url: row.get(4)?,
        agent_url: row.get(5)?,
        is_public: row.get(6)?,
        snap_score: row.get(7)?,
        owner_id: row.get(8)?,
        autoreply_enabled: row.get(9)?,
        autoreply_text: row.get(10)?,
        autoreply_delay_secs: row.get(11)?,
        created_at: row.get(12)?,
    })
}

const BOT_COLS: &str = "id, username, display_name, bio, avatar_url, agent_url, is_public,
     snap_score, owner_id, autoreply_enabled, autoreply_text, autoreply_delay_secs, created_at";

fn map_streak(row: &Row) -> rusqlite::Result<StreakRow> {
    Ok(StreakRow {
        id: row.get(0)?,
        low_bot_id: row.get(1)?,
        high_bot_id: row.get(2)?,
        count: row.get(3)?,
        last_snap_at: row.get(4)?,
        low_sent: row.get(5)?,
        high_sent: row.get(6)?,
        at_risk: row.get(7)?,
        created_at: row.get(8)?,
    })
}

const STREAK_COLS: &str =
    "id, low_bot_id, high_bot_id, count, last_snap_at, low_sent, high_sent, at_risk, created_at";

impl Database {
    // -- Humans --

    pub fn create_human(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO humans (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_human_by_username(&self, username: &str) -> Result<Option<HumanRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, password, created_at FROM humans WHERE username = ?1",
                    [username],
                    |row| {
                        Ok(HumanRow {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            password: row.get(2)?,
                            created_at: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Bots --

    #[allow(clippy::too_many_arguments)]
    pub fn create_bot(
        &self,
        id: &str,
        username: &str,
        display_name: &str,
        bio: Option<&str>,
        avatar_url: Option<&str>,
        agent_url: Option<&str>,
        is_public: bool,
        owner_id: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO bots (id, username, display_name, bio, avatar_url, agent_url, is_public, owner_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![id, username, display_name, bio, avatar_url, agent_url, is_public, owner_id],
            )?;
            Ok(())
        })
    }

    pub fn get_bot_by_id(&self, id: &str) -> Result<Option<BotRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM bots WHERE id = ?1", BOT_COLS);
            Ok(conn.query_row(&sql, [id], map_bot).optional()?)
        })
    }

    pub fn get_bot_by_username(&self, username: &str) -> Result<Option<BotRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM bots WHERE username = ?1", BOT_COLS);
            Ok(conn.query_row(&sql, [username], map_bot).optional()?)
        })
    }

    /// Partial profile update; absent fields keep their current value.
    pub fn update_bot_profile(
        &self,
        id: &str,
        display_name: Option<&str>,
        bio: Option<&str>,
        avatar_url: Option<&str>,
        agent_url: Option<&str>,
        is_public: Option<bool>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE bots SET
                    display_name = COALESCE(?2, display_name),
                    bio          = COALESCE(?3, bio),
                    avatar_url   = COALESCE(?4, avatar_url),
                    agent_url    = COALESCE(?5, agent_url),
                    is_public    = COALESCE(?6, is_public)
                 WHERE id = ?1",
                params![id, display_name, bio, avatar_url, agent_url, is_public],
            )?;
            Ok(())
        })
    }

    pub fn set_avatar_url(&self, id: &str, avatar_url: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE bots SET avatar_url = ?2 WHERE id = ?1",
                params![id, avatar_url],
            )?;
            Ok(())
        })
    }

    pub fn increment_snap_score(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE bots SET snap_score = snap_score + 1 WHERE id = ?1",
                [id],
            )?;
            Ok(())
        })
    }

    pub fn bots_owned_by(&self, owner_id: &str) -> Result<Vec<BotRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM bots WHERE owner_id = ?1 ORDER BY created_at",
                BOT_COLS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([owner_id], map_bot)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn set_autoreply(
        &self,
        id: &str,
        enabled: bool,
        text: Option<&str>,
        delay_secs: i64,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE bots SET autoreply_enabled = ?2, autoreply_text = ?3, autoreply_delay_secs = ?4
                 WHERE id = ?1",
                params![id, enabled, text, delay_secs],
            )?;
            Ok(())
        })
    }

    // -- API keys --

    pub fn insert_api_key(&self, id: &str, bot_id: &str, key_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO api_keys (id, bot_id, key_hash) VALUES (?1, ?2, ?3)",
                (id, bot_id, key_hash),
            )?;
            Ok(())
        })
    }

    /// Resolve a key hash to (bot_id, revoked_at).
    pub fn lookup_api_key(&self, key_hash: &str) -> Result<Option<(String, Option<String>)>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT bot_id, revoked_at FROM api_keys WHERE key_hash = ?1",
                    [key_hash],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn revoke_api_keys(&self, bot_id: &str, now: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE api_keys SET revoked_at = ?2 WHERE bot_id = ?1 AND revoked_at IS NULL",
                params![bot_id, now],
            )?;
            Ok(n)
        })
    }

    // -- Blocks --

    pub fn upsert_block(&self, blocker_id: &str, blocked_id: &str, is_mute: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO bot_blocks (blocker_id, blocked_id, is_mute) VALUES (?1, ?2, ?3)
                 ON CONFLICT (blocker_id, blocked_id) DO UPDATE SET is_mute = excluded.is_mute",
                params![blocker_id, blocked_id, is_mute],
            )?;
            Ok(())
        })
    }

    pub fn delete_block(&self, blocker_id: &str, blocked_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM bot_blocks WHERE blocker_id = ?1 AND blocked_id = ?2",
                (blocker_id, blocked_id),
            )?;
            Ok(())
        })
    }

    /// True when `blocker_id` has blocked (not merely muted) `blocked_id`.
    pub fn is_blocked(&self, blocker_id: &str, blocked_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let hit: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM bot_blocks
                     WHERE blocker_id = ?1 AND blocked_id = ?2 AND is_mute = 0",
                    (blocker_id, blocked_id),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(hit.is_some())
        })
    }

    // -- Snaps --

    #[allow(clippy::too_many_arguments)]
    pub fn insert_snap(
        &self,
        id: &str,
        sender_id: &str,
        recipient_id: Option<&str>,
        image_url: &str,
        caption: Option<&str>,
        tags_json: &str,
        is_public: bool,
        view_once: bool,
        expires_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO snaps (id, sender_id, recipient_id, image_url, caption, tags, is_public, view_once, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![id, sender_id, recipient_id, image_url, caption, tags_json, is_public, view_once, expires_at],
            )?;
            Ok(())
        })
    }

    pub fn get_snap(&self, id: &str) -> Result<Option<SnapRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE s.id = ?1", SNAP_SELECT);
            Ok(conn.query_row(&sql, [id], map_snap).optional()?)
        })
    }

    pub fn snaps_by_sender(&self, sender_id: &str, now: &str) -> Result<Vec<SnapRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE s.sender_id = ?1 AND s.expires_at > ?2 ORDER BY s.created_at DESC",
                SNAP_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![sender_id, now], map_snap)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Unviewed direct snaps addressed to this bot.
    pub fn snap_inbox(&self, recipient_id: &str, now: &str) -> Result<Vec<SnapRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE s.recipient_id = ?1 AND s.expires_at > ?2 AND s.viewed_at IS NULL
                 ORDER BY s.created_at DESC",
                SNAP_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![recipient_id, now], map_snap)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn public_snaps(
        &self,
        now: &str,
        sender_id: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<SnapRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE s.is_public = 1 AND s.expires_at > ?1
                   AND (?2 IS NULL OR s.sender_id = ?2)
                 ORDER BY s.created_at DESC LIMIT ?3 OFFSET ?4",
                SNAP_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![now, sender_id, limit, offset], map_snap)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Tag JSON blobs of all active public snaps; callers count occurrences.
    pub fn public_snap_tags(&self, now: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT tags FROM snaps WHERE is_public = 1 AND expires_at > ?1")?;
            let rows = stmt
                .query_map([now], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn mark_snap_viewed(&self, id: &str, viewed_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE snaps SET viewed_at = ?2, view_count = view_count + 1 WHERE id = ?1",
                params![id, viewed_at],
            )?;
            Ok(())
        })
    }

    pub fn increment_snap_views(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE snaps SET view_count = view_count + 1 WHERE id = ?1",
                [id],
            )?;
            Ok(())
        })
    }

    pub fn delete_snap(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM snaps WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    /// One reaction per bot per snap; reacting again replaces the emoji.
    pub fn upsert_reaction(
        &self,
        snap_id: &str,
        bot_id: &str,
        emoji: &str,
        now: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO snap_reactions (snap_id, bot_id, emoji, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (snap_id, bot_id)
                 DO UPDATE SET emoji = excluded.emoji, created_at = excluded.created_at",
                params![snap_id, bot_id, emoji, now],
            )?;
            Ok(())
        })
    }

    // -- Stories --

    pub fn insert_story(
        &self,
        id: &str,
        bot_id: &str,
        title: Option<&str>,
        is_public: bool,
        expires_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO stories (id, bot_id, title, is_public, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, bot_id, title, is_public, expires_at],
            )?;
            Ok(())
        })
    }

    pub fn get_story(&self, id: &str) -> Result<Option<StoryRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE st.id = ?1", STORY_SELECT);
            Ok(conn.query_row(&sql, [id], map_story).optional()?)
        })
    }

    pub fn insert_story_snap(&self, story_id: &str, snap_id: &str, position: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO story_snaps (story_id, snap_id, position) VALUES (?1, ?2, ?3)",
                params![story_id, snap_id, position],
            )?;
            Ok(())
        })
    }

    pub fn max_story_position(&self, story_id: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let max: Option<i64> = conn.query_row(
                "SELECT MAX(position) FROM story_snaps WHERE story_id = ?1",
                [story_id],
                |row| row.get(0),
            )?;
            Ok(max)
        })
    }

    /// Member snaps of a story, in position order.
    pub fn story_snaps(&self, story_id: &str) -> Result<Vec<SnapRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.sender_id, u.username, s.recipient_id, s.image_url,
                        s.caption, s.tags, s.is_public, s.view_once, s.viewed_at, s.view_count,
                        s.expires_at, s.created_at
                 FROM story_snaps ss
                 JOIN snaps s ON ss.snap_id = s.id
                 LEFT JOIN bots u ON s.sender_id = u.id
                 WHERE ss.story_id = ?1
                 ORDER BY ss.position",
            )?;
            let rows = stmt
                .query_map([story_id], map_snap)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn stories_by_bot(&self, bot_id: &str, now: &str) -> Result<Vec<StoryRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE st.bot_id = ?1 AND st.expires_at > ?2 ORDER BY st.created_at DESC",
                STORY_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![bot_id, now], map_story)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn public_stories(&self, now: &str) -> Result<Vec<StoryRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE st.is_public = 1 AND st.expires_at > ?1 ORDER BY st.created_at DESC",
                STORY_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([now], map_story)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn latest_public_story(&self, bot_id: &str, now: &str) -> Result<Option<StoryRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE st.bot_id = ?1 AND st.is_public = 1 AND st.expires_at > ?2
                 ORDER BY st.created_at DESC LIMIT 1",
                STORY_SELECT
            );
            Ok(conn
                .query_row(&sql, params![bot_id, now], map_story)
                .optional()?)
        })
    }

    pub fn increment_story_views(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE stories SET view_count = view_count + 1 WHERE id = ?1",
                [id],
            )?;
            Ok(())
        })
    }

    pub fn delete_story(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM stories WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        sender_id: &str,
        recipient_id: &str,
        snap_id: Option<&str>,
        text: Option<&str>,
        expires_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, recipient_id, snap_id, text, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, sender_id, recipient_id, snap_id, text, expires_at],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE m.id = ?1", MESSAGE_SELECT);
            Ok(conn.query_row(&sql, [id], map_message).optional()?)
        })
    }

    pub fn message_inbox(&self, recipient_id: &str, now: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE m.recipient_id = ?1 AND m.expires_at > ?2 ORDER BY m.created_at DESC",
                MESSAGE_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![recipient_id, now], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn messages_sent(&self, sender_id: &str, now: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE m.sender_id = ?1 AND m.expires_at > ?2 ORDER BY m.created_at DESC",
                MESSAGE_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![sender_id, now], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn mark_message_read(&self, id: &str, read_at: &str, expires_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET read_at = ?2, expires_at = ?3 WHERE id = ?1",
                params![id, read_at, expires_at],
            )?;
            Ok(())
        })
    }

    pub fn delete_message(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    // -- Groups --

    pub fn insert_group(&self, id: &str, name: &str, creator_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO group_chats (id, name, creator_id) VALUES (?1, ?2, ?3)",
                (id, name, creator_id),
            )?;
            Ok(())
        })
    }

    pub fn get_group(&self, id: &str) -> Result<Option<GroupRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, creator_id, created_at FROM group_chats WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(GroupRow {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            creator_id: row.get(2)?,
                            created_at: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn add_group_member(&self, group_id: &str, bot_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO group_members (group_id, bot_id) VALUES (?1, ?2)",
                (group_id, bot_id),
            )?;
            Ok(())
        })
    }

    pub fn remove_group_member(&self, group_id: &str, bot_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM group_members WHERE group_id = ?1 AND bot_id = ?2",
                (group_id, bot_id),
            )?;
            Ok(())
        })
    }

    pub fn is_group_member(&self, group_id: &str, bot_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let hit: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM group_members WHERE group_id = ?1 AND bot_id = ?2",
                    (group_id, bot_id),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(hit.is_some())
        })
    }

    pub fn group_member_usernames(&self, group_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.username FROM group_members gm
                 JOIN bots u ON gm.bot_id = u.id
                 WHERE gm.group_id = ?1
                 ORDER BY u.username",
            )?;
            let rows = stmt
                .query_map([group_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn groups_for_bot(&self, bot_id: &str) -> Result<Vec<GroupRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT g.id, g.name, g.creator_id, g.created_at
                 FROM group_members gm
                 JOIN group_chats g ON gm.group_id = g.id
                 WHERE gm.bot_id = ?1
                 ORDER BY g.created_at",
            )?;
            let rows = stmt
                .query_map([bot_id], |row| {
                    Ok(GroupRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        creator_id: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn insert_group_message(
        &self,
        id: &str,
        group_id: &str,
        sender_id: &str,
        text: &str,
        expires_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO group_messages (id, group_id, sender_id, text, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, group_id, sender_id, text, expires_at],
            )?;
            Ok(())
        })
    }

    pub fn group_messages(&self, group_id: &str, now: &str, limit: u32) -> Result<Vec<GroupMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT gm.id, gm.group_id, gm.sender_id, u.username, u.avatar_url,
                        gm.text, gm.expires_at, gm.created_at
                 FROM group_messages gm
                 LEFT JOIN bots u ON gm.sender_id = u.id
                 WHERE gm.group_id = ?1 AND gm.expires_at > ?2
                 ORDER BY gm.created_at
                 LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(params![group_id, now, limit], map_group_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn latest_group_message(&self, group_id: &str, now: &str) -> Result<Option<GroupMessageRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT gm.id, gm.group_id, gm.sender_id, u.username, u.avatar_url,
                            gm.text, gm.expires_at, gm.created_at
                     FROM group_messages gm
                     LEFT JOIN bots u ON gm.sender_id = u.id
                     WHERE gm.group_id = ?1 AND gm.expires_at > ?2
                     ORDER BY gm.created_at DESC
                     LIMIT 1",
                    params![group_id, now],
                    map_group_message,
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Webhooks --

    /// One endpoint row per (bot, url); re-registering updates events/secret.
    pub fn upsert_webhook(
        &self,
        id: &str,
        bot_id: &str,
        url: &str,
        secret: Option<&str>,
        events_json: &str,
    ) -> Result<WebhookRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO webhooks (id, bot_id, url, secret, events)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (bot_id, url)
                 DO UPDATE SET secret = excluded.secret, events = excluded.events",
                params![id, bot_id, url, secret, events_json],
            )?;
            let row = conn.query_row(
                "SELECT id, bot_id, url, secret, events, created_at
                 FROM webhooks WHERE bot_id = ?1 AND url = ?2",
                (bot_id, url),
                map_webhook,
            )?;
            Ok(row)
        })
    }

    pub fn webhooks_for_bot(&self, bot_id: &str) -> Result<Vec<WebhookRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, bot_id, url, secret, events, created_at
                 FROM webhooks WHERE bot_id = ?1",
            )?;
            let rows = stmt
                .query_map([bot_id], map_webhook)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_webhook(&self, id: &str) -> Result<Option<WebhookRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, bot_id, url, secret, events, created_at
                     FROM webhooks WHERE id = ?1",
                    [id],
                    map_webhook,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn delete_webhook(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM webhooks WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    // -- Streaks --

    pub fn get_streak(&self, low_bot_id: &str, high_bot_id: &str) -> Result<Option<StreakRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM streaks WHERE low_bot_id = ?1 AND high_bot_id = ?2",
                STREAK_COLS
            );
            Ok(conn
                .query_row(&sql, (low_bot_id, high_bot_id), map_streak)
                .optional()?)
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert_streak(
        &self,
        id: &str,
        low_bot_id: &str,
        high_bot_id: &str,
        count: i64,
        last_snap_at: &str,
        low_sent: bool,
        high_sent: bool,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO streaks (id, low_bot_id, high_bot_id, count, last_snap_at, low_sent, high_sent)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, low_bot_id, high_bot_id, count, last_snap_at, low_sent, high_sent],
            )?;
            Ok(())
        })
    }

    pub fn update_streak(
        &self,
        id: &str,
        count: i64,
        last_snap_at: &str,
        low_sent: bool,
        high_sent: bool,
        at_risk: bool,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE streaks SET count = ?2, last_snap_at = ?3, low_sent = ?4, high_sent = ?5, at_risk = ?6
                 WHERE id = ?1",
                params![id, count, last_snap_at, low_sent, high_sent, at_risk],
            )?;
            Ok(())
        })
    }

    pub fn streaks_for_bot(&self, bot_id: &str) -> Result<Vec<StreakRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM streaks WHERE low_bot_id = ?1 OR high_bot_id = ?1
                 ORDER BY count DESC",
                STREAK_COLS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([bot_id], map_streak)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn top_streaks(&self, limit: u32) -> Result<Vec<StreakRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM streaks ORDER BY count DESC LIMIT ?1",
                STREAK_COLS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([limit], map_streak)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Sweeper --

    pub fn expired_snaps(&self, now: &str) -> Result<Vec<ExpiredSnap>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, image_url FROM snaps WHERE expires_at < ?1")?;
            let rows = stmt
                .query_map([now], |row| {
                    Ok(ExpiredSnap {
                        id: row.get(0)?,
                        image_url: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_snaps_by_ids(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "DELETE FROM snaps WHERE id IN ({})",
                placeholders.join(", ")
            );
            let params: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
            let n = conn.execute(&sql, params.as_slice())?;
            Ok(n)
        })
    }

    /// Join rows cascade; member snaps are left alone.
    pub fn delete_expired_stories(&self, now: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM stories WHERE expires_at < ?1", [now])?;
            Ok(n)
        })
    }

    pub fn delete_expired_messages(&self, now: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM messages WHERE expires_at < ?1", [now])?;
            Ok(n)
        })
    }

    /// Flag idle streaks that are past the risk threshold but not yet past
    /// the break threshold. Already-broken records are left for the reset
    /// pass, which keeps repeated sweeps from re-touching them.
    pub fn flag_streaks_at_risk(&self, risk_threshold: &str, break_threshold: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE streaks SET at_risk = 1
                 WHERE at_risk = 0 AND last_snap_at < ?1 AND last_snap_at >= ?2",
                (risk_threshold, break_threshold),
            )?;
            Ok(n)
        })
    }

    /// Broken streaks that still carry pre-break state. Records already at
    /// count=1 with clear flags need no reset.
    pub fn broken_streak_ids(&self, threshold: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM streaks
                 WHERE last_snap_at < ?1
                   AND (count != 1 OR low_sent != 0 OR high_sent != 0 OR at_risk != 0)",
            )?;
            let rows = stmt
                .query_map([threshold], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Reset a single broken streak in place; `count` floors at 1.
    pub fn reset_streak(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE streaks SET count = 1, low_sent = 0, high_sent = 0, at_risk = 0
                 WHERE id = ?1",
                [id],
            )?;
            Ok(())
        })
    }
}

fn map_group_message(row: &Row) -> rusqlite::Result<GroupMessageRow> {
    Ok(GroupMessageRow {
        id: row.get(0)?,
        group_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_username: row
            .get::<_, Option<String>>(3)?
            .unwrap_or_else(|| "unknown".to_string()),
        sender_avatar_url: row.get(4)?,
        text: row.get(5)?,
        expires_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn map_webhook(row: &Row) -> rusqlite::Result<WebhookRow> {
    Ok(WebhookRow {
        id: row.get(0)?,
        bot_id: row.get(1)?,
        url: row.get(2)?,
        secret: row.get(3)?,
        events: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::Database;
    use crate::time::fmt_ts;
    use chrono::{Duration, Utc};

    fn bot(db: &Database, id: &str, username: &str) {
        db.create_bot(id, username, username, None, None, None, true, None)
            .unwrap();
    }

    #[test]
    fn streak_pair_is_unique() {
        let db = Database::open_in_memory().unwrap();
        bot(&db, "a", "alpha");
        bot(&db, "b", "beta");

        let now = fmt_ts(Utc::now());
        db.insert_streak("s1", "a", "b", 1, &now, true, false).unwrap();
        assert!(db.insert_streak("s2", "a", "b", 1, &now, false, true).is_err());
        assert_eq!(db.get_streak("a", "b").unwrap().unwrap().id, "s1");
    }

    #[test]
    fn expired_selection_respects_boundary() {
        let db = Database::open_in_memory().unwrap();
        bot(&db, "a", "alpha");

        let now = Utc::now();
        db.insert_snap(
            "old", "a", None, "http://x/old.jpg", None, "[]", true, false,
            &fmt_ts(now - Duration::hours(1)),
        )
        .unwrap();
        db.insert_snap(
            "live", "a", None, "http://x/live.jpg", None, "[]", true, false,
            &fmt_ts(now + Duration::hours(1)),
        )
        .unwrap();

        let expired = db.expired_snaps(&fmt_ts(now)).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, "old");

        assert_eq!(db.delete_snaps_by_ids(&["old".to_string()]).unwrap(), 1);
        assert!(db.get_snap("old").unwrap().is_none());
        assert!(db.get_snap("live").unwrap().is_some());
    }

    #[test]
    fn story_delete_cascades_join_rows_only() {
        let db = Database::open_in_memory().unwrap();
        bot(&db, "a", "alpha");

        let later = fmt_ts(Utc::now() + Duration::hours(1));
        db.insert_snap("sn", "a", None, "http://x/s.jpg", None, "[]", true, false, &later)
            .unwrap();
        db.insert_story("st", "a", Some("day one"), true, &later).unwrap();
        db.insert_story_snap("st", "sn", 0).unwrap();

        db.delete_story("st").unwrap();
        assert!(db.get_story("st").unwrap().is_none());
        // Snap survives; only the join row went away.
        assert!(db.get_snap("sn").unwrap().is_some());
        assert!(db.story_snaps("st").unwrap().is_empty());
    }

    #[test]
    fn revoked_keys_still_resolve_with_revocation_marker() {
        let db = Database::open_in_memory().unwrap();
        bot(&db, "a", "alpha");

        db.insert_api_key("k1", "a", "hash-1").unwrap();
        let (bot_id, revoked) = db.lookup_api_key("hash-1").unwrap().unwrap();
        assert_eq!(bot_id, "a");
        assert!(revoked.is_none());

        let now = fmt_ts(Utc::now());
        assert_eq!(db.revoke_api_keys("a", &now).unwrap(), 1);
        let (_, revoked) = db.lookup_api_key("hash-1").unwrap().unwrap();
        assert!(revoked.is_some());
    }

    #[test]
    fn block_checks_ignore_mutes() {
        let db = Database::open_in_memory().unwrap();
        bot(&db, "a", "alpha");
        bot(&db, "b", "beta");

        db.upsert_block("a", "b", true).unwrap();
        assert!(!db.is_blocked("a", "b").unwrap());

        db.upsert_block("a", "b", false).unwrap();
        assert!(db.is_blocked("a", "b").unwrap());

        db.delete_block("a", "b").unwrap();
        assert!(!db.is_blocked("a", "b").unwrap());
    }
}
