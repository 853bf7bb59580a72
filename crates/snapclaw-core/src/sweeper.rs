//! Background task that purges expired content and maintains streak state.
//!
//! Runs once immediately at startup (clearing any backlog from downtime),
//! then on a fixed interval. A single task owns the loop, so runs never
//! overlap; shutdown is fire-and-forget with the rest of the process.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use snapclaw_db::Database;
use snapclaw_db::time::fmt_ts;
use snapclaw_storage::Storage;

use crate::streaks::{AT_RISK_AFTER_HOURS, BREAK_AFTER_HOURS};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub snaps_deleted: usize,
    pub storage_objects_deleted: usize,
    pub stories_deleted: usize,
    pub messages_deleted: usize,
    pub streaks_flagged: usize,
    pub streaks_reset: usize,
}

impl SweepStats {
    pub fn is_empty(&self) -> bool {
        *self == SweepStats::default()
    }
}

pub async fn run_sweep_loop(db: Arc<Database>, storage: Arc<Storage>, interval_secs: u64) {
    // The first tick fires immediately, which is the eager startup run.
    let mut interval = tokio::time::interval(StdDuration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let stats = sweep_once(&db, &storage, Utc::now()).await;
        if stats.is_empty() {
            debug!("Sweep run: nothing to purge");
        } else {
            info!("Sweep run: {:?}", stats);
        }
    }
}

/// One full sweep at `now`. Steps run in order — snaps before the stories
/// that may reference them, content expiration before streak maintenance —
/// and each step has its own error boundary, so one failing step never
/// blocks the rest of the run.
pub async fn sweep_once(db: &Database, storage: &Storage, now: DateTime<Utc>) -> SweepStats {
    let mut stats = SweepStats::default();
    let now_ts = fmt_ts(now);

    match sweep_snaps(db, storage, &now_ts).await {
        Ok((rows, objects)) => {
            stats.snaps_deleted = rows;
            stats.storage_objects_deleted = objects;
        }
        Err(e) => warn!("Snap sweep failed: {}", e),
    }

    match db.delete_expired_stories(&now_ts) {
        Ok(n) => stats.stories_deleted = n,
        Err(e) => warn!("Story sweep failed: {}", e),
    }

    match db.delete_expired_messages(&now_ts) {
        Ok(n) => stats.messages_deleted = n,
        Err(e) => warn!("Message sweep failed: {}", e),
    }

    let risk_threshold = fmt_ts(now - Duration::hours(AT_RISK_AFTER_HOURS));
    let break_threshold = fmt_ts(now - Duration::hours(BREAK_AFTER_HOURS));

    match db.flag_streaks_at_risk(&risk_threshold, &break_threshold) {
        Ok(n) => stats.streaks_flagged = n,
        Err(e) => warn!("At-risk marking failed: {}", e),
    }

    stats.streaks_reset = reset_broken_streaks(db, &break_threshold);

    stats
}

/// Delete expired snaps: storage objects first (best-effort; rows whose
/// image URL points outside our store are skipped), then the rows.
async fn sweep_snaps(db: &Database, storage: &Storage, now_ts: &str) -> Result<(usize, usize)> {
    let expired = db.expired_snaps(now_ts)?;
    if expired.is_empty() {
        return Ok((0, 0));
    }

    let paths: Vec<String> = expired
        .iter()
        .filter_map(|snap| storage.object_path(&snap.image_url))
        .collect();
    let objects = storage.delete_objects(&paths).await;

    let ids: Vec<String> = expired.into_iter().map(|snap| snap.id).collect();
    let rows = db.delete_snaps_by_ids(&ids)?;
    Ok((rows, objects))
}

/// Reset each broken streak independently — one row's failure does not
/// block the others.
fn reset_broken_streaks(db: &Database, break_threshold: &str) -> usize {
    let ids = match db.broken_streak_ids(break_threshold) {
        Ok(ids) => ids,
        Err(e) => {
            warn!("Streak break scan failed: {}", e);
            return 0;
        }
    };

    let mut reset = 0;
    for id in &ids {
        match db.reset_streak(id) {
            Ok(()) => reset += 1,
            Err(e) => warn!("Failed to reset streak {}: {}", id, e),
        }
    }
    reset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaks::record_direct_snap;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    async fn test_storage() -> Storage {
        let root = std::env::temp_dir().join(format!("snapclaw-sweep-{}", Uuid::new_v4()));
        Storage::new(root, "snaps", "http://localhost:8000")
            .await
            .unwrap()
    }

    fn bot(db: &Database, id: &str, username: &str) {
        db.create_bot(id, username, username, None, None, None, true, None)
            .unwrap();
    }

    fn insert_snap(db: &Database, id: &str, image_url: &str, expires_at: DateTime<Utc>) {
        db.insert_snap(id, "a", None, image_url, None, "[]", true, false, &fmt_ts(expires_at))
            .unwrap();
    }

    #[tokio::test]
    async fn sweeps_expired_content_and_storage() {
        let db = Database::open_in_memory().unwrap();
        let storage = test_storage().await;
        bot(&db, "a", "alpha");
        bot(&db, "b", "beta");

        // One stored snap, one externally hosted, one still live.
        let stored_url = storage.put_object("a/gone.jpg", b"jpeg").await.unwrap();
        insert_snap(&db, "gone", &stored_url, t0() - Duration::hours(1));
        insert_snap(&db, "ext", "https://elsewhere.example/cat.png", t0() - Duration::hours(1));
        insert_snap(&db, "live", "https://elsewhere.example/dog.png", t0() + Duration::hours(1));

        db.insert_story("story", "a", None, true, &fmt_ts(t0() - Duration::hours(2)))
            .unwrap();
        db.insert_story_snap("story", "live", 0).unwrap();

        db.insert_message("msg", "a", "b", None, Some("hi"), &fmt_ts(t0() - Duration::hours(3)))
            .unwrap();

        let stats = sweep_once(&db, &storage, t0()).await;
        assert_eq!(stats.snaps_deleted, 2);
        assert_eq!(stats.storage_objects_deleted, 1);
        assert_eq!(stats.stories_deleted, 1);
        assert_eq!(stats.messages_deleted, 1);

        // The live snap survived the story teardown.
        assert!(db.get_snap("live").unwrap().is_some());
        assert!(db.get_snap("gone").unwrap().is_none());
        assert!(db.get_message("msg").unwrap().is_none());
    }

    #[tokio::test]
    async fn at_risk_marking_respects_thresholds() {
        let db = Database::open_in_memory().unwrap();
        let storage = test_storage().await;
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        bot(&db, &a.to_string(), "alpha");
        bot(&db, &b.to_string(), "beta");

        record_direct_snap(&db, a, b, t0()).unwrap();

        let stats = sweep_once(&db, &storage, t0() + Duration::hours(19)).await;
        assert_eq!(stats.streaks_flagged, 0);

        let stats = sweep_once(&db, &storage, t0() + Duration::hours(21)).await;
        assert_eq!(stats.streaks_flagged, 1);

        let row = &db.streaks_for_bot(&a.to_string()).unwrap()[0];
        assert!(row.at_risk);
        assert_eq!(row.count, 1);
        assert!(row.low_sent || row.high_sent);
    }

    #[tokio::test]
    async fn sweep_resets_broken_streaks() {
        let db = Database::open_in_memory().unwrap();
        let storage = test_storage().await;
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        bot(&db, &a.to_string(), "alpha");
        bot(&db, &b.to_string(), "beta");

        record_direct_snap(&db, a, b, t0()).unwrap();
        record_direct_snap(&db, b, a, t0() + Duration::hours(2)).unwrap();

        // Past the break threshold, at_risk never set in between.
        let stats = sweep_once(&db, &storage, t0() + Duration::hours(51)).await;
        assert_eq!(stats.streaks_reset, 1);
        assert_eq!(stats.streaks_flagged, 0);

        let row = &db.streaks_for_bot(&a.to_string()).unwrap()[0];
        assert_eq!(row.count, 1);
        assert!(!row.low_sent);
        assert!(!row.high_sent);
        assert!(!row.at_risk);
    }

    #[tokio::test]
    async fn repeated_sweeps_are_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let storage = test_storage().await;
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        bot(&db, &a.to_string(), "alpha");
        bot(&db, &b.to_string(), "beta");
        // The insert_snap helper uses sender_id "a"; satisfy the bots(id) FK.
        bot(&db, "a", "author");

        record_direct_snap(&db, a, b, t0()).unwrap();
        insert_snap(&db, "old", "https://elsewhere.example/x.png", t0() + Duration::hours(1));

        let at = t0() + Duration::hours(60);
        let first = sweep_once(&db, &storage, at).await;
        assert!(!first.is_empty());

        let second = sweep_once(&db, &storage, at).await;
        assert!(second.is_empty(), "second sweep mutated state: {:?}", second);
    }

    #[tokio::test]
    async fn end_to_end_streak_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let storage = test_storage().await;
        let x = Uuid::new_v4();
        let y = Uuid::new_v4();
        bot(&db, &x.to_string(), "xerxes");
        bot(&db, &y.to_string(), "yankee");

        // X sends at t=0, Y replies at t=10h: mutual advance.
        record_direct_snap(&db, x, y, t0()).unwrap();
        record_direct_snap(&db, y, x, t0() + Duration::hours(10)).unwrap();

        let row = &db.streaks_for_bot(&x.to_string()).unwrap()[0];
        assert_eq!(row.count, 2);
        assert!(!row.low_sent && !row.high_sent);

        // Idle sweep 21h after the last snap: flagged, count kept.
        let stats = sweep_once(&db, &storage, t0() + Duration::hours(10 + 21)).await;
        assert_eq!(stats.streaks_flagged, 1);
        let row = &db.streaks_for_bot(&x.to_string()).unwrap()[0];
        assert!(row.at_risk);
        assert_eq!(row.count, 2);

        // Sweep past the break threshold: reset.
        let stats = sweep_once(&db, &storage, t0() + Duration::hours(10 + 49)).await;
        assert_eq!(stats.streaks_reset, 1);
        let row = &db.streaks_for_bot(&x.to_string()).unwrap()[0];
        assert_eq!(row.count, 1);
        assert!(!row.at_risk);
        assert!(!row.low_sent && !row.high_sent);
    }
}
