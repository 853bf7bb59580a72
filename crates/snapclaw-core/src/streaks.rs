//! Streak engine: one canonical relationship record per unordered bot pair,
//! counting consecutive mutual snap-exchange cycles.
//!
//! A cycle advances only when BOTH sides have sent since the last advance —
//! one bot sending twice does not move the counter. Pairs idle for more than
//! [`AT_RISK_AFTER_HOURS`] are flagged by the sweeper; pairs idle for more
//! than [`BREAK_AFTER_HOURS`] reset to a count of 1, whether the reset is
//! noticed by the sweeper or by the next send.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use snapclaw_db::Database;
use snapclaw_db::models::StreakRow;
use snapclaw_db::time::{fmt_ts, parse_ts};

/// Idle hours after which a streak is flagged as at risk.
pub const AT_RISK_AFTER_HOURS: i64 = 20;
/// Idle hours after which a streak breaks.
pub const BREAK_AFTER_HOURS: i64 = 48;

/// Canonical (low, high) ordering for an unordered bot pair. Byte order over
/// the UUID values, which for hyphenated lowercase ids is the same as
/// lexicographic order of their string forms.
pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b { (a, b) } else { (b, a) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreakState {
    pub count: i64,
    pub last_snap_at: DateTime<Utc>,
    pub low_sent: bool,
    pub high_sent: bool,
    pub at_risk: bool,
}

impl StreakState {
    fn from_row(row: &StreakRow) -> Self {
        Self {
            count: row.count,
            last_snap_at: parse_ts(&row.last_snap_at),
            low_sent: row.low_sent,
            high_sent: row.high_sent,
            at_risk: row.at_risk,
        }
    }

    /// Fresh streak as created by a first (or streak-breaking) send.
    fn first_contact(sender_is_low: bool, now: DateTime<Utc>) -> Self {
        Self {
            count: 1,
            last_snap_at: now,
            low_sent: sender_is_low,
            high_sent: !sender_is_low,
            at_risk: false,
        }
    }
}

/// Apply one qualifying direct snap to the pair's streak.
///
/// Pure transition over the optional current state; `record_direct_snap` is
/// the database wrapper. The break branch lands in the same state a sweep
/// reset followed by a first send would, so the send path and the sweep path
/// agree for any elapsed time.
pub fn advance(
    current: Option<&StreakState>,
    sender_is_low: bool,
    now: DateTime<Utc>,
) -> StreakState {
    let Some(prev) = current else {
        return StreakState::first_contact(sender_is_low, now);
    };

    if now - prev.last_snap_at > Duration::hours(BREAK_AFTER_HOURS) {
        return StreakState::first_contact(sender_is_low, now);
    }

    let other_sent = if sender_is_low {
        prev.high_sent
    } else {
        prev.low_sent
    };

    if other_sent {
        // Mutual advance: both sides have sent since the last advance.
        StreakState {
            count: prev.count + 1,
            last_snap_at: now,
            low_sent: false,
            high_sent: false,
            at_risk: false,
        }
    } else {
        StreakState {
            count: prev.count,
            last_snap_at: now,
            low_sent: prev.low_sent || sender_is_low,
            high_sent: prev.high_sent || !sender_is_low,
            at_risk: false,
        }
    }
}

/// Update the streak for a direct snap from `sender` to `recipient`.
///
/// Called after the snap row is committed. Callers swallow the error: a
/// streak bookkeeping failure must never fail the send that triggered it.
pub fn record_direct_snap(
    db: &Database,
    sender: Uuid,
    recipient: Uuid,
    now: DateTime<Utc>,
) -> Result<()> {
    let (low, high) = canonical_pair(sender, recipient);
    let sender_is_low = sender == low;
    let (low_id, high_id) = (low.to_string(), high.to_string());

    let existing = db.get_streak(&low_id, &high_id)?;
    let prev = existing.as_ref().map(StreakState::from_row);
    let next = advance(prev.as_ref(), sender_is_low, now);

    match existing {
        Some(row) => db.update_streak(
            &row.id,
            next.count,
            &fmt_ts(next.last_snap_at),
            next.low_sent,
            next.high_sent,
            next.at_risk,
        )?,
        None => db.insert_streak(
            &Uuid::new_v4().to_string(),
            &low_id,
            &high_id,
            next.count,
            &fmt_ts(next.last_snap_at),
            next.low_sent,
            next.high_sent,
        )?,
    }

    debug!(
        "Streak {}..{}: count={} low_sent={} high_sent={}",
        low_id, high_id, next.count, next.low_sent, next.high_sent
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn canonical_pair_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(canonical_pair(a, b), canonical_pair(b, a));
        let (low, high) = canonical_pair(a, b);
        assert!(low <= high);
        // Byte order matches string order for hyphenated lowercase UUIDs.
        assert!(low.to_string() <= high.to_string());
    }

    #[test]
    fn first_contact_sets_only_the_sender_flag() {
        let state = advance(None, true, t0());
        assert_eq!(state.count, 1);
        assert!(state.low_sent);
        assert!(!state.high_sent);
        assert!(!state.at_risk);

        let state = advance(None, false, t0());
        assert!(!state.low_sent);
        assert!(state.high_sent);
    }

    #[test]
    fn reciprocal_send_advances_and_clears_flags() {
        let first = advance(None, true, t0());
        let second = advance(Some(&first), false, t0() + Duration::hours(10));
        assert_eq!(second.count, 2);
        assert!(!second.low_sent);
        assert!(!second.high_sent);
        assert!(!second.at_risk);
    }

    #[test]
    fn one_sided_repeat_does_not_advance() {
        let first = advance(None, true, t0());
        let again = advance(Some(&first), true, t0() + Duration::hours(5));
        assert_eq!(again.count, 1);
        assert!(again.low_sent);
        assert!(!again.high_sent);
    }

    #[test]
    fn send_after_long_gap_resets() {
        let mut state = advance(None, true, t0());
        state.count = 40;
        state.high_sent = true;

        let after = advance(Some(&state), true, t0() + Duration::hours(49));
        assert_eq!(after.count, 1);
        assert!(after.low_sent);
        assert!(!after.high_sent);
        assert!(!after.at_risk);
    }

    #[test]
    fn send_at_exactly_48h_still_counts() {
        let first = advance(None, true, t0());
        let second = advance(Some(&first), false, t0() + Duration::hours(48));
        assert_eq!(second.count, 2);
    }

    #[test]
    fn qualifying_send_clears_at_risk() {
        let mut state = advance(None, true, t0());
        state.at_risk = true;

        let after = advance(Some(&state), true, t0() + Duration::hours(21));
        assert!(!after.at_risk);
        assert_eq!(after.count, 1);
    }

    #[test]
    fn both_call_directions_hit_one_record() {
        let db = Database::open_in_memory().unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        db.create_bot(&a.to_string(), "alpha", "Alpha", None, None, None, true, None)
            .unwrap();
        db.create_bot(&b.to_string(), "beta", "Beta", None, None, None, true, None)
            .unwrap();

        record_direct_snap(&db, a, b, t0()).unwrap();
        record_direct_snap(&db, b, a, t0() + Duration::hours(1)).unwrap();

        let (low, high) = canonical_pair(a, b);
        let row = db
            .get_streak(&low.to_string(), &high.to_string())
            .unwrap()
            .unwrap();
        // Two records would have split the exchange; one record advanced it.
        assert_eq!(row.count, 2);
        assert!(!row.low_sent);
        assert!(!row.high_sent);
        assert_eq!(db.streaks_for_bot(&a.to_string()).unwrap().len(), 1);
    }
}
