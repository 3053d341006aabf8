//! Store methods for users, trust score events, and the activity log.

use super::{SqliteStore, TrustAdjustment, UserStore};
use crate::{
    error::{RiskError, RiskResult},
    event::ActivityLogEntry,
    trust_score::{ScoreChange, TrustAction, TrustScoreEvent, UserRecord},
    types::{ts_from_millis, Timestamp},
};
use rusqlite::{params, OptionalExtension, Transaction, TransactionBehavior};

impl UserStore for SqliteStore {
    fn insert_user(&self, user: &UserRecord) -> RiskResult<()> {
        self.conn.execute(
            "INSERT INTO app_user (
                user_id, trust_score, is_frozen, is_helper_verified,
                last_latitude, last_longitude, last_location_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &user.user_id,
                user.trust_score,
                user.is_frozen,
                user.is_helper_verified,
                user.last_latitude,
                user.last_longitude,
                user.last_location_at.map(|t| t.timestamp_millis()),
                user.created_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn get_user(&self, user_id: &str) -> RiskResult<Option<UserRecord>> {
        let user = self
            .conn
            .query_row(
                "SELECT user_id, trust_score, is_frozen, is_helper_verified,
                        last_latitude, last_longitude, last_location_at, created_at
                 FROM app_user WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserRecord {
                        user_id:            row.get(0)?,
                        trust_score:        row.get(1)?,
                        is_frozen:          row.get(2)?,
                        is_helper_verified: row.get(3)?,
                        last_latitude:      row.get(4)?,
                        last_longitude:     row.get(5)?,
                        last_location_at:   row.get::<_, Option<i64>>(6)?.map(ts_from_millis),
                        created_at:         ts_from_millis(row.get(7)?),
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    fn adjust_trust_score(
        &self,
        user_id: &str,
        adjustment: TrustAdjustment,
    ) -> RiskResult<Option<ScoreChange>> {
        // IMMEDIATE takes the write lock up front, so concurrent adjustments
        // for the same user serialize instead of losing an update.
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let old: Option<i32> = tx
            .query_row(
                "SELECT trust_score FROM app_user WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(old) = old else {
            return Ok(None);
        };
        let new = adjustment.apply(old);
        tx.execute(
            "UPDATE app_user SET trust_score = ?1 WHERE user_id = ?2",
            params![new, user_id],
        )?;
        tx.commit()?;
        Ok(Some(ScoreChange::new(old, new)))
    }

    fn set_frozen(&self, user_id: &str, frozen: bool) -> RiskResult<()> {
        self.conn.execute(
            "UPDATE app_user SET is_frozen = ?1 WHERE user_id = ?2",
            params![frozen, user_id],
        )?;
        Ok(())
    }

    fn update_user_location(&self, user_id: &str, lat: f64, lng: f64, at: Timestamp) -> RiskResult<()> {
        self.conn.execute(
            "UPDATE app_user SET last_latitude = ?1, last_longitude = ?2, last_location_at = ?3
             WHERE user_id = ?4",
            params![lat, lng, at.timestamp_millis(), user_id],
        )?;
        Ok(())
    }

    fn insert_trust_event(&self, event: &TrustScoreEvent) -> RiskResult<()> {
        self.conn.execute(
            "INSERT INTO trust_score_event (
                event_id, user_id, action, points, old_score, new_score, reason, metadata, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &event.event_id,
                &event.user_id,
                event.action.as_str(),
                event.points,
                event.old_score,
                event.new_score,
                &event.reason,
                serde_json::to_string(&event.metadata)?,
                event.created_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn trust_events(&self, user_id: &str, limit: usize) -> RiskResult<Vec<TrustScoreEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, user_id, action, points, old_score, new_score, reason, metadata, created_at
             FROM trust_score_event WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i32>(3)?,
                    row.get::<_, i32>(4)?,
                    row.get::<_, i32>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, i64>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(event_id, user_id, action, points, old_score, new_score, reason, metadata, at)| {
                let action = TrustAction::parse(&action).ok_or_else(|| {
                    RiskError::Other(anyhow::anyhow!("unknown trust action '{action}' in event {event_id}"))
                })?;
                Ok(TrustScoreEvent {
                    event_id,
                    user_id,
                    action,
                    points,
                    old_score,
                    new_score,
                    reason,
                    metadata: serde_json::from_str(&metadata)?,
                    created_at: ts_from_millis(at),
                })
            })
            .collect()
    }

    fn append_activity(&self, entry: &ActivityLogEntry) -> RiskResult<()> {
        self.conn.execute(
            "INSERT INTO activity_log (user_id, action_tag, details, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                &entry.user_id,
                &entry.action_tag,
                &entry.details,
                entry.created_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn recent_activity(
        &self,
        user_id: &str,
        tag_prefix: &str,
        since: Timestamp,
        limit: usize,
    ) -> RiskResult<Vec<ActivityLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, action_tag, details, created_at
             FROM activity_log
             WHERE user_id = ?1 AND substr(action_tag, 1, length(?2)) = ?2 AND created_at >= ?3
             ORDER BY created_at DESC, id DESC LIMIT ?4",
        )?;
        let entries = stmt
            .query_map(
                params![user_id, tag_prefix, since.timestamp_millis(), limit as i64],
                |row| {
                    Ok(ActivityLogEntry {
                        id:         Some(row.get(0)?),
                        user_id:    row.get(1)?,
                        action_tag: row.get(2)?,
                        details:    row.get(3)?,
                        created_at: ts_from_millis(row.get(4)?),
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
