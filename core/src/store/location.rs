//! Store methods for location history and settings.

use super::{LocationStore, SqliteStore};
use crate::{
    error::RiskResult,
    location_validator::{LocationSample, LocationSettings},
    types::{ts_from_millis, RiskLevel, Timestamp},
};
use rusqlite::{params, OptionalExtension};

impl LocationStore for SqliteStore {
    fn location_settings(&self, user_id: &str) -> RiskResult<LocationSettings> {
        let settings = self
            .conn
            .query_row(
                "SELECT foreground_only, sharing_enabled FROM location_settings WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(LocationSettings {
                        user_id:         user_id.to_string(),
                        foreground_only: row.get(0)?,
                        sharing_enabled: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(settings.unwrap_or_else(|| LocationSettings::defaults_for(user_id)))
    }

    fn save_location_settings(&self, settings: &LocationSettings) -> RiskResult<()> {
        self.conn.execute(
            "INSERT INTO location_settings (user_id, foreground_only, sharing_enabled)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                foreground_only = excluded.foreground_only,
                sharing_enabled = excluded.sharing_enabled",
            params![&settings.user_id, settings.foreground_only, settings.sharing_enabled],
        )?;
        Ok(())
    }

    fn insert_location_sample(&self, sample: &LocationSample, risk_level: RiskLevel) -> RiskResult<()> {
        self.conn.execute(
            "INSERT INTO location_sample (
                user_id, latitude, longitude, accuracy_m, recorded_at,
                is_foreground, mock_location, risk_level
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &sample.user_id,
                sample.latitude,
                sample.longitude,
                sample.accuracy_m,
                sample.timestamp.timestamp_millis(),
                sample.is_foreground,
                sample.mock_location_flag,
                risk_level.as_str(),
            ],
        )?;
        Ok(())
    }

    fn recent_location_samples(
        &self,
        user_id: &str,
        since: Timestamp,
        until: Timestamp,
        limit: usize,
    ) -> RiskResult<Vec<LocationSample>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, latitude, longitude, accuracy_m, recorded_at, is_foreground, mock_location
             FROM location_sample
             WHERE user_id = ?1 AND recorded_at >= ?2 AND recorded_at <= ?3
             ORDER BY recorded_at DESC, id DESC LIMIT ?4",
        )?;
        let samples = stmt
            .query_map(params![
                user_id,
                since.timestamp_millis(),
                until.timestamp_millis(),
                limit as i64
            ], |row| {
                Ok(LocationSample {
                    user_id:            row.get(0)?,
                    latitude:           row.get(1)?,
                    longitude:          row.get(2)?,
                    accuracy_m:         row.get(3)?,
                    timestamp:          ts_from_millis(row.get(4)?),
                    is_foreground:      row.get(5)?,
                    mock_location_flag: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(samples)
    }
}
