//! Store methods for recognised devices.

use super::{DeviceStore, SqliteStore};
use crate::{
    device_fingerprint::DeviceRecord,
    error::{RiskError, RiskResult},
    types::{ts_from_millis, RiskLevel, Timestamp},
};
use rusqlite::{params, OptionalExtension, Row};

const DEVICE_COLUMNS: &str =
    "device_id, user_id, fingerprint, characteristics, last_ip, first_seen, last_seen, risk_level";

type DeviceRow = (String, String, String, String, Option<String>, i64, i64, String);

fn read_row(row: &Row<'_>) -> rusqlite::Result<DeviceRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn into_record(raw: DeviceRow) -> RiskResult<DeviceRecord> {
    let (device_id, user_id, fingerprint, characteristics, last_ip, first_seen, last_seen, risk) = raw;
    let risk_level = RiskLevel::parse(&risk).ok_or_else(|| {
        RiskError::Other(anyhow::anyhow!("unknown risk level '{risk}' on device {device_id}"))
    })?;
    Ok(DeviceRecord {
        device_id,
        user_id,
        fingerprint,
        characteristics: serde_json::from_str(&characteristics)?,
        last_ip,
        first_seen: ts_from_millis(first_seen),
        last_seen: ts_from_millis(last_seen),
        risk_level,
    })
}

impl DeviceStore for SqliteStore {
    fn get_device(&self, user_id: &str, fingerprint: &str) -> RiskResult<Option<DeviceRecord>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {DEVICE_COLUMNS} FROM device WHERE user_id = ?1 AND fingerprint = ?2"),
                params![user_id, fingerprint],
                read_row,
            )
            .optional()?;
        raw.map(into_record).transpose()
    }

    fn count_devices(&self, user_id: &str) -> RiskResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM device WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn insert_device(&self, device: &DeviceRecord) -> RiskResult<()> {
        self.conn.execute(
            &format!("INSERT INTO device ({DEVICE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                &device.device_id,
                &device.user_id,
                &device.fingerprint,
                serde_json::to_string(&device.characteristics)?,
                &device.last_ip,
                device.first_seen.timestamp_millis(),
                device.last_seen.timestamp_millis(),
                device.risk_level.as_str(),
            ],
        )?;
        Ok(())
    }

    fn touch_device(
        &self,
        user_id: &str,
        fingerprint: &str,
        seen_at: Timestamp,
        ip_address: Option<&str>,
    ) -> RiskResult<()> {
        self.conn.execute(
            "UPDATE device SET last_seen = ?1, last_ip = COALESCE(?2, last_ip)
             WHERE user_id = ?3 AND fingerprint = ?4",
            params![seen_at.timestamp_millis(), ip_address, user_id, fingerprint],
        )?;
        Ok(())
    }

    fn list_devices(&self, user_id: &str) -> RiskResult<Vec<DeviceRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DEVICE_COLUMNS} FROM device WHERE user_id = ?1 ORDER BY last_seen DESC"
        ))?;
        let rows = stmt
            .query_map(params![user_id], read_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(into_record).collect()
    }

    fn remove_device(&self, user_id: &str, fingerprint: &str) -> RiskResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM device WHERE user_id = ?1 AND fingerprint = ?2",
            params![user_id, fingerprint],
        )?;
        Ok(removed > 0)
    }
}
