//! Store methods for payment history and screened attempts.

use super::{PaymentStore, SqliteStore};
use crate::{
    error::{RiskError, RiskResult},
    payment_fraud::{PaymentAssessment, PaymentAttempt, PaymentRecord, PaymentStatus},
    types::{ts_from_millis, Timestamp},
};
use rusqlite::params;

impl PaymentStore for SqliteStore {
    fn insert_payment(&self, record: &PaymentRecord) -> RiskResult<()> {
        self.conn.execute(
            "INSERT INTO payment (payment_id, user_id, amount, status, ip_address, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &record.payment_id,
                &record.user_id,
                record.amount,
                record.status.as_str(),
                &record.ip_address,
                record.created_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn recent_payments(&self, user_id: &str, since: Timestamp, limit: usize) -> RiskResult<Vec<PaymentRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT payment_id, user_id, amount, status, ip_address, created_at
             FROM payment
             WHERE user_id = ?1 AND created_at >= ?2
             ORDER BY created_at DESC LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![user_id, since.timestamp_millis(), limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(payment_id, user_id, amount, status, ip_address, created_at)| {
                let status = PaymentStatus::parse(&status).ok_or_else(|| {
                    RiskError::Other(anyhow::anyhow!("unknown payment status '{status}' on {payment_id}"))
                })?;
                Ok(PaymentRecord {
                    payment_id,
                    user_id,
                    amount,
                    status,
                    ip_address,
                    created_at: ts_from_millis(created_at),
                })
            })
            .collect()
    }

    fn insert_payment_attempt(
        &self,
        attempt_id: &str,
        attempt: &PaymentAttempt,
        assessment: &PaymentAssessment,
    ) -> RiskResult<()> {
        self.conn.execute(
            "INSERT INTO payment_attempt (
                attempt_id, user_id, amount, payment_method, ip_address, device_fingerprint,
                attempted_at, risk_level, recommended_action, confidence
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                attempt_id,
                &attempt.user_id,
                attempt.amount,
                attempt.payment_method.as_str(),
                &attempt.ip_address,
                &attempt.device_fingerprint,
                attempt.timestamp.timestamp_millis(),
                assessment.risk_level.as_str(),
                assessment.recommended_action.as_str(),
                assessment.confidence,
            ],
        )?;
        Ok(())
    }

    fn count_payment_attempts(&self, user_id: &str, since: Timestamp) -> RiskResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM payment_attempt WHERE user_id = ?1 AND attempted_at >= ?2",
            params![user_id, since.timestamp_millis()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn count_ip_payment_attempts(&self, ip_address: &str, since: Timestamp) -> RiskResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM payment_attempt WHERE ip_address = ?1 AND attempted_at >= ?2",
            params![ip_address, since.timestamp_millis()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn distinct_payment_ips(&self, user_id: &str, since: Timestamp) -> RiskResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT ip_address FROM payment_attempt
             WHERE user_id = ?1 AND attempted_at >= ?2
             ORDER BY ip_address",
        )?;
        let ips = stmt
            .query_map(params![user_id, since.timestamp_millis()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ips)
    }
}
