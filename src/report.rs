//! Forum reports for Agora.
//!
//! Monthly post and signup counts, bucketed by the month a row was created in
//! the configured timezone.

use std::collections::BTreeMap;

use crate::datetime::{format_datetime, month_label};
use crate::db::DbPool;
use crate::{AgoraError, Result};

/// Number of rows created in one month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyCount {
    pub month: String,
    pub count: i64,
}

/// Repository for report queries.
pub struct ReportRepository<'a> {
    pool: &'a DbPool,
    timezone: String,
}

impl<'a> ReportRepository<'a> {
    /// Create a new ReportRepository bucketing months in `timezone`.
    pub fn new(pool: &'a DbPool, timezone: impl Into<String>) -> Self {
        Self {
            pool,
            timezone: timezone.into(),
        }
    }

    /// Posts per month as `YYYY-MM`, newest first.
    pub async fn monthly_posts(&self) -> Result<Vec<MonthlyCount>> {
        let slots = self.slot_counts("posts").await?;
        Ok(self.bucket(&slots))
    }

    /// Member signups per month labelled like `2024 March`, newest first.
    pub async fn monthly_signups(&self) -> Result<Vec<MonthlyCount>> {
        let slots = self.slot_counts("members").await?;
        Ok(self
            .bucket(&slots)
            .into_iter()
            .map(|row| MonthlyCount {
                month: month_label(&row.month),
                count: row.count,
            })
            .collect())
    }

    /// Row counts per quarter hour of UTC creation time.
    ///
    /// Every zone offset in use is a multiple of fifteen minutes, so a slot
    /// never straddles a local month boundary.
    async fn slot_counts(&self, table: &'static str) -> Result<Vec<(String, i64)>> {
        let sql = format!(
            "SELECT COALESCE(
                 strftime('%Y-%m-%d %H:', created_at)
                     || printf('%02d', CAST(strftime('%M', created_at) AS INTEGER) / 15 * 15)
                     || ':00',
                 created_at) AS slot,
                 COUNT(*) AS num
             FROM {table}
             GROUP BY slot"
        );
        sqlx::query_as(&sql)
            .fetch_all(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))
    }

    fn bucket(&self, slots: &[(String, i64)]) -> Vec<MonthlyCount> {
        let mut months: BTreeMap<String, i64> = BTreeMap::new();
        for (slot, count) in slots {
            let month = format_datetime(slot, &self.timezone, "%Y-%m");
            // Unparseable timestamps come back unchanged; keep their date prefix.
            let month = month.get(..7).unwrap_or(&month).to_string();
            *months.entry(month).or_default() += count;
        }

        months
            .into_iter()
            .rev()
            .map(|(month, count)| MonthlyCount { month, count })
            .collect()
    }
}
