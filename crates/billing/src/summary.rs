//! Next-day billing digest for the administrator
//!
//! Once a day (the charges fire at 12:00 JST) the school owner gets a digest
//! of everything scheduled to be charged tomorrow, so surprises can be pulled
//! back before the money moves.

use serde::Serialize;
use sqlx::PgPool;
use time::format_description::FormatItem;
use time::macros::{format_description, offset};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use swimdesk_shared::BillingStatus;

use crate::error::{BillingError, BillingResult};
use crate::mailer::NotificationMailer;
use crate::run::format_yen;
use crate::template::TemplateVars;

/// Template sent to the admin address
pub const SUMMARY_TEMPLATE_KEY: &str = "admin_daily_billing_summary";

const DATE_FMT: &[FormatItem<'static>] = format_description!("[year]/[month]/[day]");
const TIME_FMT: &[FormatItem<'static>] = format_description!("[hour]:[minute]");

#[derive(Debug, Clone, Serialize)]
pub struct SummaryOutcome {
    pub count: usize,
    pub total_yen: i64,
    pub sent: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SummaryRow {
    #[allow(dead_code)]
    id: Uuid,
    start_time: OffsetDateTime,
    title: String,
    price: Option<i32>,
    full_name: Option<String>,
}

/// Daily admin summary job
pub struct DailySummary {
    pool: PgPool,
    mailer: NotificationMailer,
    report_email: Option<String>,
}

impl DailySummary {
    pub fn new(pool: PgPool, mailer: NotificationMailer, report_email: Option<String>) -> Self {
        Self {
            pool,
            mailer,
            report_email,
        }
    }

    /// Collect tomorrow's approved charges (JST calendar day) and mail the
    /// digest. Returns the aggregate even when there is nothing to send.
    pub async fn run(&self) -> BillingResult<SummaryOutcome> {
        let now_jst = OffsetDateTime::now_utc().to_offset(offset!(+9));
        let window_start = (now_jst.date() + Duration::days(1))
            .midnight()
            .assume_offset(offset!(+9));
        let window_end = window_start + Duration::days(1);

        let rows: Vec<SummaryRow> = sqlx::query_as(
            r#"
            SELECT ls.id, ls.start_time, ls.title, ls.price, s.full_name
            FROM lesson_schedules ls
            LEFT JOIN students s ON s.id = ls.student_id
            WHERE ls.billing_status = $3
              AND ls.billing_scheduled_at >= $1
              AND ls.billing_scheduled_at < $2
            ORDER BY ls.start_time ASC
            "#,
        )
        .bind(window_start)
        .bind(window_end)
        .bind(BillingStatus::Approved.as_str())
        .fetch_all(&self.pool)
        .await?;

        let count = rows.len();
        let total_yen: i64 = rows.iter().map(|r| i64::from(r.price.unwrap_or(0))).sum();

        if count == 0 {
            tracing::info!("No approved billings scheduled for tomorrow");
            return Ok(SummaryOutcome {
                count,
                total_yen,
                sent: false,
            });
        }

        let Some(report_email) = self.report_email.as_deref() else {
            tracing::error!("No admin report email configured (REPORT_NOTIFICATION_EMAIL)");
            return Ok(SummaryOutcome {
                count,
                total_yen,
                sent: false,
            });
        };

        let items_list = rows
            .iter()
            .map(format_summary_line)
            .collect::<BillingResult<Vec<_>>>()?
            .join("\n");

        let date_str = window_start
            .format(DATE_FMT)
            .map_err(|e| BillingError::Internal(format!("date formatting failed: {}", e)))?;

        let mut vars = TemplateVars::new();
        vars.insert("date", date_str);
        vars.insert("count", count.to_string());
        vars.insert("total_amount", format!("¥{}", format_yen(total_yen)));
        vars.insert("items_list", items_list);

        let sent = self
            .mailer
            .send_template(SUMMARY_TEMPLATE_KEY, report_email, &vars)
            .await?;

        tracing::info!(
            count = count,
            total_yen = total_yen,
            sent = sent,
            "Daily billing summary processed"
        );

        Ok(SummaryOutcome {
            count,
            total_yen,
            sent,
        })
    }
}

fn format_summary_line(row: &SummaryRow) -> BillingResult<String> {
    let time_jst = row
        .start_time
        .to_offset(offset!(+9))
        .format(TIME_FMT)
        .map_err(|e| BillingError::Internal(format!("date formatting failed: {}", e)))?;
    let name = row.full_name.as_deref().unwrap_or("不明");
    let price = format_yen(i64::from(row.price.unwrap_or(0)));
    Ok(format!("・{} {}様: ¥{} ({})", time_jst, name, price, row.title))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn summary_line_shows_jst_time_and_grouped_price() {
        let row = SummaryRow {
            id: Uuid::new_v4(),
            // 01:30 UTC = 10:30 JST
            start_time: datetime!(2026-09-01 01:30 UTC),
            title: "追加レッスン".to_string(),
            price: Some(8800),
            full_name: Some("山田 一郎".to_string()),
        };
        assert_eq!(
            format_summary_line(&row).unwrap(),
            "・10:30 山田 一郎様: ¥8,800 (追加レッスン)"
        );
    }

    #[test]
    fn summary_line_tolerates_missing_student_and_price() {
        let row = SummaryRow {
            id: Uuid::new_v4(),
            start_time: datetime!(2026-09-01 01:30 UTC),
            title: "体験".to_string(),
            price: None,
            full_name: None,
        };
        assert_eq!(
            format_summary_line(&row).unwrap(),
            "・10:30 不明様: ¥0 (体験)"
        );
    }
}
