//! Recurring billing run
//!
//! Claims due lesson-billing schedules, sends the pre-charge notice, charges
//! the stored Stripe customer, and records one log entry per schedule. The
//! claim is an atomic compare-and-set on `billing_status`, so overlapping
//! invocations (cron retry plus a manual trigger) can never charge the same
//! row twice, and re-running with no new due rows is a no-op.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::PgPool;
use time::format_description::FormatItem;
use time::macros::{format_description, offset};
use time::OffsetDateTime;
use uuid::Uuid;

use swimdesk_shared::BillingStatus;

use crate::error::{BillingError, BillingResult};
use crate::mailer::NotificationMailer;
use crate::provider::{ChargeOutcome, PaymentProvider};
use crate::template::{EmailTemplate, TemplateVars};

/// Template sent to the student before the charge is executed
pub const NOTICE_TEMPLATE_KEY: &str = "schedule_overage_billing";

/// Rows claimed per round trip
const CLAIM_BATCH: i64 = 100;

/// Reason line for single-ticket (単発) memberships
const REASON_SINGLE: &str =
    "ご登録の会員プランに基づき、レッスン料をご請求させていただきます。";

/// Reason line for over-allowance lessons
const REASON_OVERAGE: &str =
    "月規定回数を超過しているため、追加レッスン料をご請求させていただきます。";

const DATE_FMT: &[FormatItem<'static>] = format_description!("[year]/[month]/[day]");
const TIME_FMT: &[FormatItem<'static>] = format_description!("[hour]:[minute]");

/// Per-schedule outcome in the run log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Charged,
    Failed,
}

/// One entry per processed schedule, returned to the cron caller
#[derive(Debug, Clone, Serialize)]
pub struct RunLogEntry {
    pub schedule_id: Uuid,
    pub student_id: Option<Uuid>,
    pub status: RunOutcome,
    pub amount_yen: Option<i64>,
    /// Whether the pre-charge notice is confirmed sent for this schedule
    /// (either during this run or a previous one)
    pub notified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A due schedule row claimed by this run
#[derive(Debug, Clone, sqlx::FromRow)]
struct ClaimedSchedule {
    id: Uuid,
    student_id: Option<Uuid>,
    title: String,
    start_time: OffsetDateTime,
    price: Option<i32>,
    notification_sent_at: Option<OffsetDateTime>,
    /// Set just before the previous charge attempt went out to Stripe
    charge_started_at: Option<OffsetDateTime>,
    /// True when this row was taken back from a stale `processing` claim
    reclaimed: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct StudentRow {
    id: Uuid,
    full_name: String,
    second_student_name: Option<String>,
    contact_email: Option<String>,
    stripe_customer_id: Option<String>,
    membership_name: Option<String>,
}

/// The recurring billing job
pub struct BillingRunner {
    pool: PgPool,
    payments: Arc<dyn PaymentProvider>,
    mailer: NotificationMailer,
    run_timeout: Duration,
}

impl BillingRunner {
    pub fn new(
        pool: PgPool,
        payments: Arc<dyn PaymentProvider>,
        mailer: NotificationMailer,
        run_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            payments,
            mailer,
            run_timeout,
        }
    }

    /// Process every due billing schedule and return the per-schedule log.
    ///
    /// Job-level failures (database unreachable, notice template missing,
    /// run timeout) surface as an error; per-schedule failures are recorded
    /// in the log and do not abort the run.
    pub async fn run_monthly_billing(&self) -> BillingResult<Vec<RunLogEntry>> {
        let timeout_secs = self.run_timeout.as_secs();
        tokio::time::timeout(self.run_timeout, self.process_due())
            .await
            .map_err(|_| BillingError::Timeout(timeout_secs))?
    }

    async fn process_due(&self) -> BillingResult<Vec<RunLogEntry>> {
        // The notice template is a configuration prerequisite: without it no
        // customer can be warned before a charge, so the whole run fails.
        let template = EmailTemplate::load(&self.pool, NOTICE_TEMPLATE_KEY).await?;

        let mut log = Vec::new();
        loop {
            let claimed = self.claim_due_batch().await?;
            if claimed.is_empty() {
                break;
            }

            tracing::info!(count = claimed.len(), "Claimed due billing schedules");

            for schedule in claimed {
                let entry = self.process_schedule(&template, schedule).await;
                log.push(entry);
            }
        }

        tracing::info!(
            processed = log.len(),
            charged = log.iter().filter(|e| e.status == RunOutcome::Charged).count(),
            failed = log.iter().filter(|e| e.status == RunOutcome::Failed).count(),
            "Billing run complete"
        );

        Ok(log)
    }

    /// Atomically claim a batch of due rows.
    ///
    /// `FOR UPDATE SKIP LOCKED` plus the status transition make the claim a
    /// compare-and-set: a row claimed here is invisible to any concurrent
    /// invocation. `processing` rows older than an hour are reclaimed so a
    /// crashed run cannot strand schedules forever.
    async fn claim_due_batch(&self) -> BillingResult<Vec<ClaimedSchedule>> {
        let claimed: Vec<ClaimedSchedule> = sqlx::query_as(
            r#"
            UPDATE lesson_schedules ls
               SET billing_status = $2, billing_claimed_at = NOW()
              FROM (
                  SELECT id, billing_status AS prev_status
                    FROM lesson_schedules
                   WHERE billing_scheduled_at IS NOT NULL
                     AND billing_scheduled_at <= NOW()
                     AND (
                         billing_status = $3
                         OR (billing_status = $2
                             AND billing_claimed_at < NOW() - INTERVAL '1 hour')
                     )
                   ORDER BY billing_scheduled_at ASC
                   LIMIT $1
                     FOR UPDATE SKIP LOCKED
              ) due
             WHERE ls.id = due.id
            RETURNING ls.id, ls.student_id, ls.title, ls.start_time, ls.price,
                      ls.notification_sent_at, ls.charge_started_at,
                      (due.prev_status = $2) AS reclaimed
            "#,
        )
        .bind(CLAIM_BATCH)
        .bind(BillingStatus::Processing.as_str())
        .bind(BillingStatus::Approved.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(claimed)
    }

    async fn process_schedule(
        &self,
        template: &EmailTemplate,
        schedule: ClaimedSchedule,
    ) -> RunLogEntry {
        let schedule_id = schedule.id;
        let student_id = schedule.student_id;
        let amount_yen = schedule.price.map(i64::from);
        let mut notified = schedule.notification_sent_at.is_some();

        match self.notify_and_charge(template, &schedule, &mut notified).await {
            Ok(amount) => {
                tracing::info!(
                    schedule_id = %schedule_id,
                    amount_yen = amount,
                    "Schedule charged"
                );
                RunLogEntry {
                    schedule_id,
                    student_id,
                    status: RunOutcome::Charged,
                    amount_yen: Some(amount),
                    notified,
                    error: None,
                }
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(
                    schedule_id = %schedule_id,
                    error = %message,
                    "Schedule failed"
                );
                if let Err(db_err) = self.mark_failed(schedule_id, &message).await {
                    tracing::error!(
                        schedule_id = %schedule_id,
                        error = %db_err,
                        "Failed to record schedule failure"
                    );
                }
                RunLogEntry {
                    schedule_id,
                    student_id,
                    status: RunOutcome::Failed,
                    amount_yen,
                    notified,
                    error: Some(message),
                }
            }
        }
    }

    /// Notice first, charge second. The notice template promises the charge
    /// will follow the notification, so a failed notice blocks the charge and
    /// the row lands in `failed` for an admin to re-approve.
    async fn notify_and_charge(
        &self,
        template: &EmailTemplate,
        schedule: &ClaimedSchedule,
        notified: &mut bool,
    ) -> BillingResult<i64> {
        // A reclaimed row whose previous run got as far as Stripe may already
        // be charged there; never re-charge it automatically.
        if schedule.reclaimed && schedule.charge_started_at.is_some() {
            return Err(BillingError::ChargeUnverified(schedule.id));
        }

        let student_id = schedule
            .student_id
            .ok_or_else(|| BillingError::Internal("schedule has no student".to_string()))?;

        let student = self.fetch_student(student_id).await?;

        let amount = match schedule.price.map(i64::from) {
            Some(p) if p > 0 => p,
            other => return Err(BillingError::InvalidAmount(other.unwrap_or(0))),
        };

        let customer_ref = student
            .stripe_customer_id
            .as_deref()
            .ok_or_else(|| BillingError::CustomerNotFound(student.id.to_string()))?;

        let is_single = student
            .membership_name
            .as_deref()
            .is_some_and(|name| name.contains("単発"));

        if !*notified {
            if let Some(email) = student.contact_email.as_deref() {
                let vars = notice_vars(&student, schedule, amount, is_single)?;
                let sent = self.mailer.send_rendered(template, email, &vars).await?;
                if !sent {
                    return Err(BillingError::Internal(
                        "pre-charge notification could not be sent".to_string(),
                    ));
                }
                self.mark_notified(schedule.id).await?;
                *notified = true;
            }
            // No contact email on file: nothing to notify, proceed to charge.
        }

        let start_jst = schedule.start_time.to_offset(offset!(+9));
        let label = if is_single { "レッスン料" } else { "追加レッスン料" };
        let description = format!(
            "{} ({}): {}",
            label,
            format_dt(start_jst, DATE_FMT)?,
            schedule.title
        );

        // Persist the intent before the money moves: if the run dies between
        // here and `mark_invoiced`, the reclaim path sees `charge_started_at`
        // and routes the row to reconciliation instead of charging again.
        self.mark_charge_started(schedule.id).await?;

        let outcome = self.payments.charge(customer_ref, amount, &description).await?;
        self.mark_invoiced(schedule.id, &outcome).await?;

        Ok(amount)
    }

    async fn fetch_student(&self, student_id: Uuid) -> BillingResult<StudentRow> {
        let student: Option<StudentRow> = sqlx::query_as(
            r#"
            SELECT s.id, s.full_name, s.second_student_name, s.contact_email,
                   s.stripe_customer_id, m.name AS membership_name
            FROM students s
            LEFT JOIN membership_types m ON m.id = s.membership_type_id
            WHERE s.id = $1
            "#,
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;

        student.ok_or_else(|| BillingError::CustomerNotFound(student_id.to_string()))
    }

    /// Recorded only after the transport confirmed the send, so the notice is
    /// never silently re-sent on the next run.
    async fn mark_notified(&self, schedule_id: Uuid) -> BillingResult<()> {
        sqlx::query("UPDATE lesson_schedules SET notification_sent_at = NOW() WHERE id = $1")
            .bind(schedule_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_charge_started(&self, schedule_id: Uuid) -> BillingResult<()> {
        sqlx::query("UPDATE lesson_schedules SET charge_started_at = NOW() WHERE id = $1")
            .bind(schedule_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_invoiced(&self, schedule_id: Uuid, outcome: &ChargeOutcome) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE lesson_schedules
               SET billing_status = $2,
                   stripe_invoice_item_id = $3,
                   stripe_invoice_id = $4,
                   payment_intent_id = $5,
                   error_message = NULL
             WHERE id = $1
            "#,
        )
        .bind(schedule_id)
        .bind(BillingStatus::Invoiced.as_str())
        .bind(&outcome.invoice_item_id)
        .bind(&outcome.invoice_id)
        .bind(outcome.payment_intent_id.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, schedule_id: Uuid, error: &str) -> BillingResult<()> {
        sqlx::query(
            "UPDATE lesson_schedules SET billing_status = $3, error_message = $2 WHERE id = $1",
        )
        .bind(schedule_id)
        .bind(error)
        .bind(BillingStatus::Failed.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn notice_vars(
    student: &StudentRow,
    schedule: &ClaimedSchedule,
    amount: i64,
    is_single: bool,
) -> BillingResult<TemplateVars> {
    let start_jst = schedule.start_time.to_offset(offset!(+9));

    let mut vars = TemplateVars::new();
    vars.insert("name", format_student_names(student));
    vars.insert("amount", format_yen(amount));
    vars.insert("date", format_dt(start_jst, DATE_FMT)?);
    vars.insert("time", format_dt(start_jst, TIME_FMT)?);
    vars.insert("title", schedule.title.clone());
    vars.insert(
        "reason",
        if is_single { REASON_SINGLE } else { REASON_OVERAGE }.to_string(),
    );
    Ok(vars)
}

/// Sibling enrollments share one contact, shown as 「一郎・二郎」
fn format_student_names(student: &StudentRow) -> String {
    match student.second_student_name.as_deref() {
        Some(second) if !second.is_empty() => format!("{}・{}", student.full_name, second),
        _ => student.full_name.clone(),
    }
}

/// Thousands-separated yen amount, e.g. 8800 -> "8,800"
pub fn format_yen(amount: i64) -> String {
    let negative = amount < 0;
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if negative {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

fn format_dt(dt: OffsetDateTime, fmt: &[FormatItem<'static>]) -> BillingResult<String> {
    dt.format(fmt)
        .map_err(|e| BillingError::Internal(format!("date formatting failed: {}", e)))
}
