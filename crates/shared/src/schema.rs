//! Startup schema verification
//!
//! The billing run depends on columns that were added to `lesson_schedules`
//! after the table was first created. Rather than discovering the schema at
//! runtime, every binary verifies the columns it needs once at startup and
//! refuses to start if a migration is missing.

use sqlx::PgPool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("missing column {table}.{column} (run pending migrations)")]
    MissingColumn { table: String, column: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Columns the billing pipeline reads or writes.
const REQUIRED_COLUMNS: &[(&str, &str)] = &[
    ("students", "stripe_customer_id"),
    ("students", "contact_email"),
    ("students", "membership_type_id"),
    ("lesson_schedules", "billing_status"),
    ("lesson_schedules", "billing_scheduled_at"),
    ("lesson_schedules", "billing_claimed_at"),
    ("lesson_schedules", "notification_sent_at"),
    ("lesson_schedules", "charge_started_at"),
    ("lesson_schedules", "price"),
    ("lesson_schedules", "stripe_invoice_item_id"),
    ("lesson_schedules", "stripe_invoice_id"),
    ("lesson_schedules", "payment_intent_id"),
    ("lesson_schedules", "error_message"),
    ("email_templates", "key"),
    ("email_templates", "subject"),
    ("email_templates", "body"),
    ("email_templates", "variables"),
];

/// Verify that every column the billing pipeline touches exists.
pub async fn verify_billing_schema(pool: &PgPool) -> Result<(), SchemaError> {
    for (table, column) in REQUIRED_COLUMNS {
        let exists: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM information_schema.columns
            WHERE table_schema = 'public' AND table_name = $1 AND column_name = $2
            "#,
        )
        .bind(table)
        .bind(column)
        .fetch_optional(pool)
        .await?;

        if exists.is_none() {
            return Err(SchemaError::MissingColumn {
                table: (*table).to_string(),
                column: (*column).to_string(),
            });
        }
    }

    Ok(())
}
