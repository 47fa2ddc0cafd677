//! Billing error types

use thiserror::Error;
use uuid::Uuid;

/// Billing-specific errors
///
/// Configuration problems (`Config`, `TemplateMissing`) fail a whole run;
/// everything else is recoverable per schedule and ends up in the run log.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    #[error("Invalid charge amount: {0} yen")]
    InvalidAmount(i64),

    #[error("Schedule {0}: a previous charge attempt may have reached Stripe; manual reconciliation required")]
    ChargeUnverified(Uuid),

    #[error("Email template not found: {0}")]
    TemplateMissing(String),

    #[error("Template {template}: variable {{{{{variable}}}}} could not be resolved")]
    TemplateVariable { template: String, variable: String },

    #[error("Billing run exceeded {0}s time limit")]
    Timeout(u64),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        BillingError::StripeApi(err.to_string())
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
