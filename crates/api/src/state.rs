//! Shared application state

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use swimdesk_billing::{
    BillingRunner, DailySummary, EmailConfig, NotificationMailer, ResendTransport, StripeClient,
    StripeConfig, StripeProvider,
};

use crate::config::Config;

/// State shared by all request handlers.
///
/// Every collaborator is constructed here and passed in explicitly; there are
/// no module-level client singletons, so tests can assemble a state with fake
/// payment/email implementations.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub runner: Arc<BillingRunner>,
    pub summary: Arc<DailySummary>,
}

impl AppState {
    /// Build production state: Stripe provider + Resend transport.
    pub fn new(pool: PgPool, config: Config) -> Self {
        let stripe = StripeClient::new(StripeConfig {
            secret_key: config.stripe_secret_key.clone(),
        });
        let transport = Arc::new(ResendTransport::new(EmailConfig {
            resend_api_key: config.resend_api_key.clone(),
            email_from: config.email_from.clone(),
        }));
        let mailer = NotificationMailer::new(pool.clone(), transport);

        let runner = Arc::new(BillingRunner::new(
            pool.clone(),
            Arc::new(StripeProvider::new(stripe)),
            mailer.clone(),
            Duration::from_secs(config.billing_run_timeout_secs),
        ));
        let summary = Arc::new(DailySummary::new(
            pool.clone(),
            mailer,
            config.report_notification_email.clone(),
        ));

        Self {
            pool,
            config: Arc::new(config),
            runner,
            summary,
        }
    }
}
