//! Email notifications for billing events
//!
//! Renders stored templates and sends them via the Resend API. Transport
//! failures are non-fatal (`Ok(false)`) so a flaky mail provider cannot abort
//! a billing run; template problems are real errors and propagate.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::BillingResult;
use crate::template::{EmailTemplate, TemplateVars};

/// Email configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Resend API key
    pub resend_api_key: String,
    /// From address for emails
    pub email_from: String,
}

impl EmailConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            resend_api_key: std::env::var("RESEND_API_KEY").unwrap_or_default(),
            email_from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Swim Partners <noreply@swimpartners.jp>".to_string()),
        }
    }

    /// Check if email sending is enabled
    pub fn is_enabled(&self) -> bool {
        !self.resend_api_key.is_empty()
    }
}

/// Transport seam so tests can capture sends instead of hitting the network
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Returns `Ok(true)` when the provider confirmed the send, `Ok(false)`
    /// when sending failed non-fatally.
    async fn send(&self, to: &str, subject: &str, body: &str) -> BillingResult<bool>;
}

/// Resend API transport
#[derive(Clone)]
pub struct ResendTransport {
    config: EmailConfig,
    client: reqwest::Client,
}

impl ResendTransport {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(EmailConfig::from_env())
    }
}

#[async_trait]
impl EmailTransport for ResendTransport {
    async fn send(&self, to: &str, subject: &str, body: &str) -> BillingResult<bool> {
        if !self.config.is_enabled() {
            tracing::warn!(
                to = %to,
                subject = %subject,
                "Email not configured, skipping"
            );
            return Ok(false);
        }

        #[allow(clippy::disallowed_methods)]
        // json! macro uses unwrap internally, safe for primitive types
        let payload = serde_json::json!({
            "from": self.config.email_from,
            "to": [to],
            "subject": subject,
            "text": body
        });

        let response = self
            .client
            .post("https://api.resend.com/emails")
            .header(
                "Authorization",
                format!("Bearer {}", self.config.resend_api_key),
            )
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(to = %to, subject = %subject, "Billing email sent");
                Ok(true)
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                tracing::error!(
                    to = %to,
                    status = %status,
                    body = %body,
                    "Failed to send billing email - non-fatal"
                );
                Ok(false)
            }
            Err(e) => {
                tracing::error!(
                    to = %to,
                    error = %e,
                    "Failed to send billing email - non-fatal"
                );
                Ok(false)
            }
        }
    }
}

/// Template-driven notification sender
#[derive(Clone)]
pub struct NotificationMailer {
    pool: PgPool,
    transport: Arc<dyn EmailTransport>,
}

impl NotificationMailer {
    pub fn new(pool: PgPool, transport: Arc<dyn EmailTransport>) -> Self {
        Self { pool, transport }
    }

    /// Render the stored template `key` with `vars` and send it to `to`.
    ///
    /// Errors for a missing template or an unresolvable variable; returns
    /// `Ok(false)` when the transport itself failed.
    pub async fn send_template(
        &self,
        key: &str,
        to: &str,
        vars: &TemplateVars,
    ) -> BillingResult<bool> {
        let template = EmailTemplate::load(&self.pool, key).await?;
        self.send_rendered(&template, to, vars).await
    }

    /// Same as [`send_template`](Self::send_template) but with a template the
    /// caller already loaded (the billing run loads it once per run).
    pub async fn send_rendered(
        &self,
        template: &EmailTemplate,
        to: &str,
        vars: &TemplateVars,
    ) -> BillingResult<bool> {
        let rendered = template.render(vars)?;
        self.transport
            .send(to, &rendered.subject, &rendered.body)
            .await
    }
}
