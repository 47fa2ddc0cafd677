//! Stored email templates and `{{var}}` substitution
//!
//! Templates live in the `email_templates` table and are editable by admins.
//! The `variables` column declares exactly which placeholders the body may
//! use; rendering fails when a declared variable cannot be resolved so a
//! customer never receives a mail with a blank amount or date.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Values supplied for one render, keyed by variable name
pub type TemplateVars = HashMap<&'static str, String>;

/// A stored email template
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmailTemplate {
    pub id: Uuid,
    pub key: String,
    pub subject: String,
    pub body: String,
    pub variables: Vec<String>,
    pub description: Option<String>,
    pub updated_at: OffsetDateTime,
}

/// A fully substituted subject/body pair ready to hand to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

impl EmailTemplate {
    /// Look up a template by its unique key
    pub async fn load(pool: &PgPool, key: &str) -> BillingResult<Self> {
        let template: Option<EmailTemplate> = sqlx::query_as(
            "SELECT id, key, subject, body, variables, description, updated_at
             FROM email_templates WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(pool)
        .await?;

        template.ok_or_else(|| BillingError::TemplateMissing(key.to_string()))
    }

    /// Substitute every declared variable into the subject and body.
    ///
    /// Fails if any declared variable is absent or empty in `vars` — partial
    /// substitution is never allowed to reach a customer.
    pub fn render(&self, vars: &TemplateVars) -> BillingResult<RenderedEmail> {
        let mut subject = self.subject.clone();
        let mut body = self.body.clone();

        for name in &self.variables {
            let value = vars
                .get(name.as_str())
                .map(String::as_str)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| BillingError::TemplateVariable {
                    template: self.key.clone(),
                    variable: name.clone(),
                })?;

            let placeholder = format!("{{{{{}}}}}", name);
            subject = subject.replace(&placeholder, value);
            body = body.replace(&placeholder, value);
        }

        Ok(RenderedEmail { subject, body })
    }
}
