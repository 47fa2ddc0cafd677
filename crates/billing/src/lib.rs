//! Swimdesk Billing
//!
//! Recurring lesson billing for the swim school back office: claims due
//! billing schedules, sends the pre-charge notice email, executes the charge
//! through Stripe, and records the outcome per schedule.

pub mod client;
pub mod error;
pub mod mailer;
pub mod provider;
pub mod run;
pub mod summary;
pub mod template;

pub use client::{StripeClient, StripeConfig};
pub use error::{BillingError, BillingResult};
pub use mailer::{EmailConfig, EmailTransport, NotificationMailer, ResendTransport};
pub use provider::{ChargeOutcome, PaymentProvider, StripeProvider};
pub use run::{BillingRunner, RunLogEntry, RunOutcome};
pub use summary::{DailySummary, SummaryOutcome};
pub use template::{EmailTemplate, RenderedEmail, TemplateVars};
