//! Swimdesk background worker
//!
//! Runs the billing jobs on an in-process schedule, independent of the
//! external cron hitting the API. Both paths drive the same `BillingRunner`,
//! and the row-level claim makes overlapping invocations safe.

use anyhow::Context;
use swimdesk_api::{AppState, Config};
use tokio_cron_scheduler::{Job, JobScheduler};

/// Billing run: every 10 minutes (charges become due at 12:00 JST, the
/// frequent tick keeps late approvals from waiting a full day)
const BILLING_SCHEDULE: &str = "0 */10 * * * *";

/// Admin digest: 03:00 UTC = 12:00 JST daily
const SUMMARY_SCHEDULE: &str = "0 0 3 * * *";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "swimdesk_worker=info,swimdesk_billing=info".into()),
        )
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = swimdesk_shared::create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    // The API owns migrations; the worker only refuses to run against a
    // schema that is missing billing columns.
    swimdesk_shared::verify_billing_schema(&pool)
        .await
        .context("Billing schema verification failed")?;

    let state = AppState::new(pool, config);

    let scheduler = JobScheduler::new()
        .await
        .context("Failed to create job scheduler")?;

    let billing_state = state.clone();
    scheduler
        .add(Job::new_async(BILLING_SCHEDULE, move |_uuid, _lock| {
            let state = billing_state.clone();
            Box::pin(async move {
                match state.runner.run_monthly_billing().await {
                    Ok(logs) => {
                        if !logs.is_empty() {
                            tracing::info!(processed = logs.len(), "Scheduled billing run complete");
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Scheduled billing run failed"),
                }
            })
        })?)
        .await
        .context("Failed to register billing job")?;

    let summary_state = state.clone();
    scheduler
        .add(Job::new_async(SUMMARY_SCHEDULE, move |_uuid, _lock| {
            let state = summary_state.clone();
            Box::pin(async move {
                match state.summary.run().await {
                    Ok(outcome) => tracing::info!(
                        count = outcome.count,
                        total_yen = outcome.total_yen,
                        sent = outcome.sent,
                        "Daily billing summary complete"
                    ),
                    Err(e) => tracing::error!(error = %e, "Daily billing summary failed"),
                }
            })
        })?)
        .await
        .context("Failed to register summary job")?;

    scheduler.start().await.context("Failed to start scheduler")?;
    tracing::info!("swimdesk worker started");

    // Jobs run on the scheduler's tasks; park the main task.
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down worker");

    Ok(())
}
