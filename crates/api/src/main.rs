//! Swimdesk API server

use anyhow::Context;
use swimdesk_api::{routes::create_router, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "swimdesk_api=info,swimdesk_billing=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = swimdesk_shared::create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    // Migrations run from a dedicated single-connection pool
    {
        let migration_pool = swimdesk_shared::create_migration_pool(&config.database_url)
            .await
            .context("Failed to create migration pool")?;
        swimdesk_shared::run_migrations(&migration_pool)
            .await
            .context("Failed to run migrations")?;
        migration_pool.close().await;
    }

    // Refuse to start against a half-migrated schema
    swimdesk_shared::verify_billing_schema(&pool)
        .await
        .context("Billing schema verification failed")?;

    let bind_address = config.bind_address.clone();
    let state = AppState::new(pool, config);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    tracing::info!(address = %bind_address, "swimdesk API listening");

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
