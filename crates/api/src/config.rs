//! Application configuration

use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Database
    pub database_url: String,

    // Scheduled job auth: when set, every cron/debug billing route requires
    // `Authorization: Bearer <CRON_SECRET>`
    pub cron_secret: Option<String>,

    // Stripe
    pub stripe_secret_key: String,

    // Email
    pub resend_api_key: String,
    pub email_from: String,

    // Admin digest recipient
    pub report_notification_email: Option<String>,

    // Upper bound on a single billing run, in seconds
    pub billing_run_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),

            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,

            cron_secret: env::var("CRON_SECRET").ok().filter(|s| !s.is_empty()),

            stripe_secret_key: env::var("STRIPE_SECRET_KEY")
                .map_err(|_| ConfigError::Missing("STRIPE_SECRET_KEY"))?,

            resend_api_key: env::var("RESEND_API_KEY").unwrap_or_default(),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Swim Partners <noreply@swimpartners.jp>".to_string()),

            report_notification_email: env::var("REPORT_NOTIFICATION_EMAIL")
                .ok()
                .filter(|s| !s.is_empty()),

            billing_run_timeout_secs: env::var("BILLING_RUN_TIMEOUT_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure config tests run serially (they modify shared env vars)
    static CONFIG_TEST_MUTEX: Mutex<()> = Mutex::new(());

    fn setup_minimal_config() {
        env::set_var("DATABASE_URL", "postgres://test");
        env::set_var("STRIPE_SECRET_KEY", "sk_test_dummy");
        env::remove_var("CRON_SECRET");
        env::remove_var("BILLING_RUN_TIMEOUT_SECS");
    }

    fn cleanup_config() {
        env::remove_var("DATABASE_URL");
        env::remove_var("STRIPE_SECRET_KEY");
        env::remove_var("CRON_SECRET");
        env::remove_var("BILLING_RUN_TIMEOUT_SECS");
    }

    #[test]
    fn test_config_validation() {
        let _lock = CONFIG_TEST_MUTEX.lock().unwrap();

        // === Missing DATABASE_URL fails fast ===
        cleanup_config();
        env::set_var("STRIPE_SECRET_KEY", "sk_test_dummy");
        match Config::from_env() {
            Err(ConfigError::Missing("DATABASE_URL")) => {}
            other => panic!("Expected Missing(DATABASE_URL), got: {:?}", other),
        }

        // === Missing STRIPE_SECRET_KEY fails fast ===
        cleanup_config();
        env::set_var("DATABASE_URL", "postgres://test");
        match Config::from_env() {
            Err(ConfigError::Missing("STRIPE_SECRET_KEY")) => {}
            other => panic!("Expected Missing(STRIPE_SECRET_KEY), got: {:?}", other),
        }

        // === Minimal config accepted, defaults applied ===
        setup_minimal_config();
        let config = Config::from_env().expect("minimal config");
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert!(config.cron_secret.is_none());
        assert_eq!(config.billing_run_timeout_secs, 300);

        // === Empty CRON_SECRET is treated as unset ===
        env::set_var("CRON_SECRET", "");
        let config = Config::from_env().expect("config");
        assert!(config.cron_secret.is_none());

        env::set_var("CRON_SECRET", "topsecret");
        let config = Config::from_env().expect("config");
        assert_eq!(config.cron_secret.as_deref(), Some("topsecret"));

        cleanup_config();
    }
}
