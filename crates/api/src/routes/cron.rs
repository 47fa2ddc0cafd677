//! Scheduled-job trigger routes
//!
//! The external scheduler hits `/api/cron/billing` on its tick;
//! `/api/debug/billing-test` exists for manual runs and goes through the same
//! authorization check. When `CRON_SECRET` is unset (local development only)
//! the check is a no-op.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use serde::Serialize;
use subtle::ConstantTimeEq;
use swimdesk_billing::{RunLogEntry, SummaryOutcome};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct BillingRunResponse {
    pub success: bool,
    pub logs: Vec<RunLogEntry>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: SummaryOutcome,
}

/// Shared authorization check for every route that can move money.
///
/// Uses a constant-time comparison so the secret cannot be guessed a byte at
/// a time from response timing.
pub fn authorize_cron(headers: &HeaderMap, secret: Option<&str>) -> Result<(), ApiError> {
    let Some(secret) = secret else {
        return Ok(());
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    if provided.as_bytes().ct_eq(secret.as_bytes()).into() {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// GET /api/cron/billing and /api/debug/billing-test
pub async fn run_billing(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<BillingRunResponse>> {
    authorize_cron(&headers, state.config.cron_secret.as_deref())?;

    let logs = state.runner.run_monthly_billing().await?;
    Ok(Json(BillingRunResponse {
        success: true,
        logs,
    }))
}

/// GET /api/cron/daily-billing-summary
pub async fn run_daily_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<SummaryResponse>> {
    authorize_cron(&headers, state.config.cron_secret.as_deref())?;

    let outcome = state.summary.run().await?;
    Ok(Json(SummaryResponse {
        success: true,
        outcome,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn no_configured_secret_allows_the_request() {
        assert!(authorize_cron(&HeaderMap::new(), None).is_ok());
    }

    #[test]
    fn missing_header_is_rejected_when_secret_is_set() {
        let err = authorize_cron(&HeaderMap::new(), Some("topsecret")).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[test]
    fn wrong_token_is_rejected() {
        let headers = headers_with_bearer("not-the-secret");
        let err = authorize_cron(&headers, Some("topsecret")).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[test]
    fn malformed_scheme_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dG9wc2VjcmV0"),
        );
        let err = authorize_cron(&headers, Some("topsecret")).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[test]
    fn matching_token_is_accepted() {
        let headers = headers_with_bearer("topsecret");
        assert!(authorize_cron(&headers, Some("topsecret")).is_ok());
    }

    #[test]
    fn prefix_of_the_secret_is_rejected() {
        let headers = headers_with_bearer("topsecre");
        let err = authorize_cron(&headers, Some("topsecret")).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }
}
