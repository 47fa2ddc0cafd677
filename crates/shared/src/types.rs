//! Shared domain types for the billing pipeline

use serde::{Deserialize, Serialize};

/// Lifecycle of a billing schedule row.
///
/// `pending` / `awaiting_approval` rows are not yet eligible for charging.
/// The billing run only ever claims `approved` rows (plus stale `processing`
/// rows abandoned by a crashed run) and moves them to `invoiced` or `failed`.
/// Rows are never deleted by the run; the table is the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    Pending,
    AwaitingApproval,
    Approved,
    Processing,
    Invoiced,
    Failed,
}

impl BillingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingStatus::Pending => "pending",
            BillingStatus::AwaitingApproval => "awaiting_approval",
            BillingStatus::Approved => "approved",
            BillingStatus::Processing => "processing",
            BillingStatus::Invoiced => "invoiced",
            BillingStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BillingStatus::Pending),
            "awaiting_approval" => Some(BillingStatus::AwaitingApproval),
            "approved" => Some(BillingStatus::Approved),
            "processing" => Some(BillingStatus::Processing),
            "invoiced" => Some(BillingStatus::Invoiced),
            "failed" => Some(BillingStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for BillingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            BillingStatus::Pending,
            BillingStatus::AwaitingApproval,
            BillingStatus::Approved,
            BillingStatus::Processing,
            BillingStatus::Invoiced,
            BillingStatus::Failed,
        ] {
            assert_eq!(BillingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BillingStatus::parse("charged"), None);
    }
}
