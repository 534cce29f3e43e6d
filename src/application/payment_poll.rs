use crate::domain::payment::TransactionStatus;
use crate::domain::ports::PaymentGateway;
use std::time::Duration;
use tracing::{debug, warn};

/// How long to keep asking the provider for a terminal status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval: Duration::from_secs(1),
        }
    }
}

/// What polling ended with. `status` is always terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub status: TransactionStatus,
    pub label: Option<String>,
    pub attempts: u32,
}

/// Queries the transaction status until it turns `SUCCESSFUL` or `FAILED`.
///
/// Per-attempt errors are logged and treated as transient: the loop sleeps and tries again.
/// Running out of attempts without a terminal answer yields `FAILED`, so callers only ever
/// see a terminal status.
pub async fn poll_transaction_status(
    gateway: &dyn PaymentGateway,
    transaction_id: &str,
    policy: PollPolicy,
) -> PollOutcome {
    let mut label = None;

    for attempt in 1..=policy.max_attempts {
        match gateway.transaction_status(transaction_id).await {
            Ok(report) => {
                if report.label.is_some() {
                    label = report.label;
                }
                if report.status.is_terminal() {
                    debug!(transaction_id, attempt, status = %report.status, "terminal status");
                    return PollOutcome {
                        status: report.status,
                        label,
                        attempts: attempt,
                    };
                }
                debug!(transaction_id, attempt, status = %report.status, "still waiting");
            }
            Err(e) => {
                warn!(transaction_id, attempt, error = %e, "error polling status");
            }
        }
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    warn!(
        transaction_id,
        attempts = policy.max_attempts,
        "no terminal status before the polling budget ran out"
    );
    PollOutcome {
        status: TransactionStatus::Failed,
        label,
        attempts: policy.max_attempts,
    }
}
