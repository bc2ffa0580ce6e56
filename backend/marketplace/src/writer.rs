//! Bounded, logged access to the ledger.
//!
//! Every write goes through [`LedgerWriter::execute`]: one submission, one
//! confirmation, each under its own deadline. A write is never retried. A
//! timeout in either phase only abandons the wait: the call may still be
//! applied, so the caller must re-read ledger state before trying again.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use equinex_ledger::{Address, CallOutcome, LedgerCall};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::errors::{MarketError, Result};
use crate::ledger::Ledger;

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub read: Duration,
    pub write: Duration,
    pub confirm: Duration,
}

impl Timeouts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            read: config.read_timeout,
            write: config.write_timeout,
            confirm: config.confirm_timeout,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        let secs = Duration::from_secs(30);
        Self {
            read: secs,
            write: secs,
            confirm: secs,
        }
    }
}

/// Run `fut`, mapping an elapsed deadline to [`MarketError::Timeout`].
pub async fn bounded<T, F>(operation: &'static str, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(MarketError::Timeout { operation, after }),
    }
}

#[derive(Clone)]
pub struct LedgerWriter {
    ledger: Arc<dyn Ledger>,
    timeouts: Timeouts,
}

impl LedgerWriter {
    pub fn new(ledger: Arc<dyn Ledger>, timeouts: Timeouts) -> Self {
        Self { ledger, timeouts }
    }

    pub fn ledger(&self) -> &dyn Ledger {
        self.ledger.as_ref()
    }

    /// Bounded read against the ledger.
    pub async fn read<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        bounded(operation, self.timeouts.read, fut).await
    }

    /// Submit `call` as `actor` and wait for its outcome.
    pub async fn execute(&self, actor: &Address, call: LedgerCall) -> Result<CallOutcome> {
        let operation = call.name();
        let target = call.target();
        info!(operation, %target, %actor, "Submitting ledger call");

        let submitted = bounded(
            operation,
            self.timeouts.write,
            self.ledger.submit(actor, call),
        )
        .await;
        let tx = match submitted {
            Ok(tx) => tx,
            Err(e) => {
                log_failure(operation, &target, actor, "submission", &e);
                return Err(e);
            }
        };

        let confirmed = bounded(operation, self.timeouts.confirm, self.ledger.confirm(&tx)).await;
        match confirmed {
            Ok(outcome) => {
                info!(operation, %target, %actor, %tx, "Ledger call confirmed");
                Ok(outcome)
            }
            Err(e) => {
                log_failure(operation, &target, actor, "confirmation", &e);
                Err(e)
            }
        }
    }
}

/// The ledger confirmed a call with an outcome of the wrong shape.
pub fn unexpected_outcome(operation: &str, outcome: &CallOutcome) -> MarketError {
    MarketError::Unavailable(format!("{operation} confirmed with unexpected outcome {outcome:?}"))
}

fn log_failure(operation: &str, target: &str, actor: &Address, phase: &str, e: &MarketError) {
    match e {
        MarketError::Ledger(_) => {
            warn!(operation, %target, %actor, phase, "Ledger rejected call: {e}")
        }
        _ => error!(operation, %target, %actor, phase, "Ledger call failed: {e}"),
    }
}
