//! Cooperative time and cancellation budgets
//!
//! Parsers and enhancers call [`ExecutionBudget::check`] inside their loops
//! and recursion steps. A unit that runs past its deadline returns at the next
//! checkpoint, so the worker thread that ran it is never abandoned.

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Reason a checkpoint refused to continue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetExceeded {
    /// The deadline passed
    Timeout {
        /// Milliseconds spent when the checkpoint tripped
        elapsed_ms: u64,
    },
    /// The pipeline invocation was cancelled
    Cancelled,
}

/// Deadline plus cancellation token for one unit of work
#[derive(Debug, Clone)]
pub struct ExecutionBudget {
    started: Instant,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl ExecutionBudget {
    /// Budget that expires `timeout` from now
    #[must_use]
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started.checked_add(timeout),
            cancel,
        }
    }

    /// Budget that never expires and cannot be cancelled
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            started: Instant::now(),
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Budget without a deadline that still honors cancellation
    #[must_use]
    pub fn cancellable(cancel: CancellationToken) -> Self {
        Self {
            started: Instant::now(),
            deadline: None,
            cancel,
        }
    }

    /// Fresh budget for a sub-unit sharing this budget's cancellation token
    #[must_use]
    pub fn child(&self, timeout: Duration) -> Self {
        Self::new(timeout, self.cancel.clone())
    }

    /// Checkpoint: cancellation wins over timeout
    ///
    /// # Errors
    ///
    /// Returns the reason the unit must stop
    pub fn check(&self) -> Result<(), BudgetExceeded> {
        if self.cancel.is_cancelled() {
            return Err(BudgetExceeded::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(BudgetExceeded::Timeout {
                    elapsed_ms: self.elapsed_ms(),
                });
            }
        }
        Ok(())
    }

    /// Whether the owning invocation was cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Milliseconds since the budget started
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// The cancellation token
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Default for ExecutionBudget {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_budget_passes() {
        let budget = ExecutionBudget::unbounded();
        assert!(budget.check().is_ok());
    }

    #[test]
    fn test_zero_timeout_trips() {
        let budget = ExecutionBudget::new(Duration::ZERO, CancellationToken::new());
        assert!(matches!(
            budget.check(),
            Err(BudgetExceeded::Timeout { .. })
        ));
    }

    #[test]
    fn test_cancellation_wins() {
        let token = CancellationToken::new();
        let budget = ExecutionBudget::new(Duration::ZERO, token.clone());
        token.cancel();
        assert_eq!(budget.check(), Err(BudgetExceeded::Cancelled));

        let child = budget.child(Duration::from_secs(60));
        assert!(child.is_cancelled());
    }
}
