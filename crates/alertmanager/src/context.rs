//! Call-scoped cancellation and deadlines.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{CallTimeout, ReconcileError};

/// Carried through every collaborator call made on behalf of one reconcile.
///
/// Cancelling the token, or passing the deadline, aborts the in-flight call.
/// Writes already committed by collaborators are not rolled back.
#[derive(Debug, Clone, Default)]
pub struct ReconcileContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl ReconcileContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shares cancellation with an existing token (e.g. a detection worker's).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Runs `call` under this context's cancellation and deadline.
    ///
    /// The call's own output is returned untouched; cancellation and deadline
    /// expiry surface as the outer error and end the pass.
    pub(crate) async fn run<F>(
        &self,
        operation: &'static str,
        call: F,
    ) -> Result<F::Output, ReconcileError>
    where
        F: Future,
    {
        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, call)
                    .await
                    .map_err(|_| ReconcileError::DeadlineExceeded { operation }),
                None => Ok(call.await),
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(ReconcileError::Cancelled),
            output = bounded => output,
        }
    }

    /// Runs one fallible collaborator call, additionally bounded by
    /// `call_timeout`.
    ///
    /// Running out the per-call timeout fails only this call, as the
    /// collaborator's own error type. The context deadline and cancellation
    /// still end the pass.
    pub(crate) async fn call<T, E, F>(
        &self,
        operation: &'static str,
        call_timeout: Option<Duration>,
        call: F,
    ) -> Result<Result<T, E>, ReconcileError>
    where
        F: Future<Output = Result<T, E>>,
        E: From<CallTimeout>,
    {
        let Some(timeout) = call_timeout else {
            return self.run(operation, call).await;
        };

        let output = self
            .run(operation, tokio::time::timeout(timeout, call))
            .await?;
        Ok(output.unwrap_or_else(|_| Err(CallTimeout { operation, timeout }.into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[tokio::test]
    async fn test_run_returns_call_output() {
        let ctx = ReconcileContext::new();
        let out = ctx.run("noop", async { 7 }).await.unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn test_cancelled_context_short_circuits() {
        let token = CancellationToken::new();
        let ctx = ReconcileContext::new().with_cancellation(token.clone());
        token.cancel();
        assert!(ctx.is_cancelled());

        let result = ctx
            .call(
                "search_alerts",
                Some(Duration::from_secs(1)),
                std::future::pending::<Result<(), StoreError>>(),
            )
            .await;
        assert!(matches!(result, Err(ReconcileError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_fails_only_the_call() {
        let ctx = ReconcileContext::new();
        let result = ctx
            .call("upsert_alert", Some(Duration::from_secs(1)), async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<(), StoreError>(())
            })
            .await
            .unwrap();
        assert_eq!(
            result,
            Err(StoreError::Unavailable(
                "upsert_alert timed out after 1s".to_string()
            ))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_deadline_ends_the_pass() {
        let ctx = ReconcileContext::new().with_timeout(Duration::from_millis(10));
        assert!(ctx.deadline().is_some());
        let result = ctx
            .call("mark_alert_stale", Some(Duration::from_secs(60)), async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<(), StoreError>(())
            })
            .await;
        assert!(matches!(
            result,
            Err(ReconcileError::DeadlineExceeded {
                operation: "mark_alert_stale"
            })
        ));
    }
}
