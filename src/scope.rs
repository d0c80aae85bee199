use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation and deadline shared by a context and all of its children.
///
/// Every statement issued through a [`Querier`](crate::Querier) runs under its
/// scope. Cancelling the token or passing the deadline makes the statement in
/// flight fail, which the executor treats like any other statement failure.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Scope {
    /// Creates a scope with a fresh token and no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an existing cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Fails every statement still running at `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the deadline `timeout` from now.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use sqlx_atomic::Scope;
    ///
    /// let scope = Scope::new().with_timeout(Duration::from_secs(5));
    /// assert!(scope.deadline().is_some());
    /// assert!(!scope.is_cancelled());
    /// ```
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Token shared by this scope and its clones.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Deadline, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancels this scope and every clone of it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once this scope or any clone was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Runs a statement future under this scope.
    pub(crate) async fn run<T, E, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Into<Error>,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if matches!(self.deadline, Some(deadline) if deadline <= Instant::now()) {
            return Err(Error::DeadlineExceeded);
        }

        let bounded = async {
            let res = match self.deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, fut).await {
                    Ok(res) => res,
                    Err(_) => return Err(Error::DeadlineExceeded),
                },
                None => fut.await,
            };
            res.map_err(|e| -> Error { e.into() })
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            res = bounded => res,
        }
    }
}
