//! Caller-owned call context: cancellation plus an optional deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a guarded future stopped before completing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Interrupt {
    Cancelled,
    DeadlineExceeded,
}

/// Cancellation and deadline for one logical call.
///
/// Cloning shares the cancellation token, so cancelling any clone cancels
/// every call running under it.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never cancelled and has no deadline until told otherwise.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing cancellation token, e.g. a server shutdown token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Sets the deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Sets an absolute deadline; an earlier existing deadline wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Child context: cancelled with its parent, cancellable on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Checks the context without awaiting anything.
    pub fn check(&self) -> Result<(), Interrupt> {
        if self.token.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| deadline <= Instant::now()) {
            return Err(Interrupt::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drives `future` until it completes, the token fires, or the deadline
    /// passes. An interrupted future is dropped in place.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, Interrupt> {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(Interrupt::Cancelled),
            () = deadline => Err(Interrupt::DeadlineExceeded),
            output = future => Ok(output),
        }
    }
}
