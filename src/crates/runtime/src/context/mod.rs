//! Shared cancellable execution context
//!
//! One [`ExecutionContext`] bounds every task of a run. It becomes done
//! either when its [`CancelHandle`] is invoked or when its deadline passes,
//! whichever happens first. Done is terminal and keeps the first reason.
//!
//! Cancellation is cooperative: tasks poll [`ExecutionContext::is_done`] at
//! their own checkpoints or await [`ExecutionContext::done`].
//!
//! # Example
//!
//! ```rust
//! use mage_runtime::context::{DoneReason, ExecutionContext};
//! use std::time::Duration;
//!
//! let (ctx, cancel) = ExecutionContext::with_timeout(Duration::from_secs(30));
//! let _guard = cancel.guard();
//!
//! assert!(!ctx.is_done());
//! cancel.cancel();
//! assert_eq!(ctx.reason(), Some(DoneReason::Canceled));
//! ```

mod manager;

pub use manager::{global, ContextManager};

use crate::{Result, RuntimeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

const ACTIVE: u8 = 0;
const CANCELED: u8 = 1;
const DEADLINE_EXCEEDED: u8 = 2;

/// Why a context is done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneReason {
    /// The cancel handle was invoked
    Canceled,
    /// The deadline passed
    DeadlineExceeded,
}

impl DoneReason {
    fn code(self) -> u8 {
        match self {
            DoneReason::Canceled => CANCELED,
            DoneReason::DeadlineExceeded => DEADLINE_EXCEEDED,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            CANCELED => Some(DoneReason::Canceled),
            DEADLINE_EXCEEDED => Some(DoneReason::DeadlineExceeded),
            _ => None,
        }
    }
}

impl fmt::Display for DoneReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoneReason::Canceled => write!(f, "context canceled"),
            DoneReason::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

struct Inner {
    state: AtomicU8,
    notify: Notify,
    deadline: Option<Instant>,
    cancellable: bool,
}

impl Inner {
    fn new(deadline: Option<Instant>, cancellable: bool) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(ACTIVE),
            notify: Notify::new(),
            deadline,
            cancellable,
        })
    }

    /// Move to done; only the first caller wins
    fn finish(&self, reason: DoneReason) -> bool {
        let won = self
            .state
            .compare_exchange(ACTIVE, reason.code(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if won {
            self.notify.notify_waiters();
        }
        won
    }

    fn reason(&self) -> Option<DoneReason> {
        if let Some(reason) = DoneReason::from_code(self.state.load(Ordering::SeqCst)) {
            return Some(reason);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.finish(DoneReason::DeadlineExceeded);
                DoneReason::from_code(self.state.load(Ordering::SeqCst))
            }
            _ => None,
        }
    }
}

/// Handle on the shared context, cheap to clone and safe to share
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<Inner>,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("deadline", &self.inner.deadline)
            .field("reason", &self.reason())
            .finish()
    }
}

impl ExecutionContext {
    /// Context with no deadline whose cancel handle does nothing
    ///
    /// It never becomes done.
    pub fn background() -> (Self, CancelHandle) {
        Self::pair(Inner::new(None, false))
    }

    /// Context that is done once `timeout` has elapsed from now, or earlier
    /// if cancelled
    pub fn with_timeout(timeout: Duration) -> (Self, CancelHandle) {
        let deadline = Instant::now()
            .checked_add(timeout)
            .unwrap_or_else(far_future);
        Self::pair(Inner::new(Some(deadline), true))
    }

    /// Context without a deadline that is done only when cancelled
    pub fn with_cancel() -> (Self, CancelHandle) {
        Self::pair(Inner::new(None, true))
    }

    fn pair(inner: Arc<Inner>) -> (Self, CancelHandle) {
        (
            Self {
                inner: inner.clone(),
            },
            CancelHandle { inner },
        )
    }

    /// Whether the context is done
    pub fn is_done(&self) -> bool {
        self.reason().is_some()
    }

    /// Why the context is done, or `None` while it is still active
    pub fn reason(&self) -> Option<DoneReason> {
        self.inner.reason()
    }

    /// Deadline, if the context has one
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Time left until the deadline
    ///
    /// `None` if there is no deadline; zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Wait until the context is done
    ///
    /// Never resolves for a background context.
    pub async fn done(&self) -> DoneReason {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(reason) = self.reason() {
                return reason;
            }

            match self.inner.deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Run `operation` until it finishes or the context is done
    ///
    /// If both happen together the operation's output wins.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let (ctx, _cancel) = mage_runtime::context()?;
    /// let output = ctx.run(build_target()).await?;
    /// ```
    pub async fn run<F, T>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        if let Some(reason) = self.reason() {
            return Err(RuntimeError::Done(reason));
        }

        tokio::select! {
            biased;
            output = operation => Ok(output),
            reason = self.done() => Err(RuntimeError::Done(reason)),
        }
    }

    /// Whether two handles refer to the same context
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }
}

/// Releases a context; invoking it more than once is harmless
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<Inner>,
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancellable", &self.inner.cancellable)
            .finish()
    }
}

impl CancelHandle {
    /// Mark the context done
    ///
    /// No effect on a background context or on one that is already done.
    pub fn cancel(&self) {
        if !self.inner.cancellable {
            return;
        }
        // Latch an expired deadline first so it keeps its reason
        if self.inner.reason().is_none() && self.inner.finish(DoneReason::Canceled) {
            debug!("Execution context canceled");
        }
    }

    /// Whether invoking this handle can ever have an effect
    pub fn is_noop(&self) -> bool {
        !self.inner.cancellable
    }

    /// Scope guard that cancels when dropped
    pub fn guard(&self) -> CancelGuard {
        CancelGuard {
            handle: self.clone(),
        }
    }

    /// Whether two handles release the same context
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }
}

/// Cancels its context on drop, on every exit path
#[derive(Debug)]
#[must_use = "dropping the guard cancels the context immediately"]
pub struct CancelGuard {
    handle: CancelHandle,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

// Roughly thirty years out, for timeouts too large to add to now
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365 * 30)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_never_done() {
        let (ctx, cancel) = ExecutionContext::background();
        assert!(!ctx.is_done());
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
        assert!(cancel.is_noop());

        cancel.cancel();
        cancel.cancel();
        assert!(!ctx.is_done());
        assert!(ctx.reason().is_none());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (ctx, cancel) = ExecutionContext::with_timeout(Duration::from_secs(60));
        assert!(!cancel.is_noop());

        cancel.cancel();
        cancel.cancel();
        cancel.cancel();

        assert_eq!(ctx.reason(), Some(DoneReason::Canceled));
    }

    #[test]
    fn test_with_cancel() {
        let (ctx, cancel) = ExecutionContext::with_cancel();
        assert!(ctx.deadline().is_none());
        assert!(!ctx.is_done());

        cancel.cancel();
        assert_eq!(ctx.reason(), Some(DoneReason::Canceled));
    }

    #[test]
    fn test_guard_cancels_on_drop() {
        let (ctx, cancel) = ExecutionContext::with_timeout(Duration::from_secs(60));
        {
            let _guard = cancel.guard();
            assert!(!ctx.is_done());
        }
        assert_eq!(ctx.reason(), Some(DoneReason::Canceled));
    }

    #[test]
    fn test_guard_cancels_on_panic() {
        let (ctx, cancel) = ExecutionContext::with_timeout(Duration::from_secs(60));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = cancel.guard();
            panic!("task failed");
        }));
        assert!(result.is_err());
        assert!(ctx.is_done());
    }

    #[test]
    fn test_clones_share_state() {
        let (ctx, cancel) = ExecutionContext::with_timeout(Duration::from_secs(60));
        let ctx_clone = ctx.clone();
        let cancel_clone = cancel.clone();

        assert!(ExecutionContext::ptr_eq(&ctx, &ctx_clone));
        assert!(CancelHandle::ptr_eq(&cancel, &cancel_clone));

        cancel_clone.cancel();
        assert!(ctx.is_done());
    }

    #[test]
    fn test_distinct_contexts_are_not_equal() {
        let (a, _) = ExecutionContext::background();
        let (b, _) = ExecutionContext::background();
        assert!(!ExecutionContext::ptr_eq(&a, &b));
    }

    #[test]
    fn test_zero_timeout_is_expired() {
        let (ctx, cancel) = ExecutionContext::with_timeout(Duration::ZERO);
        assert_eq!(ctx.reason(), Some(DoneReason::DeadlineExceeded));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));

        // Cancelling afterwards keeps the first reason
        cancel.cancel();
        assert_eq!(ctx.reason(), Some(DoneReason::DeadlineExceeded));
    }

    #[test]
    fn test_huge_timeout_does_not_panic() {
        let (ctx, _cancel) = ExecutionContext::with_timeout(Duration::MAX);
        assert!(!ctx.is_done());
        assert!(ctx.deadline().is_some());
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(DoneReason::Canceled.to_string(), "context canceled");
        assert_eq!(
            DoneReason::DeadlineExceeded.to_string(),
            "context deadline exceeded"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let (ctx, _cancel) = ExecutionContext::with_timeout(Duration::from_millis(50));
        let start = Instant::now();

        assert_eq!(ctx.done().await, DoneReason::DeadlineExceeded);
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(ctx.reason(), Some(DoneReason::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_done_before_deadline() {
        let (ctx, _cancel) = ExecutionContext::with_timeout(Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!ctx.is_done());

        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(ctx.is_done());
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let (ctx, cancel) = ExecutionContext::with_timeout(Duration::from_secs(60));

        let mut waiters = Vec::new();
        for _ in 0..4 {
            let ctx = ctx.clone();
            waiters.push(tokio::spawn(async move { ctx.done().await }));
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        for waiter in waiters {
            let reason = tokio::time::timeout(Duration::from_millis(500), waiter)
                .await
                .expect("waiter should wake")
                .unwrap();
            assert_eq!(reason, DoneReason::Canceled);
        }
    }

    #[tokio::test]
    async fn test_done_after_cancel_returns_immediately() {
        let (ctx, cancel) = ExecutionContext::with_cancel();
        cancel.cancel();
        assert_eq!(ctx.done().await, DoneReason::Canceled);
    }

    #[tokio::test]
    async fn test_run_completes() {
        let (ctx, _cancel) = ExecutionContext::with_timeout(Duration::from_secs(5));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                42
            })
            .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_interrupted_by_deadline() {
        let (ctx, _cancel) = ExecutionContext::with_timeout(Duration::from_millis(10));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                "should not reach here"
            })
            .await;

        match result {
            Err(RuntimeError::Done(reason)) => assert_eq!(reason, DoneReason::DeadlineExceeded),
            other => panic!("Expected deadline error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_after_cancel_does_not_start() {
        let (ctx, cancel) = ExecutionContext::with_cancel();
        cancel.cancel();

        let result = ctx.run(std::future::pending::<()>()).await;
        assert!(matches!(
            result,
            Err(RuntimeError::Done(DoneReason::Canceled))
        ));
    }
}
