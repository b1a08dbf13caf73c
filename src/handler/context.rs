//! Call context for handlers and callers.
//!
//! A [`CallContext`] carries what one invocation needs besides its
//! arguments:
//! - a cancellation signal shared by every clone
//! - an optional deadline
//! - request tags (string metadata propagated from the caller)
//!
//! # Example
//!
//! ```ignore
//! async fn slow_handler(ctx: CallContext, arg: Arg) -> Result<()> {
//!     tokio::select! {
//!         err = ctx.done() => Err(err),
//!         res = do_work(arg) => res,
//!     }
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{Result, RpcError};

/// Request tags carried alongside a call.
pub type Tags = BTreeMap<String, String>;

/// Context passed to handlers and to client calls.
///
/// `CallContext` is `Clone`; clones share one cancellation signal, so
/// cancelling any clone cancels them all.
#[derive(Clone, Debug)]
pub struct CallContext {
    cancel: Arc<watch::Sender<bool>>,
    deadline: Option<Instant>,
    tags: Arc<Tags>,
}

impl CallContext {
    /// Create a context with no deadline and no tags.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            cancel: Arc::new(tx),
            deadline: None,
            tags: Arc::new(Tags::new()),
        }
    }

    /// Set an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now.
    ///
    /// A timeout too large to represent leaves the context without a deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Attach a request tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.tags).insert(key.into(), value.into());
        self
    }

    /// Replace all request tags.
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = Arc::new(tags);
        self
    }

    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, zero if it already passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    #[inline]
    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Look up one request tag.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Cancel this context and every clone of it.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Check whether the context was cancelled or its deadline passed.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Return the cancellation error if the context is done.
    pub fn check(&self) -> Result<()> {
        if *self.cancel.borrow() {
            return Err(RpcError::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Err(RpcError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Wait until the context is cancelled or its deadline passes.
    ///
    /// Resolves to [`RpcError::Cancelled`] or [`RpcError::DeadlineExceeded`].
    pub async fn done(&self) -> RpcError {
        let mut rx = self.cancel.subscribe();
        let cancelled = async move {
            // The sender lives as long as `self`, so this only returns on cancel.
            let _ = rx.wait_for(|cancelled| *cancelled).await;
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = cancelled => RpcError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => RpcError::DeadlineExceeded,
            },
            None => {
                cancelled.await;
                RpcError::Cancelled
            }
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_creation() {
        let ctx = CallContext::new();
        assert!(ctx.deadline().is_none());
        assert!(ctx.tags().is_empty());
        assert!(!ctx.is_cancelled());
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn test_cancel_is_shared_by_clones() {
        let ctx = CallContext::new();
        let clone = ctx.clone();

        clone.cancel();

        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check(), Err(RpcError::Cancelled)));
    }

    #[test]
    fn test_tags() {
        let ctx = CallContext::new()
            .with_tag("device", "laptop")
            .with_tag("trace", "abc");

        assert_eq!(ctx.tag("device"), Some("laptop"));
        assert_eq!(ctx.tag("trace"), Some("abc"));
        assert_eq!(ctx.tag("missing"), None);
    }

    #[test]
    fn test_tags_do_not_leak_between_clones() {
        let base = CallContext::new().with_tag("a", "1");
        let extended = base.clone().with_tag("b", "2");

        assert_eq!(base.tag("b"), None);
        assert_eq!(extended.tag("a"), Some("1"));
    }

    #[tokio::test]
    async fn test_done_after_cancel() {
        let ctx = CallContext::new();
        let waiter = ctx.clone();
        let task = tokio::spawn(async move { waiter.done().await });

        ctx.cancel();

        let err = task.await.unwrap();
        assert!(matches!(err, RpcError::Cancelled));
    }

    #[test]
    fn test_huge_timeout_means_no_deadline() {
        let ctx = CallContext::new().with_timeout(Duration::MAX);
        assert!(ctx.deadline().is_none());
        assert!(ctx.check().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_on_deadline() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(50));

        let err = ctx.done().await;

        assert!(matches!(err, RpcError::DeadlineExceeded));
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check(), Err(RpcError::DeadlineExceeded)));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }
}
