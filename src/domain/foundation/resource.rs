//! Resource groups - cancellation scopes forming an ownership tree.
//!
//! Every long-lived component (adapter registry, adapter, session, client
//! connection, server, serving stack) owns a [`ResourceGroup`]. Closing a
//! group cancels everything spawned under it and every child group; awaiting
//! [`ResourceGroup::async_close`] returns once all of that work has finished.
//!
//! ```text
//! supervisor
//! └── stack runner
//!     ├── adapter registry ── adapter ── session
//!     └── server ── client connection
//! ```
//!
//! Two spawn flavours exist. [`ResourceGroup::spawn`] drops the future as soon
//! as the group starts closing. [`ResourceGroup::spawn_uncancellable`] lets
//! the future run to completion and is used for cleanup that must not be
//! interrupted, and for loops that observe [`ResourceGroup::wait_closing`]
//! themselves so they can resolve pending callers before exiting.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Cancellation scope owning a set of tasks and child scopes.
///
/// Cloning yields another handle to the same scope.
#[derive(Clone, Debug)]
pub struct ResourceGroup {
    inner: Arc<GroupInner>,
}

#[derive(Debug)]
struct GroupInner {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ResourceGroup {
    /// Creates a new root group.
    pub fn new() -> Self {
        Self::from_token(CancellationToken::new())
    }

    fn from_token(token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                token,
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Creates a child group.
    ///
    /// Closing this group closes the child, and [`async_close`] on this
    /// group waits for the child's tasks as well. Closing the child alone
    /// leaves this group open; use [`bind`] for upward propagation.
    ///
    /// [`async_close`]: ResourceGroup::async_close
    /// [`bind`]: ResourceGroup::bind
    pub fn child(&self) -> Self {
        let child = Self::from_token(self.inner.token.child_token());
        let tracked = child.clone();
        self.inner.tracker.spawn(async move {
            tracked.wait_closed().await;
        });
        child
    }

    /// Returns true once closing has been requested.
    pub fn is_closing(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Requests closing without waiting.
    pub fn close(&self) {
        self.inner.token.cancel();
        self.inner.tracker.close();
    }

    /// Requests closing and waits until every task of this group and of its
    /// child groups has finished.
    ///
    /// Must not be awaited from a task spawned in this same group.
    pub async fn async_close(&self) {
        self.close();
        self.inner.tracker.wait().await;
    }

    /// Resolves once closing has been requested.
    pub async fn wait_closing(&self) {
        self.inner.token.cancelled().await;
    }

    /// Resolves once the group is closing and all of its tasks are done.
    pub async fn wait_closed(&self) {
        self.wait_closing().await;
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }

    /// Spawns a task that is dropped when the group starts closing.
    ///
    /// Returns false (and drops the future) if the group is already closing.
    pub fn spawn<F>(&self, fut: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_closing() {
            return false;
        }

        let token = self.inner.token.clone();
        self.inner.tracker.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = fut => {}
            }
        });
        true
    }

    /// Spawns a task that runs to completion even if the group closes.
    ///
    /// The task is still awaited by [`ResourceGroup::async_close`].
    pub fn spawn_uncancellable<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.tracker.spawn(fut);
    }

    /// Takes ownership of another group's lifetime.
    ///
    /// When this group closes, `other` is closed and awaited. `other`
    /// closing on its own leaves this group open.
    pub fn own(&self, other: &ResourceGroup) {
        let parent = self.clone();
        let child = other.clone();
        self.spawn_uncancellable(async move {
            tokio::select! {
                _ = parent.wait_closing() => {
                    child.async_close().await;
                }
                _ = child.wait_closed() => {}
            }
        });
    }

    /// Binds another group's lifetime to this one in both directions.
    ///
    /// When this group closes, `other` is closed and awaited. When `other`
    /// closes on its own, this group is closed as well.
    pub fn bind(&self, other: &ResourceGroup) {
        let parent = self.clone();
        let child = other.clone();
        self.spawn_uncancellable(async move {
            tokio::select! {
                _ = parent.wait_closing() => {
                    child.async_close().await;
                }
                _ = child.wait_closing() => {
                    parent.close();
                    child.wait_closed().await;
                }
            }
        });
    }
}

impl Default for ResourceGroup {
    fn default() -> Self {
        Self::new()
    }
}

/// A long-lived component owning a resource group.
pub trait Resource: Send + Sync {
    /// The group whose closing ends this resource.
    fn group(&self) -> &ResourceGroup;

    /// Returns true while the resource has not started closing.
    fn is_open(&self) -> bool {
        !self.group().is_closing()
    }

    /// Requests closing without waiting.
    fn close(&self) {
        self.group().close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn close_cancels_spawned_tasks() {
        let group = ResourceGroup::new();
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        assert!(group.spawn(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            flag.store(true, Ordering::SeqCst);
        }));

        group.async_close().await;

        assert!(group.is_closing());
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn spawn_on_closed_group_is_rejected() {
        let group = ResourceGroup::new();
        group.close();

        assert!(!group.spawn(async {}));
    }

    #[tokio::test]
    async fn uncancellable_task_runs_to_completion() {
        let group = ResourceGroup::new();
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        let watched = group.clone();
        group.spawn_uncancellable(async move {
            watched.wait_closing().await;
            tokio::time::sleep(Duration::from_millis(10)).await;
            flag.store(true, Ordering::SeqCst);
        });

        group.async_close().await;

        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn closing_parent_closes_children() {
        let parent = ResourceGroup::new();
        let child = parent.child();
        let grandchild = child.child();

        parent.async_close().await;

        assert!(child.is_closing());
        assert!(grandchild.is_closing());
    }

    #[tokio::test]
    async fn closing_child_leaves_parent_open() {
        let parent = ResourceGroup::new();
        let child = parent.child();

        child.async_close().await;

        assert!(!parent.is_closing());
    }

    #[tokio::test]
    async fn bound_group_closes_parent_when_it_closes() {
        let parent = ResourceGroup::new();
        let other = ResourceGroup::new();
        parent.bind(&other);

        other.close();
        parent.wait_closing().await;

        assert!(parent.is_closing());
    }

    #[tokio::test]
    async fn bound_group_is_closed_with_parent() {
        let parent = ResourceGroup::new();
        let other = ResourceGroup::new();
        parent.bind(&other);

        parent.async_close().await;

        assert!(other.is_closing());
    }

    #[tokio::test]
    async fn owned_group_is_closed_with_owner() {
        let owner = ResourceGroup::new();
        let owned = ResourceGroup::new();
        owner.own(&owned);

        owner.async_close().await;

        assert!(owned.is_closing());
    }

    #[tokio::test]
    async fn owned_group_closing_leaves_owner_open() {
        let owner = ResourceGroup::new();
        let owned = ResourceGroup::new();
        owner.own(&owned);

        owned.async_close().await;
        tokio::task::yield_now().await;

        assert!(!owner.is_closing());
    }
}
