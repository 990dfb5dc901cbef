use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::client::CoordinationClient;
use crate::client::Notification;
use crate::client::NotificationReceiver;
use crate::client::SessionState;
use crate::client::Stat;
use crate::client::WatchedEvent;
use crate::client::WatchedEventKind;
use crate::constants::ROOT_PATH;
use crate::event::EventBus;
use crate::path::get_parent;
use crate::path::join;
use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::Error;
use crate::Event;
use crate::Mirror;
use crate::Result;
use crate::RetryPolicies;

enum Flow {
    Continue,
    Stop,
}

/// Which retry policy a remote read runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Bounded by `retry.initial_load`; failure is reported to `watch()`
    InitialLoad,
    /// Watch re-registration; connectivity errors are retried until the
    /// session expires or the dispatcher shuts down
    Rearm,
}

/// Single writer of the mirror.
///
/// Consumes the session's notification stream one item at a time. Every
/// branch that leaves a path mirrored re-reads it with `watch = true`, which
/// re-arms the one-shot watch that just fired.
pub(crate) struct Dispatcher<C>
where C: CoordinationClient
{
    client: Arc<C>,
    mirror: Arc<RwLock<Mirror>>,
    bus: Arc<EventBus>,
    expired: Arc<AtomicBool>,
    retry: RetryPolicies,

    notifications: NotificationReceiver,

    // Shutdown signal
    shutdown_signal: watch::Receiver<()>,
}

impl<C> Dispatcher<C>
where C: CoordinationClient
{
    pub(crate) fn new(
        client: Arc<C>,
        mirror: Arc<RwLock<Mirror>>,
        bus: Arc<EventBus>,
        expired: Arc<AtomicBool>,
        retry: RetryPolicies,
        notifications: NotificationReceiver,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            client,
            mirror,
            bus,
            expired,
            retry,
            notifications,
            shutdown_signal,
        }
    }

    /// Initial top-down traversal from the root.
    pub(crate) async fn load(&mut self) -> Result<()> {
        info!(session_id = self.client.session_id(), "Initial mirror load started");

        if let Err(e) = self.appear(ROOT_PATH, Phase::InitialLoad).await {
            if matches!(e, Error::SessionExpired) {
                self.expire();
            }
            return Err(e);
        }

        let mirror = self.mirror.read();
        if !mirror.contains(ROOT_PATH) {
            return Err(Error::Fatal("root node missing after initial load".to_string()));
        }
        info!(nodes = mirror.len(), "Initial mirror load completed");
        Ok(())
    }

    /// Withdraws whatever a failed load managed to mirror, announcing each
    /// node as deleted, deepest first.
    pub(crate) fn reset(&self) {
        self.disappear(ROOT_PATH);
    }

    /// Gives the notification stream back so a later `watch()` can retry.
    pub(crate) fn into_notifications(self) -> NotificationReceiver {
        self.notifications
    }

    pub(crate) async fn run(mut self) {
        debug!("Mirror dispatcher started");
        let mut shutdown_signal = self.shutdown_signal.clone();

        loop {
            let notification = tokio::select! {
                // Use biased to ensure branch order
                biased;
                _ = shutdown_signal.changed() => {
                    debug!("Mirror dispatcher received shutdown signal");
                    break;
                }
                notification = self.notifications.recv() => notification,
            };
            let Some(notification) = notification else {
                warn!("Notification channel closed unexpectedly");
                break;
            };

            // Re-arm reads may retry for as long as the service is unreachable
            let outcome = tokio::select! {
                biased;
                _ = shutdown_signal.changed() => {
                    debug!("Mirror dispatcher interrupted by shutdown signal");
                    break;
                }
                outcome = self.handle(notification) => outcome,
            };
            match outcome {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(Error::SessionExpired) => {
                    self.expire();
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Failed to process notification");
                }
            }
        }

        debug!("Mirror dispatcher stopped");
    }

    async fn handle(
        &self,
        notification: Notification,
    ) -> Result<Flow> {
        match notification {
            Notification::Session(SessionState::Expired) => {
                self.expire();
                return Ok(Flow::Stop);
            }
            Notification::Session(SessionState::Disconnected) => {
                warn!(session_id = self.client.session_id(), "Session disconnected");
            }
            Notification::Session(SessionState::SyncConnected) => {
                info!(session_id = self.client.session_id(), "Session reconnected");
            }
            Notification::Node(WatchedEvent { kind, path }) => {
                debug!(?kind, %path, "Watch notification");
                match kind {
                    WatchedEventKind::NodeCreated => self.on_node_created(&path).await?,
                    WatchedEventKind::NodeChildrenChanged => self.on_children_changed(&path).await?,
                    WatchedEventKind::NodeDataChanged => self.on_data_changed(&path).await?,
                    WatchedEventKind::NodeDeleted => self.on_node_deleted(&path),
                }
            }
        }
        Ok(Flow::Continue)
    }

    async fn on_node_created(
        &self,
        path: &str,
    ) -> Result<()> {
        if self.is_mirrored(path) {
            // Recreated before the deletion was observed
            return self.on_data_changed(path).await;
        }
        if get_parent(path).is_some_and(|parent| self.is_mirrored(parent)) {
            self.appear(path, Phase::Rearm).await?;
        }
        Ok(())
    }

    async fn on_children_changed(
        &self,
        path: &str,
    ) -> Result<()> {
        if !self.is_mirrored(path) {
            return Ok(());
        }

        let remote: BTreeSet<String> = match self.fetch_children(path, Phase::Rearm).await {
            Ok(children) => children.into_iter().collect(),
            Err(Error::NotFound(_)) => {
                self.disappear(path);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        // Child count and cversion moved; not an update
        if let Some(stat) = self.fetch_stat(path).await? {
            self.mirror.write().refresh_stat(path, stat);
        }

        let known = self
            .mirror
            .read()
            .get(path)
            .map(|n| n.children.clone())
            .unwrap_or_default();

        for gone in known.difference(&remote) {
            self.disappear(&join(path, gone));
        }
        for added in remote.difference(&known) {
            self.appear(&join(path, added), Phase::Rearm).await?;
        }
        Ok(())
    }

    async fn on_data_changed(
        &self,
        path: &str,
    ) -> Result<()> {
        if !self.is_mirrored(path) {
            return Ok(());
        }

        match self.fetch_data(path, Phase::Rearm).await {
            Ok((data, stat)) => {
                let changed = self.mirror.write().update(path, data, stat);
                if changed {
                    self.bus.publish(Event::update(path));
                } else {
                    trace!(path, "Data notification without change");
                }
                Ok(())
            }
            Err(Error::NotFound(_)) => {
                self.disappear(path);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Ends the lifecycle of `path` without asking whether it still exists:
    /// a node re-created in the meantime is a new lifecycle, brought back by
    /// the `NodeChildrenChanged` already queued for its parent.
    fn on_node_deleted(
        &self,
        path: &str,
    ) {
        if self.is_mirrored(path) {
            self.disappear(path);
        }
    }

    /// Mirrors `path` and everything below it that exists remotely.
    ///
    /// Depth-first with an explicit stack: a node is inserted and announced
    /// before any of its descendants, siblings in lexicographic order.
    async fn appear(
        &self,
        path: &str,
        phase: Phase,
    ) -> Result<()> {
        let mut stack = vec![path.to_string()];

        while let Some(current) = stack.pop() {
            if self.is_mirrored(&current) {
                continue;
            }

            let (data, stat) = match self.fetch_data(&current, phase).await {
                Ok(v) => v,
                Err(Error::NotFound(_)) => {
                    trace!(path = %current, "Node vanished before it could be mirrored");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let inserted = self.mirror.write().insert(&current, data, stat);
            if !inserted {
                trace!(path = %current, "Parent no longer mirrored; skipping");
                continue;
            }
            self.bus.publish(Event::add(current.clone()));

            let children = match self.fetch_children(&current, phase).await {
                Ok(children) => children,
                // Its NodeDeleted notification is already queued
                Err(Error::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            for child in children.iter().rev() {
                stack.push(join(&current, child));
            }
        }
        Ok(())
    }

    /// Removes `path` and its mirrored descendants, deepest first.
    fn disappear(
        &self,
        path: &str,
    ) {
        let doomed = self.mirror.read().post_order(path);
        for p in doomed {
            let removed = self.mirror.write().remove_leaf(&p);
            if removed {
                self.bus.publish(Event::delete(p));
            }
        }
    }

    fn expire(&self) {
        if self.expired.swap(true, Ordering::SeqCst) {
            return;
        }
        let dropped = {
            let mut mirror = self.mirror.write();
            let len = mirror.len();
            mirror.clear();
            len
        };
        warn!(
            session_id = self.client.session_id(),
            dropped, "Session expired; mirror invalidated"
        );
        self.bus.publish_session_expired();
    }

    fn is_mirrored(
        &self,
        path: &str,
    ) -> bool {
        self.mirror.read().contains(path)
    }

    async fn fetch_data(
        &self,
        path: &str,
        phase: Phase,
    ) -> Result<(Bytes, Stat)> {
        let client = &self.client;
        self.with_retry(path, phase, || async move {
            client.get_data(path, true).await.map_err(Error::from)
        })
        .await
    }

    async fn fetch_children(
        &self,
        path: &str,
        phase: Phase,
    ) -> Result<Vec<String>> {
        let client = &self.client;
        self.with_retry(path, phase, || async move {
            client.get_children(path, true).await.map_err(Error::from)
        })
        .await
    }

    async fn fetch_stat(
        &self,
        path: &str,
    ) -> Result<Option<Stat>> {
        let client = &self.client;
        self.with_retry(path, Phase::Rearm, || async move {
            client.exists(path, false).await.map_err(Error::from)
        })
        .await
    }

    /// Runs a remote read under the policy of `phase`.
    ///
    /// A watch that already fired is only re-registered by this read, so in
    /// the re-arm phase an exhausted policy starts over instead of giving up.
    /// Non-retryable errors, `SessionExpired` included, end the loop.
    async fn with_retry<T, F, Fut>(
        &self,
        path: &str,
        phase: Phase,
        mut read: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match phase {
            Phase::InitialLoad => {
                task_with_timeout_and_exponential_backoff(read, self.retry.initial_load).await
            }
            Phase::Rearm => loop {
                match task_with_timeout_and_exponential_backoff(&mut read, self.retry.rearm).await {
                    Err(Error::RetryExhausted { attempts, last }) => {
                        error!(
                            path,
                            attempts,
                            error = %last,
                            "Watch re-registration still failing; starting over"
                        );
                    }
                    other => return other,
                }
            },
        }
    }
}
