use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::dispatcher::Dispatcher;
use crate::client::CoordinationClient;
use crate::client::CreateMode;
use crate::client::NotificationReceiver;
use crate::client::Stat;
use crate::constants::ROOT_PATH;
use crate::event::EventBus;
use crate::path::ancestors;
use crate::path::get_parent;
use crate::path::join;
use crate::path::validate_path;
use crate::Error;
use crate::Listener;
use crate::Mirror;
use crate::MirrorConfig;
use crate::Node;
use crate::RemoteError;
use crate::Result;

/// Keeps a local mirror of the whole remote namespace.
///
/// Reads are served from the mirror; mutations go straight to the remote
/// service and become visible locally only once the corresponding watch
/// notification has been processed by the background dispatcher.
///
/// # Basic Usage
/// ```ignore
/// let namespace = MemoryNamespace::new();
/// let (session, notifications) = namespace.connect();
/// let engine = MirrorEngine::new(Arc::new(session), notifications, MirrorConfig::default());
///
/// engine.add_listener(Arc::new(|e: &Event| println!("{} {}", e.event_type, e.path)));
/// engine.watch().await?;
///
/// engine.create_persistent("/services/api").await?;
/// ```
pub struct MirrorEngine<C>
where C: CoordinationClient
{
    client: Arc<C>,
    mirror: Arc<RwLock<Mirror>>,
    bus: Arc<EventBus>,
    expired: Arc<AtomicBool>,
    config: MirrorConfig,

    // Handed to the dispatcher by the first watch()
    notifications: Mutex<Option<NotificationReceiver>>,
    shutdown_signal: watch::Sender<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<C> std::fmt::Debug for MirrorEngine<C>
where C: CoordinationClient
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("MirrorEngine")
            .field("session_id", &self.client.session_id())
            .field("nodes", &self.mirror.read().len())
            .field("expired", &self.expired.load(Ordering::Acquire))
            .finish()
    }
}

impl<C> MirrorEngine<C>
where C: CoordinationClient
{
    pub fn new(
        client: Arc<C>,
        notifications: NotificationReceiver,
        config: MirrorConfig,
    ) -> Self {
        let (shutdown_signal, _) = watch::channel(());
        Self {
            client,
            mirror: Arc::new(RwLock::new(Mirror::new())),
            bus: Arc::new(EventBus::default()),
            expired: Arc::new(AtomicBool::new(false)),
            config,
            notifications: Mutex::new(Some(notifications)),
            shutdown_signal,
            worker: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> i64 {
        self.client.session_id()
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Registers a listener; it sees every event published after this call.
    pub fn add_listener(
        &self,
        listener: Arc<dyn Listener>,
    ) {
        self.bus.register(listener);
    }

    /// Loads the whole namespace and starts tracking it.
    ///
    /// Returns once the initial load has completed; every node present at
    /// that point has been announced with an `add` event, parents first.
    ///
    /// A load that fails for any other reason than session expiry is rolled
    /// back, each node it announced followed by a `delete`, and `watch()` may
    /// be called again.
    ///
    /// # Errors
    /// - [`Error::AlreadyWatching`] if a previous call succeeded
    /// - [`Error::SessionExpired`] if the session died before or during the load
    /// - [`Error::RetryExhausted`] if the service stayed unreachable
    pub async fn watch(&self) -> Result<()> {
        self.ensure_live()?;
        let notifications = self.notifications.lock().take().ok_or(Error::AlreadyWatching)?;

        let mut dispatcher = Dispatcher::new(
            self.client.clone(),
            self.mirror.clone(),
            self.bus.clone(),
            self.expired.clone(),
            self.config.retry.clone(),
            notifications,
            self.shutdown_signal.subscribe(),
        );
        if let Err(e) = dispatcher.load().await {
            if !matches!(e, Error::SessionExpired) {
                warn!(error = %e, "Initial mirror load failed; rolling back");
                dispatcher.reset();
                *self.notifications.lock() = Some(dispatcher.into_notifications());
            }
            return Err(e);
        }

        let handle = tokio::spawn(dispatcher.run());
        *self.worker.lock() = Some(handle);
        info!(session_id = self.session_id(), "Mirror engine watching");
        Ok(())
    }

    /// Stops the dispatcher and waits for it to exit.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_signal.send(());
        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            if let Err(e) = handle.await {
                warn!(error = %e, "Mirror dispatcher terminated abnormally");
            }
        }
        debug!(session_id = self.session_id(), "Mirror engine shut down");
    }

    pub fn is_session_expired(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }

    // ---------------------------------------------------------------------
    // Mirror reads

    /// Snapshot of every mirrored path.
    pub fn get_nodes(&self) -> BTreeSet<String> {
        self.mirror.read().paths()
    }

    pub fn contains(
        &self,
        path: &str,
    ) -> bool {
        self.mirror.read().contains(path)
    }

    /// Mirrored payload of `path`.
    pub fn get_data(
        &self,
        path: &str,
    ) -> Result<Bytes> {
        self.read_node(path, |node| node.data.clone())
    }

    pub fn get_stat(
        &self,
        path: &str,
    ) -> Result<Stat> {
        self.read_node(path, |node| node.stat)
    }

    /// Segment names of the mirrored children, lexicographically ordered.
    pub fn get_children(
        &self,
        path: &str,
    ) -> Result<Vec<String>> {
        self.read_node(path, |node| node.children.iter().cloned().collect())
    }

    fn read_node<T>(
        &self,
        path: &str,
        f: impl FnOnce(&Node) -> T,
    ) -> Result<T> {
        self.ensure_live()?;
        validate_path(path)?;
        self.mirror
            .read()
            .get(path)
            .map(f)
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    // ---------------------------------------------------------------------
    // Remote mutations

    /// Creates `path` with empty data, creating missing ancestors as
    /// persistent nodes.
    ///
    /// Returns `false` if a non-sequential node already exists at `path`.
    pub async fn create(
        &self,
        path: &str,
        mode: CreateMode,
    ) -> Result<bool> {
        Ok(self.create_with_data(path, &[], mode).await?.is_some())
    }

    pub async fn create_persistent(
        &self,
        path: &str,
    ) -> Result<bool> {
        self.create(path, CreateMode::Persistent).await
    }

    /// Creates `path` with `data`.
    ///
    /// Returns the realized path, carrying the 10-digit suffix for sequential
    /// modes, or `None` if a non-sequential node already exists.
    pub async fn create_with_data(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
    ) -> Result<Option<String>> {
        self.ensure_live()?;
        validate_path(path)?;
        if path == ROOT_PATH {
            return Err(Error::InvalidArgument("cannot create the root node".to_string()));
        }

        for ancestor in ancestors(path) {
            match self.client.create(&ancestor, &[], CreateMode::Persistent).await {
                Ok(_) => debug!(path = %ancestor, "Created missing ancestor"),
                Err(RemoteError::NodeExists(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        match self.client.create(path, data, mode).await {
            Ok(realized) => {
                debug!(path, %realized, ?mode, "Node created");
                Ok(Some(realized))
            }
            Err(RemoteError::NodeExists(_)) if !mode.is_sequential() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Conditional write; `expected_version == -1` matches any version.
    ///
    /// # Errors
    /// - [`Error::VersionConflict`] if the remote version differs
    /// - [`Error::NotFound`] if `path` does not exist
    pub async fn set_data(
        &self,
        path: &str,
        expected_version: i32,
        data: impl Into<Bytes>,
    ) -> Result<Stat> {
        self.ensure_live()?;
        validate_path(path)?;
        let data = data.into();
        let stat = self.client.set_data(path, &data, expected_version).await?;
        Ok(stat)
    }

    /// Deletes `path` together with its remote subtree.
    pub async fn delete(
        &self,
        path: &str,
    ) -> Result<()> {
        self.ensure_live()?;
        validate_path(path)?;
        if path == ROOT_PATH {
            return Err(Error::InvalidArgument("cannot delete the root node".to_string()));
        }
        self.delete_tree(path).await
    }

    /// Deletes every child subtree of `path`, keeping `path` itself.
    pub async fn trim(
        &self,
        path: &str,
    ) -> Result<()> {
        self.ensure_live()?;
        validate_path(path)?;

        let children = self.client.get_children(path, false).await?;
        for child in children {
            self.delete_tree(&join(path, &child)).await?;
        }
        Ok(())
    }

    /// Deletes `path` and then every ancestor left without children.
    ///
    /// Returns the deepest surviving ancestor, `/` when the climb reached the
    /// root.
    pub async fn prune(
        &self,
        path: &str,
    ) -> Result<String> {
        self.ensure_live()?;
        validate_path(path)?;
        if path == ROOT_PATH {
            return Err(Error::InvalidArgument("cannot prune the root node".to_string()));
        }

        self.delete_tree(path).await?;

        let mut current = get_parent(path);
        while let Some(ancestor) = current {
            if ancestor == ROOT_PATH {
                break;
            }
            match self.client.get_children(ancestor, false).await {
                Ok(children) if !children.is_empty() => return Ok(ancestor.to_string()),
                Ok(_) => {}
                Err(RemoteError::NoNode(_)) => {}
                Err(e) => return Err(e.into()),
            }
            match self.client.delete(ancestor, None).await {
                Ok(()) | Err(RemoteError::NoNode(_)) => {}
                // Someone added a child in the meantime
                Err(RemoteError::NotEmpty(_)) => return Ok(ancestor.to_string()),
                Err(e) => return Err(e.into()),
            }
            current = get_parent(ancestor);
        }
        Ok(ROOT_PATH.to_string())
    }

    async fn delete_tree(
        &self,
        path: &str,
    ) -> Result<()> {
        // Pre-order listing; deleting it back to front removes leaves first
        let mut subtree = Vec::new();
        let mut stack = vec![path.to_string()];
        while let Some(current) = stack.pop() {
            match self.client.get_children(&current, false).await {
                Ok(children) => {
                    for child in children.iter().rev() {
                        stack.push(join(&current, child));
                    }
                    subtree.push(current);
                }
                Err(RemoteError::NoNode(_)) if current == path => {
                    return Err(Error::NotFound(path.to_string()));
                }
                Err(RemoteError::NoNode(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        for node in subtree.iter().rev() {
            match self.client.delete(node, None).await {
                Ok(()) | Err(RemoteError::NoNode(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!(path, nodes = subtree.len(), "Subtree deleted");
        Ok(())
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_session_expired() {
            return Err(Error::SessionExpired);
        }
        Ok(())
    }
}

impl<C> Drop for MirrorEngine<C>
where C: CoordinationClient
{
    fn drop(&mut self) {
        let _ = self.shutdown_signal.send(());
    }
}
