use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;
use tracing::trace;

use super::MemorySession;
use crate::client::CreateMode;
use crate::client::Notification;
use crate::client::NotificationReceiver;
use crate::client::NotificationSender;
use crate::client::RemoteResult;
use crate::client::SessionState;
use crate::client::Stat;
use crate::client::WatchedEvent;
use crate::client::WatchedEventKind;
use crate::constants::PERSISTENT_OWNER;
use crate::constants::RESERVED_PATH;
use crate::constants::RESERVED_QUOTA_PATH;
use crate::constants::ROOT_PATH;
use crate::constants::SEQUENTIAL_SUFFIX_WIDTH;
use crate::path::get_parent;
use crate::path::is_valid_absolute_path;
use crate::path::node_name;
use crate::utils::time::now_millis;
use crate::RemoteError;

#[derive(Debug, Clone)]
struct ZNode {
    data: Bytes,
    stat: Stat,
    children: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Liveness {
    Connected,
    Disconnected,
    Expired,
}

#[derive(Debug)]
struct SessionEntry {
    sender: NotificationSender,
    liveness: Liveness,
    /// Number of upcoming calls that fail with `ConnectionLoss`
    injected_failures: usize,
}

/// Watch table: path -> sessions holding a one-shot watch on it
type WatchTable = HashMap<String, HashSet<i64>>;

#[derive(Debug)]
pub(super) struct NamespaceState {
    nodes: HashMap<String, ZNode>,
    zxid: i64,
    next_session_id: i64,
    sessions: HashMap<i64, SessionEntry>,
    data_watches: WatchTable,
    child_watches: WatchTable,
}

/// Shared in-memory namespace; clones refer to the same tree.
#[derive(Debug, Clone)]
pub struct MemoryNamespace {
    state: Arc<Mutex<NamespaceState>>,
}

impl Default for MemoryNamespace {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNamespace {
    /// A freshly initialized namespace holding `/`, `/zookeeper` and
    /// `/zookeeper/quota`.
    pub fn new() -> Self {
        let mut state = NamespaceState {
            nodes: HashMap::new(),
            zxid: 0,
            next_session_id: 0x1000,
            sessions: HashMap::new(),
            data_watches: HashMap::new(),
            child_watches: HashMap::new(),
        };
        state.nodes.insert(
            ROOT_PATH.to_string(),
            ZNode {
                data: Bytes::new(),
                stat: Stat::default(),
                children: BTreeSet::new(),
            },
        );
        for reserved in [RESERVED_PATH, RESERVED_QUOTA_PATH] {
            // Parents exist and nothing is watched yet
            let _ = state.create_node(reserved, &[], CreateMode::Persistent, PERSISTENT_OWNER);
        }

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Opens a new session and returns its client handle together with the
    /// stream of notifications addressed to it.
    pub fn connect(&self) -> (MemorySession, NotificationReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        let id = state.next_session_id;
        state.next_session_id += 1;
        state.sessions.insert(
            id,
            SessionEntry {
                sender,
                liveness: Liveness::Connected,
                injected_failures: 0,
            },
        );
        debug!(session_id = id, "Session connected");

        (MemorySession::new(id, self.clone()), receiver)
    }

    /// Ends a session for good: its watches are dropped, its ephemeral nodes
    /// are deleted (firing watches held by other sessions) and it receives
    /// `SessionState::Expired`.
    pub fn expire_session(
        &self,
        session_id: i64,
    ) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(entry) = state.sessions.get_mut(&session_id) else {
            return;
        };
        if entry.liveness == Liveness::Expired {
            return;
        }
        entry.liveness = Liveness::Expired;
        let _ = entry.sender.send(Notification::Session(SessionState::Expired));

        for table in [&mut state.data_watches, &mut state.child_watches] {
            table.retain(|_, sessions| {
                sessions.remove(&session_id);
                !sessions.is_empty()
            });
        }

        // Ephemerals are leaves
        let mut owned: Vec<String> = state
            .nodes
            .iter()
            .filter(|(_, n)| n.stat.ephemeral_owner == session_id)
            .map(|(p, _)| p.clone())
            .collect();
        owned.sort_by(|a, b| b.cmp(a));
        for path in owned {
            let _ = state.delete_node(&path, None);
        }

        info!(session_id, "Session expired");
    }

    /// Drops the connection of a session without expiring it. Watches stay
    /// armed; calls fail with `ConnectionLoss` until [`reconnect`](Self::reconnect).
    pub fn disconnect(
        &self,
        session_id: i64,
    ) {
        self.set_liveness(session_id, Liveness::Disconnected, SessionState::Disconnected);
    }

    pub fn reconnect(
        &self,
        session_id: i64,
    ) {
        self.set_liveness(session_id, Liveness::Connected, SessionState::SyncConnected);
    }

    /// Makes the next `count` calls of the session fail with `ConnectionLoss`.
    pub fn inject_connection_loss(
        &self,
        session_id: i64,
        count: usize,
    ) {
        if let Some(entry) = self.state.lock().sessions.get_mut(&session_id) {
            entry.injected_failures += count;
        }
    }

    /// Whether `session_id` currently holds a data watch on `path`
    pub fn has_data_watch(
        &self,
        session_id: i64,
        path: &str,
    ) -> bool {
        let state = self.state.lock();
        state.data_watches.get(path).is_some_and(|s| s.contains(&session_id))
    }

    /// Whether `session_id` currently holds a child watch on `path`
    pub fn has_child_watch(
        &self,
        session_id: i64,
        path: &str,
    ) -> bool {
        let state = self.state.lock();
        state.child_watches.get(path).is_some_and(|s| s.contains(&session_id))
    }

    /// All node paths, sorted
    pub fn paths(&self) -> BTreeSet<String> {
        self.state.lock().nodes.keys().cloned().collect()
    }

    fn set_liveness(
        &self,
        session_id: i64,
        liveness: Liveness,
        announce: SessionState,
    ) {
        let mut state = self.state.lock();
        if let Some(entry) = state.sessions.get_mut(&session_id) {
            if entry.liveness == Liveness::Expired || entry.liveness == liveness {
                return;
            }
            entry.liveness = liveness;
            let _ = entry.sender.send(Notification::Session(announce));
            debug!(session_id, ?announce, "Session state changed");
        }
    }

    /// Runs `f` on the locked state after admitting the call for `session_id`.
    pub(super) fn with_session<T>(
        &self,
        session_id: i64,
        f: impl FnOnce(&mut NamespaceState) -> RemoteResult<T>,
    ) -> RemoteResult<T> {
        let mut state = self.state.lock();
        state.admit(session_id)?;
        f(&mut state)
    }
}

impl NamespaceState {
    fn admit(
        &mut self,
        session_id: i64,
    ) -> RemoteResult<()> {
        let entry = self.sessions.get_mut(&session_id).ok_or(RemoteError::SessionExpired)?;
        match entry.liveness {
            Liveness::Expired => Err(RemoteError::SessionExpired),
            Liveness::Disconnected => Err(RemoteError::ConnectionLoss),
            Liveness::Connected if entry.injected_failures > 0 => {
                entry.injected_failures -= 1;
                Err(RemoteError::ConnectionLoss)
            }
            Liveness::Connected => Ok(()),
        }
    }

    pub(super) fn exists(
        &mut self,
        session_id: i64,
        path: &str,
        watch: bool,
    ) -> RemoteResult<Option<Stat>> {
        check_path(path)?;
        if watch {
            arm(&mut self.data_watches, path, session_id);
        }
        Ok(self.nodes.get(path).map(|n| n.stat))
    }

    pub(super) fn get_children(
        &mut self,
        session_id: i64,
        path: &str,
        watch: bool,
    ) -> RemoteResult<Vec<String>> {
        check_path(path)?;
        let node = self.nodes.get(path).ok_or_else(|| RemoteError::NoNode(path.to_string()))?;
        let children = node.children.iter().cloned().collect();
        if watch {
            arm(&mut self.child_watches, path, session_id);
        }
        Ok(children)
    }

    pub(super) fn get_data(
        &mut self,
        session_id: i64,
        path: &str,
        watch: bool,
    ) -> RemoteResult<(Bytes, Stat)> {
        check_path(path)?;
        let node = self.nodes.get(path).ok_or_else(|| RemoteError::NoNode(path.to_string()))?;
        let result = (node.data.clone(), node.stat);
        if watch {
            arm(&mut self.data_watches, path, session_id);
        }
        Ok(result)
    }

    pub(super) fn create_node(
        &mut self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
        session_id: i64,
    ) -> RemoteResult<String> {
        check_path(path)?;
        let parent_path = get_parent(path)
            .ok_or_else(|| RemoteError::BadArguments("cannot create the root node".to_string()))?
            .to_string();
        let parent = self
            .nodes
            .get(&parent_path)
            .ok_or_else(|| RemoteError::NoNode(parent_path.clone()))?;
        if parent.stat.is_ephemeral() {
            return Err(RemoteError::NoChildrenForEphemerals(parent_path));
        }

        let realized = if mode.is_sequential() {
            format!(
                "{path}{:0width$}",
                parent.stat.cversion,
                width = SEQUENTIAL_SUFFIX_WIDTH
            )
        } else {
            path.to_string()
        };
        if self.nodes.contains_key(&realized) {
            return Err(RemoteError::NodeExists(realized));
        }

        self.zxid += 1;
        let now = now_millis();
        let stat = Stat {
            czxid: self.zxid,
            mzxid: self.zxid,
            ctime: now,
            mtime: now,
            version: 0,
            cversion: 0,
            ephemeral_owner: if mode.is_ephemeral() {
                session_id
            } else {
                PERSISTENT_OWNER
            },
            data_length: data.len() as i32,
            num_children: 0,
        };
        self.nodes.insert(
            realized.clone(),
            ZNode {
                data: Bytes::copy_from_slice(data),
                stat,
                children: BTreeSet::new(),
            },
        );
        if let Some(parent) = self.nodes.get_mut(&parent_path) {
            parent.children.insert(node_name(&realized).to_string());
            parent.stat.cversion += 1;
            parent.stat.num_children += 1;
        }
        trace!(path = %realized, ?mode, zxid = self.zxid, "Node created");

        self.trigger(&realized, WatchedEventKind::NodeCreated, &[WatchKind::Data]);
        self.trigger(
            &parent_path,
            WatchedEventKind::NodeChildrenChanged,
            &[WatchKind::Child],
        );
        Ok(realized)
    }

    pub(super) fn set_data(
        &mut self,
        path: &str,
        data: &[u8],
        version: i32,
    ) -> RemoteResult<Stat> {
        check_path(path)?;
        let node = self
            .nodes
            .get_mut(path)
            .ok_or_else(|| RemoteError::NoNode(path.to_string()))?;
        if version != -1 && version != node.stat.version {
            return Err(RemoteError::BadVersion {
                path: path.to_string(),
                expected: version,
                actual: node.stat.version,
            });
        }
        self.zxid += 1;
        node.data = Bytes::copy_from_slice(data);
        node.stat.version += 1;
        node.stat.mzxid = self.zxid;
        node.stat.mtime = now_millis();
        node.stat.data_length = data.len() as i32;
        let stat = node.stat;
        trace!(path, version = stat.version, "Node data set");

        self.trigger(path, WatchedEventKind::NodeDataChanged, &[WatchKind::Data]);
        Ok(stat)
    }

    pub(super) fn delete_node(
        &mut self,
        path: &str,
        version: Option<i32>,
    ) -> RemoteResult<()> {
        check_path(path)?;
        let parent_path = get_parent(path)
            .ok_or_else(|| RemoteError::BadArguments("cannot delete the root node".to_string()))?
            .to_string();
        let node = self.nodes.get(path).ok_or_else(|| RemoteError::NoNode(path.to_string()))?;
        if let Some(expected) = version {
            if expected != node.stat.version {
                return Err(RemoteError::BadVersion {
                    path: path.to_string(),
                    expected,
                    actual: node.stat.version,
                });
            }
        }
        if !node.children.is_empty() {
            return Err(RemoteError::NotEmpty(path.to_string()));
        }

        self.zxid += 1;
        self.nodes.remove(path);
        if let Some(parent) = self.nodes.get_mut(&parent_path) {
            parent.children.remove(node_name(path));
            parent.stat.cversion += 1;
            parent.stat.num_children -= 1;
        }
        trace!(path, zxid = self.zxid, "Node deleted");

        self.trigger(
            path,
            WatchedEventKind::NodeDeleted,
            &[WatchKind::Data, WatchKind::Child],
        );
        self.trigger(
            &parent_path,
            WatchedEventKind::NodeChildrenChanged,
            &[WatchKind::Child],
        );
        Ok(())
    }

    /// Consumes the one-shot watches of the given kinds on `path` and delivers
    /// a single notification per session.
    fn trigger(
        &mut self,
        path: &str,
        kind: WatchedEventKind,
        tables: &[WatchKind],
    ) {
        let mut targets = HashSet::new();
        for table in tables {
            let watches = match table {
                WatchKind::Data => &mut self.data_watches,
                WatchKind::Child => &mut self.child_watches,
            };
            if let Some(sessions) = watches.remove(path) {
                targets.extend(sessions);
            }
        }

        for session_id in targets {
            if let Some(entry) = self.sessions.get(&session_id) {
                if entry.liveness == Liveness::Expired {
                    continue;
                }
                let _ = entry.sender.send(Notification::Node(WatchedEvent {
                    kind,
                    path: path.to_string(),
                }));
                trace!(session_id, path, ?kind, "Watch fired");
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum WatchKind {
    Data,
    Child,
}

fn arm(
    table: &mut WatchTable,
    path: &str,
    session_id: i64,
) {
    table.entry(path.to_string()).or_default().insert(session_id);
}

fn check_path(path: &str) -> RemoteResult<()> {
    if is_valid_absolute_path(path) {
        Ok(())
    } else {
        Err(RemoteError::BadArguments(format!("invalid path {path:?}")))
    }
}
