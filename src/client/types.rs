use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::constants::PERSISTENT_OWNER;

/// Node creation flavours supported by the coordination service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CreateMode {
    /// Survives the creating session
    #[default]
    Persistent,
    /// Persistent, with a server-assigned 10-digit suffix
    PersistentSequential,
    /// Removed when the creating session ends
    Ephemeral,
    /// Ephemeral, with a server-assigned 10-digit suffix
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    pub fn is_sequential(&self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }
}

/// Per-node metadata maintained by the coordination service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stat {
    /// Transaction id that created the node
    pub czxid: i64,
    /// Transaction id of the last data change
    pub mzxid: i64,
    /// Creation time, ms since epoch
    pub ctime: i64,
    /// Last modification time, ms since epoch
    pub mtime: i64,
    /// Data version; starts at 0 and increments on every write
    pub version: i32,
    /// Child version; increments on every child creation or deletion
    pub cversion: i32,
    /// Session id of the owner for ephemeral nodes, 0 otherwise
    pub ephemeral_owner: i64,
    pub data_length: i32,
    pub num_children: i32,
}

impl Stat {
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral_owner != PERSISTENT_OWNER
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchedEventKind {
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
}

/// A fired one-shot watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEvent {
    pub kind: WatchedEventKind,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection (re-)established; armed watches are intact
    SyncConnected,
    /// Connection lost; calls fail with `ConnectionLoss` until reconnected
    Disconnected,
    /// Session is gone for good, together with its ephemerals and watches
    Expired,
}

/// Everything the service pushes to a session, in delivery order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Node(WatchedEvent),
    Session(SessionState),
}

pub type NotificationSender = mpsc::UnboundedSender<Notification>;
pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;
