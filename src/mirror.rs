//! Local replica of the remote namespace.
//!
//! The [`Mirror`] is written only by the dispatch worker; everyone else reads
//! it through a shared lock. Nodes are linked to their parent's child set on
//! insertion and may only be removed once childless, so the tree stays closed
//! under parent at every step of a cascade.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use bytes::Bytes;

use crate::client::Stat;
use crate::constants::ROOT_PATH;
use crate::path::get_parent;
use crate::path::join;
use crate::path::node_name;

/// A mirrored node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub path: String,
    pub data: Bytes,
    pub stat: Stat,
    /// Segment names of the mirrored children
    pub children: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct Mirror {
    nodes: BTreeMap<String, Node>,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &self,
        path: &str,
    ) -> Option<&Node> {
        self.nodes.get(path)
    }

    pub fn contains(
        &self,
        path: &str,
    ) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Copy of every mirrored path
    pub fn paths(&self) -> BTreeSet<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Inserts a node under an already mirrored parent.
    ///
    /// Returns `false` without touching the mirror if the path is already
    /// present or its parent is not.
    pub(crate) fn insert(
        &mut self,
        path: &str,
        data: Bytes,
        stat: Stat,
    ) -> bool {
        if self.nodes.contains_key(path) {
            return false;
        }
        match get_parent(path) {
            Some(parent) => match self.nodes.get_mut(parent) {
                Some(parent) => {
                    parent.children.insert(node_name(path).to_string());
                }
                None => return false,
            },
            None if path == ROOT_PATH => {}
            None => return false,
        }

        self.nodes.insert(
            path.to_string(),
            Node {
                path: path.to_string(),
                data,
                stat,
                children: BTreeSet::new(),
            },
        );
        true
    }

    /// Stores fresh data and stat; returns whether payload or version changed.
    pub(crate) fn update(
        &mut self,
        path: &str,
        data: Bytes,
        stat: Stat,
    ) -> bool {
        let Some(node) = self.nodes.get_mut(path) else {
            return false;
        };
        let changed = node.data != data || node.stat.version != stat.version;
        node.data = data;
        node.stat = stat;
        changed
    }

    /// Replaces the stat without reporting a change (child bookkeeping only).
    pub(crate) fn refresh_stat(
        &mut self,
        path: &str,
        stat: Stat,
    ) {
        if let Some(node) = self.nodes.get_mut(path) {
            node.stat = stat;
        }
    }

    /// Full paths of the mirrored children of `path`
    pub fn child_paths(
        &self,
        path: &str,
    ) -> Vec<String> {
        self.nodes
            .get(path)
            .map(|n| n.children.iter().map(|c| join(path, c)).collect())
            .unwrap_or_default()
    }

    /// `path` and all its mirrored descendants, deepest first, `path` last.
    pub fn post_order(
        &self,
        path: &str,
    ) -> Vec<String> {
        if !self.nodes.contains_key(path) {
            return Vec::new();
        }

        // Reverse of a pre-order walk visits every descendant before its ancestors
        let mut pre_order = Vec::new();
        let mut stack = vec![path.to_string()];
        while let Some(current) = stack.pop() {
            let mut children = self.child_paths(&current);
            children.reverse();
            stack.extend(children);
            pre_order.push(current);
        }
        pre_order.reverse();
        pre_order
    }

    /// Removes a childless node and unlinks it from its parent.
    ///
    /// Returns `false` if the node is absent or still has mirrored children.
    pub(crate) fn remove_leaf(
        &mut self,
        path: &str,
    ) -> bool {
        match self.nodes.get(path) {
            Some(node) if node.children.is_empty() => {}
            _ => return false,
        }
        self.nodes.remove(path);
        if let Some(parent) = get_parent(path).and_then(|p| self.nodes.get_mut(p)) {
            parent.children.remove(node_name(path));
        }
        true
    }

    /// Drops every node (session invalidation)
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
    }
}
