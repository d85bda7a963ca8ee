//! The resource tree.
//!
//! Nodes live in an arena owned by the [`Tree`] and refer to each other by [`NodeId`].
//! Every node except the session root has exactly one parent, which owns it: removing a
//! node removes its whole subtree. Siblings of the same kind are unique by index
//! (chassis, which all have the empty index, by name).

use rustc_hash::FxHashMap;

use crate::Error;

mod index;
mod kind;

pub use index::Index;
pub use kind::{CachePolicy, Kind};

/// Handle of a node in the [`Tree`]. Ids are never reused within a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

/// An addressable resource.
#[derive(Debug)]
pub struct ResourceNode {
    kind: Kind,
    index: Index,
    name: String,
    /// Last known attribute values. Only written by explicit queries and commands.
    cache: FxHashMap<String, String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl ResourceNode {
    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// All children, in creation order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Last known value of `attribute`, if it was ever read or written.
    pub fn cached(&self, attribute: &str) -> Option<&str> {
        self.cache.get(attribute).map(String::as_str)
    }

    pub fn attributes(&self) -> &FxHashMap<String, String> {
        &self.cache
    }

    fn same_slot(&self, kind: Kind, index: &Index, name: &str) -> bool {
        self.kind == kind
            && match kind {
                Kind::Chassis => self.name == name,
                _ => self.index == *index,
            }
    }
}

#[derive(Debug)]
pub struct Tree {
    nodes: FxHashMap<NodeId, ResourceNode>,
    root: NodeId,
    next_id: u64,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// Creates a tree holding only the session root.
    pub fn new() -> Self {
        let root = NodeId(0);
        let mut nodes = FxHashMap::default();
        nodes.insert(
            root,
            ResourceNode {
                kind: Kind::Session,
                index: Index::root(),
                name: String::new(),
                cache: FxHashMap::default(),
                parent: None,
                children: Vec::new(),
            },
        );

        Self { nodes, root, next_id: 1 }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&ResourceNode> {
        self.nodes.get(&id)
    }

    /// Like [`Self::get`], but a missing node is an error.
    pub fn node(&self, id: NodeId) -> Result<&ResourceNode, Error> {
        self.nodes.get(&id).ok_or(Error::Detached)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut ResourceNode, Error> {
        self.nodes.get_mut(&id).ok_or(Error::Detached)
    }

    /// Attaches a new node below `parent`.
    pub(crate) fn insert(
        &mut self,
        parent: NodeId,
        kind: Kind,
        index: Index,
        name: impl Into<String>,
    ) -> Result<NodeId, Error> {
        let name = name.into();

        let mut siblings = self.node(parent)?.children.iter().filter_map(|c| self.nodes.get(c));
        if siblings.any(|s| s.same_slot(kind, &index, &name)) {
            return Err(Error::Duplicate { kind, index, name });
        }

        let id = NodeId(self.next_id);
        self.next_id += 1;

        tracing::debug!(%kind, %index, name = %name, "Attaching node");

        self.nodes.insert(
            id,
            ResourceNode {
                kind,
                index,
                name,
                cache: FxHashMap::default(),
                parent: Some(parent),
                children: Vec::new(),
            },
        );
        self.node_mut(parent)?.children.push(id);

        Ok(id)
    }

    /// Detaches `id` from its parent and discards its subtree. Returns the number of
    /// nodes removed. The root can't be removed.
    pub(crate) fn remove(&mut self, id: NodeId) -> usize {
        if id == self.root {
            return 0;
        }

        let Some(parent) = self.nodes.get(&id).and_then(|n| n.parent) else {
            return 0;
        };

        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.retain(|c| *c != id);
        }

        let mut removed = 0;
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            if let Some(node) = self.nodes.remove(&id) {
                tracing::trace!(kind = %node.kind, index = %node.index, "Detached node");
                pending.extend(node.children);
                removed += 1;
            }
        }

        removed
    }

    /// Direct child of `parent` with the given kind and index.
    pub fn child(&self, parent: NodeId, kind: Kind, index: &Index) -> Option<NodeId> {
        let parent = self.nodes.get(&parent)?;
        parent.children.iter().copied().find(|c| {
            self.nodes.get(c).is_some_and(|n| n.kind == kind && n.index == *index)
        })
    }

    /// Direct children of `parent` with the given kind, in creation order.
    pub fn children(&self, parent: NodeId, kind: Kind) -> Vec<NodeId> {
        let Some(parent) = self.nodes.get(&parent) else {
            return Vec::new();
        };

        parent
            .children
            .iter()
            .copied()
            .filter(|c| self.nodes.get(c).is_some_and(|n| n.kind == kind))
            .collect()
    }

    /// All descendants of `id` with the given kind, depth first in creation order.
    pub fn get_objects_by_type(&self, id: NodeId, kind: Kind) -> Vec<NodeId> {
        let mut found = Vec::new();
        self.visit(id, &mut |node_id, node| {
            if node.kind == kind {
                found.push(node_id);
            }
        });
        found
    }

    /// The single descendant of `id` with the given kind. More than one is an error.
    pub fn get_object_by_type(&self, id: NodeId, kind: Kind) -> Result<Option<NodeId>, Error> {
        single(self.get_objects_by_type(id, kind), || kind.to_string())
    }

    /// The single descendant of `id` with the given name. More than one is an error.
    pub fn get_object_by_name(&self, id: NodeId, name: &str) -> Result<Option<NodeId>, Error> {
        let mut found = Vec::new();
        self.visit(id, &mut |node_id, node| {
            if node.name == name {
                found.push(node_id);
            }
        });

        single(found, || name.to_string())
    }

    /// Removes every descendant of `id` with the given kind, along with their subtrees.
    /// Returns the number of nodes removed.
    pub(crate) fn del_objects_by_type(&mut self, id: NodeId, kind: Kind) -> usize {
        self.get_objects_by_type(id, kind).into_iter().map(|obj| self.remove(obj)).sum()
    }

    /// Removes all descendants of `id`, keeping `id` itself.
    pub(crate) fn clear_children(&mut self, id: NodeId) -> usize {
        let children = self.nodes.get(&id).map(|n| n.children.clone()).unwrap_or_default();
        children.into_iter().map(|c| self.remove(c)).sum()
    }

    /// The closest node of the given kind on the path from `id` to the root, `id`
    /// included.
    pub fn ancestor(&self, id: NodeId, kind: Kind) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(id) = current {
            let node = self.nodes.get(&id)?;
            if node.kind == kind {
                return Some(id);
            }
            current = node.parent;
        }
        None
    }

    pub(crate) fn rename(&mut self, id: NodeId, name: impl Into<String>) -> Result<(), Error> {
        self.node_mut(id)?.name = name.into();
        Ok(())
    }

    pub(crate) fn cache(&mut self, id: NodeId, attribute: &str, value: &str) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.cache.insert(attribute.to_string(), value.to_string());
        }
    }

    /// Pre-order walk over the strict descendants of `id`.
    fn visit(&self, id: NodeId, f: &mut impl FnMut(NodeId, &ResourceNode)) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };

        for child in &node.children {
            if let Some(child_node) = self.nodes.get(child) {
                f(*child, child_node);
                self.visit(*child, f);
            }
        }
    }
}

fn single(found: Vec<NodeId>, what: impl FnOnce() -> String) -> Result<Option<NodeId>, Error> {
    match found.as_slice() {
        [] => Ok(None),
        [id] => Ok(Some(*id)),
        _ => Err(Error::Ambiguous { what: what(), count: found.len() }),
    }
}
