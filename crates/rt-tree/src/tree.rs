//! Arena-backed ordered configuration tree with a navigation cursor.

use indexmap::IndexMap;
use rt_core::Id;

use crate::error::{TreeError, TreeResult};
use crate::path;
use crate::value::{FromValue, Value};

pub type NodeId = Id;

#[derive(Debug, Clone)]
enum Child {
    Leaf(Value),
    Node(NodeId),
}

#[derive(Debug, Clone)]
struct NodeData {
    name: String,
    parent: Option<NodeId>,
    children: IndexMap<String, Child>,
}

/// Borrowed view of one child of the current node.
#[derive(Debug, Clone, Copy)]
pub enum ChildRef<'a> {
    Leaf(&'a Value),
    Node,
}

/// Ordered key/value tree.
///
/// Every child keeps its insertion position, so iterating a node is a stable
/// function of the order in which the tree was populated. All navigation
/// happens through a cursor; failed moves and creates leave the cursor and
/// the tree untouched. Slots of deleted subtrees are reused by later
/// creations.
#[derive(Debug, Clone)]
pub struct ConfigTree {
    nodes: Vec<Option<NodeData>>,
    free: Vec<NodeId>,
    root: NodeId,
    current: NodeId,
}

impl Default for ConfigTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigTree {
    pub fn new() -> Self {
        let root = NodeId::from_index(0);
        Self {
            nodes: vec![Some(NodeData {
                name: String::new(),
                parent: None,
                children: IndexMap::new(),
            })],
            free: Vec::new(),
            root,
            current: root,
        }
    }

    fn node(&self, id: NodeId) -> &NodeData {
        match self.nodes.get(id.as_usize()).and_then(Option::as_ref) {
            Some(node) => node,
            // the cursor only ever points at live nodes
            None => unreachable!("dangling node id {id}"),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        match self.nodes.get_mut(id.as_usize()).and_then(Option::as_mut) {
            Some(node) => node,
            None => unreachable!("dangling node id {id}"),
        }
    }

    fn alloc(&mut self, name: &str, parent: NodeId) -> NodeId {
        let data = NodeData {
            name: name.to_string(),
            parent: Some(parent),
            children: IndexMap::new(),
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id.as_usize()] = Some(data);
                id
            }
            None => {
                let id = NodeId::from_index(self.nodes.len() as u32);
                self.nodes.push(Some(data));
                id
            }
        };
        self.node_mut(parent)
            .children
            .insert(name.to_string(), Child::Node(id));
        id
    }

    /// Resolve `segments` from `start` without touching the cursor.
    fn walk(&self, start: NodeId, segments: &[&str]) -> TreeResult<NodeId> {
        let mut at = start;
        for seg in segments {
            match self.node(at).children.get(*seg) {
                Some(Child::Node(id)) => at = *id,
                Some(Child::Leaf(_)) => {
                    return Err(TreeError::NotANode {
                        name: seg.to_string(),
                        at: self.path_of(at),
                    });
                }
                None => {
                    return Err(TreeError::NotFound {
                        name: seg.to_string(),
                        at: self.path_of(at),
                    });
                }
            }
        }
        Ok(at)
    }

    fn create_from(&mut self, start: NodeId, segments: &[&str]) -> TreeResult<()> {
        // Pre-check so that a failure has no side effects.
        let mut at = Some(start);
        for (i, seg) in segments.iter().enumerate() {
            let Some(node) = at else { break };
            match self.node(node).children.get(*seg) {
                Some(Child::Node(id)) => {
                    if i + 1 == segments.len() {
                        return Err(TreeError::AlreadyExists {
                            name: seg.to_string(),
                            at: self.path_of(node),
                        });
                    }
                    at = Some(*id);
                }
                Some(Child::Leaf(_)) => {
                    return Err(TreeError::NotANode {
                        name: seg.to_string(),
                        at: self.path_of(node),
                    });
                }
                None => at = None,
            }
        }

        let mut at = start;
        for seg in segments {
            at = match self.node(at).children.get(*seg) {
                Some(Child::Node(id)) => *id,
                _ => self.alloc(seg, at),
            };
        }
        self.current = at;
        Ok(())
    }

    fn path_of(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut at = Some(id);
        while let Some(node) = at {
            let data = self.node(node);
            if data.parent.is_some() {
                parts.push(data.name.as_str());
            }
            at = data.parent;
        }
        parts.reverse();
        parts.join(".")
    }

    // ---------------------------------------------------------------------
    // Cursor navigation
    // ---------------------------------------------------------------------

    pub fn move_to_root(&mut self) {
        self.current = self.root;
    }

    pub fn move_absolute(&mut self, path: &str) -> TreeResult<()> {
        let segments = path::segments(path)?;
        self.current = self.walk(self.root, &segments)?;
        Ok(())
    }

    pub fn move_relative(&mut self, path: &str) -> TreeResult<()> {
        let segments = path::segments(path)?;
        self.current = self.walk(self.current, &segments)?;
        Ok(())
    }

    /// Move `levels` parents up. Moving past the root fails without moving.
    pub fn move_to_ancestor(&mut self, levels: u32) -> TreeResult<()> {
        let mut at = self.current;
        for _ in 0..levels {
            at = self.node(at).parent.ok_or_else(|| TreeError::NoParent {
                levels,
                at: self.path(),
            })?;
        }
        self.current = at;
        Ok(())
    }

    /// Move into the `index`-th child, which must be a node.
    pub fn move_to_child(&mut self, index: usize) -> TreeResult<()> {
        let node = self.node(self.current);
        match node.children.get_index(index) {
            Some((_, Child::Node(id))) => {
                self.current = *id;
                Ok(())
            }
            Some((name, Child::Leaf(_))) => Err(TreeError::NotANode {
                name: name.clone(),
                at: self.path(),
            }),
            None => Err(TreeError::ChildIndex {
                index,
                len: node.children.len(),
            }),
        }
    }

    /// Create every missing node along `path` from the root and move there.
    pub fn create_absolute(&mut self, path: &str) -> TreeResult<()> {
        let segments = path::segments(path)?;
        self.create_from(self.root, &segments)
    }

    /// Create every missing node along `path` from the cursor and move there.
    pub fn create_relative(&mut self, path: &str) -> TreeResult<()> {
        let segments = path::segments(path)?;
        self.create_from(self.current, &segments)
    }

    // ---------------------------------------------------------------------
    // Current node inspection
    // ---------------------------------------------------------------------

    /// Name of the current node (empty at the root).
    pub fn name(&self) -> &str {
        &self.node(self.current).name
    }

    /// Dotted path of the current node from the root.
    pub fn path(&self) -> String {
        self.path_of(self.current)
    }

    pub fn is_root(&self) -> bool {
        self.current == self.root
    }

    pub fn number_of_children(&self) -> usize {
        self.node(self.current).children.len()
    }

    pub fn child_name(&self, index: usize) -> Option<&str> {
        self.node(self.current)
            .children
            .get_index(index)
            .map(|(name, _)| name.as_str())
    }

    pub fn child(&self, index: usize) -> Option<(&str, ChildRef<'_>)> {
        self.node(self.current)
            .children
            .get_index(index)
            .map(|(name, child)| (name.as_str(), to_ref(child)))
    }

    /// Children of the current node in insertion order.
    pub fn children(&self) -> impl Iterator<Item = (&str, ChildRef<'_>)> {
        self.node(self.current)
            .children
            .iter()
            .map(|(name, child)| (name.as_str(), to_ref(child)))
    }

    /// Names of the child nodes (not leaves) in insertion order.
    pub fn child_nodes(&self) -> Vec<String> {
        self.node(self.current)
            .children
            .iter()
            .filter(|(_, c)| matches!(c, Child::Node(_)))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node(self.current).children.contains_key(name)
    }

    pub fn is_node(&self, name: &str) -> bool {
        matches!(
            self.node(self.current).children.get(name),
            Some(Child::Node(_))
        )
    }

    // ---------------------------------------------------------------------
    // Values
    // ---------------------------------------------------------------------

    /// Raw leaf value, if present.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.node(self.current).children.get(name) {
            Some(Child::Leaf(v)) => Some(v),
            _ => None,
        }
    }

    /// Typed read of a leaf of the current node.
    pub fn read<T: FromValue>(&self, name: &str) -> TreeResult<T> {
        match self.node(self.current).children.get(name) {
            Some(Child::Leaf(v)) => T::from_value(v).ok_or_else(|| TreeError::TypeMismatch {
                name: name.to_string(),
                expected: T::EXPECTED,
            }),
            Some(Child::Node(_)) => Err(TreeError::NotALeaf {
                name: name.to_string(),
                at: self.path(),
            }),
            None => Err(TreeError::NotFound {
                name: name.to_string(),
                at: self.path(),
            }),
        }
    }

    /// Typed read that treats a missing leaf as `None`.
    pub fn read_opt<T: FromValue>(&self, name: &str) -> TreeResult<Option<T>> {
        if self.contains(name) {
            self.read(name).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Write (or overwrite) a leaf of the current node.
    pub fn write(&mut self, name: &str, value: impl Into<Value>) -> TreeResult<()> {
        path::check_name(name)?;
        if self.is_node(name) {
            return Err(TreeError::NotALeaf {
                name: name.to_string(),
                at: self.path(),
            });
        }
        let current = self.current;
        self.node_mut(current)
            .children
            .insert(name.to_string(), Child::Leaf(value.into()));
        Ok(())
    }

    /// Remove a leaf or a whole subtree from the current node.
    pub fn delete(&mut self, name: &str) -> TreeResult<()> {
        let current = self.current;
        let removed = self.node_mut(current).children.shift_remove(name);
        match removed {
            Some(Child::Node(id)) => {
                self.release(id);
                Ok(())
            }
            Some(Child::Leaf(_)) => Ok(()),
            None => Err(TreeError::NotFound {
                name: name.to_string(),
                at: self.path(),
            }),
        }
    }

    fn release(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(next.as_usize()).and_then(Option::take) {
                self.free.push(next);
                stack.extend(node.children.values().filter_map(|c| match c {
                    Child::Node(child) => Some(*child),
                    Child::Leaf(_) => None,
                }));
            }
        }
    }

    /// Remove every child of the current node.
    pub fn purge(&mut self) {
        let current = self.current;
        let children = std::mem::take(&mut self.node_mut(current).children);
        for child in children.into_values() {
            if let Child::Node(id) = child {
                self.release(id);
            }
        }
    }

    /// Copy the children of the current node into the current node of
    /// `dest`. Leaves overwrite, nodes merge. Both cursors are preserved.
    pub fn copy(&self, dest: &mut ConfigTree) -> TreeResult<()> {
        let target = dest.current;
        self.copy_node(self.current, dest, target);
        dest.current = target;
        Ok(())
    }

    fn copy_node(&self, from: NodeId, dest: &mut ConfigTree, to: NodeId) {
        for (name, child) in &self.node(from).children {
            match child {
                Child::Leaf(value) => {
                    let released = match dest.node(to).children.get(name) {
                        Some(Child::Node(old)) => Some(*old),
                        _ => None,
                    };
                    if let Some(old) = released {
                        dest.release(old);
                    }
                    dest.node_mut(to)
                        .children
                        .insert(name.clone(), Child::Leaf(value.clone()));
                }
                Child::Node(id) => {
                    let sub = match dest.node(to).children.get(name) {
                        Some(Child::Node(existing)) => *existing,
                        _ => dest.alloc(name, to),
                    };
                    self.copy_node(*id, dest, sub);
                }
            }
        }
    }
}

fn to_ref(child: &Child) -> ChildRef<'_> {
    match child {
        Child::Leaf(v) => ChildRef::Leaf(v),
        Child::Node(_) => ChildRef::Node,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConfigTree {
        let mut tree = ConfigTree::new();
        tree.create_absolute("A.B.C").unwrap();
        tree.write("x", 1_u32).unwrap();
        tree.create_absolute("A.D").unwrap();
        tree.write("y", "hello").unwrap();
        tree.move_to_root();
        tree
    }

    #[test]
    fn create_moves_cursor_to_new_node() {
        let mut tree = ConfigTree::new();
        tree.create_absolute("A.B").unwrap();
        assert_eq!(tree.name(), "B");
        assert_eq!(tree.path(), "A.B");
    }

    #[test]
    fn create_existing_fails() {
        let mut tree = sample();
        let err = tree.create_absolute("A.B").unwrap_err();
        assert!(matches!(err, TreeError::AlreadyExists { .. }));
        assert!(tree.is_root());
    }

    #[test]
    fn create_through_leaf_has_no_side_effects() {
        let mut tree = sample();
        tree.move_absolute("A.B.C").unwrap();
        let err = tree.create_relative("x.Z").unwrap_err();
        assert!(matches!(err, TreeError::NotANode { .. }));
        assert_eq!(tree.number_of_children(), 1);
        assert_eq!(tree.path(), "A.B.C");
    }

    #[test]
    fn invalid_paths_do_not_move() {
        let mut tree = sample();
        tree.move_absolute("A.B").unwrap();
        for p in ["", ".", "..", "..."] {
            assert!(tree.move_absolute(p).is_err());
            assert!(tree.move_relative(p).is_err());
            assert!(tree.create_relative(p).is_err());
        }
        assert_eq!(tree.path(), "A.B");
        assert_eq!(tree.number_of_children(), 1);
    }

    #[test]
    fn ancestor_moves() {
        let mut tree = sample();
        tree.move_absolute("A.B.C").unwrap();
        tree.move_to_ancestor(2).unwrap();
        assert_eq!(tree.name(), "A");
        assert!(tree.move_to_ancestor(5).is_err());
        assert_eq!(tree.name(), "A");
    }

    #[test]
    fn children_keep_insertion_order() {
        let mut tree = ConfigTree::new();
        for name in ["z", "a", "m"] {
            tree.write(name, 0_i32).unwrap();
        }
        let names: Vec<_> = tree.children().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["z", "a", "m"]);
    }

    #[test]
    fn typed_read_reports_mismatch() {
        let mut tree = sample();
        tree.move_absolute("A.D").unwrap();
        assert_eq!(tree.read::<String>("y").unwrap(), "hello");
        assert!(matches!(
            tree.read::<u32>("y"),
            Err(TreeError::TypeMismatch { .. })
        ));
        assert!(matches!(
            tree.read::<u32>("nope"),
            Err(TreeError::NotFound { .. })
        ));
        assert_eq!(tree.read_opt::<u32>("nope").unwrap(), None);
    }

    #[test]
    fn delete_subtree() {
        let mut tree = sample();
        tree.move_absolute("A").unwrap();
        tree.delete("B").unwrap();
        assert_eq!(tree.number_of_children(), 1);
        assert!(tree.move_absolute("A.B.C").is_err());
    }

    #[test]
    fn copy_merges_into_destination() {
        let src = sample();
        let mut dest = ConfigTree::new();
        dest.create_absolute("Out").unwrap();
        src.copy(&mut dest).unwrap();
        assert_eq!(dest.path(), "Out");
        dest.move_absolute("Out.A.B.C").unwrap();
        assert_eq!(dest.read::<u32>("x").unwrap(), 1);
    }

    #[test]
    fn purged_slots_are_reused() {
        let mut tree = ConfigTree::new();
        tree.create_absolute("Out").unwrap();
        let src = sample();
        src.copy(&mut tree).unwrap();
        let high_water = tree.nodes.len();
        for _ in 0..10 {
            tree.purge();
            assert_eq!(tree.number_of_children(), 0);
            src.copy(&mut tree).unwrap();
        }
        assert_eq!(tree.nodes.len(), high_water);
        tree.move_absolute("Out.A.B.C").unwrap();
        assert_eq!(tree.read::<u32>("x").unwrap(), 1);
    }

    #[test]
    fn deleted_slots_are_reused() {
        let mut tree = sample();
        let high_water = tree.nodes.len();
        tree.delete("A").unwrap();
        tree.create_absolute("X.Y.Z").unwrap();
        assert_eq!(tree.nodes.len(), high_water);
        assert_eq!(tree.path(), "X.Y.Z");
    }

    #[test]
    fn write_over_node_is_rejected() {
        let mut tree = sample();
        assert!(tree.write("A", 1_u8).is_err());
        assert!(tree.write("a.b", 1_u8).is_err());
    }
}
