//! In-memory rooted phylogenetic tree.
//!
//! Nodes live in an arena indexed by [`NodeId`]. Ids are handed out in
//! creation order and never reused: the tree only grows, by attaching new
//! children and by splitting existing edges.

pub mod newick;
pub mod stats;

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, instrument, trace};

use insertster_shared::{InsertsterError, NodeId, Result};

pub use stats::TreeStats;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A single tree node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    name: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    length: Option<f64>,
}

impl Node {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Length of the edge above this node.
    pub fn length(&self) -> Option<f64> {
        self.length
    }

    pub fn is_tip(&self) -> bool {
        self.children.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// Rooted tree with parent/child links, branch lengths and unique names.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
    names: HashMap<String, NodeId>,
}

impl Tree {
    /// Create a tree holding only a root.
    pub fn new(root_name: Option<String>) -> Self {
        let mut names = HashMap::new();
        if let Some(name) = &root_name {
            names.insert(name.clone(), NodeId(0));
        }
        Self {
            nodes: vec![Node {
                name: root_name,
                parent: None,
                children: Vec::new(),
                length: None,
            }],
            root: NodeId(0),
            names,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Total number of nodes (internal + tips).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Look up a node, failing with a structural error for unknown ids.
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.get(id)
            .ok_or_else(|| InsertsterError::structural(format!("unknown node {id}")))
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(Node::name)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(Node::parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(Node::children).unwrap_or(&[])
    }

    pub fn length(&self, id: NodeId) -> Option<f64> {
        self.get(id).and_then(Node::length)
    }

    pub fn is_tip(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(Node::is_tip)
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        id == self.root
    }

    /// Find a node by name.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Human-readable label: the node name, or `#id` for unnamed nodes.
    pub fn label(&self, id: NodeId) -> String {
        match self.name(id) {
            Some(name) => name.to_string(),
            None => id.to_string(),
        }
    }

    /// All tip ids in id order.
    pub fn tips(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_tip())
            .map(|(i, _)| NodeId(i))
    }

    pub fn tip_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_tip()).count()
    }

    /// Children-before-parent order. Siblings are visited in child order.
    pub fn postorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(self.root, false)];

        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            stack.push((id, true));
            for &child in self.children(id).iter().rev() {
                stack.push((child, false));
            }
        }

        order
    }

    /// Parent-before-children order. Siblings are visited in child order.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];

        while let Some(id) = stack.pop() {
            order.push(id);
            for &child in self.children(id).iter().rev() {
                stack.push(child);
            }
        }

        order
    }

    /// Attach a new child under `parent`.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: Option<String>,
        length: Option<f64>,
    ) -> Result<NodeId> {
        self.node(parent)?;
        check_length(length)?;
        self.claim_name(name.as_deref())?;

        let id = self.push_node(Node {
            name,
            parent: Some(parent),
            children: Vec::new(),
            length,
        });
        self.nodes[parent.index()].children.push(id);

        trace!(%parent, child = %id, "added child");
        Ok(id)
    }

    /// Split the edge above `child` by inserting a new unnamed internal node.
    ///
    /// `fraction` is the position of the new node measured from `child`
    /// toward its parent, as a share of the edge length: `0.0` puts it at
    /// the child, `1.0` at the parent. The child keeps its slot in the
    /// parent's child list, now occupied by the new node.
    pub fn split_edge(&mut self, child: NodeId, fraction: f64) -> Result<NodeId> {
        let node = self.node(child)?;
        let parent = node.parent.ok_or_else(|| {
            InsertsterError::structural(format!("cannot split above the root {child}"))
        })?;
        if !(0.0..=1.0).contains(&fraction) {
            return Err(InsertsterError::structural(format!(
                "edge fraction must lie in [0, 1], got {fraction}"
            )));
        }

        let (lower, upper) = match node.length {
            Some(length) => {
                let lower = length * fraction;
                (Some(lower), Some(length - lower))
            }
            None => (None, None),
        };

        let slot = self.nodes[parent.index()]
            .children
            .iter()
            .position(|&c| c == child)
            .ok_or_else(|| {
                InsertsterError::structural(format!(
                    "node {child} is not listed among the children of {parent}"
                ))
            })?;

        let mid = self.push_node(Node {
            name: None,
            parent: Some(parent),
            children: vec![child],
            length: upper,
        });
        self.nodes[parent.index()].children[slot] = mid;
        let child_node = &mut self.nodes[child.index()];
        child_node.parent = Some(mid);
        child_node.length = lower;

        trace!(%parent, %child, %mid, fraction, "split edge");
        Ok(mid)
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        if let Some(name) = &node.name {
            self.names.insert(name.clone(), id);
        }
        self.nodes.push(node);
        id
    }

    fn claim_name(&self, name: Option<&str>) -> Result<()> {
        match name {
            Some(name) if self.names.contains_key(name) => Err(InsertsterError::structural(
                format!("duplicate node name '{name}'"),
            )),
            _ => Ok(()),
        }
    }
}

fn check_length(length: Option<f64>) -> Result<()> {
    match length {
        Some(l) if !l.is_finite() || l < 0.0 => Err(InsertsterError::structural(format!(
            "branch length must be a finite value >= 0, got {l}"
        ))),
        _ => Ok(()),
    }
}

/// Read a Newick file.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_tree(path: &Path) -> Result<Tree> {
    let content = std::fs::read_to_string(path).map_err(|e| InsertsterError::io(path, e))?;
    let tree = newick::parse(&content)?;

    info!(nodes = tree.len(), leaves = tree.tip_count(), "tree loaded");
    Ok(tree)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// `(((a,b)c,d)e,(f,g)h)root;`
    fn sample() -> Tree {
        newick::parse("(((a,b)c,d)e,(f,g)h)root;").expect("parse sample tree")
    }

    fn names(tree: &Tree, ids: &[NodeId]) -> Vec<String> {
        ids.iter().map(|&id| tree.label(id)).collect()
    }

    #[test]
    fn postorder_visits_children_first() {
        let tree = sample();
        assert_eq!(
            names(&tree, &tree.postorder()),
            vec!["a", "b", "c", "d", "e", "f", "g", "h", "root"]
        );
    }

    #[test]
    fn preorder_visits_parents_first() {
        let tree = sample();
        assert_eq!(
            names(&tree, &tree.preorder()),
            vec!["root", "e", "c", "a", "b", "d", "h", "f", "g"]
        );
    }

    #[test]
    fn find_and_links() {
        let tree = sample();
        let a = tree.find("a").expect("a");
        let c = tree.find("c").expect("c");
        assert_eq!(tree.parent(a), Some(c));
        assert!(tree.is_tip(a));
        assert!(!tree.is_tip(c));
        assert!(tree.is_root(tree.find("root").expect("root")));
        assert_eq!(tree.tip_count(), 5);
        assert!(tree.find("zzz").is_none());
    }

    #[test]
    fn add_child_rejects_duplicate_names() {
        let mut tree = sample();
        let h = tree.find("h").expect("h");
        let err = tree.add_child(h, Some("a".into()), Some(0.0)).unwrap_err();
        assert!(matches!(err, InsertsterError::Structural { .. }));
        assert_eq!(tree.len(), 9);
    }

    #[test]
    fn add_child_rejects_negative_length() {
        let mut tree = sample();
        let h = tree.find("h").expect("h");
        assert!(tree.add_child(h, Some("q".into()), Some(-1.0)).is_err());
    }

    #[test]
    fn split_edge_divides_length() {
        let mut tree = newick::parse("(A:1,B:2)root;").expect("parse");
        let b = tree.find("B").expect("B");
        let root = tree.root();

        let mid = tree.split_edge(b, 0.25).expect("split");

        assert_eq!(tree.parent(b), Some(mid));
        assert_eq!(tree.parent(mid), Some(root));
        assert_eq!(tree.length(b), Some(0.5));
        assert_eq!(tree.length(mid), Some(1.5));
        // slot in the parent's child list is preserved
        assert_eq!(tree.children(root)[1], mid);
        assert_eq!(tree.children(mid), &[b]);
        assert_eq!(tree.tip_count(), 2);
    }

    #[test]
    fn split_edge_rejects_root_and_bad_fraction() {
        let mut tree = newick::parse("(A:1,B:1)root;").expect("parse");
        let root = tree.root();
        let a = tree.find("A").expect("A");
        assert!(tree.split_edge(root, 0.5).is_err());
        assert!(tree.split_edge(a, 1.5).is_err());
        assert!(tree.split_edge(a, f64::NAN).is_err());
    }

    #[test]
    fn ids_are_never_reused() {
        let mut tree = newick::parse("(A:1,B:1)root;").expect("parse");
        let before = tree.len();
        let a = tree.find("A").expect("A");
        let mid = tree.split_edge(a, 0.0).expect("split");
        let leaf = tree.add_child(mid, Some("Q".into()), Some(0.0)).expect("add");
        assert_eq!(mid.index(), before);
        assert_eq!(leaf.index(), before + 1);
        assert_eq!(tree.name(a), Some("A"));
    }

    #[test]
    fn load_tree_reports_missing_files() {
        let missing = std::env::temp_dir().join("insertster-no-such-tree.nwk");
        let err = load_tree(&missing).unwrap_err();
        assert!(matches!(err, InsertsterError::Io { .. }));
    }
}
