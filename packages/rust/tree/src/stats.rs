//! Per-node structural statistics used by score and selection strategies.

use insertster_shared::NodeId;

use crate::Tree;

/// Snapshot of per-node counts, indexed by [`NodeId`].
///
/// Computed once for the reference tree; nodes added afterwards are not
/// covered (lookups for them return `None`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeStats {
    tip_counts: Vec<usize>,
    min_tip_distance: Vec<usize>,
    root_distance: Vec<usize>,
}

impl TreeStats {
    pub fn compute(tree: &Tree) -> Self {
        let n = tree.len();
        let mut tip_counts = vec![0; n];
        let mut min_tip_distance = vec![0; n];
        let mut root_distance = vec![0; n];

        for id in tree.postorder() {
            let children = tree.children(id);
            if children.is_empty() {
                tip_counts[id.index()] = 1;
                min_tip_distance[id.index()] = 0;
            } else {
                tip_counts[id.index()] = children.iter().map(|c| tip_counts[c.index()]).sum();
                min_tip_distance[id.index()] = children
                    .iter()
                    .map(|c| min_tip_distance[c.index()])
                    .min()
                    .unwrap_or(0)
                    + 1;
            }
        }

        for id in tree.preorder() {
            if let Some(parent) = tree.parent(id) {
                root_distance[id.index()] = root_distance[parent.index()] + 1;
            }
        }

        Self {
            tip_counts,
            min_tip_distance,
            root_distance,
        }
    }

    /// Number of tips in the subtree rooted at `id`.
    pub fn tip_count(&self, id: NodeId) -> Option<usize> {
        self.tip_counts.get(id.index()).copied()
    }

    /// Minimum number of branches from `id` down to a tip.
    pub fn min_tip_distance(&self, id: NodeId) -> Option<usize> {
        self.min_tip_distance.get(id.index()).copied()
    }

    /// Number of branches from the root down to `id`.
    ///
    /// No built-in selection policy reads this; it is provided for custom
    /// `BestFunction` implementations that weigh depth.
    pub fn root_distance(&self, id: NodeId) -> Option<usize> {
        self.root_distance.get(id.index()).copied()
    }
}
