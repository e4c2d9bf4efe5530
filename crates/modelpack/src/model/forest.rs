//! Decision tree ensemble.
//!
//! Trees are stored structure-of-arrays: one flat array per node attribute,
//! indexed by node id, root at 0. Every child id is strictly greater than
//! its parent's, which rules out cycles and lets validation run in a single
//! forward pass.
//!
//! Split rule: go left when `x < threshold`; a NaN feature follows the
//! node's default direction.

use ndarray::{Array1, ArrayView1};
use thiserror::Error;

use super::{InferenceModel, ModelMeta};

/// Node identifier within one tree.
pub type NodeId = u32;

// ============================================================================
// Errors
// ============================================================================

/// Structural problems in a single tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeError {
    #[error("tree has no nodes")]
    Empty,

    #[error("node array {field} has {got} entries, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("node {node} points to child {child}, outside 0..{n_nodes}")]
    ChildOutOfBounds {
        node: NodeId,
        child: NodeId,
        n_nodes: usize,
    },

    #[error("node {node} points back to node {child}")]
    ChildNotAfterParent { node: NodeId, child: NodeId },

    #[error("node {node} has a non-finite threshold or leaf value")]
    NonFinite { node: NodeId },
}

/// Structural problems in a forest.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForestError {
    #[error("tree {tree}: {source}")]
    InvalidTree {
        tree: usize,
        #[source]
        source: TreeError,
    },

    #[error("tree {tree} splits on feature {feature}, model has {n_features}")]
    FeatureOutOfRange {
        tree: usize,
        feature: u32,
        n_features: usize,
    },

    #[error("tree {tree} assigned to group {group}, model has {n_groups}")]
    GroupOutOfRange {
        tree: usize,
        group: u32,
        n_groups: usize,
    },

    #[error("{got} base scores for {expected} groups")]
    BaseScoreLen { expected: usize, got: usize },

    #[error("{trees} trees but {groups} group assignments")]
    TreeGroupsLen { trees: usize, groups: usize },

    #[error("invalid model metadata: {0}")]
    Meta(String),
}

// ============================================================================
// Tree
// ============================================================================

/// One regression tree with scalar leaves.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    split_indices: Box<[u32]>,
    thresholds: Box<[f64]>,
    left_children: Box<[NodeId]>,
    right_children: Box<[NodeId]>,
    default_left: Box<[bool]>,
    is_leaf: Box<[bool]>,
    leaf_values: Box<[f64]>,
}

impl Tree {
    /// Create a tree from parallel node arrays, validating structure.
    ///
    /// Split fields of leaf nodes and leaf values of split nodes are ignored.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        split_indices: Vec<u32>,
        thresholds: Vec<f64>,
        left_children: Vec<NodeId>,
        right_children: Vec<NodeId>,
        default_left: Vec<bool>,
        is_leaf: Vec<bool>,
        leaf_values: Vec<f64>,
    ) -> Result<Self, TreeError> {
        let n_nodes = is_leaf.len();
        if n_nodes == 0 {
            return Err(TreeError::Empty);
        }
        for (field, got) in [
            ("split_indices", split_indices.len()),
            ("thresholds", thresholds.len()),
            ("left_children", left_children.len()),
            ("right_children", right_children.len()),
            ("default_left", default_left.len()),
            ("leaf_values", leaf_values.len()),
        ] {
            if got != n_nodes {
                return Err(TreeError::LengthMismatch {
                    field,
                    expected: n_nodes,
                    got,
                });
            }
        }

        let tree = Self {
            split_indices: split_indices.into_boxed_slice(),
            thresholds: thresholds.into_boxed_slice(),
            left_children: left_children.into_boxed_slice(),
            right_children: right_children.into_boxed_slice(),
            default_left: default_left.into_boxed_slice(),
            is_leaf: is_leaf.into_boxed_slice(),
            leaf_values: leaf_values.into_boxed_slice(),
        };
        tree.validate()?;
        Ok(tree)
    }

    /// Single-leaf tree.
    pub fn constant(value: f64) -> Result<Self, TreeError> {
        Self::from_parts(
            vec![0],
            vec![0.0],
            vec![0],
            vec![0],
            vec![false],
            vec![true],
            vec![value],
        )
    }

    fn validate(&self) -> Result<(), TreeError> {
        let n_nodes = self.n_nodes();
        for node in 0..n_nodes {
            let id = node as NodeId;
            if self.is_leaf[node] {
                if !self.leaf_values[node].is_finite() {
                    return Err(TreeError::NonFinite { node: id });
                }
                continue;
            }
            if self.thresholds[node].is_nan() {
                return Err(TreeError::NonFinite { node: id });
            }
            for child in [self.left_children[node], self.right_children[node]] {
                if child as usize >= n_nodes {
                    return Err(TreeError::ChildOutOfBounds {
                        node: id,
                        child,
                        n_nodes,
                    });
                }
                if child <= id {
                    return Err(TreeError::ChildNotAfterParent { node: id, child });
                }
            }
        }
        Ok(())
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.is_leaf.len()
    }

    #[inline]
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.is_leaf[node as usize]
    }

    #[inline]
    pub fn split_index(&self, node: NodeId) -> u32 {
        self.split_indices[node as usize]
    }

    #[inline]
    pub fn threshold(&self, node: NodeId) -> f64 {
        self.thresholds[node as usize]
    }

    #[inline]
    pub fn left_child(&self, node: NodeId) -> NodeId {
        self.left_children[node as usize]
    }

    #[inline]
    pub fn right_child(&self, node: NodeId) -> NodeId {
        self.right_children[node as usize]
    }

    #[inline]
    pub fn default_left(&self, node: NodeId) -> bool {
        self.default_left[node as usize]
    }

    #[inline]
    pub fn leaf_value(&self, node: NodeId) -> f64 {
        self.leaf_values[node as usize]
    }

    /// Largest feature index used by a split, if any.
    pub fn max_feature(&self) -> Option<u32> {
        (0..self.n_nodes())
            .filter(|&n| !self.is_leaf[n])
            .map(|n| self.split_indices[n])
            .max()
    }

    /// Walk from the root to a leaf.
    #[inline]
    pub(crate) fn traverse_to_leaf(&self, features: ArrayView1<'_, f64>) -> NodeId {
        let mut node: NodeId = 0;
        while !self.is_leaf(node) {
            let fvalue = features[self.split_index(node) as usize];
            let go_left = if fvalue.is_nan() {
                self.default_left(node)
            } else {
                fvalue < self.threshold(node)
            };
            node = if go_left {
                self.left_child(node)
            } else {
                self.right_child(node)
            };
        }
        node
    }

    /// Leaf value reached by `features`. The row must hold every split
    /// feature; [`Forest`] checks this before traversal.
    #[inline]
    pub(crate) fn predict(&self, features: ArrayView1<'_, f64>) -> f64 {
        self.leaf_value(self.traverse_to_leaf(features))
    }

    pub(crate) fn split_indices(&self) -> &[u32] {
        &self.split_indices
    }

    pub(crate) fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    pub(crate) fn left_children(&self) -> &[NodeId] {
        &self.left_children
    }

    pub(crate) fn right_children(&self) -> &[NodeId] {
        &self.right_children
    }

    pub(crate) fn default_lefts(&self) -> &[bool] {
        &self.default_left
    }

    pub(crate) fn leaf_flags(&self) -> &[bool] {
        &self.is_leaf
    }

    pub(crate) fn leaf_values(&self) -> &[f64] {
        &self.leaf_values
    }
}

/// Incremental tree construction in node-id order.
///
/// ```
/// use modelpack::model::TreeBuilder;
///
/// // x0 < 0.5 ? -1 : 1
/// let tree = TreeBuilder::new()
///     .split(0, 0.5, 1, 2, true)
///     .leaf(-1.0)
///     .leaf(1.0)
///     .build()
///     .unwrap();
/// assert_eq!(tree.n_nodes(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TreeBuilder {
    split_indices: Vec<u32>,
    thresholds: Vec<f64>,
    left_children: Vec<NodeId>,
    right_children: Vec<NodeId>,
    default_left: Vec<bool>,
    is_leaf: Vec<bool>,
    leaf_values: Vec<f64>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a split node.
    pub fn split(
        mut self,
        feature: u32,
        threshold: f64,
        left: NodeId,
        right: NodeId,
        default_left: bool,
    ) -> Self {
        self.split_indices.push(feature);
        self.thresholds.push(threshold);
        self.left_children.push(left);
        self.right_children.push(right);
        self.default_left.push(default_left);
        self.is_leaf.push(false);
        self.leaf_values.push(0.0);
        self
    }

    /// Append a leaf node.
    pub fn leaf(mut self, value: f64) -> Self {
        self.split_indices.push(0);
        self.thresholds.push(0.0);
        self.left_children.push(0);
        self.right_children.push(0);
        self.default_left.push(false);
        self.is_leaf.push(true);
        self.leaf_values.push(value);
        self
    }

    pub fn build(self) -> Result<Tree, TreeError> {
        Tree::from_parts(
            self.split_indices,
            self.thresholds,
            self.left_children,
            self.right_children,
            self.default_left,
            self.is_leaf,
            self.leaf_values,
        )
    }
}

// ============================================================================
// Forest
// ============================================================================

/// Additive ensemble of trees, each contributing to one output group.
///
/// `margin[g] = base_score[g] + sum of trees assigned to g`.
#[derive(Debug, Clone)]
pub struct Forest {
    trees: Vec<Tree>,
    tree_groups: Vec<u32>,
    base_score: Vec<f64>,
    meta: ModelMeta,
}

impl Forest {
    /// Create an empty forest with zero base scores.
    pub fn new(meta: ModelMeta) -> Result<Self, ForestError> {
        meta.validate().map_err(ForestError::Meta)?;
        let n_groups = meta.n_groups();
        Ok(Self {
            trees: Vec::new(),
            tree_groups: Vec::new(),
            base_score: vec![0.0; n_groups],
            meta,
        })
    }

    /// Create a forest from its parts, validating every tree against the
    /// metadata.
    pub fn from_parts(
        meta: ModelMeta,
        trees: Vec<Tree>,
        tree_groups: Vec<u32>,
        base_score: Vec<f64>,
    ) -> Result<Self, ForestError> {
        if trees.len() != tree_groups.len() {
            return Err(ForestError::TreeGroupsLen {
                trees: trees.len(),
                groups: tree_groups.len(),
            });
        }
        let mut forest = Self::new(meta)?.with_base_score(base_score)?;
        for (tree, group) in trees.into_iter().zip(tree_groups) {
            forest.push_tree(tree, group)?;
        }
        Ok(forest)
    }

    /// Set the base score of every group.
    pub fn with_base_score(mut self, base_score: Vec<f64>) -> Result<Self, ForestError> {
        if base_score.len() != self.meta.n_groups() {
            return Err(ForestError::BaseScoreLen {
                expected: self.meta.n_groups(),
                got: base_score.len(),
            });
        }
        self.base_score = base_score;
        Ok(self)
    }

    /// Add a tree contributing to `group`.
    pub fn push_tree(&mut self, tree: Tree, group: u32) -> Result<(), ForestError> {
        let idx = self.trees.len();
        let n_groups = self.meta.n_groups();
        if group as usize >= n_groups {
            return Err(ForestError::GroupOutOfRange {
                tree: idx,
                group,
                n_groups,
            });
        }
        if let Some(feature) = tree.max_feature() {
            if feature as usize >= self.meta.n_features {
                return Err(ForestError::FeatureOutOfRange {
                    tree: idx,
                    feature,
                    n_features: self.meta.n_features,
                });
            }
        }
        self.trees.push(tree);
        self.tree_groups.push(group);
        Ok(())
    }

    /// Builder-style [`push_tree`](Self::push_tree).
    pub fn with_tree(mut self, tree: Tree, group: u32) -> Result<Self, ForestError> {
        self.push_tree(tree, group)?;
        Ok(self)
    }

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    #[inline]
    pub fn base_score(&self) -> &[f64] {
        &self.base_score
    }

    #[inline]
    pub fn tree_groups(&self) -> &[u32] {
        &self.tree_groups
    }

    pub fn trees(&self) -> impl Iterator<Item = &Tree> {
        self.trees.iter()
    }

    /// Iterate over trees with their group assignments.
    pub fn trees_with_groups(&self) -> impl Iterator<Item = (&Tree, u32)> {
        self.trees
            .iter()
            .zip(self.tree_groups.iter())
            .map(|(t, &g)| (t, g))
    }
}

impl InferenceModel for Forest {
    fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    fn margins(&self, features: ArrayView1<'_, f64>) -> Array1<f64> {
        let mut output = Array1::from(self.base_score.clone());
        for (tree, group) in self.trees_with_groups() {
            output[group as usize] += tree.predict(features);
        }
        output
    }
}
