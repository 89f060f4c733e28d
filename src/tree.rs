//! Arena-backed phylogeny whose edges carry mutations.
//!
//! Nodes live in a `Vec` and refer to each other by index: children are an
//! ordered list of indices, the parent a plain back-reference. Merging a
//! child into its parent frees the child's slot, so an index stays valid
//! until the node it names is merged away.
//!
//! A [`Tree`] also owns the [`BlockCatalog`] its mutations are expressed
//! against, and the [`GlobalCoords`] derived from it.

use std::fmt;
use std::fmt::Write as _;

use hashbrown::HashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub mod annotate;
pub mod newick;
pub mod reroot;
pub mod substitutions;

use crate::coordinates::{BlockCatalog, GlobalCoords};
use crate::error::{MatError, Result};
use crate::mutation::{combine_block_mutations, BlockEffect, BlockMut, NucMut, NucMutType};

/// Index of a node in the tree's arena
pub type NodeIdx = usize;

/// A node and the mutations on the edge from its parent
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
    /// Unique name
    pub identifier: String,
    /// Length of the edge from the parent
    pub branch_length: f32,
    /// Depth below the root (root is 0)
    pub level: usize,
    /// Parent, [`None`] for the root
    pub parent: Option<NodeIdx>,
    /// Children, in order
    pub children: Vec<NodeIdx>,
    /// Nucleotide mutations, applied in order
    pub nuc_mutation: Vec<NucMut>,
    /// Block mutations, applied before the nucleotide mutations
    pub block_mutation: Vec<BlockMut>,
    /// Free-text labels
    pub annotations: Vec<String>,
}

impl Node {
    /// A node with no mutations and no links
    pub fn new(identifier: &str, branch_length: f32) -> Self {
        Self {
            identifier: identifier.to_string(),
            branch_length,
            ..Default::default()
        }
    }

    /// Whether the node has no children
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of sites edited by the nucleotide mutations
    pub fn mutated_sites(&self) -> usize {
        self.nuc_mutation.iter().map(|m| m.len()).sum()
    }
}

/// Per-node content of a tree file, listed in pre-order
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Nucleotide mutations
    pub nuc_mutation: Vec<NucMut>,
    /// Block mutations
    pub block_mutation: Vec<BlockMut>,
    /// Annotations
    #[serde(default)]
    pub annotations: Vec<String>,
}

/// A mutation-annotated tree
#[derive(Clone, Debug)]
pub struct Tree {
    nodes: Vec<Option<Node>>,
    root: NodeIdx,
    all_nodes: HashMap<String, NodeIdx>,
    catalog: BlockCatalog,
    global_coords: GlobalCoords,
    internal_counter: usize,
}

impl Tree {
    /// Builds a tree from a Newick topology and pre-order node records.
    ///
    /// Unlabelled internal nodes are named `node_<n>`.
    ///
    /// # Errors
    /// - [`MatError::MalformedInput`] if the topology cannot be parsed, the
    ///   record count differs from the node count, or names repeat.
    /// - [`MatError::MalformedCatalog`] if the catalog is inconsistent.
    /// - [`MatError::EmptyTree`] if there is nothing to build.
    pub fn new(newick: &str, records: Vec<NodeRecord>, catalog: BlockCatalog) -> Result<Self> {
        let parsed = newick::parse(newick)?;
        if parsed.len() != records.len() {
            return Err(MatError::malformed(format!(
                "topology has {} nodes but {} node records were given",
                parsed.len(),
                records.len()
            )));
        }
        let mut nodes = Vec::with_capacity(parsed.len());
        for (parsed_node, record) in parsed.iter().zip(records) {
            nodes.push(Node {
                identifier: parsed_node.name.clone().unwrap_or_default(),
                branch_length: parsed_node.branch_length.unwrap_or(0.0),
                level: 0,
                parent: parsed_node.parent,
                children: Vec::new(),
                nuc_mutation: record.nuc_mutation,
                block_mutation: record.block_mutation,
                annotations: record.annotations,
            });
        }
        for (idx, parsed_node) in parsed.iter().enumerate() {
            if let Some(parent) = parsed_node.parent {
                nodes[parent].children.push(idx);
            }
        }
        Self::from_nodes(nodes, 0, catalog)
    }

    /// Builds a tree from nodes whose parent and child links are already set.
    ///
    /// Nodes with an empty identifier are given `node_<n>` names.
    pub fn from_nodes(nodes: Vec<Node>, root: NodeIdx, catalog: BlockCatalog) -> Result<Self> {
        if nodes.is_empty() {
            return Err(MatError::EmptyTree);
        }
        if root >= nodes.len() || nodes[root].parent.is_some() {
            return Err(MatError::malformed("root node has a parent"));
        }
        let global_coords = GlobalCoords::new(&catalog)?;
        let mut tree = Self {
            nodes: nodes.into_iter().map(Some).collect(),
            root,
            all_nodes: HashMap::new(),
            catalog,
            global_coords,
            internal_counter: 0,
        };
        for idx in 0..tree.nodes.len() {
            let name = tree.node(idx).identifier.clone();
            if !name.is_empty() && tree.all_nodes.insert(name.clone(), idx).is_some() {
                return Err(MatError::malformed(format!("node name {name} is repeated")));
            }
        }
        for idx in 0..tree.nodes.len() {
            if tree.node(idx).identifier.is_empty() {
                let name = tree.new_internal_id();
                tree.all_nodes.insert(name.clone(), idx);
                tree.node_mut(idx).identifier = name;
            }
        }
        tree.fix_levels();
        Ok(tree)
    }

    /// Index of the root
    pub fn root(&self) -> NodeIdx {
        self.root
    }

    /// Node at `idx`.
    ///
    /// # Panics
    /// If the node has been merged away.
    pub fn node(&self, idx: NodeIdx) -> &Node {
        self.nodes[idx]
            .as_ref()
            .expect("node index refers to a merged node")
    }

    /// Mutable node at `idx`.
    ///
    /// # Panics
    /// If the node has been merged away.
    pub fn node_mut(&mut self, idx: NodeIdx) -> &mut Node {
        self.nodes[idx]
            .as_mut()
            .expect("node index refers to a merged node")
    }

    /// Node at `idx`, [`None`] if it was merged away
    pub fn get_node(&self, idx: NodeIdx) -> Option<&Node> {
        self.nodes.get(idx).and_then(|n| n.as_ref())
    }

    // Arena slots, for per-node parallel work
    pub(crate) fn nodes_mut(&mut self) -> &mut Vec<Option<Node>> {
        &mut self.nodes
    }

    /// Index of a named node
    pub fn get(&self, identifier: &str) -> Option<NodeIdx> {
        self.all_nodes.get(identifier).copied()
    }

    /// Index of a named node, or [`MatError::MissingNode`]
    pub fn find(&self, identifier: &str) -> Result<NodeIdx> {
        self.get(identifier)
            .ok_or_else(|| MatError::MissingNode(identifier.to_string()))
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.all_nodes.len()
    }

    /// Always false: a tree has a root
    pub fn is_empty(&self) -> bool {
        self.all_nodes.is_empty()
    }

    /// Size of the arena, including freed slots
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Block catalog the mutations refer to
    pub fn catalog(&self) -> &BlockCatalog {
        &self.catalog
    }

    /// Ordinals of the catalog's sites
    pub fn global_coords(&self) -> &GlobalCoords {
        &self.global_coords
    }

    /// All nodes below and including `from`, parents before children and
    /// siblings in order
    pub fn preorder(&self, from: NodeIdx) -> Vec<NodeIdx> {
        let mut order = Vec::new();
        let mut stack = vec![from];
        while let Some(idx) = stack.pop() {
            order.push(idx);
            stack.extend(self.node(idx).children.iter().rev());
        }
        order
    }

    /// Leaves, in pre-order
    pub fn leaves(&self) -> Vec<NodeIdx> {
        self.preorder(self.root)
            .into_iter()
            .filter(|idx| self.node(*idx).is_leaf())
            .collect()
    }

    /// Nodes from the root down to and including `idx`
    pub fn path_from_root(&self, idx: NodeIdx) -> Vec<NodeIdx> {
        let mut path = vec![idx];
        let mut cur = idx;
        while let Some(parent) = self.node(cur).parent {
            path.push(parent);
            cur = parent;
        }
        path.reverse();
        path
    }

    /// Whether `ancestor` is `idx` or lies on its path to the root
    pub fn is_ancestor(&self, ancestor: NodeIdx, idx: NodeIdx) -> bool {
        let mut cur = Some(idx);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.node(c).parent;
        }
        false
    }

    /// A fresh `node_<n>` identifier
    pub fn new_internal_id(&mut self) -> String {
        loop {
            self.internal_counter += 1;
            let name = format!("node_{}", self.internal_counter);
            if !self.all_nodes.contains_key(&name) {
                return name;
            }
        }
    }

    /// Adds a node to the arena.
    ///
    /// Links are taken as given; the caller wires parent and children.
    pub fn add_node(&mut self, node: Node) -> Result<NodeIdx> {
        if self.all_nodes.contains_key(&node.identifier) {
            return Err(MatError::malformed(format!(
                "node name {} is repeated",
                node.identifier
            )));
        }
        let idx = self.nodes.len();
        self.all_nodes.insert(node.identifier.clone(), idx);
        self.nodes.push(Some(node));
        Ok(idx)
    }

    /// Makes `idx` the root
    pub fn set_root(&mut self, idx: NodeIdx) {
        self.node_mut(idx).parent = None;
        self.root = idx;
    }

    /// Folds `child` into `parent`.
    ///
    /// The parent takes the child's identifier and children, branch lengths
    /// add up, block mutations combine (an insertion followed by a deletion
    /// cancels) and the child's nucleotide mutations are appended to the
    /// parent's. The child's arena slot is freed.
    pub fn merge_nodes(&mut self, parent: NodeIdx, child: NodeIdx) -> Result<()> {
        if self.get_node(child).and_then(|c| c.parent) != Some(parent) {
            return Err(MatError::inconsistent(format!(
                "cannot merge {} into a node that is not its parent",
                self.get_node(child)
                    .map(|c| c.identifier.as_str())
                    .unwrap_or("<merged>")
            )));
        }
        let absorbed = self.nodes[child]
            .take()
            .ok_or_else(|| MatError::inconsistent("merging a merged node"))?;
        for grandchild in &absorbed.children {
            self.node_mut(*grandchild).parent = Some(parent);
        }

        let old_name = std::mem::take(&mut self.node_mut(parent).identifier);
        self.all_nodes.remove(&old_name);
        self.all_nodes.insert(absorbed.identifier.clone(), parent);

        let par = self.node_mut(parent);
        par.identifier = absorbed.identifier;
        par.branch_length += absorbed.branch_length;
        par.children = absorbed.children;
        par.block_mutation = combine_block_mutations(&par.block_mutation, &absorbed.block_mutation);
        par.nuc_mutation.extend(absorbed.nuc_mutation);
        par.annotations.extend(absorbed.annotations);
        Ok(())
    }

    /// Recomputes every node's level from the root
    pub fn fix_levels(&mut self) {
        let mut stack = vec![(self.root, 0)];
        while let Some((idx, level)) = stack.pop() {
            let node = self.node_mut(idx);
            node.level = level;
            let children = node.children.clone();
            stack.extend(children.into_iter().map(|c| (c, level + 1)));
        }
    }

    /// Topology as Newick, every node labelled.
    ///
    /// Labels that [`newick::parse`] would split are single-quoted.
    pub fn newick_string(&self) -> String {
        let mut newick = String::new();
        self.write_newick(self.root, &mut newick);
        newick.push(';');
        newick
    }

    fn write_newick(&self, idx: NodeIdx, out: &mut String) {
        let node = self.node(idx);
        if !node.is_leaf() {
            out.push('(');
            for (i, child) in node.children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                self.write_newick(*child, out);
            }
            out.push(')');
        }
        // Writing to a String cannot fail
        let _ = write!(
            out,
            "{}:{}",
            newick::quote_label(&node.identifier),
            node.branch_length
        );
    }

    /// Node records in the order [`Tree::newick_string`] lists nodes
    pub fn to_records(&self) -> Vec<NodeRecord> {
        self.preorder(self.root)
            .into_iter()
            .map(|idx| {
                let node = self.node(idx);
                NodeRecord {
                    nuc_mutation: node.nuc_mutation.clone(),
                    block_mutation: node.block_mutation.clone(),
                    annotations: node.annotations.clone(),
                }
            })
            .collect()
    }

    /// Counts of nodes, depths and mutations
    pub fn summary(&self) -> TreeSummary {
        let leaves = self.leaves();
        let depths: Vec<usize> = leaves.iter().map(|l| self.node(*l).level).collect();
        let mut summary = self
            .nodes
            .par_iter()
            .filter_map(|n| n.as_ref())
            .fold(TreeSummary::default, |mut acc, node| {
                acc.add_node(node);
                acc
            })
            .reduce(TreeSummary::default, |a, b| a.combine(&b));
        summary.leaves = leaves.len();
        summary.max_depth = depths.iter().copied().max().unwrap_or(0);
        summary.mean_depth = if depths.is_empty() {
            0.0
        } else {
            depths.iter().sum::<usize>() as f64 / depths.len() as f64
        };
        summary
    }
}

/// Node, depth and mutation totals of a tree
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TreeSummary {
    /// Nodes
    pub nodes: usize,
    /// Leaves
    pub leaves: usize,
    /// Deepest leaf level
    pub max_depth: usize,
    /// Mean leaf level
    pub mean_depth: f64,
    /// Sites edited, over all nucleotide mutations
    pub parsimony: usize,
    /// Substitution runs
    pub substitutions: usize,
    /// Insertion runs
    pub insertions: usize,
    /// Deletion runs
    pub deletions: usize,
    /// Single-base substitutions
    pub snp_substitutions: usize,
    /// Single-base insertions
    pub snp_insertions: usize,
    /// Single-base deletions
    pub snp_deletions: usize,
    /// Block insertions
    pub block_insertions: usize,
    /// Block deletions
    pub block_deletions: usize,
    /// Block inversions
    pub block_inversions: usize,
}

impl TreeSummary {
    fn add_node(&mut self, node: &Node) {
        self.nodes += 1;
        for m in &node.nuc_mutation {
            self.parsimony += m.len();
            match m.mut_type() {
                NucMutType::Substitution => self.substitutions += 1,
                NucMutType::Insertion => self.insertions += 1,
                NucMutType::Deletion => self.deletions += 1,
                NucMutType::SnpSubstitution => self.snp_substitutions += 1,
                NucMutType::SnpInsertion => self.snp_insertions += 1,
                NucMutType::SnpDeletion => self.snp_deletions += 1,
            }
        }
        for m in &node.block_mutation {
            match m.effect() {
                BlockEffect::Insert { .. } => self.block_insertions += 1,
                BlockEffect::Delete => self.block_deletions += 1,
                BlockEffect::Invert => self.block_inversions += 1,
            }
        }
    }

    fn combine(&self, other: &Self) -> Self {
        Self {
            nodes: self.nodes + other.nodes,
            leaves: self.leaves + other.leaves,
            max_depth: self.max_depth.max(other.max_depth),
            mean_depth: 0.0,
            parsimony: self.parsimony + other.parsimony,
            substitutions: self.substitutions + other.substitutions,
            insertions: self.insertions + other.insertions,
            deletions: self.deletions + other.deletions,
            snp_substitutions: self.snp_substitutions + other.snp_substitutions,
            snp_insertions: self.snp_insertions + other.snp_insertions,
            snp_deletions: self.snp_deletions + other.snp_deletions,
            block_insertions: self.block_insertions + other.block_insertions,
            block_deletions: self.block_deletions + other.block_deletions,
            block_inversions: self.block_inversions + other.block_inversions,
        }
    }
}

impl fmt::Display for TreeSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "nodes\t{}", self.nodes)?;
        writeln!(f, "leaves\t{}", self.leaves)?;
        writeln!(f, "max_depth\t{}", self.max_depth)?;
        writeln!(f, "mean_depth\t{:.2}", self.mean_depth)?;
        writeln!(f, "parsimony\t{}", self.parsimony)?;
        writeln!(f, "substitutions\t{}", self.substitutions)?;
        writeln!(f, "insertions\t{}", self.insertions)?;
        writeln!(f, "deletions\t{}", self.deletions)?;
        writeln!(f, "snp_substitutions\t{}", self.snp_substitutions)?;
        writeln!(f, "snp_insertions\t{}", self.snp_insertions)?;
        writeln!(f, "snp_deletions\t{}", self.snp_deletions)?;
        writeln!(f, "block_insertions\t{}", self.block_insertions)?;
        writeln!(f, "block_deletions\t{}", self.block_deletions)?;
        write!(f, "block_inversions\t{}", self.block_inversions)
    }
}
