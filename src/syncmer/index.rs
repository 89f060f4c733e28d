//! Tree-wide syncmer index stored as per-node deltas.
//!
//! The baseline is the syncmer set of the buffer before any mutation. For
//! each node, the columns its mutations touch are widened by `k` bases on
//! each side; parent syncmers lying wholly inside a widened window are
//! deleted, and the syncmers of the node's sequence inside the windows are
//! inserted. Everything outside the windows is shared with the parent.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::ops::Range;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::coordinates::GlobalCoords;
use crate::error::{MatError, Result};
use crate::replay::buffer::SequenceBuffer;
use crate::replay::{traverse, ReplayVisitor};
use crate::syncmer::{syncmers, syncmers_at, Syncmer, SyncmerParams};
use crate::tree::{Node, NodeIdx, Tree};

/// Change in syncmers from a node's parent to the node
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncmerDelta {
    /// Indices into the parent's sorted syncmer list, ascending
    pub deleted: Vec<usize>,
    /// New syncmers, sorted
    pub inserted: Vec<Syncmer>,
}

impl SyncmerDelta {
    /// Applies the delta to the parent's sorted syncmers
    pub fn apply(&self, parent: &[Syncmer]) -> Vec<Syncmer> {
        let mut deleted = self.deleted.iter().peekable();
        let mut child: Vec<Syncmer> = Vec::with_capacity(parent.len() + self.inserted.len());
        for (idx, syncmer) in parent.iter().enumerate() {
            if deleted.peek() == Some(&&idx) {
                deleted.next();
            } else {
                child.push(syncmer.clone());
            }
        }
        child.extend(self.inserted.iter().cloned());
        child.sort();
        child
    }
}

/// Baseline syncmers and a delta for every node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncmerIndex {
    /// k and s used
    pub params: SyncmerParams,
    /// Syncmers before the root's mutations, sorted
    pub baseline: Vec<Syncmer>,
    /// Delta of each node, by identifier
    pub deltas: HashMap<String, SyncmerDelta>,
}

struct IndexBuilder<'a> {
    params: SyncmerParams,
    coords: &'a GlobalCoords,
    stack: Vec<Vec<Syncmer>>,
    deltas: HashMap<String, SyncmerDelta>,
}

impl ReplayVisitor for IndexBuilder<'_> {
    fn visit(&mut self, tree: &Tree, idx: NodeIdx, buffer: &SequenceBuffer) -> Result<()> {
        let node = tree.node(idx);
        let touched = touched_columns(node, buffer, self.coords)?;
        let windows = widen_windows(buffer, touched, self.params.k);

        let parent = self.stack.last().map(Vec::as_slice).unwrap_or_default();
        let deleted: Vec<usize> = parent
            .iter()
            .enumerate()
            .filter(|(_, s)| windows.iter().any(|w| s.pos >= w.start && s.end <= w.end))
            .map(|(i, _)| i)
            .collect();
        let mut inserted: Vec<Syncmer> = windows
            .iter()
            .flat_map(|w| syncmers_at(&buffer.aligned_range(w.clone()), w.start, &self.params))
            .collect();
        inserted.sort();
        inserted.dedup();

        let delta = SyncmerDelta { deleted, inserted };
        let child = delta.apply(parent);
        log::debug!(
            "{}: -{} +{} syncmers",
            node.identifier,
            delta.deleted.len(),
            delta.inserted.len()
        );
        self.deltas.insert(node.identifier.clone(), delta);
        self.stack.push(child);
        Ok(())
    }

    fn leave(&mut self, _tree: &Tree, _idx: NodeIdx) -> Result<()> {
        self.stack.pop();
        Ok(())
    }
}

// Column ranges edited by a node. Block mutations, and edits inside an
// inverted block, touch the whole block.
fn touched_columns(
    node: &Node,
    buffer: &SequenceBuffer,
    coords: &GlobalCoords,
) -> Result<Vec<Range<usize>>> {
    let out_of_range = |what: String| MatError::OutOfRange {
        node: node.identifier.clone(),
        mutation: what,
    };
    let mut touched = Vec::with_capacity(node.nuc_mutation.len() + node.block_mutation.len());
    for m in &node.block_mutation {
        let span = coords
            .block_span(m.primary_block_id, m.secondary_block_id)
            .ok_or_else(|| out_of_range(format!("{m:?}")))?;
        touched.push(span);
    }
    for m in &node.nuc_mutation {
        let p = m.position.primary_block_id;
        let s = m.position.secondary_block_id;
        if buffer.presence(p, s).is_some_and(|presence| presence.inverted) {
            touched.push(
                coords
                    .block_span(p, s)
                    .ok_or_else(|| out_of_range(m.to_string()))?,
            );
            continue;
        }
        let first = coords
            .coordinate_of(&m.coordinate(0))
            .map_err(|_| out_of_range(m.to_string()))?;
        let last = coords
            .coordinate_of(&m.coordinate(m.len() - 1))
            .map_err(|_| out_of_range(m.to_string()))?;
        touched.push(first.min(last)..first.max(last) + 1);
    }
    Ok(touched)
}

/// Widens each range by `k` non-gap columns on either side and merges
/// overlapping results
pub fn widen_windows(buffer: &SequenceBuffer, mut touched: Vec<Range<usize>>, k: usize) -> Vec<Range<usize>> {
    touched.sort_by_key(|r| r.start);
    let mut windows: Vec<Range<usize>> = Vec::with_capacity(touched.len());
    for range in touched {
        let widened = buffer.widen(range, k);
        match windows.last_mut() {
            Some(last) if widened.start <= last.end => last.end = last.end.max(widened.end),
            _ => windows.push(widened),
        }
    }
    windows
}

impl SyncmerIndex {
    /// Indexes every node of `tree` in one replay traversal
    pub fn build(tree: &Tree, params: SyncmerParams) -> Result<Self> {
        let pristine = SequenceBuffer::new(tree.catalog())?;
        let baseline = syncmers(&pristine.sequence(true), &params);
        log::info!("Indexing {} nodes, baseline has {} syncmers", tree.len(), baseline.len());
        let mut builder = IndexBuilder {
            params,
            coords: tree.global_coords(),
            stack: vec![baseline.clone()],
            deltas: HashMap::new(),
        };
        traverse(tree, &mut builder)?;
        Ok(Self {
            params,
            baseline,
            deltas: builder.deltas,
        })
    }

    /// Delta of a node
    pub fn delta(&self, identifier: &str) -> Result<&SyncmerDelta> {
        self.deltas
            .get(identifier)
            .ok_or_else(|| MatError::MissingNode(identifier.to_string()))
    }

    /// Full syncmer set of a node, from the baseline along its root path
    pub fn node_syncmers(&self, tree: &Tree, identifier: &str) -> Result<Vec<Syncmer>> {
        let idx = tree.find(identifier)?;
        let mut current = self.baseline.clone();
        for step in tree.path_from_root(idx) {
            current = self.delta(&tree.node(step).identifier)?.apply(&current);
        }
        Ok(current)
    }

    /// Saves the index
    pub fn save(&self, filename: &str) -> Result<()> {
        let mut serial_file = BufWriter::new(File::create(filename)?);
        ciborium::ser::into_writer(self, &mut serial_file)
            .map_err(|e| MatError::serialization(e.to_string()))?;
        Ok(())
    }

    /// Loads an index saved by [`SyncmerIndex::save`]
    pub fn load(filename: &str) -> Result<Self> {
        let index_file = BufReader::new(File::open(filename)?);
        ciborium::de::from_reader(index_file).map_err(|e| MatError::serialization(e.to_string()))
    }
}
