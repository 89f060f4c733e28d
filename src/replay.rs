//! Recovering sequences by replaying mutations from the root.
//!
//! A single [`SequenceBuffer`] is shared by a whole pre-order traversal: on
//! entering a node its block and nucleotide mutations are applied, the
//! visitor sees the node's sequence, children are visited, and the node's
//! edits are undone before returning to the parent.
//!
//! ```no_run
//! use panmat::replay::{sequence_of, write_fasta};
//! use panmat::tree::Tree;
//!
//! let tree = Tree::load("pangenome.pmat").unwrap();
//! let seq = sequence_of(&tree, "sample_1", false).unwrap();
//! println!("{}", String::from_utf8_lossy(&seq));
//!
//! let mut out = std::io::stdout();
//! write_fasta(&tree, &mut out, true, false).unwrap();
//! ```

use std::io::Write;
use std::ops::Range;

use indicatif::ParallelProgressIterator;
use needletail::parser::{write_fasta as write_fasta_record, LineEnding};
use rayon::prelude::*;

pub mod buffer;
use crate::replay::buffer::SequenceBuffer;

use crate::error::Result;
use crate::mutation::bit_encoding::GAP;
use crate::tree::{NodeIdx, Tree};

/// Callbacks for [`traverse`]
pub trait ReplayVisitor {
    /// Called with the node's sequence in `buffer`, before its children
    fn visit(&mut self, tree: &Tree, idx: NodeIdx, buffer: &SequenceBuffer) -> Result<()>;

    /// Called after all children, before the node's edits are undone
    fn leave(&mut self, _tree: &Tree, _idx: NodeIdx) -> Result<()> {
        Ok(())
    }
}

/// Visits every node in pre-order with its sequence
pub fn traverse<V: ReplayVisitor>(tree: &Tree, visitor: &mut V) -> Result<()> {
    let mut buffer = SequenceBuffer::new(tree.catalog())?;
    traverse_from(tree, tree.root(), &mut buffer, visitor)
}

fn traverse_from<V: ReplayVisitor>(
    tree: &Tree,
    idx: NodeIdx,
    buffer: &mut SequenceBuffer,
    visitor: &mut V,
) -> Result<()> {
    let node = tree.node(idx);
    let mut applied = buffer.enter(node)?;
    visitor.visit(tree, idx, &applied)?;
    for child in &node.children {
        traverse_from(tree, *child, &mut applied, visitor)?;
    }
    visitor.leave(tree, idx)
}

/// Buffer holding the sequence of `idx`, built by applying the mutations on
/// its root path to `template`
pub fn buffer_at(tree: &Tree, idx: NodeIdx, template: &SequenceBuffer) -> Result<SequenceBuffer> {
    let mut buffer = template.clone();
    for step in tree.path_from_root(idx) {
        buffer.apply(tree.node(step))?;
    }
    Ok(buffer)
}

/// Sequence of a named node, aligned or with gaps removed
pub fn sequence_of(tree: &Tree, identifier: &str, aligned: bool) -> Result<Vec<u8>> {
    let idx = tree.find(identifier)?;
    let template = SequenceBuffer::new(tree.catalog())?;
    Ok(buffer_at(tree, idx, &template)?.sequence(aligned))
}

struct FastaWriter<'a, W: Write> {
    out: &'a mut W,
    aligned: bool,
    all_nodes: bool,
}

impl<W: Write> ReplayVisitor for FastaWriter<'_, W> {
    fn visit(&mut self, tree: &Tree, idx: NodeIdx, buffer: &SequenceBuffer) -> Result<()> {
        let node = tree.node(idx);
        if self.all_nodes || node.is_leaf() {
            write_fasta_record(
                node.identifier.as_bytes(),
                &buffer.sequence(self.aligned),
                &mut *self.out,
                LineEnding::Unix,
            )?;
        }
        Ok(())
    }
}

/// Writes leaf sequences (or all nodes') as FASTA, in pre-order.
///
/// Uses a single buffer and one traversal.
pub fn write_fasta<W: Write>(tree: &Tree, f: &mut W, aligned: bool, all_nodes: bool) -> Result<()> {
    let mut writer = FastaWriter {
        out: f,
        aligned,
        all_nodes,
    };
    traverse(tree, &mut writer)
}

/// Sequences of many nodes in parallel.
///
/// Each worker replays the root path of its node into its own copy of a
/// freshly built buffer. Output keeps the order of `nodes`.
pub fn sequences_parallel(
    tree: &Tree,
    nodes: &[NodeIdx],
    aligned: bool,
) -> Result<Vec<(String, Vec<u8>)>> {
    let template = SequenceBuffer::new(tree.catalog())?;
    let total = nodes.len() as u64;
    nodes
        .par_iter()
        .progress_count(total)
        .map(|idx| {
            let buffer = buffer_at(tree, *idx, &template)?;
            Ok((tree.node(*idx).identifier.clone(), buffer.sequence(aligned)))
        })
        .collect()
}

/// Window `columns` of the aligned sequences of many nodes, in parallel.
///
/// Only the blocks overlapping the window are built for each node. Gaps
/// are removed unless `aligned` is set.
pub fn segments_parallel(
    tree: &Tree,
    nodes: &[NodeIdx],
    columns: Range<usize>,
    aligned: bool,
) -> Result<Vec<(String, Vec<u8>)>> {
    let template = SequenceBuffer::new(tree.catalog())?;
    let total = nodes.len() as u64;
    nodes
        .par_iter()
        .progress_count(total)
        .map(|idx| {
            let buffer = buffer_at(tree, *idx, &template)?;
            let mut seq = buffer.aligned_range(columns.clone());
            if !aligned {
                seq.retain(|c| *c != GAP);
            }
            Ok((tree.node(*idx).identifier.clone(), seq))
        })
        .collect()
}

/// Parallel version of [`write_fasta`], same output
pub fn write_fasta_parallel<W: Write>(
    tree: &Tree,
    f: &mut W,
    aligned: bool,
    all_nodes: bool,
) -> Result<()> {
    let nodes: Vec<NodeIdx> = tree
        .preorder(tree.root())
        .into_iter()
        .filter(|idx| all_nodes || tree.node(*idx).is_leaf())
        .collect();
    log::info!("Extracting {} sequences", nodes.len());
    for (name, seq) in sequences_parallel(tree, &nodes, aligned)? {
        write_fasta_record(name.as_bytes(), &seq, &mut *f, LineEnding::Unix)?;
    }
    Ok(())
}
