use panmat::coordinates::{Block, BlockCatalog};
use panmat::error::MatError;
use panmat::mutation::bit_encoding::revcomp;
use panmat::mutation::{BlockMut, NucMut};
use panmat::replay::buffer::SequenceBuffer;
use panmat::replay::{buffer_at, sequence_of, sequences_parallel, write_fasta, write_fasta_parallel};
use panmat::tree::{Node, NodeRecord, Tree};

use proptest::prelude::*;

pub mod common;
use crate::common::*;

#[cfg(test)]
use pretty_assertions::assert_eq;

#[test]
fn toy_sequences() {
    let tree = toy_tree();
    for (id, expected) in TOY_SEQS {
        let seq = sequence_of(&tree, id, false).unwrap();
        assert_eq!(String::from_utf8(seq).unwrap(), expected, "sequence of {id}");
    }

    let aligned = sequence_of(&tree, "a", true).unwrap();
    assert_eq!(String::from_utf8(aligned).unwrap(), "AGGTTTTGCAGGCCAATT");
    let aligned = sequence_of(&tree, "c", true).unwrap();
    assert_eq!(String::from_utf8(aligned).unwrap(), "ACGT--TGCA--------");
    assert_eq!(tree.global_coords().len(), 18);
}

#[test]
fn site_ordinals() {
    let tree = toy_tree();
    let coords = tree.global_coords();
    assert_eq!(coords.coordinate_of(&site(0, 0)).unwrap(), 0);
    assert_eq!(coords.coordinate_of(&gap_site(0, 4, 1)).unwrap(), 5);
    assert_eq!(coords.coordinate_of(&site(0, 4)).unwrap(), 6);
    assert_eq!(coords.coordinate_of(&site(1, 7)).unwrap(), 17);

    for missing in [site(2, 0), site(0, 9), gap_site(0, 3, 0), gap_site(0, 4, 2)] {
        assert!(
            matches!(coords.coordinate_of(&missing), Err(MatError::MalformedCatalog { .. })),
            "{missing} has no ordinal"
        );
    }
}

#[test]
fn repeated_block_rejected() {
    let mut catalog = toy_catalog();
    catalog.blocks.push(Block::new(1, -1, b"TTTT", "chr2"));
    assert!(matches!(
        SequenceBuffer::new(&catalog),
        Err(MatError::MalformedCatalog { .. })
    ));
    assert!(matches!(
        Tree::new(TOY_NEWICK, toy_records(), catalog),
        Err(MatError::MalformedCatalog { .. })
    ));
}

#[test]
fn missing_node() {
    let tree = toy_tree();
    assert!(matches!(
        sequence_of(&tree, "nobody", false),
        Err(MatError::MissingNode(id)) if id == "nobody"
    ));
}

#[test]
fn column_windows() {
    let tree = toy_tree();
    let template = SequenceBuffer::new(tree.catalog()).unwrap();
    let c = buffer_at(&tree, tree.find("c").unwrap(), &template).unwrap();
    // ACGT--TGCA--------
    assert_eq!(c.aligned_len(), 18);
    assert_eq!(c.aligned_range(4..10), b"--TGCA");
    assert_eq!(c.aligned_range(8..12), b"CA--");
    assert_eq!(c.aligned_range(0..100), c.sequence(true));
    assert!(c.aligned_range(20..30).is_empty());

    assert_eq!(c.widen(4..6, 2), 2..8);
    // block 1 is absent, so widening runs to the end
    assert_eq!(c.widen(9..10, 3), 6..18);
    assert_eq!(c.widen(1..2, 5), 0..9);
    assert_eq!(c.widen(3..4, 0), 3..4);

    let a = buffer_at(&tree, tree.find("a").unwrap(), &template).unwrap();
    // AGGTTTTGCAGGCCAATT
    assert_eq!(a.widen(9..10, 2), 7..12);
    assert_eq!(a.aligned_range(7..12), b"GCAGG");
}

#[test]
fn apply_then_undo_restores() {
    let tree = toy_tree();
    let mut buffer = SequenceBuffer::new(tree.catalog()).unwrap();
    let pristine = buffer.sequence(true);
    assert_eq!(pristine, vec![b'-'; 18]);

    let root_log = buffer.apply(tree.node(tree.root())).unwrap();
    let root_seq = buffer.sequence(true);
    assert_eq!(String::from_utf8(root_seq.clone()).unwrap(), "ACGT--TGCAGGCCAATT");

    let a = tree.node(tree.find("a").unwrap());
    let log = buffer.apply(a).unwrap();
    assert_eq!(log.len(), 2);
    assert_ne!(buffer.sequence(true), root_seq);
    buffer.undo(log);
    assert_eq!(buffer.sequence(true), root_seq);

    {
        let guard = buffer.enter(tree.node(tree.find("c").unwrap())).unwrap();
        assert!(!guard.block_exists(1, -1));
    }
    assert!(buffer.block_exists(1, -1));

    buffer.undo(root_log);
    assert_eq!(buffer.sequence(true), pristine);
}

#[test]
fn out_of_range_leaves_buffer_unchanged() {
    let tree = toy_tree();
    let mut buffer = SequenceBuffer::new(tree.catalog()).unwrap();
    buffer.apply(tree.node(tree.root())).unwrap();
    let before = buffer.sequence(true);

    let mut bad = Node::new("bad", 0.0);
    bad.nuc_mutation = vec![sub(site(0, 0), b'T'), sub(site(0, 8), b'A')];
    let err = buffer.apply(&bad).unwrap_err();
    assert!(matches!(err, MatError::OutOfRange { ref node, .. } if node == "bad"));
    assert_eq!(buffer.sequence(true), before);

    let mut bad_block = Node::new("bad_block", 0.0);
    bad_block.block_mutation = vec![BlockMut::insertion(5, -1)];
    assert!(buffer.apply(&bad_block).is_err());
    assert_eq!(buffer.sequence(true), before);
}

#[test]
fn inversions() {
    let catalog = BlockCatalog {
        blocks: vec![Block::new(0, -1, b"AACGTG", "chr1")],
        ..Default::default()
    };
    let records = vec![
        NodeRecord {
            block_mutation: vec![BlockMut::insertion(0, -1)],
            ..Default::default()
        },
        NodeRecord {
            block_mutation: vec![BlockMut::inversion(0, -1)],
            ..Default::default()
        },
        NodeRecord {
            block_mutation: vec![BlockMut::inversion(0, -1)],
            nuc_mutation: vec![sub(site(0, 0), b'G')],
            ..Default::default()
        },
    ];
    let tree = Tree::new("((back:0.1)inv:0.1)root;", records, catalog).unwrap();
    assert_eq!(sequence_of(&tree, "root", false).unwrap(), b"AACGTG");
    assert_eq!(sequence_of(&tree, "inv", false).unwrap(), revcomp(b"AACGTG"));
    assert_eq!(sequence_of(&tree, "back", false).unwrap(), b"GACGTG");
}

#[test]
fn serial_and_parallel_fasta_agree() {
    let (tree, _) = random_tree(7);
    for aligned in [false, true] {
        for all_nodes in [false, true] {
            let mut serial = Vec::new();
            write_fasta(&tree, &mut serial, aligned, all_nodes).unwrap();
            let mut parallel = Vec::new();
            write_fasta_parallel(&tree, &mut parallel, aligned, all_nodes).unwrap();
            assert_eq!(serial, parallel);
        }
    }

    let mut leaves_only = Vec::new();
    write_fasta(&tree, &mut leaves_only, false, false).unwrap();
    let headers = String::from_utf8(leaves_only)
        .unwrap()
        .lines()
        .filter(|l| l.starts_with('>'))
        .map(str::to_string)
        .collect::<Vec<_>>();
    assert_eq!(headers, vec![">l1", ">l2", ">l3", ">l4", ">l5", ">l6"]);
}

#[test]
fn random_tree_matches_direct_edits() {
    let (tree, consensus) = random_tree(11);
    let nodes = tree.preorder(tree.root());
    let seqs = sequences_parallel(&tree, &nodes, false).unwrap();
    for (idx, (name, seq)) in nodes.iter().zip(&seqs) {
        let mut expected = consensus.clone();
        for step in tree.path_from_root(*idx) {
            for m in &tree.node(step).nuc_mutation {
                for (i, (coord, _)) in m.sites().enumerate() {
                    expected[coord.nuc_position as usize] = m.nuc(i);
                }
            }
        }
        assert_eq!(seq, &expected, "sequence of {name}");
    }
}

proptest! {
    // A chain of substitution/deletion edges replays to the same sequence
    // as editing a plain vector
    #[test]
    fn chain_replay(edits in prop::collection::vec(
        prop::collection::vec((0usize..12, prop::sample::select(b"ACGT-".to_vec())), 1..4),
        1..6,
    )) {
        let consensus = b"ACGTACGTACGT";
        let catalog = BlockCatalog {
            blocks: vec![Block::new(0, -1, consensus, "chr1")],
            ..Default::default()
        };
        let mut newick = String::from("n0");
        for depth in 1..=edits.len() {
            newick = format!("({newick}:0.1)n{depth}");
        }
        newick.push(';');

        // Pre-order lists the outermost (root) first
        let mut records = vec![NodeRecord {
            block_mutation: vec![BlockMut::insertion(0, -1)],
            ..Default::default()
        }];
        let mut expected = consensus.to_vec();
        for edge in &edits {
            let mut muts = Vec::new();
            for (pos, base) in edge {
                let coord = site(0, *pos as i32);
                if *base == b'-' {
                    muts.push(NucMut::deletion(coord));
                } else {
                    muts.push(sub(coord, *base));
                }
                expected[*pos] = *base;
            }
            records.push(NodeRecord { nuc_mutation: muts, ..Default::default() });
        }
        let tree = Tree::new(&newick, records, catalog).unwrap();
        let leaf = sequence_of(&tree, "n0", true).unwrap();
        prop_assert_eq!(leaf, expected);
    }
}
