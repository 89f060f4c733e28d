use std::collections::HashSet;

use panmat::coordinates::{Block, BlockCatalog};
use panmat::mutation::bit_encoding::revcomp;
use panmat::mutation::{BlockMut, NucMut};
use panmat::replay::sequence_of;
use panmat::syncmer::index::SyncmerIndex;
use panmat::syncmer::place::{align_reads, place, place_and_align, query_syncmers, Read};
use panmat::syncmer::{is_syncmer, syncmers, syncmers_in, SyncmerParams};
use panmat::tree::{NodeRecord, Tree};

pub mod common;
use crate::common::*;

#[cfg(test)]
use pretty_assertions::assert_eq;

#[test]
fn closed_syncmers() {
    // Smallest 2-mer first or last
    assert!(is_syncmer(b"AACGT", 2));
    assert!(is_syncmer(b"CGTAA", 2));
    assert!(!is_syncmer(b"CAAGT", 2));

    let params = SyncmerParams { k: 5, s: 2 };
    let found = syncmers(b"AAC-GTNCGTAA", &params);
    // Gaps are skipped, k-mers with N are not
    let seqs: Vec<&[u8]> = found.iter().map(|s| s.seq.as_slice()).collect();
    assert!(seqs.contains(&b"AACGT".as_slice()));
    let first = found.iter().find(|s| s.seq == b"AACGT").unwrap();
    assert_eq!((first.pos, first.end), (0, 6));
    assert!(found.iter().all(|s| !s.seq.contains(&b'N')));

    let inside = syncmers_in(b"AAC-GTNCGTAA", 7..12, &params);
    assert_eq!(inside.len(), 1);
    assert_eq!(inside[0].seq, b"CGTAA");
    assert!(syncmers_in(b"ACGT", 0..100, &params).is_empty());
}

#[test]
fn index_matches_direct_syncmers() {
    let (tree, _) = random_tree(5);
    let params = SyncmerParams::default();
    let index = SyncmerIndex::build(&tree, params).unwrap();
    assert!(index.baseline.is_empty());
    for idx in tree.preorder(tree.root()) {
        let id = &tree.node(idx).identifier;
        let aligned = sequence_of(&tree, id, true).unwrap();
        assert_eq!(
            index.node_syncmers(&tree, id).unwrap(),
            syncmers(&aligned, &params),
            "syncmers of {id}"
        );
    }
}

#[test]
fn index_handles_gaps_and_blocks() {
    let tree = toy_tree();
    let params = SyncmerParams { k: 5, s: 2 };
    let index = SyncmerIndex::build(&tree, params).unwrap();
    for (id, _) in TOY_SEQS {
        let aligned = sequence_of(&tree, id, true).unwrap();
        assert_eq!(
            index.node_syncmers(&tree, id).unwrap(),
            syncmers(&aligned, &params),
            "syncmers of {id}"
        );
    }
    // Deleting block 1 takes its syncmers out of c
    let c_delta = index.delta("c").unwrap();
    assert!(!c_delta.deleted.is_empty());
    assert!(index.delta("nobody").is_err());
}

#[test]
fn index_save_and_load() {
    let sandbox = TestSetup::setup();
    let (tree, _) = random_tree(9);
    let index = SyncmerIndex::build(&tree, SyncmerParams::default()).unwrap();
    let path = sandbox.file_string("tree.idx");
    index.save(&path).unwrap();
    assert!(sandbox.file_exists("tree.idx"));
    assert_eq!(SyncmerIndex::load(&path).unwrap(), index);
}

#[test]
fn reads_place_on_their_leaf() {
    let (tree, _) = random_tree(21);
    let index = SyncmerIndex::build(&tree, SyncmerParams::default()).unwrap();
    let l5 = sequence_of(&tree, "l5", false).unwrap();
    let reads = vec![
        ("r1".to_string(), l5[..220].to_vec()),
        ("r2".to_string(), revcomp(&l5[180..])),
    ];

    let placement = place(&index, &tree, &reads).unwrap();
    assert_eq!(placement.best_node, "l5");
    assert_eq!(placement.scores.len(), tree.len());
    assert_eq!(placement.scores[0].0, "root");
    let l5_score = placement
        .scores
        .iter()
        .find(|(name, _)| name == "l5")
        .unwrap()
        .1;
    assert_eq!(l5_score, placement.best_score);
    assert!(placement
        .scores
        .iter()
        .all(|(_, score)| *score <= placement.best_score));

    let (_, alignments) = place_and_align(&index, &tree, &reads).unwrap();
    assert_eq!(alignments.len(), 2);
    assert_eq!(alignments[0].ref_start, 0);
    assert!(!alignments[0].reversed);
    assert_eq!(alignments[1].ref_start, 180);
    assert!(alignments[1].reversed);
    assert!(alignments.iter().all(|a| a.mismatches == 0));
}

// Jaccard similarity of the distinct syncmer sequences of a node and reads
fn set_jaccard(tree: &Tree, id: &str, reads: &[Read], params: &SyncmerParams) -> f64 {
    let aligned = sequence_of(tree, id, true).unwrap();
    let node: HashSet<Vec<u8>> = syncmers(&aligned, params).into_iter().map(|s| s.seq).collect();
    let query = query_syncmers(reads, params);
    let shared = node.iter().filter(|s| query.contains(*s)).count();
    let union = node.len() + query.len() - shared;
    if union == 0 {
        0.0
    } else {
        shared as f64 / union as f64
    }
}

#[test]
fn repeated_syncmers_count_once() {
    let params = SyncmerParams { k: 5, s: 2 };
    let mut rng = Lcg::new(17);
    let unit: Vec<u8> = (0..32).map(|_| rng.base()).collect();
    let mut consensus = unit.clone();
    consensus.extend_from_slice(b"TTTT");
    consensus.extend_from_slice(&unit);
    let catalog = BlockCatalog {
        blocks: vec![Block::new(0, -1, &consensus, "chr1")],
        ..Default::default()
    };
    // root holds the unit twice, half drops the second copy
    let records = vec![
        NodeRecord {
            block_mutation: vec![BlockMut::insertion(0, -1)],
            ..Default::default()
        },
        NodeRecord::default(),
        NodeRecord {
            nuc_mutation: (36..68)
                .step_by(6)
                .map(|pos| NucMut::deletion_run(site(0, pos), (68 - pos).min(6) as usize))
                .collect(),
            ..Default::default()
        },
    ];
    let tree = Tree::new("(both:0.1,half:0.1)root;", records, catalog).unwrap();
    assert_eq!(sequence_of(&tree, "half", false).unwrap().len(), 36);
    let index = SyncmerIndex::build(&tree, params).unwrap();

    let found = syncmers(&consensus, &params);
    let distinct: HashSet<&Vec<u8>> = found.iter().map(|s| &s.seq).collect();
    assert!(found.len() > distinct.len());

    let reads = vec![("unit".to_string(), unit.clone())];
    let placement = place(&index, &tree, &reads).unwrap();
    for (id, score) in &placement.scores {
        let expected = set_jaccard(&tree, id, &reads, &params);
        assert!((score - expected).abs() < 1e-9, "{id}: {score} vs {expected}");
    }
}

#[test]
fn scores_are_set_similarities() {
    let (tree, _) = random_tree(21);
    let params = SyncmerParams::default();
    let index = SyncmerIndex::build(&tree, params).unwrap();
    let l2 = sequence_of(&tree, "l2", false).unwrap();
    let reads = vec![("r".to_string(), l2[100..300].to_vec())];
    let placement = place(&index, &tree, &reads).unwrap();
    assert_eq!(placement.scores.len(), tree.len());
    for (id, score) in &placement.scores {
        let expected = set_jaccard(&tree, id, &reads, &params);
        assert!((score - expected).abs() < 1e-9, "{id}: {score} vs {expected}");
    }
}

#[test]
fn reads_align_on_both_strands() {
    let mut rng = Lcg::new(99);
    let reference: Vec<u8> = (0..400).map(|_| rng.base()).collect();
    let params = SyncmerParams::default();
    let mut with_snp = reference[40..140].to_vec();
    with_snp[50] = rng.other_base(with_snp[50]);
    let reads = vec![
        ("fwd".to_string(), reference[40..140].to_vec()),
        ("rev".to_string(), revcomp(&reference[40..140])),
        ("snp".to_string(), with_snp),
        ("none".to_string(), b"NNNNNNNNNNNNNNNNNNNN".to_vec()),
    ];

    let alignments = align_reads(&reference, &reads, &params);
    assert_eq!(alignments.len(), 3);
    for alignment in &alignments[..2] {
        assert_eq!(alignment.ref_start, 40);
        assert_eq!(alignment.matches, 100);
        assert_eq!(alignment.mismatches, 0);
        assert!(alignment.seeds > 0);
    }
    assert!(!alignments[0].reversed);
    assert!(alignments[1].reversed);
    assert_eq!(alignments[2].read, "snp");
    assert_eq!(alignments[2].ref_start, 40);
    assert_eq!((alignments[2].matches, alignments[2].mismatches), (99, 1));
    assert_eq!(
        alignments[0].to_string(),
        format!("fwd\t+\t40\t{}\t100\t0", alignments[0].seeds)
    );
}
