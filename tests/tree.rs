use std::io::Cursor;

use panmat::error::MatError;
use panmat::mutation::{BlockEffect, BlockMut, NucMut};
use panmat::replay::sequence_of;
use panmat::tree::newick::parse;
use panmat::tree::{NodeRecord, Tree};

pub mod common;
use crate::common::*;

#[cfg(test)]
use pretty_assertions::assert_eq;

#[test]
fn newick_parsing() {
    let parsed = parse("((a:0.5,:1)x,c)root;").unwrap();
    let names: Vec<Option<&str>> = parsed.iter().map(|n| n.name.as_deref()).collect();
    assert_eq!(names, vec![Some("root"), Some("x"), Some("a"), None, Some("c")]);
    let parents: Vec<Option<usize>> = parsed.iter().map(|n| n.parent).collect();
    assert_eq!(parents, vec![None, Some(0), Some(1), Some(1), Some(0)]);
    assert_eq!(parsed[2].branch_length, Some(0.5));
    assert_eq!(parsed[3].branch_length, Some(1.0));
    assert_eq!(parsed[4].branch_length, None);

    assert!(matches!(parse("(a,b)root"), Err(MatError::MalformedInput { .. })));
    assert!(matches!(parse("((a,b)root;"), Err(MatError::MalformedInput { .. })));
    assert!(matches!(parse("(a:x,b)root;"), Err(MatError::MalformedInput { .. })));
}

#[test]
fn tree_building() {
    let tree = toy_tree();
    assert_eq!(tree.len(), 5);
    let x = tree.find("x").unwrap();
    assert_eq!(tree.node(x).level, 1);
    assert_eq!(tree.node(tree.find("a").unwrap()).level, 2);
    assert!(tree.is_ancestor(x, tree.find("b").unwrap()));
    assert!(!tree.is_ancestor(x, tree.find("c").unwrap()));
    assert_eq!(
        tree.newick_string(),
        "((a:0.1,b:0.1)x:0.2,c:0.3)root:0;"
    );
    assert_eq!(tree.to_records(), toy_records());

    // Unlabelled internal nodes get generated names
    let records = vec![NodeRecord::default(); 5];
    let unnamed = Tree::new("((a,b),c);", records, toy_catalog()).unwrap();
    assert_eq!(unnamed.newick_string(), "((a:0,b:0)node_2:0,c:0)node_1:0;");

    assert!(matches!(
        Tree::new(TOY_NEWICK, vec![NodeRecord::default(); 3], toy_catalog()),
        Err(MatError::MalformedInput { .. })
    ));
    assert!(matches!(
        Tree::new("(a,a)root;", vec![NodeRecord::default(); 3], toy_catalog()),
        Err(MatError::MalformedInput { .. })
    ));
}

#[test]
fn awkward_names_are_quoted() {
    let newick = "(('sample 1:x':0.1,'o''brien':0.1)'clade (A)':0.2,c:0.3)root;";
    let tree = Tree::new(newick, toy_records(), toy_catalog()).unwrap();
    for name in ["sample 1:x", "o'brien", "clade (A)"] {
        assert!(tree.get(name).is_some(), "{name} was parsed");
    }
    assert_eq!(
        tree.newick_string(),
        "(('sample 1:x':0.1,'o''brien':0.1)'clade (A)':0.2,c:0.3)root:0;"
    );

    let mut bytes = Vec::new();
    tree.to_writer(&mut bytes).unwrap();
    let reloaded = Tree::from_reader(bytes.as_slice()).unwrap();
    assert_eq!(reloaded.newick_string(), tree.newick_string());
    assert_eq!(
        sequence_of(&reloaded, "sample 1:x", false).unwrap(),
        sequence_of(&toy_tree(), "a", false).unwrap()
    );

    assert!(matches!(
        parse("('open:0.1,b)root;"),
        Err(MatError::MalformedInput { .. })
    ));
}

#[test]
fn merging_nodes() {
    let mut tree = toy_tree();
    let x = tree.find("x").unwrap();
    let a = tree.find("a").unwrap();
    let c = tree.find("c").unwrap();
    assert!(matches!(
        tree.merge_nodes(x, c),
        Err(MatError::Inconsistent { .. })
    ));

    // Detach b so that x has a single child
    let b = tree.find("b").unwrap();
    tree.node_mut(x).children.retain(|child| *child != b);
    tree.merge_nodes(x, a).unwrap();
    tree.fix_levels();

    assert!(tree.get("x").is_none());
    assert_eq!(tree.find("a").unwrap(), x);
    let merged = tree.node(x);
    assert!((merged.branch_length - 0.3).abs() < 1e-6);
    assert_eq!(merged.nuc_mutation.len(), 2);
    assert_eq!(merged.level, 1);
    assert_eq!(sequence_of(&tree, "a", false).unwrap(), b"AGGTTTTGCAGGCCAATT");
}

#[test]
fn block_mutations_combine_on_merge() {
    let catalog = toy_catalog();
    let records = vec![
        NodeRecord {
            block_mutation: vec![BlockMut::insertion(0, -1)],
            ..Default::default()
        },
        NodeRecord {
            block_mutation: vec![BlockMut::insertion(1, -1)],
            ..Default::default()
        },
        NodeRecord {
            block_mutation: vec![BlockMut::deletion(1, -1)],
            ..Default::default()
        },
    ];
    let mut tree = Tree::new("((leaf:0.1)mid:0.1)root;", records, catalog).unwrap();
    let mid = tree.find("mid").unwrap();
    let leaf = tree.find("leaf").unwrap();
    tree.merge_nodes(mid, leaf).unwrap();
    assert!(tree.node(mid).block_mutation.is_empty());
    assert_eq!(sequence_of(&tree, "leaf", false).unwrap(), b"ACGTTGCA");
}

#[test]
fn summary_counts() {
    let tree = toy_tree();
    let summary = tree.summary();
    assert_eq!(summary.nodes, 5);
    assert_eq!(summary.leaves, 3);
    assert_eq!(summary.max_depth, 2);
    assert!((summary.mean_depth - 5.0 / 3.0).abs() < 1e-9);
    assert_eq!(summary.parsimony, 4);
    assert_eq!(summary.snp_substitutions, 1);
    assert_eq!(summary.insertions, 1);
    assert_eq!(summary.snp_deletions, 1);
    assert_eq!(summary.block_insertions, 2);
    assert_eq!(summary.block_deletions, 1);
    assert_eq!(summary.block_inversions, 0);

    let text = summary.to_string();
    assert!(text.starts_with("nodes\t5\nleaves\t3\nmax_depth\t2\nmean_depth\t1.67\n"));
    assert!(text.ends_with("block_inversions\t0"));
}

#[test]
fn annotations() {
    let mut tree = toy_tree();
    let input = "# comment\na, lineage A, sampled\n\nc,sampled\na,sampled\n";
    let added = tree.annotate(Cursor::new(input)).unwrap();
    assert_eq!(added, 3);
    assert_eq!(tree.search_by_annotation("sampled"), vec!["a", "c"]);
    assert_eq!(tree.search_by_annotation("lineage A"), vec!["a"]);
    assert!(tree.search_by_annotation("absent").is_empty());

    assert!(matches!(
        tree.annotate(Cursor::new("nobody,label\n")),
        Err(MatError::MissingNode(id)) if id == "nobody"
    ));
    assert!(matches!(
        tree.annotate(Cursor::new("a,\n")),
        Err(MatError::MalformedInput { .. })
    ));
}

// Blocks switched on and off and inverted, indels in gap slots, and edits
// inside an absent block
fn tangled_tree() -> Tree {
    let records = vec![
        NodeRecord {
            block_mutation: vec![BlockMut::insertion(0, -1)],
            nuc_mutation: vec![sub(site(0, 0), b'T')],
            ..Default::default()
        },
        NodeRecord {
            block_mutation: vec![BlockMut::from_effect(
                1,
                -1,
                BlockEffect::Insert { inverted: true },
            )],
            nuc_mutation: vec![
                sub(site(1, 2), b'A'),
                insertion_run(gap_site(0, 4, 0), b"C"),
            ],
            ..Default::default()
        },
        NodeRecord {
            nuc_mutation: vec![
                NucMut::deletion_run(site(0, 1), 3),
                sub(gap_site(0, 4, 0), b'G'),
            ],
            ..Default::default()
        },
        NodeRecord {
            block_mutation: vec![BlockMut::inversion(1, -1), BlockMut::deletion(0, -1)],
            nuc_mutation: vec![insertion_run(gap_site(0, 4, 1), b"A")],
            ..Default::default()
        },
        NodeRecord {
            block_mutation: vec![BlockMut::deletion(1, -1)],
            nuc_mutation: vec![sub(site(0, 5), b'C')],
            ..Default::default()
        },
        NodeRecord::default(),
    ];
    Tree::new(
        "(((d:0.1)v:0.2,w:0.3)u:0.4,o:0.5)root;",
        records,
        toy_catalog(),
    )
    .unwrap()
}

fn all_sequences(tree: &Tree) -> Vec<(String, Vec<u8>)> {
    let mut names: Vec<String> = tree
        .preorder(tree.root())
        .into_iter()
        .map(|idx| tree.node(idx).identifier.clone())
        .collect();
    names.sort();
    names
        .into_iter()
        .map(|name| {
            let seq = sequence_of(tree, &name, true).unwrap();
            (name, seq)
        })
        .collect()
}

#[test]
fn reroot_on_leaf() {
    let mut tree = toy_tree();
    tree.reroot("a").unwrap();
    assert_eq!(tree.node(tree.root()).identifier, "a");
    assert_eq!(tree.newick_string(), "((b:0.1,(c:0.3)root:0.2)x:0.1)a:0;");
    assert_eq!(tree.node(tree.find("c").unwrap()).level, 3);
    for (id, expected) in TOY_SEQS {
        let seq = sequence_of(&tree, id, false).unwrap();
        assert_eq!(String::from_utf8(seq).unwrap(), expected, "sequence of {id}");
    }

    let listing: Vec<String> = tree.substitutions().unwrap().iter().map(|n| n.to_string()).collect();
    assert_eq!(listing, vec!["a\tC2G", "x\t", "b\t", "root\tG2C", "c\t"]);

    assert!(matches!(
        tree.reroot("nobody"),
        Err(MatError::MissingNode(id)) if id == "nobody"
    ));
    let before = tree.newick_string();
    tree.reroot("a").unwrap();
    assert_eq!(tree.newick_string(), before);
}

#[test]
fn reroot_keeps_every_sequence() {
    let original = tangled_tree();
    let expected = all_sequences(&original);
    for (target, _) in &expected {
        let mut tree = original.clone();
        tree.reroot(target).unwrap();
        let root = tree.root();
        assert_eq!(&tree.node(root).identifier, target);
        assert_eq!(tree.node(root).level, 0);
        assert_eq!(all_sequences(&tree), expected, "rerooted on {target}");

        let mut bytes = Vec::new();
        tree.to_writer(&mut bytes).unwrap();
        let reloaded = Tree::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(all_sequences(&reloaded), expected, "reloaded after rooting on {target}");
    }

    for seed in 0..4 {
        let (original, _) = random_tree(seed);
        let expected = all_sequences(&original);
        let mut tree = original.clone();
        for target in ["l5", "i1", "l2", "root"] {
            tree.reroot(target).unwrap();
            assert_eq!(all_sequences(&tree), expected, "seed {seed}, rooted on {target}");
        }
    }
}

#[test]
fn substitutions_per_edge() {
    let tree = toy_tree();
    let listing = tree.substitutions().unwrap();
    assert_eq!(listing.len(), 5);
    let x = &listing[1];
    assert_eq!(x.identifier, "x");
    assert_eq!(x.substitutions.len(), 1);
    assert_eq!(x.substitutions[0].column, 1);
    assert_eq!((x.substitutions[0].reference, x.substitutions[0].alternative), (b'C', b'G'));
    assert!(listing
        .iter()
        .filter(|n| n.identifier != "x")
        .all(|n| n.substitutions.is_empty()));

    // Substitutions that rewrite an inserted base are not listed
    let tangled = tangled_tree();
    let listing = tangled.substitutions().unwrap();
    let by_name = |name: &str| {
        listing
            .iter()
            .find(|n| n.identifier == name)
            .unwrap()
            .to_string()
    };
    assert_eq!(by_name("root"), "root\tA1T");
    assert_eq!(by_name("u"), "u\tC13A");
    assert_eq!(by_name("v"), "v\tC5G");
    assert_eq!(by_name("w"), "w\tG8C");
}
