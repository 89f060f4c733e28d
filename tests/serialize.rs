use std::io::Cursor;

use panmat::error::MatError;
use panmat::impute::ImputeConfig;
use panmat::replay::sequence_of;
use panmat::tree::Tree;

pub mod common;
use crate::common::*;

#[cfg(test)]
use pretty_assertions::assert_eq;

#[test]
fn save_and_load() {
    let sandbox = TestSetup::setup();
    let mut tree = toy_tree();
    tree.annotate(Cursor::new("a,lineage A\nroot,reference\n"))
        .unwrap();
    let path = sandbox.save_tree(&tree, "toy.pmat");
    assert!(sandbox.file_exists("toy.pmat"));

    let loaded = Tree::load(&path).unwrap();
    assert_eq!(loaded.newick_string(), tree.newick_string());
    assert_eq!(loaded.to_records(), tree.to_records());
    assert_eq!(loaded.catalog(), tree.catalog());
    assert_eq!(loaded.search_by_annotation("lineage A"), vec!["a"]);
    for (id, expected) in TOY_SEQS {
        assert_eq!(sequence_of(&loaded, id, false).unwrap(), expected.as_bytes());
    }
}

#[test]
fn edited_trees_save_in_preorder() {
    let (tree, _) = random_tree(13);
    // Merging frees arena slots; the saved file must not see them
    let mut subtree = tree
        .extract_subtree(&["l1".to_string(), "l4".to_string()])
        .unwrap();
    assert!(subtree.capacity() > subtree.len());
    subtree.impute_ns(&ImputeConfig::default()).unwrap();

    let mut buffer = Vec::new();
    subtree.to_writer(&mut buffer).unwrap();
    let loaded = Tree::from_reader(Cursor::new(buffer)).unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded.capacity(), 3);
    assert_eq!(loaded.newick_string(), subtree.newick_string());
    for leaf in ["l1", "l4"] {
        assert_eq!(
            sequence_of(&loaded, leaf, true).unwrap(),
            sequence_of(&tree, leaf, true).unwrap()
        );
    }
}

#[test]
fn garbage_is_rejected() {
    assert!(matches!(
        Tree::from_reader(Cursor::new(b"not a tree file".to_vec())),
        Err(MatError::Serialization { .. })
    ));

    let sandbox = TestSetup::setup();
    assert!(matches!(
        Tree::load(&sandbox.file_string("missing.pmat")),
        Err(MatError::Io(_))
    ));
}
