//! Integration tests for rt-tree.

use rt_tree::{ChildRef, ConfigTree, TreeError, Value};

fn application() -> ConfigTree {
    let mut tree = ConfigTree::new();
    tree.create_absolute("App.Functions.GAMA.OutputSignals.Signal0")
        .unwrap();
    tree.write("DataSource", "DDB1").unwrap();
    tree.write("Type", "uint32").unwrap();
    tree.create_absolute("App.Functions.GAMB.InputSignals.Signal0")
        .unwrap();
    tree.write("DataSource", "DDB1").unwrap();
    tree.write("Type", "uint32").unwrap();
    tree.write("Ranges", vec![vec![0_u32, 0]]).unwrap();
    tree.move_to_root();
    tree
}

#[test]
fn navigate_functions() {
    let mut tree = application();
    tree.move_absolute("App.Functions").unwrap();
    assert_eq!(tree.number_of_children(), 2);
    tree.move_to_child(1).unwrap();
    assert_eq!(tree.name(), "GAMB");
    tree.move_relative("InputSignals.Signal0").unwrap();
    let ranges: Vec<Vec<u32>> = tree.read("Ranges").unwrap();
    assert_eq!(ranges, vec![vec![0, 0]]);
    tree.move_to_ancestor(3).unwrap();
    assert_eq!(tree.path(), "App.Functions");
}

#[test]
fn child_kinds() {
    let mut tree = application();
    tree.move_absolute("App.Functions.GAMA.OutputSignals.Signal0")
        .unwrap();
    let kinds: Vec<_> = tree
        .children()
        .map(|(name, c)| (name.to_string(), matches!(c, ChildRef::Leaf(_))))
        .collect();
    assert_eq!(
        kinds,
        vec![("DataSource".to_string(), true), ("Type".to_string(), true)]
    );
    assert_eq!(tree.get("Type"), Some(&Value::from("uint32")));
}

#[test]
fn move_to_child_on_leaf_fails() {
    let mut tree = application();
    tree.move_absolute("App.Functions.GAMA.OutputSignals.Signal0")
        .unwrap();
    assert!(matches!(
        tree.move_to_child(0),
        Err(TreeError::NotANode { .. })
    ));
    assert!(matches!(
        tree.move_to_child(9),
        Err(TreeError::ChildIndex { .. })
    ));
}

#[test]
fn copy_subtree_between_trees() {
    let mut tree = application();
    tree.move_absolute("App.Functions.GAMA").unwrap();
    let mut out = ConfigTree::new();
    tree.copy(&mut out).unwrap();
    out.move_absolute("OutputSignals.Signal0").unwrap();
    assert_eq!(out.read::<String>("DataSource").unwrap(), "DDB1");
}

#[test]
fn purge_clears_node() {
    let mut tree = application();
    tree.move_absolute("App.Functions").unwrap();
    tree.purge();
    assert_eq!(tree.number_of_children(), 0);
    assert!(tree.move_absolute("App.Functions.GAMA").is_err());
}
