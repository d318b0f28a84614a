//! Flattened leaves written individually read back as the structure.

use rt_signals::{
    FieldValue, SignalDescriptor, StructTypeBuilder, TypeRegistry, expand, read_struct,
};
use rt_tree::{ConfigTree, Value};

fn registry() -> TypeRegistry {
    let mut reg = TypeRegistry::new();
    reg.define(
        StructTypeBuilder::new("B")
            .member("b1", "int32")
            .member("b2", "int32"),
    )
    .unwrap();
    reg.define(
        StructTypeBuilder::new("A")
            .member("a1", "B")
            .member("a2", "float32")
            .array("a3", "B", &[2]),
    )
    .unwrap();
    reg
}

fn write_leaf(tree: &mut ConfigTree, qualified_name: &str, value: Value) {
    let (parent, leaf) = qualified_name.rsplit_once('.').unwrap();
    tree.move_to_root();
    if tree.move_absolute(parent).is_err() {
        tree.create_absolute(parent).unwrap();
    }
    tree.write(leaf, value).unwrap();
}

#[test]
fn leaves_read_back_as_parent_structure() {
    let reg = registry();
    let decl = SignalDescriptor::new("Signal1").with_type("A");
    let leaves = expand(&decl, &reg).unwrap();
    let names: Vec<_> = leaves.iter().map(|l| l.qualified_name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Signal1.a1.b1",
            "Signal1.a1.b2",
            "Signal1.a2",
            "Signal1.a3[0].b1",
            "Signal1.a3[0].b2",
            "Signal1.a3[1].b1",
            "Signal1.a3[1].b2",
        ]
    );

    let mut tree = ConfigTree::new();
    for (i, leaf) in leaves.iter().enumerate() {
        let value = if leaf.type_name.as_deref() == Some("float32") {
            Value::Float(0.25)
        } else {
            Value::Int(i as i64 * 10)
        };
        write_leaf(&mut tree, &leaf.qualified_name, value);
    }

    let back = read_struct(&mut tree, "Signal1", "A", &reg).unwrap();
    let FieldValue::Struct(a1) = &back["a1"] else {
        panic!("a1 is a structure");
    };
    assert_eq!(a1["b1"], FieldValue::Leaf(Value::Int(0)));
    assert_eq!(a1["b2"], FieldValue::Leaf(Value::Int(10)));
    assert_eq!(back["a2"], FieldValue::Leaf(Value::Float(0.25)));
    let FieldValue::Array(a3) = &back["a3"] else {
        panic!("a3 is an array of structures");
    };
    assert_eq!(a3.len(), 2);
    assert_eq!(a3[1]["b2"], FieldValue::Leaf(Value::Int(60)));
}

#[test]
fn member_sizes_sum_to_structure_size() {
    let reg = registry();
    let decl = SignalDescriptor::new("Signal1").with_type("A");
    let leaves = expand(&decl, &reg).unwrap();
    let total: u32 = leaves.iter().map(|l| l.member_size.unwrap()).sum();
    assert_eq!(total, reg.get("A").unwrap().size);
}
