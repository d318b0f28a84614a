//! rt-project: application files in and out of a `ConfigTree`.
//!
//! YAML and JSON documents map onto the tree one to one: mappings become
//! nodes, scalars become leaves, sequences become vectors and sequences of
//! sequences become matrices. The `+`/`$` markers of textual
//! configurations are dropped from node names.

pub mod hash;

pub use hash::layout_fingerprint;

use std::path::Path;

use rt_tree::{ChildRef, ConfigTree, TreeError, Value};
use serde_yaml::{Mapping, Number, Value as Yaml};

pub type ProjectResult<T> = Result<T, ProjectError>;

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error("Unsupported content at '{path}': {what}")]
    Unsupported { path: String, what: String },

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn unsupported(tree: &ConfigTree, key: &str, what: impl Into<String>) -> ProjectError {
    ProjectError::Unsupported {
        path: rt_tree::path::join(&tree.path(), key),
        what: what.into(),
    }
}

fn key_name(key: &Yaml) -> Option<String> {
    match key {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Number(n) => Some(n.to_string()),
        Yaml::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar(value: &Yaml) -> Option<Value> {
    match value {
        Yaml::Bool(b) => Some(Value::Bool(*b)),
        Yaml::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_u64().map(Value::UInt))
            .or_else(|| n.as_f64().map(Value::Float)),
        Yaml::String(s) => Some(Value::Str(s.clone())),
        _ => None,
    }
}

fn leaf(tree: &ConfigTree, key: &str, value: &Yaml) -> ProjectResult<Value> {
    if let Some(v) = scalar(value) {
        return Ok(v);
    }
    let Yaml::Sequence(items) = value else {
        return Err(unsupported(tree, key, "null or tagged value"));
    };
    if !items.is_empty() && items.iter().all(|i| matches!(i, Yaml::Sequence(_))) {
        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            let Yaml::Sequence(row) = item else { continue };
            let row: Option<Vec<Value>> = row.iter().map(scalar).collect();
            rows.push(row.ok_or_else(|| unsupported(tree, key, "matrix rows must hold scalars"))?);
        }
        return Ok(Value::Matrix(rows));
    }
    let items: Option<Vec<Value>> = items.iter().map(scalar).collect();
    items
        .map(Value::Vector)
        .ok_or_else(|| unsupported(tree, key, "vectors must hold scalars or rows"))
}

/// Fill the current node of `tree` from a YAML mapping.
pub fn populate(tree: &mut ConfigTree, mapping: &Mapping) -> ProjectResult<()> {
    for (key, value) in mapping {
        let name = key_name(key).ok_or_else(|| unsupported(tree, "?", "non-scalar key"))?;
        match value {
            Yaml::Mapping(child) => {
                tree.create_relative(name.trim_start_matches(['+', '$']))?;
                populate(tree, child)?;
                tree.move_to_ancestor(1)?;
            }
            other => {
                let v = leaf(tree, &name, other)?;
                tree.write(&name, v)?;
            }
        }
    }
    Ok(())
}

pub fn from_yaml_str(content: &str) -> ProjectResult<ConfigTree> {
    let doc: Yaml = serde_yaml::from_str(content)?;
    let mut tree = ConfigTree::new();
    match &doc {
        Yaml::Mapping(mapping) => populate(&mut tree, mapping)?,
        Yaml::Null => {}
        _ => return Err(unsupported(&tree, "", "document root must be a mapping")),
    }
    tree.move_to_root();
    tracing::debug!(children = tree.number_of_children(), "loaded configuration");
    Ok(tree)
}

pub fn from_json_str(content: &str) -> ProjectResult<ConfigTree> {
    let json: serde_json::Value = serde_json::from_str(content)?;
    // serialising keeps the object order (preserve_order)
    let doc: Yaml = serde_yaml::to_value(&json)?;
    let mut tree = ConfigTree::new();
    match &doc {
        Yaml::Mapping(mapping) => populate(&mut tree, mapping)?,
        _ => return Err(unsupported(&tree, "", "document root must be an object")),
    }
    tree.move_to_root();
    Ok(tree)
}

pub fn load_yaml(path: &Path) -> ProjectResult<ConfigTree> {
    let content = std::fs::read_to_string(path)?;
    from_yaml_str(&content)
}

pub fn load_json(path: &Path) -> ProjectResult<ConfigTree> {
    let content = std::fs::read_to_string(path)?;
    from_json_str(&content)
}

/// Load by extension: `.json` is JSON, anything else YAML.
pub fn load(path: &Path) -> ProjectResult<ConfigTree> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => load_json(path),
        _ => load_yaml(path),
    }
}

fn value_to_yaml(value: &Value) -> Yaml {
    match value {
        Value::Int(v) => Yaml::Number(Number::from(*v)),
        Value::UInt(v) => Yaml::Number(Number::from(*v)),
        Value::Float(v) => Yaml::Number(Number::from(*v)),
        Value::Bool(v) => Yaml::Bool(*v),
        Value::Str(v) => Yaml::String(v.clone()),
        Value::Vector(items) => Yaml::Sequence(items.iter().map(value_to_yaml).collect()),
        Value::Matrix(rows) => Yaml::Sequence(
            rows.iter()
                .map(|row| Yaml::Sequence(row.iter().map(value_to_yaml).collect()))
                .collect(),
        ),
    }
}

fn node_to_yaml(tree: &mut ConfigTree) -> ProjectResult<Mapping> {
    let mut mapping = Mapping::new();
    for i in 0..tree.number_of_children() {
        let Some((name, child)) = tree.child(i) else {
            continue;
        };
        let name = name.to_string();
        match child {
            ChildRef::Leaf(value) => {
                mapping.insert(Yaml::String(name), value_to_yaml(value));
            }
            ChildRef::Node => {
                tree.move_to_child(i)?;
                let sub = node_to_yaml(tree)?;
                tree.move_to_ancestor(1)?;
                mapping.insert(Yaml::String(name), Yaml::Mapping(sub));
            }
        }
    }
    Ok(mapping)
}

/// The current node of `tree` as a YAML mapping.
pub fn tree_to_yaml(tree: &ConfigTree) -> ProjectResult<Yaml> {
    let mut cursor = tree.clone();
    Ok(Yaml::Mapping(node_to_yaml(&mut cursor)?))
}

pub fn to_yaml_string(tree: &ConfigTree) -> ProjectResult<String> {
    Ok(serde_yaml::to_string(&tree_to_yaml(tree)?)?)
}

pub fn save_yaml(path: &Path, tree: &ConfigTree) -> ProjectResult<()> {
    std::fs::write(path, to_yaml_string(tree)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
$App:
  Class: RealTimeApplication
  +Functions:
    Class: ReferenceContainer
    +GAMA:
      Class: IOGAM
      Gains: [1, 2.5, -3]
      Matrix: [[1, 2], [3, 4]]
      Enabled: true
"#;

    #[test]
    fn yaml_maps_onto_tree() {
        let mut tree = from_yaml_str(SAMPLE).unwrap();
        tree.move_absolute("App.Functions.GAMA").unwrap();
        assert_eq!(tree.read::<String>("Class").unwrap(), "IOGAM");
        assert_eq!(
            tree.get("Gains"),
            Some(&Value::Vector(vec![Value::Int(1), Value::Float(2.5), Value::Int(-3)]))
        );
        assert_eq!(tree.get("Matrix").map(Value::number_of_dimensions), Some(2));
        assert!(tree.read::<bool>("Enabled").unwrap());
    }

    #[test]
    fn json_keeps_order() {
        let tree = from_json_str(r#"{"Z": 1, "A": {"M": "x"}, "B": 2}"#).unwrap();
        let names: Vec<&str> = tree.children().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Z", "A", "B"]);
    }

    #[test]
    fn yaml_export_round_trips() {
        let tree = from_yaml_str(SAMPLE).unwrap();
        let text = to_yaml_string(&tree).unwrap();
        let again = from_yaml_str(&text).unwrap();
        assert_eq!(to_yaml_string(&again).unwrap(), text);
    }

    #[test]
    fn rejects_null_leaf() {
        let err = from_yaml_str("A:\n  B: ~\n").unwrap_err();
        assert!(matches!(err, ProjectError::Unsupported { .. }));
    }
}
