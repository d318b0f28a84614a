//! The signal descriptor and its tree representation.

use indexmap::IndexMap;
use rt_core::BasicType;
use rt_tree::{ChildRef, ConfigTree, Value};

use crate::error::{SignalError, SignalResult};

/// Canonical attribute names used in the configuration tree.
pub mod attr {
    pub const QUALIFIED_NAME: &str = "QualifiedName";
    pub const TYPE: &str = "Type";
    pub const FULL_TYPE: &str = "FullType";
    pub const NUMBER_OF_DIMENSIONS: &str = "NumberOfDimensions";
    pub const NUMBER_OF_ELEMENTS: &str = "NumberOfElements";
    pub const BYTE_SIZE: &str = "ByteSize";
    pub const DATA_SOURCE: &str = "DataSource";
    pub const ALIAS: &str = "Alias";
    pub const DEFAULT: &str = "Default";
    pub const SAMPLES: &str = "Samples";
    pub const FREQUENCY: &str = "Frequency";
    pub const TRIGGER: &str = "Trigger";
    pub const RANGES: &str = "Ranges";
    pub const MEMBER_SIZE: &str = "MemberSize";
    pub const ALIGNMENT: &str = "Alignment";
    pub const ALLOW_NO_PRODUCERS: &str = "AllowNoProducers";
    pub const SYNC_SIGNAL: &str = "SyncSignal";
    pub const TRIGGER_SIGNAL: &str = "TriggerSignal";
    pub const MEMBER_ALIASES: &str = "MemberAliases";
    pub const DEFAULTS: &str = "Defaults";
    pub const LOCKED: &str = "Locked";
}

/// Direction of a function signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::Input, Direction::Output];

    /// Name of the subtree holding signals of this direction.
    pub fn node_name(self) -> &'static str {
        match self {
            Direction::Input => "InputSignals",
            Direction::Output => "OutputSignals",
        }
    }
}

/// One signal occurrence: a function input/output or a data-source signal.
///
/// Every attribute is optional until the resolver has established it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignalDescriptor {
    pub qualified_name: String,
    pub type_name: Option<String>,
    pub full_type: Option<String>,
    pub number_of_dimensions: Option<u8>,
    pub number_of_elements: Option<u32>,
    pub byte_size: Option<u32>,
    pub data_source: Option<String>,
    pub alias: Option<String>,
    pub default: Option<Value>,
    pub samples: Option<u32>,
    pub frequency: Option<f32>,
    pub trigger: Option<u32>,
    pub ranges: Option<Vec<[u32; 2]>>,
    pub member_size: Option<u32>,
    pub alignment: Option<u32>,
    pub allow_no_producers: Option<bool>,
    pub sync_signal: Option<String>,
    pub trigger_signal: Option<String>,
    pub member_aliases: IndexMap<String, String>,
    pub defaults: IndexMap<String, Value>,
}

impl SignalDescriptor {
    pub fn new(qualified_name: impl Into<String>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn with_data_source(mut self, data_source: impl Into<String>) -> Self {
        self.data_source = Some(data_source.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_elements(mut self, elements: u32) -> Self {
        self.number_of_elements = Some(elements);
        self
    }

    pub fn with_ranges(mut self, ranges: Vec<[u32; 2]>) -> Self {
        self.ranges = Some(ranges);
        self
    }

    /// Name the signal has inside its data source.
    pub fn remote_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.qualified_name)
    }

    pub fn element_count(&self) -> u32 {
        self.number_of_elements.unwrap_or(1)
    }

    pub fn basic_type(&self) -> Option<BasicType> {
        self.type_name.as_deref().and_then(BasicType::parse)
    }

    pub fn samples_or_one(&self) -> u32 {
        self.samples.unwrap_or(1)
    }

    /// A frequency of zero or more marks the signal as synchronising.
    pub fn is_synchronising(&self) -> bool {
        self.frequency.is_some_and(|f| f >= 0.0)
    }

    pub fn is_triggering(&self) -> bool {
        self.trigger == Some(1)
    }

    /// Read a declaration from the current node of `tree`.
    pub fn from_tree(tree: &ConfigTree, qualified_name: &str) -> SignalResult<Self> {
        let mut d = SignalDescriptor::new(qualified_name);
        d.type_name = tree.read_opt(attr::TYPE)?;
        d.full_type = tree.read_opt(attr::FULL_TYPE)?;
        d.number_of_dimensions = tree.read_opt(attr::NUMBER_OF_DIMENSIONS)?;
        match tree.get(attr::NUMBER_OF_ELEMENTS) {
            Some(Value::Vector(_)) => {
                let dims: Vec<u32> = tree.read(attr::NUMBER_OF_ELEMENTS)?;
                let elements = dims.iter().try_fold(1_u32, |acc, n| acc.checked_mul(*n));
                d.number_of_elements = Some(elements.ok_or_else(|| SignalError::MalformedAttribute {
                    signal: qualified_name.to_string(),
                    attribute: attr::NUMBER_OF_ELEMENTS,
                    reason: format!("{dims:?} elements do not fit in 32 bits"),
                })?);
                if d.number_of_dimensions.is_none() {
                    d.number_of_dimensions = Some(dims.len() as u8);
                }
            }
            Some(_) => d.number_of_elements = tree.read_opt(attr::NUMBER_OF_ELEMENTS)?,
            None => {}
        }
        d.byte_size = tree.read_opt(attr::BYTE_SIZE)?;
        d.data_source = tree.read_opt(attr::DATA_SOURCE)?;
        d.alias = tree.read_opt(attr::ALIAS)?;
        d.default = tree.get(attr::DEFAULT).cloned();
        d.samples = tree.read_opt(attr::SAMPLES)?;
        d.frequency = tree.read_opt(attr::FREQUENCY)?;
        d.trigger = tree.read_opt(attr::TRIGGER)?;
        d.member_size = tree.read_opt(attr::MEMBER_SIZE)?;
        d.alignment = tree.read_opt(attr::ALIGNMENT)?;
        d.allow_no_producers = tree.read_opt(attr::ALLOW_NO_PRODUCERS)?;
        d.sync_signal = tree.read_opt(attr::SYNC_SIGNAL)?;
        d.trigger_signal = tree.read_opt(attr::TRIGGER_SIGNAL)?;

        if tree.contains(attr::RANGES) {
            let rows: Vec<Vec<u32>> = tree.read(attr::RANGES)?;
            let mut ranges = Vec::with_capacity(rows.len());
            for row in rows {
                match row.as_slice() {
                    [min, max] => ranges.push([*min, *max]),
                    _ => {
                        return Err(SignalError::MalformedAttribute {
                            signal: qualified_name.to_string(),
                            attribute: attr::RANGES,
                            reason: format!("expected [min, max] pairs, found {row:?}"),
                        });
                    }
                }
            }
            d.ranges = Some(ranges);
        }

        if tree.is_node(attr::MEMBER_ALIASES) {
            let mut sub = tree.clone();
            sub.move_relative(attr::MEMBER_ALIASES)?;
            for (key, value) in flatten_leaves(&mut sub, "")? {
                let alias = value.as_str().map(str::to_string).ok_or_else(|| {
                    SignalError::MalformedAttribute {
                        signal: qualified_name.to_string(),
                        attribute: attr::MEMBER_ALIASES,
                        reason: format!("alias of '{key}' must be a string"),
                    }
                })?;
                d.member_aliases.insert(key, alias);
            }
        }
        if tree.is_node(attr::DEFAULTS) {
            let mut sub = tree.clone();
            sub.move_relative(attr::DEFAULTS)?;
            d.defaults = flatten_leaves(&mut sub, "")?.into_iter().collect();
        }
        Ok(d)
    }

    /// Write every established attribute into the current node of `tree`.
    pub fn write_to(&self, tree: &mut ConfigTree) -> SignalResult<()> {
        tree.write(attr::QUALIFIED_NAME, self.qualified_name.as_str())?;
        if let Some(v) = &self.type_name {
            tree.write(attr::TYPE, v.as_str())?;
        }
        if let Some(v) = &self.full_type {
            tree.write(attr::FULL_TYPE, v.as_str())?;
        }
        if let Some(v) = self.number_of_dimensions {
            tree.write(attr::NUMBER_OF_DIMENSIONS, v)?;
        }
        if let Some(v) = self.number_of_elements {
            tree.write(attr::NUMBER_OF_ELEMENTS, v)?;
        }
        if let Some(v) = self.byte_size {
            tree.write(attr::BYTE_SIZE, v)?;
        }
        if let Some(v) = &self.data_source {
            tree.write(attr::DATA_SOURCE, v.as_str())?;
        }
        if let Some(v) = &self.alias {
            tree.write(attr::ALIAS, v.as_str())?;
        }
        if let Some(v) = &self.default {
            tree.write(attr::DEFAULT, v.clone())?;
        }
        if let Some(v) = self.samples {
            tree.write(attr::SAMPLES, v)?;
        }
        if let Some(v) = self.frequency {
            tree.write(attr::FREQUENCY, v)?;
        }
        if let Some(v) = self.trigger {
            tree.write(attr::TRIGGER, v)?;
        }
        if let Some(ranges) = &self.ranges {
            let rows: Vec<Vec<u32>> = ranges.iter().map(|r| r.to_vec()).collect();
            tree.write(attr::RANGES, rows)?;
        }
        if let Some(v) = self.member_size {
            tree.write(attr::MEMBER_SIZE, v)?;
        }
        if let Some(v) = self.alignment {
            tree.write(attr::ALIGNMENT, v)?;
        }
        if let Some(v) = self.allow_no_producers {
            tree.write(attr::ALLOW_NO_PRODUCERS, v)?;
        }
        Ok(())
    }
}

/// Collect the leaves below the cursor as `dotted.key -> value`.
fn flatten_leaves(tree: &mut ConfigTree, prefix: &str) -> SignalResult<Vec<(String, Value)>> {
    let mut out = Vec::new();
    for i in 0..tree.number_of_children() {
        let Some((name, child)) = tree.child(i) else {
            continue;
        };
        let key = rt_tree::path::join(prefix, name);
        match child {
            ChildRef::Leaf(v) => out.push((key, v.clone())),
            ChildRef::Node => {
                tree.move_to_child(i)?;
                out.extend(flatten_leaves(tree, &key)?);
                tree.move_to_ancestor(1)?;
            }
        }
    }
    Ok(out)
}

/// Read the signal declarations below the cursor (e.g. an `InputSignals`
/// node), in declaration order.
///
/// A child node with no leaves of its own and only child nodes is a
/// namespace: its children become signals named `namespace.child`.
pub fn read_signal_list(tree: &mut ConfigTree) -> SignalResult<Vec<SignalDescriptor>> {
    let mut out = Vec::new();
    read_signal_list_into(tree, "", &mut out)?;
    Ok(out)
}

fn read_signal_list_into(
    tree: &mut ConfigTree,
    prefix: &str,
    out: &mut Vec<SignalDescriptor>,
) -> SignalResult<()> {
    for name in tree.child_nodes() {
        if name == attr::MEMBER_ALIASES || name == attr::DEFAULTS {
            continue;
        }
        let qualified = rt_tree::path::join(prefix, &name);
        tree.move_relative(&name)?;
        let has_leaves = tree
            .children()
            .any(|(_, c)| matches!(c, ChildRef::Leaf(_)));
        let has_nodes = tree.number_of_children() > 0 && !has_leaves;
        if has_nodes {
            read_signal_list_into(tree, &qualified, out)?;
        } else {
            if out.iter().any(|d| d.qualified_name == qualified) {
                return Err(SignalError::DuplicateSignal { signal: qualified });
            }
            out.push(SignalDescriptor::from_tree(tree, &qualified)?);
        }
        tree.move_to_ancestor(1)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_attributes() {
        let mut tree = ConfigTree::new();
        tree.create_absolute("Signal0").unwrap();
        tree.write("Type", "uint32").unwrap();
        tree.write("DataSource", "DDB1").unwrap();
        tree.write("NumberOfElements", 32_u32).unwrap();
        tree.write("Ranges", vec![vec![0_u32, 10], vec![15, 20]])
            .unwrap();
        tree.write("Frequency", 10.0_f64).unwrap();

        let d = SignalDescriptor::from_tree(&tree, "Signal0").unwrap();
        assert_eq!(d.type_name.as_deref(), Some("uint32"));
        assert_eq!(d.element_count(), 32);
        assert_eq!(d.ranges, Some(vec![[0, 10], [15, 20]]));
        assert!(d.is_synchronising());
        assert_eq!(d.remote_name(), "Signal0");
    }

    #[test]
    fn malformed_ranges_are_rejected() {
        let mut tree = ConfigTree::new();
        tree.write("Ranges", vec![vec![0_u32, 1, 2]]).unwrap();
        let err = SignalDescriptor::from_tree(&tree, "S").unwrap_err();
        assert!(matches!(err, SignalError::MalformedAttribute { .. }));
    }

    #[test]
    fn vector_element_count_sets_dimensions() {
        let mut tree = ConfigTree::new();
        tree.write("NumberOfElements", vec![2_u32, 3]).unwrap();
        let d = SignalDescriptor::from_tree(&tree, "M").unwrap();
        assert_eq!(d.number_of_elements, Some(6));
        assert_eq!(d.number_of_dimensions, Some(2));
    }

    #[test]
    fn oversized_dimensions_are_rejected() {
        let mut tree = ConfigTree::new();
        tree.write("NumberOfElements", vec![65536_u32, 65536]).unwrap();
        let err = SignalDescriptor::from_tree(&tree, "M").unwrap_err();
        assert!(matches!(
            err,
            SignalError::MalformedAttribute { attribute: "NumberOfElements", .. }
        ));
    }

    #[test]
    fn namespaces_flatten_into_dotted_names() {
        let mut tree = ConfigTree::new();
        tree.create_absolute("Signals.Group.Inner.A").unwrap();
        tree.write("Type", "int32").unwrap();
        tree.create_absolute("Signals.B").unwrap();
        tree.write("Type", "float32").unwrap();
        tree.move_absolute("Signals").unwrap();

        let list = read_signal_list(&mut tree).unwrap();
        let names: Vec<_> = list.iter().map(|d| d.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["Group.Inner.A", "B"]);
        assert_eq!(tree.path(), "Signals");
    }

    #[test]
    fn nested_defaults_become_dotted_keys() {
        let mut tree = ConfigTree::new();
        tree.create_absolute("Signal1").unwrap();
        tree.write("Type", "A").unwrap();
        tree.create_relative("Defaults.a1").unwrap();
        tree.write("b1", 3_i32).unwrap();
        tree.move_absolute("Signal1").unwrap();
        tree.create_relative("MemberAliases").unwrap();
        tree.write("a2", "SharedVar").unwrap();
        tree.move_absolute("Signal1").unwrap();

        let d = SignalDescriptor::from_tree(&tree, "Signal1").unwrap();
        assert_eq!(d.defaults.get("a1.b1"), Some(&Value::Int(3)));
        assert_eq!(d.member_aliases.get("a2").map(String::as_str), Some("SharedVar"));
    }

    #[test]
    fn write_then_read_preserves_attributes() {
        let d = SignalDescriptor::new("Signal0")
            .with_type("uint32")
            .with_data_source("DDB1")
            .with_elements(4)
            .with_ranges(vec![[0, 1]]);
        let mut tree = ConfigTree::new();
        d.write_to(&mut tree).unwrap();
        let back = SignalDescriptor::from_tree(&tree, "Signal0").unwrap();
        assert_eq!(back, d);
    }
}
