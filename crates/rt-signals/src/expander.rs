//! Structured-type expansion and partial-declaration merging.

use rt_core::BasicType;

use crate::descriptor::{SignalDescriptor, attr};
use crate::error::{SignalError, SignalResult};
use crate::registry::{StructType, TypeRegistry};

/// Placeholder for a path segment that carries no type.
const NODE: &str = "Node";

/// Expand a declaration into its scalar leaves.
///
/// Basic-typed and untyped declarations come back as a single descriptor.
/// Structured declarations produce one leaf per basic member, named after
/// the member path, with the declaration's attributes carried to each leaf.
pub fn expand(decl: &SignalDescriptor, registry: &TypeRegistry) -> SignalResult<Vec<SignalDescriptor>> {
    let Some(type_name) = decl.type_name.as_deref() else {
        return Ok(vec![decl.clone()]);
    };

    if let Some(basic) = BasicType::parse(type_name) {
        let mut leaf = decl.clone();
        leaf.type_name = Some(basic.name().to_string());
        if leaf.full_type.is_none() {
            leaf.full_type = Some(format!("{}{}", node_prefix(&decl.qualified_name), basic.name()));
        }
        if leaf.alignment.is_none() {
            leaf.alignment = Some(basic.alignment());
        }
        leaf.member_aliases.clear();
        leaf.defaults.clear();
        leaf.sync_signal = None;
        leaf.trigger_signal = None;
        return Ok(vec![leaf]);
    }

    let ty = registry.get(type_name).ok_or_else(|| SignalError::UnresolvedType {
        signal: decl.qualified_name.clone(),
        type_name: type_name.to_string(),
    })?;

    if decl.frequency.is_some() && decl.sync_signal.is_none() {
        return Err(SignalError::MissingAttribute {
            signal: decl.qualified_name.clone(),
            reason: format!("{} on a structure requires {}", attr::FREQUENCY, attr::SYNC_SIGNAL),
        });
    }
    if decl.trigger.is_some() && decl.trigger_signal.is_none() {
        return Err(SignalError::MissingAttribute {
            signal: decl.qualified_name.clone(),
            reason: format!("{} on a structure requires {}", attr::TRIGGER, attr::TRIGGER_SIGNAL),
        });
    }

    let mut expansion = Expansion {
        decl,
        registry,
        leaves: Vec::new(),
        first_alignment: Some(registry.alignment(type_name).unwrap_or(1)),
        sync_found: false,
        trigger_found: false,
    };
    let full = format!("{}{}", node_prefix(&decl.qualified_name), type_name);
    let count = decl.element_count();
    if count > 1 {
        for i in 0..count {
            let name = format!("{}[{i}]", decl.qualified_name);
            let alias = decl.alias.as_ref().map(|a| format!("{a}[{i}]"));
            expansion.visit(ty, &name, alias.as_deref(), &full, 0)?;
        }
    } else {
        expansion.visit(ty, &decl.qualified_name, decl.alias.as_deref(), &full, 0)?;
    }

    if let Some(sync) = &decl.sync_signal {
        if !expansion.sync_found {
            return Err(missing_member(decl, attr::SYNC_SIGNAL, sync));
        }
    }
    if let Some(trigger) = &decl.trigger_signal {
        if !expansion.trigger_found {
            return Err(missing_member(decl, attr::TRIGGER_SIGNAL, trigger));
        }
    }
    tracing::debug!(
        signal = %decl.qualified_name,
        leaves = expansion.leaves.len(),
        "expanded structured signal"
    );
    Ok(expansion.leaves)
}

fn missing_member(decl: &SignalDescriptor, what: &str, member: &str) -> SignalError {
    SignalError::MissingAttribute {
        signal: decl.qualified_name.clone(),
        reason: format!("{what} '{member}' is not a member"),
    }
}

fn node_prefix(qualified_name: &str) -> String {
    let depth = qualified_name.split('.').count().saturating_sub(1);
    format!("{NODE}.").repeat(depth)
}

struct Expansion<'a> {
    decl: &'a SignalDescriptor,
    registry: &'a TypeRegistry,
    leaves: Vec<SignalDescriptor>,
    /// Alignment for the very first leaf; later leaves pack contiguously.
    first_alignment: Option<u32>,
    sync_found: bool,
    trigger_found: bool,
}

impl Expansion<'_> {
    fn visit(
        &mut self,
        ty: &StructType,
        name: &str,
        alias: Option<&str>,
        full: &str,
        trailing_pad: u32,
    ) -> SignalResult<()> {
        let last = ty.members.len().saturating_sub(1);
        for (idx, member) in ty.members.iter().enumerate() {
            let member_name = format!("{name}.{}", member.name);
            let member_alias = alias.map(|a| format!("{a}.{}", member.name));
            let member_full = format!("{full}.{}", member.type_name);
            let pad = if idx == last { trailing_pad } else { 0 };
            let span = ty.member_span(idx);

            if let Some(sub) = self.registry.get(&member.type_name) {
                let n = member.number_of_elements();
                let array_pad = span.saturating_sub(sub.size.saturating_mul(n));
                if n > 1 {
                    for j in 0..n {
                        let tail = if j + 1 == n { array_pad + pad } else { 0 };
                        let alias_j = member_alias.as_ref().map(|a| format!("{a}[{j}]"));
                        self.visit(
                            sub,
                            &format!("{member_name}[{j}]"),
                            alias_j.as_deref(),
                            &member_full,
                            tail,
                        )?;
                    }
                } else {
                    self.visit(sub, &member_name, member_alias.as_deref(), &member_full, array_pad + pad)?;
                }
            } else {
                self.leaf(member, &member_name, member_alias, member_full, span + pad)?;
            }
        }
        Ok(())
    }

    fn leaf(
        &mut self,
        member: &crate::registry::Member,
        name: &str,
        alias: Option<String>,
        full: String,
        member_size: u32,
    ) -> SignalResult<()> {
        let decl = self.decl;
        let suffix = name
            .strip_prefix(decl.qualified_name.as_str())
            .unwrap_or(name)
            .trim_start_matches('.');

        let mut leaf = SignalDescriptor::new(name);
        leaf.type_name = Some(member.type_name.clone());
        leaf.full_type = Some(full);
        leaf.number_of_elements = Some(member.number_of_elements());
        leaf.number_of_dimensions = Some(member.number_of_dimensions());
        leaf.member_size = Some(member_size);
        leaf.alignment = Some(self.first_alignment.take().unwrap_or(1));
        leaf.data_source = decl.data_source.clone();
        leaf.samples = decl.samples;
        leaf.allow_no_producers = decl.allow_no_producers;
        leaf.alias = alias;

        if let Some((key, replacement)) = decl
            .member_aliases
            .iter()
            .find(|(key, _)| covers(key, suffix) || covers(key, name))
        {
            let rest = if covers(key, suffix) {
                &suffix[key.len()..]
            } else {
                &name[key.len()..]
            };
            leaf.alias = Some(format!("{replacement}{rest}"));
        }

        leaf.default = decl
            .defaults
            .get(suffix)
            .or_else(|| decl.defaults.get(name))
            .cloned();

        if decl.sync_signal.as_deref() == Some(suffix) {
            leaf.frequency = decl.frequency;
            self.sync_found = true;
        }
        if decl.trigger_signal.as_deref() == Some(suffix) {
            leaf.trigger = decl.trigger;
            self.trigger_found = true;
        }

        if let Some(ranges) = &decl.ranges {
            let elements = member.number_of_elements();
            for range in ranges {
                let index = range[0].max(range[1]);
                if index >= elements {
                    return Err(SignalError::DimensionMismatch {
                        signal: name.to_string(),
                        index,
                        elements,
                    });
                }
            }
            leaf.ranges = Some(ranges.clone());
        }

        self.leaves.push(leaf);
        Ok(())
    }
}

/// `key` names `path` itself or one of its ancestors.
fn covers(key: &str, path: &str) -> bool {
    path == key
        || (path.starts_with(key)
            && matches!(path.as_bytes().get(key.len()), Some(b'.') | Some(b'[')))
}

/// Full types are compatible when, aligned from the basic type backwards,
/// every segment matches or one side is an untyped `Node`.
pub fn full_types_compatible(a: &str, b: &str) -> bool {
    a.rsplit('.')
        .zip(b.rsplit('.'))
        .all(|(x, y)| x == y || x == NODE || y == NODE)
}

/// Merge `incoming` into `target`.
///
/// Attributes present on one side only are copied; attributes present on
/// both must agree exactly.
pub fn merge(target: &mut SignalDescriptor, incoming: &SignalDescriptor) -> SignalResult<()> {
    fn conflict<T: std::fmt::Debug>(
        target: &SignalDescriptor,
        attribute: &'static str,
        existing: &T,
        incoming: &T,
    ) -> SignalError {
        SignalError::SignalConflict {
            signal: target.qualified_name.clone(),
            attribute,
            existing: format!("{existing:?}"),
            incoming: format!("{incoming:?}"),
        }
    }

    macro_rules! merge_exact {
        ($field:ident, $attr:expr) => {
            if let (Some(a), Some(b)) = (&target.$field, &incoming.$field) {
                if a != b {
                    return Err(conflict(target, $attr, a, b));
                }
            }
            if target.$field.is_none() {
                target.$field = incoming.$field.clone();
            }
        };
    }

    merge_exact!(type_name, attr::TYPE);
    merge_exact!(number_of_dimensions, attr::NUMBER_OF_DIMENSIONS);
    merge_exact!(number_of_elements, attr::NUMBER_OF_ELEMENTS);
    merge_exact!(default, attr::DEFAULT);
    merge_exact!(member_size, attr::MEMBER_SIZE);

    if let (Some(a), Some(b)) = (&target.full_type, &incoming.full_type) {
        if !full_types_compatible(a, b) {
            return Err(conflict(target, attr::FULL_TYPE, a, b));
        }
    }
    if target.full_type.is_none() {
        target.full_type = incoming.full_type.clone();
    }

    target.alignment = match (target.alignment, incoming.alignment) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
    if incoming.allow_no_producers == Some(true) {
        target.allow_no_producers = Some(true);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StructTypeBuilder;
    use rt_tree::Value;

    fn registry() -> TypeRegistry {
        let mut reg = TypeRegistry::new();
        reg.define(
            StructTypeBuilder::new("B")
                .member("b1", "int32")
                .member("b2", "int32"),
        )
        .unwrap();
        reg.define(StructTypeBuilder::new("A").member("a1", "B").member("a2", "float32"))
            .unwrap();
        reg
    }

    fn names(leaves: &[SignalDescriptor]) -> Vec<&str> {
        leaves.iter().map(|l| l.qualified_name.as_str()).collect()
    }

    #[test]
    fn basic_signal_is_unchanged() {
        let decl = SignalDescriptor::new("Signal0").with_type("uint32");
        let leaves = expand(&decl, &registry()).unwrap();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].full_type.as_deref(), Some("uint32"));
        assert_eq!(leaves[0].alignment, Some(4));
    }

    #[test]
    fn structure_flattens_with_alias_suffix() {
        let decl = SignalDescriptor::new("Signal1")
            .with_type("A")
            .with_data_source("DDB1")
            .with_alias("Remote");
        let leaves = expand(&decl, &registry()).unwrap();
        assert_eq!(names(&leaves), vec!["Signal1.a1.b1", "Signal1.a1.b2", "Signal1.a2"]);
        for leaf in &leaves {
            assert_eq!(leaf.number_of_dimensions, Some(0));
            assert_eq!(leaf.number_of_elements, Some(1));
            assert_eq!(leaf.data_source.as_deref(), Some("DDB1"));
        }
        assert_eq!(leaves[1].alias.as_deref(), Some("Remote.a1.b2"));
        assert_eq!(leaves[2].full_type.as_deref(), Some("A.float32"));
        assert_eq!(leaves[0].full_type.as_deref(), Some("A.B.int32"));
    }

    #[test]
    fn structure_array_uses_brackets() {
        let decl = SignalDescriptor::new("S")
            .with_type("B")
            .with_alias("R")
            .with_elements(2);
        let leaves = expand(&decl, &registry()).unwrap();
        assert_eq!(names(&leaves), vec!["S[0].b1", "S[0].b2", "S[1].b1", "S[1].b2"]);
        assert_eq!(leaves[3].alias.as_deref(), Some("R[1].b2"));
    }

    #[test]
    fn unknown_type() {
        let decl = SignalDescriptor::new("S").with_type("Nope");
        let err = expand(&decl, &registry()).unwrap_err();
        assert!(matches!(err, SignalError::UnresolvedType { .. }));
    }

    #[test]
    fn defaults_and_member_aliases_reach_leaves() {
        let mut decl = SignalDescriptor::new("Signal1").with_type("A");
        decl.defaults.insert("a1.b2".into(), Value::Int(7));
        decl.member_aliases.insert("a2".into(), "SharedVar".into());
        let leaves = expand(&decl, &registry()).unwrap();
        assert_eq!(leaves[1].default, Some(Value::Int(7)));
        assert_eq!(leaves[0].default, None);
        assert_eq!(leaves[2].alias.as_deref(), Some("SharedVar"));
        assert_eq!(leaves[0].alias, None);
    }

    #[test]
    fn frequency_goes_to_sync_member() {
        let mut decl = SignalDescriptor::new("Signal1").with_type("A");
        decl.frequency = Some(10.0);
        assert!(expand(&decl, &registry()).is_err());

        decl.sync_signal = Some("a1.b1".into());
        let leaves = expand(&decl, &registry()).unwrap();
        assert_eq!(leaves[0].frequency, Some(10.0));
        assert_eq!(leaves[1].frequency, None);

        decl.sync_signal = Some("missing".into());
        assert!(expand(&decl, &registry()).is_err());
    }

    #[test]
    fn member_sizes_reproduce_structure_layout() {
        let mut reg = TypeRegistry::new();
        reg.define(
            StructTypeBuilder::new("Padded")
                .member_at("flag", "uint8", &[], 0)
                .member_at("value", "float64", &[], 8)
                .member_at("count", "uint16", &[], 16)
                .size(24),
        )
        .unwrap();
        let decl = SignalDescriptor::new("P").with_type("Padded");
        let leaves = expand(&decl, &reg).unwrap();
        let sizes: Vec<_> = leaves.iter().map(|l| l.member_size.unwrap()).collect();
        assert_eq!(sizes, vec![8, 8, 8]);
        assert_eq!(leaves[0].alignment, Some(8));
        assert_eq!(leaves[1].alignment, Some(1));
    }

    #[test]
    fn ranges_beyond_leaf_dimension_fail() {
        let mut reg = TypeRegistry::new();
        reg.define(StructTypeBuilder::new("V").array("v", "uint32", &[4]))
            .unwrap();
        let decl = SignalDescriptor::new("S")
            .with_type("V")
            .with_ranges(vec![[0, 1], [2, 4]]);
        let err = expand(&decl, &reg).unwrap_err();
        assert!(matches!(err, SignalError::DimensionMismatch { index: 4, .. }));
    }

    #[test]
    fn merge_fills_and_checks() {
        let mut target = SignalDescriptor::new("Signal0").with_type("uint32");
        let incoming = SignalDescriptor::new("Signal0").with_type("uint32").with_elements(4);
        merge(&mut target, &incoming).unwrap();
        assert_eq!(target.number_of_elements, Some(4));

        let clash = SignalDescriptor::new("Signal0").with_type("float32");
        let err = merge(&mut target, &clash).unwrap_err();
        assert!(matches!(err, SignalError::SignalConflict { attribute: "Type", .. }));
    }

    #[test]
    fn full_type_compatibility() {
        assert!(full_types_compatible("A.B.int32", "Node.Node.int32"));
        assert!(full_types_compatible("int32", "A.B.int32"));
        assert!(!full_types_compatible("A.B.int32", "C.B.int32"));
    }
}
