//! Structured-type introspection registry.
//!
//! A process-wide, read-only catalog from type name to an ordered member
//! list. Types defined in configuration are packed without padding; types
//! mirroring a native layout can place members at explicit offsets.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use rt_core::BasicType;
use rt_tree::{ConfigTree, Value};

use crate::error::{SignalError, SignalResult};

/// One member of a structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub type_name: String,
    /// Elements per dimension; empty for scalars.
    pub dimensions: Vec<u32>,
    pub byte_offset: u32,
}

impl Member {
    /// Element count; saturates for dimensions no registered type can hold.
    pub fn number_of_elements(&self) -> u32 {
        self.checked_number_of_elements().unwrap_or(u32::MAX)
    }

    pub fn checked_number_of_elements(&self) -> Option<u32> {
        self.dimensions
            .iter()
            .try_fold(1_u32, |acc, d| acc.checked_mul(*d))
            .map(|n| n.max(1))
    }

    pub fn number_of_dimensions(&self) -> u8 {
        self.dimensions.len() as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructType {
    pub name: String,
    pub members: Vec<Member>,
    pub size: u32,
}

impl StructType {
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Bytes from the start of member `index` to the next member (or the end
    /// of the structure), padding included.
    pub fn member_span(&self, index: usize) -> u32 {
        let offset = self.members[index].byte_offset;
        let end = self
            .members
            .get(index + 1)
            .map_or(self.size, |next| next.byte_offset);
        end.saturating_sub(offset)
    }
}

/// Incremental definition of a structure.
#[derive(Debug, Clone)]
pub struct StructTypeBuilder {
    name: String,
    members: Vec<(String, String, Vec<u32>, Option<u32>)>,
    size: Option<u32>,
}

impl StructTypeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            size: None,
        }
    }

    pub fn member(self, name: &str, type_name: &str) -> Self {
        self.array(name, type_name, &[])
    }

    pub fn array(mut self, name: &str, type_name: &str, dimensions: &[u32]) -> Self {
        self.members
            .push((name.into(), type_name.into(), dimensions.to_vec(), None));
        self
    }

    /// Place a member at an explicit byte offset.
    pub fn member_at(mut self, name: &str, type_name: &str, dimensions: &[u32], offset: u32) -> Self {
        self.members
            .push((name.into(), type_name.into(), dimensions.to_vec(), Some(offset)));
        self
    }

    /// Total size, for layouts with trailing padding.
    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Resolve member offsets against the types already in `registry`.
    pub fn build(self, registry: &TypeRegistry) -> SignalResult<StructType> {
        let invalid = |reason: String| SignalError::InvalidStructure {
            type_name: self.name.clone(),
            reason,
        };
        if self.members.is_empty() {
            return Err(invalid("no members".into()));
        }
        let mut members = Vec::with_capacity(self.members.len());
        let mut cursor = 0_u32;
        for (name, type_name, dimensions, offset) in &self.members {
            let element_size =
                registry
                    .type_size(type_name)
                    .ok_or_else(|| SignalError::UnresolvedType {
                        signal: format!("{}.{}", self.name, name),
                        type_name: type_name.clone(),
                    })?;
            if members.iter().any(|m: &Member| &m.name == name) {
                return Err(invalid(format!("member '{name}' declared twice")));
            }
            let byte_offset = offset.unwrap_or(cursor);
            if byte_offset < cursor {
                return Err(invalid(format!("member '{name}' overlaps its predecessor")));
            }
            let member = Member {
                name: name.clone(),
                type_name: type_name.clone(),
                dimensions: dimensions.clone(),
                byte_offset,
            };
            cursor = member
                .checked_number_of_elements()
                .and_then(|n| n.checked_mul(element_size))
                .and_then(|bytes| bytes.checked_add(byte_offset))
                .ok_or_else(|| invalid(format!("member '{name}' does not fit in 32 bits")))?;
            members.push(member);
        }
        let size = self.size.unwrap_or(cursor);
        if size < cursor {
            return Err(invalid(format!("size {size} smaller than members ({cursor})")));
        }
        Ok(StructType {
            name: self.name,
            members,
            size,
        })
    }
}

/// Catalog of registered structures, in registration order.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: IndexMap<String, StructType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ty: StructType) -> SignalResult<()> {
        if BasicType::parse(&ty.name).is_some() {
            return Err(SignalError::InvalidStructure {
                type_name: ty.name,
                reason: "shadows a basic type".into(),
            });
        }
        self.types.insert(ty.name.clone(), ty);
        Ok(())
    }

    /// Build and register in one step.
    pub fn define(&mut self, builder: StructTypeBuilder) -> SignalResult<()> {
        let ty = builder.build(self)?;
        self.register(ty)
    }

    pub fn get(&self, name: &str) -> Option<&StructType> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        BasicType::parse(name).is_some() || self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StructType> {
        self.types.values()
    }

    /// Size in bytes of one element of `name`.
    pub fn type_size(&self, name: &str) -> Option<u32> {
        BasicType::parse(name)
            .map(BasicType::byte_size)
            .or_else(|| self.types.get(name).map(|t| t.size))
    }

    /// Largest basic alignment reachable from `name`.
    pub fn alignment(&self, name: &str) -> Option<u32> {
        if let Some(basic) = BasicType::parse(name) {
            return Some(basic.alignment());
        }
        let ty = self.types.get(name)?;
        ty.members
            .iter()
            .map(|m| self.alignment(&m.type_name))
            .try_fold(1_u32, |acc, a| a.map(|a| acc.max(a)))
    }

    /// Register every structure found below the cursor (e.g. a `Types`
    /// node). Each child node is a structure whose children are members
    /// with a `Type` and an optional `NumberOfElements`.
    ///
    /// Definitions may reference each other in any order.
    pub fn load_from_tree(&mut self, tree: &mut ConfigTree) -> SignalResult<usize> {
        let mut pending: Vec<StructTypeBuilder> = Vec::new();
        for name in tree.child_nodes() {
            tree.move_relative(&name)?;
            let mut builder = StructTypeBuilder::new(name.trim_start_matches(['+', '$']));
            for member in tree.child_nodes() {
                tree.move_relative(&member)?;
                let type_name: String = tree.read("Type").map_err(|_| SignalError::InvalidStructure {
                    type_name: name.clone(),
                    reason: format!("member '{member}' has no Type"),
                })?;
                let dimensions: Vec<u32> = match tree.get("NumberOfElements") {
                    None => Vec::new(),
                    Some(Value::Vector(_)) => tree.read("NumberOfElements")?,
                    Some(_) => match tree.read::<u32>("NumberOfElements")? {
                        0 | 1 => Vec::new(),
                        n => vec![n],
                    },
                };
                builder = builder.array(&member, &type_name, &dimensions);
                tree.move_to_ancestor(1)?;
            }
            pending.push(builder);
            tree.move_to_ancestor(1)?;
        }

        let total = pending.len();
        while !pending.is_empty() {
            let before = pending.len();
            let mut last_err = None;
            let mut retry = Vec::new();
            for builder in pending {
                match builder.clone().build(self) {
                    Ok(ty) => {
                        tracing::debug!(name = %ty.name, size = ty.size, "registered structure");
                        self.register(ty)?;
                    }
                    Err(err @ SignalError::UnresolvedType { .. }) => {
                        last_err = Some(err);
                        retry.push(builder);
                    }
                    Err(err) => return Err(err),
                }
            }
            if retry.len() == before {
                if let Some(err) = last_err {
                    return Err(err);
                }
            }
            pending = retry;
        }
        Ok(total)
    }
}

static GLOBAL: RwLock<Option<Arc<TypeRegistry>>> = RwLock::new(None);

/// Install the process-wide registry, replacing any previous one.
pub fn install(registry: TypeRegistry) -> Arc<TypeRegistry> {
    let shared = Arc::new(registry);
    *GLOBAL.write() = Some(Arc::clone(&shared));
    shared
}

/// The installed registry, or an empty one.
pub fn global() -> Arc<TypeRegistry> {
    GLOBAL
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(TypeRegistry::new()))
}

/// Drop the installed registry.
pub fn clear() {
    *GLOBAL.write() = None;
}

/// Value of a structure read back from the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Leaf(Value),
    Struct(StructValue),
    Array(Vec<StructValue>),
}

pub type StructValue = IndexMap<String, FieldValue>;

/// Read the node at `path` as an instance of the structure `type_name`.
///
/// Members of a structure array are looked up as `member[i]` children.
pub fn read_struct(
    tree: &mut ConfigTree,
    path: &str,
    type_name: &str,
    registry: &TypeRegistry,
) -> SignalResult<StructValue> {
    let saved = tree.path();
    tree.move_absolute(path)?;
    let result = read_struct_here(tree, type_name, registry);
    if saved.is_empty() {
        tree.move_to_root();
    } else {
        tree.move_absolute(&saved)?;
    }
    result
}

fn read_struct_here(
    tree: &mut ConfigTree,
    type_name: &str,
    registry: &TypeRegistry,
) -> SignalResult<StructValue> {
    let ty = registry
        .get(type_name)
        .ok_or_else(|| SignalError::UnresolvedType {
            signal: tree.path(),
            type_name: type_name.to_string(),
        })?;
    let mut out = StructValue::new();
    for member in &ty.members {
        let value = if registry.get(&member.type_name).is_none() {
            let value = tree.get(&member.name).cloned().ok_or_else(|| {
                SignalError::MissingAttribute {
                    signal: rt_tree::path::join(&tree.path(), &member.name),
                    reason: "member value not found".into(),
                }
            })?;
            FieldValue::Leaf(value)
        } else if member.number_of_elements() > 1 {
            let mut items = Vec::new();
            for i in 0..member.number_of_elements() {
                tree.move_relative(&format!("{}[{i}]", member.name))?;
                items.push(read_struct_here(tree, &member.type_name, registry)?);
                tree.move_to_ancestor(1)?;
            }
            FieldValue::Array(items)
        } else {
            tree.move_relative(&member.name)?;
            let inner = read_struct_here(tree, &member.type_name, registry)?;
            tree.move_to_ancestor(1)?;
            FieldValue::Struct(inner)
        };
        out.insert(member.name.clone(), value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_ab() -> TypeRegistry {
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

    #[test]
    fn packed_offsets() {
        let reg = registry_ab();
        let a = reg.get("A").unwrap();
        assert_eq!(a.size, 12);
        assert_eq!(a.member("a2").unwrap().byte_offset, 8);
        assert_eq!(a.member_span(0), 8);
        assert_eq!(reg.alignment("A"), Some(4));
    }

    #[test]
    fn explicit_offsets_keep_padding() {
        let mut reg = TypeRegistry::new();
        reg.define(
            StructTypeBuilder::new("Padded")
                .member_at("flag", "uint8", &[], 0)
                .member_at("value", "float64", &[], 8)
                .size(16),
        )
        .unwrap();
        let ty = reg.get("Padded").unwrap();
        assert_eq!(ty.member_span(0), 8);
        assert_eq!(ty.member_span(1), 8);
        assert_eq!(reg.alignment("Padded"), Some(8));
    }

    #[test]
    fn unknown_member_type() {
        let reg = TypeRegistry::new();
        let err = StructTypeBuilder::new("X").member("m", "Nope").build(&reg).unwrap_err();
        assert!(matches!(err, SignalError::UnresolvedType { .. }));
    }

    #[test]
    fn overlapping_explicit_offset_is_rejected() {
        let reg = TypeRegistry::new();
        let err = StructTypeBuilder::new("X")
            .member_at("a", "uint32", &[], 0)
            .member_at("b", "uint32", &[], 2)
            .build(&reg)
            .unwrap_err();
        assert!(matches!(err, SignalError::InvalidStructure { .. }));
    }

    #[test]
    fn oversized_member_is_rejected() {
        let reg = TypeRegistry::new();
        let err = StructTypeBuilder::new("Huge")
            .array("m", "uint32", &[65_536, 65_536])
            .build(&reg)
            .unwrap_err();
        assert!(matches!(err, SignalError::InvalidStructure { .. }));

        let member = Member {
            name: "m".into(),
            type_name: "uint8".into(),
            dimensions: vec![65_536, 65_536],
            byte_offset: 0,
        };
        assert_eq!(member.checked_number_of_elements(), None);
        assert_eq!(member.number_of_elements(), u32::MAX);
    }

    #[test]
    fn load_from_tree_in_any_order() {
        let mut tree = ConfigTree::new();
        tree.create_absolute("Types.A.a1").unwrap();
        tree.write("Type", "B").unwrap();
        tree.create_absolute("Types.A.a2").unwrap();
        tree.write("Type", "float32").unwrap();
        tree.write("NumberOfElements", 3_u32).unwrap();
        tree.create_absolute("Types.B.b1").unwrap();
        tree.write("Type", "uint8").unwrap();
        tree.move_absolute("Types").unwrap();

        let mut reg = TypeRegistry::new();
        assert_eq!(reg.load_from_tree(&mut tree).unwrap(), 2);
        let a = reg.get("A").unwrap();
        assert_eq!(a.size, 1 + 12);
        assert_eq!(a.member("a2").unwrap().dimensions, vec![3]);
    }

    #[test]
    fn global_lifecycle() {
        let mut reg = TypeRegistry::new();
        reg.define(StructTypeBuilder::new("GlobalOnly").member("x", "uint8"))
            .unwrap();
        install(reg);
        assert!(global().get("GlobalOnly").is_some());
        clear();
        assert!(global().get("GlobalOnly").is_none());
    }

    #[test]
    fn read_struct_from_leaves() {
        let reg = registry_ab();
        let mut tree = ConfigTree::new();
        tree.create_absolute("Signal1.a1").unwrap();
        tree.write("b1", 1_i32).unwrap();
        tree.write("b2", 2_i32).unwrap();
        tree.move_absolute("Signal1").unwrap();
        tree.write("a2", 0.5_f32).unwrap();
        tree.move_to_root();

        let value = read_struct(&mut tree, "Signal1", "A", &reg).unwrap();
        let FieldValue::Struct(a1) = &value["a1"] else {
            panic!("a1 should be a structure");
        };
        assert_eq!(a1["b2"], FieldValue::Leaf(Value::Int(2)));
        assert_eq!(value["a2"], FieldValue::Leaf(Value::Float(0.5)));
        assert!(tree.is_root());
    }
}
