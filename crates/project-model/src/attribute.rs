//! Image attributes (non-pixel metadata).
//!
//! Attribute values are a closed set of variants. Anything the image store
//! cannot round-trip through its setter lands in [`AttributeValue::Opaque`]
//! and is marked non-editable, so it is carried through verbatim instead of
//! being dropped.
//!
//! Names are opaque strings. Namespaced names such as `openexr:lineOrder` or
//! `camera/lens/focal` are never split.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Element kind of a fixed-length numeric array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericKind {
    Int,
    Float,
}

/// Declared type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeType {
    Int,
    Float,
    String,
    /// Fixed-length numeric array (vectors, matrices, boxes).
    NumericArray { element: NumericKind, len: usize },
    /// Type the image store cannot safely set; carried read-only.
    Opaque { type_name: String },
}

/// Attribute payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    Int(i64),
    Float(f64),
    String(String),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    /// Store-provided textual rendering of an opaque value.
    Opaque(String),
}

/// Where an attribute came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum AttributeProvenance {
    /// Read from a probed input sequence.
    Input {
        sequence_id: String,
        subimage_index: usize,
    },
    /// Created or overridden by the user.
    UserOverride,
}

/// A single named, typed attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub type_tag: AttributeType,

    pub value: AttributeValue,

    pub provenance: AttributeProvenance,

    /// False when the type cannot be round-tripped through the store's setter.
    pub editable: bool,

    /// Value at import time, kept to detect later edits of read-only entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_value: Option<AttributeValue>,
}

/// Two attributes share a name but disagree on value.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeConflict {
    pub name: String,
    pub existing: AttributeSpec,
    pub incoming: AttributeSpec,
}

/// How a caller settles an [`AttributeConflict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeResolution {
    KeepExisting,
    Replace,
    /// Not representable because names are unique; always rejected.
    KeepBoth,
}

/// Errors from editing an attribute in place.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttributeEditError {
    #[error("attribute '{name}' not found")]
    NotFound { name: String },

    #[error("attribute '{name}' is read-only")]
    NotEditable { name: String },

    #[error("value for attribute '{name}' does not match its type {expected}")]
    TypeMismatch { name: String, expected: String },

    #[error("attribute '{name}' already exists")]
    DuplicateName { name: String },
}

impl AttributeType {
    /// Whether `value` is consistent with this type. No numeric widening.
    pub fn accepts(&self, value: &AttributeValue) -> bool {
        match (self, value) {
            (AttributeType::Int, AttributeValue::Int(_)) => true,
            (AttributeType::Float, AttributeValue::Float(_)) => true,
            (AttributeType::String, AttributeValue::String(_)) => true,
            (
                AttributeType::NumericArray {
                    element: NumericKind::Int,
                    len,
                },
                AttributeValue::IntArray(items),
            ) => items.len() == *len,
            (
                AttributeType::NumericArray {
                    element: NumericKind::Float,
                    len,
                },
                AttributeValue::FloatArray(items),
            ) => items.len() == *len,
            (AttributeType::Opaque { .. }, AttributeValue::Opaque(_)) => true,
            _ => false,
        }
    }

    /// Opaque types never round-trip through a setter.
    pub fn is_settable(&self) -> bool {
        !matches!(self, AttributeType::Opaque { .. })
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::Int => f.write_str("int"),
            AttributeType::Float => f.write_str("float"),
            AttributeType::String => f.write_str("string"),
            AttributeType::NumericArray { element, len } => match element {
                NumericKind::Int => write!(f, "int[{len}]"),
                NumericKind::Float => write!(f, "float[{len}]"),
            },
            AttributeType::Opaque { type_name } => write!(f, "opaque<{type_name}>"),
        }
    }
}

impl AttributeValue {
    /// Exact equality; floats compare bitwise so NaN equals itself.
    pub fn same_as(&self, other: &AttributeValue) -> bool {
        match (self, other) {
            (AttributeValue::Float(a), AttributeValue::Float(b)) => a.to_bits() == b.to_bits(),
            (AttributeValue::FloatArray(a), AttributeValue::FloatArray(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Int(v) => write!(f, "{v}"),
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::String(v) => write!(f, "\"{v}\""),
            AttributeValue::IntArray(v) => write!(f, "{v:?}"),
            AttributeValue::FloatArray(v) => write!(f, "{v:?}"),
            AttributeValue::Opaque(v) => write!(f, "<{v}>"),
        }
    }
}

impl AttributeSpec {
    /// A user-authored attribute. Editable unless its type is opaque.
    pub fn user(name: impl Into<String>, type_tag: AttributeType, value: AttributeValue) -> Self {
        let editable = type_tag.is_settable();
        Self {
            name: name.into(),
            type_tag,
            value,
            provenance: AttributeProvenance::UserOverride,
            editable,
            imported_value: None,
        }
    }

    /// Shorthand for a user string attribute.
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::user(
            name,
            AttributeType::String,
            AttributeValue::String(value.into()),
        )
    }

    /// Copy for an output set, remembering the value at import time.
    pub fn imported_copy(&self) -> Self {
        let mut copy = self.clone();
        copy.imported_value = Some(self.value.clone());
        copy
    }

    pub fn is_type_consistent(&self) -> bool {
        self.type_tag.accepts(&self.value)
    }

    /// True when the value differs from the one captured at import.
    pub fn is_modified_since_import(&self) -> bool {
        self.imported_value
            .as_ref()
            .map(|original| !original.same_as(&self.value))
            .unwrap_or(false)
    }

    /// Same name and identical value.
    pub fn same_value_as(&self, other: &AttributeSpec) -> bool {
        self.type_tag == other.type_tag && self.value.same_as(&other.value)
    }
}

/// Ordered attributes, unique by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<AttributeSpec>", into = "Vec<AttributeSpec>")]
pub struct AttributeSet {
    attributes: Vec<AttributeSpec>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeSpec> {
        self.attributes.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.attributes.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Append a new attribute. Fails if the name is taken.
    pub fn insert(&mut self, attr: AttributeSpec) -> Result<(), AttributeEditError> {
        if self.contains(&attr.name) {
            return Err(AttributeEditError::DuplicateName { name: attr.name });
        }
        self.attributes.push(attr);
        Ok(())
    }

    /// Replace the attribute with the same name in place, or append it.
    /// Returns the previous entry.
    pub fn replace(&mut self, attr: AttributeSpec) -> Option<AttributeSpec> {
        match self.attributes.iter_mut().find(|a| a.name == attr.name) {
            Some(slot) => Some(std::mem::replace(slot, attr)),
            None => {
                self.attributes.push(attr);
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<AttributeSpec> {
        let index = self.attributes.iter().position(|a| a.name == name)?;
        Some(self.attributes.remove(index))
    }

    /// Edit a value in place. Read-only entries and type changes are refused.
    pub fn set_value(&mut self, name: &str, value: AttributeValue) -> Result<(), AttributeEditError> {
        let attr = self
            .attributes
            .iter_mut()
            .find(|a| a.name == name)
            .ok_or_else(|| AttributeEditError::NotFound {
                name: name.to_string(),
            })?;

        if !attr.editable {
            return Err(AttributeEditError::NotEditable {
                name: name.to_string(),
            });
        }
        if !attr.type_tag.accepts(&value) {
            return Err(AttributeEditError::TypeMismatch {
                name: name.to_string(),
                expected: attr.type_tag.to_string(),
            });
        }

        if !attr.value.same_as(&value) {
            // `imported_value` still records what the input carried.
            attr.provenance = AttributeProvenance::UserOverride;
        }
        attr.value = value;
        Ok(())
    }

    /// Attributes of `incoming` that would clash with entries of `self`.
    pub fn conflicts_with<'a>(
        &self,
        incoming: impl IntoIterator<Item = &'a AttributeSpec>,
    ) -> Vec<AttributeConflict> {
        incoming
            .into_iter()
            .filter_map(|attr| {
                let existing = self.get(&attr.name)?;
                if existing.same_value_as(attr) {
                    None
                } else {
                    Some(AttributeConflict {
                        name: attr.name.clone(),
                        existing: existing.clone(),
                        incoming: attr.clone(),
                    })
                }
            })
            .collect()
    }

    /// Union of both sets. Shared names with identical values collapse;
    /// any shared name with a differing value aborts the merge and the
    /// conflicts are returned instead. Neither input is modified.
    pub fn merge(&self, other: &AttributeSet) -> Result<AttributeSet, Vec<AttributeConflict>> {
        let conflicts = self.conflicts_with(other.iter());
        if !conflicts.is_empty() {
            return Err(conflicts);
        }

        let mut merged = self.clone();
        for attr in other.iter() {
            if !merged.contains(&attr.name) {
                merged.attributes.push(attr.clone());
            }
        }
        Ok(merged)
    }
}

impl TryFrom<Vec<AttributeSpec>> for AttributeSet {
    type Error = AttributeEditError;

    fn try_from(value: Vec<AttributeSpec>) -> Result<Self, Self::Error> {
        let mut set = AttributeSet::new();
        for attr in value {
            set.insert(attr)?;
        }
        Ok(set)
    }
}

impl From<AttributeSet> for Vec<AttributeSpec> {
    fn from(value: AttributeSet) -> Self {
        value.attributes
    }
}

impl<'a> IntoIterator for &'a AttributeSet {
    type Item = &'a AttributeSpec;
    type IntoIter = std::slice::Iter<'a, AttributeSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.attributes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input_attr(name: &str, value: &str, seq: &str) -> AttributeSpec {
        AttributeSpec {
            name: name.to_string(),
            type_tag: AttributeType::String,
            value: AttributeValue::String(value.to_string()),
            provenance: AttributeProvenance::Input {
                sequence_id: seq.to_string(),
                subimage_index: 0,
            },
            editable: true,
            imported_value: None,
        }
    }

    #[test]
    fn test_type_tag_rejects_widening() {
        assert!(AttributeType::Float.accepts(&AttributeValue::Float(1.0)));
        assert!(!AttributeType::Float.accepts(&AttributeValue::Int(1)));
        let v3f = AttributeType::NumericArray {
            element: NumericKind::Float,
            len: 3,
        };
        assert!(v3f.accepts(&AttributeValue::FloatArray(vec![0.0, 1.0, 2.0])));
        assert!(!v3f.accepts(&AttributeValue::FloatArray(vec![0.0, 1.0])));
        assert!(!v3f.accepts(&AttributeValue::IntArray(vec![0, 1, 2])));
    }

    #[test]
    fn test_insert_rejects_duplicate_names() {
        let mut set = AttributeSet::new();
        set.insert(AttributeSpec::string("owner", "lighting")).unwrap();
        let err = set
            .insert(AttributeSpec::string("owner", "comp"))
            .unwrap_err();
        assert_eq!(
            err,
            AttributeEditError::DuplicateName {
                name: "owner".to_string()
            }
        );
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_merge_conflict_is_returned_not_resolved() {
        let mut existing = AttributeSet::new();
        existing
            .insert(input_attr("compression", "piz", "seq_b"))
            .unwrap();
        let mut incoming = AttributeSet::new();
        incoming
            .insert(input_attr("compression", "zip", "seq_a"))
            .unwrap();

        let conflicts = existing.merge(&incoming).unwrap_err();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].name, "compression");
        assert_eq!(
            conflicts[0].incoming.value,
            AttributeValue::String("zip".to_string())
        );
        // Untouched.
        assert_eq!(
            existing.get("compression").unwrap().value,
            AttributeValue::String("piz".to_string())
        );
    }

    #[test]
    fn test_merge_collapses_identical_values() {
        let mut a = AttributeSet::new();
        a.insert(input_attr("owner", "fx", "seq_a")).unwrap();
        let mut b = AttributeSet::new();
        b.insert(input_attr("owner", "fx", "seq_b")).unwrap();
        b.insert(input_attr("camera/lens", "35mm", "seq_b")).unwrap();

        let merged = a.merge(&b).unwrap();
        assert_eq!(merged.names(), vec!["owner", "camera/lens"]);
    }

    #[test]
    fn test_set_value_refuses_read_only_and_type_change() {
        let mut set = AttributeSet::new();
        set.insert(AttributeSpec::user(
            "chromaticities",
            AttributeType::Opaque {
                type_name: "chromaticities".to_string(),
            },
            AttributeValue::Opaque("0.64 0.33 ...".to_string()),
        ))
        .unwrap();
        set.insert(AttributeSpec::user(
            "pixelAspectRatio",
            AttributeType::Float,
            AttributeValue::Float(1.0),
        ))
        .unwrap();

        assert!(matches!(
            set.set_value("chromaticities", AttributeValue::Opaque("x".into())),
            Err(AttributeEditError::NotEditable { .. })
        ));
        assert!(matches!(
            set.set_value("pixelAspectRatio", AttributeValue::Int(2)),
            Err(AttributeEditError::TypeMismatch { .. })
        ));
        set.set_value("pixelAspectRatio", AttributeValue::Float(2.0))
            .unwrap();
        assert_eq!(
            set.get("pixelAspectRatio").unwrap().value,
            AttributeValue::Float(2.0)
        );
    }

    #[test]
    fn test_imported_copy_tracks_modification() {
        let source = input_attr("owner", "fx", "seq_a");
        let mut copy = source.imported_copy();
        assert!(!copy.is_modified_since_import());
        copy.value = AttributeValue::String("comp".to_string());
        assert!(copy.is_modified_since_import());
    }

    #[test]
    fn test_nan_values_compare_equal_to_themselves() {
        let a = AttributeValue::Float(f64::NAN);
        assert!(a.same_as(&AttributeValue::Float(f64::NAN)));
    }

    #[test]
    fn test_deserialize_rejects_duplicate_names() {
        let set = {
            let mut s = AttributeSet::new();
            s.insert(AttributeSpec::string("a", "1")).unwrap();
            s
        };
        let mut value = serde_json::to_value(&set).unwrap();
        let entry = value.as_array().unwrap()[0].clone();
        value.as_array_mut().unwrap().push(entry);
        assert!(serde_json::from_value::<AttributeSet>(value).is_err());
    }
}
