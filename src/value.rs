//! Typed values exchanged with SOAP services.

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

/// A scalar leaf value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(n) => write!(f, "{}", n),
            Scalar::Float(x) if x.is_nan() => write!(f, "NaN"),
            Scalar::Float(x) if x.is_infinite() => {
                write!(f, "{}", if *x > 0.0 { "INF" } else { "-INF" })
            }
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::String(s) => write!(f, "{}", s),
        }
    }
}

/// A value that can be serialized into, or decoded from, a SOAP message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TypedValue {
    /// Absent value (`xsi:nil`).
    Null,
    /// Scalar leaf.
    Scalar(Scalar),
    /// Ordered list of values.
    Sequence(Vec<TypedValue>),
    /// Named fields in insertion order.
    Struct(IndexMap<String, TypedValue>),
    /// Apache-style map of arbitrary keys to values.
    Map(Vec<(TypedValue, TypedValue)>),
    /// Value carrying explicit naming and typing.
    Named(Box<SoapVal>),
}

/// Shape of an aggregate, decided from its keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    /// Keys are exactly `0..n` in order.
    Sequence,
    /// Any other key set.
    Struct,
}

/// Classify an aggregate from its keys.
///
/// Only the keys `"0"`, `"1"`, ... `"n-1"` in that order make a sequence;
/// an empty key set is a sequence too.
pub fn classify<I, K>(keys: I) -> Aggregate
where
    I: IntoIterator<Item = K>,
    K: AsRef<str>,
{
    for (expected, key) in keys.into_iter().enumerate() {
        if key.as_ref() != expected.to_string() {
            return Aggregate::Struct;
        }
    }
    Aggregate::Sequence
}

impl TypedValue {
    /// Build an aggregate from keyed entries, choosing sequence or struct
    /// by [`classify`].
    pub fn from_entries<K: Into<String>>(entries: Vec<(K, TypedValue)>) -> Self {
        let entries: Vec<(String, TypedValue)> =
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        match classify(entries.iter().map(|(k, _)| k.as_str())) {
            Aggregate::Sequence => TypedValue::Sequence(entries.into_iter().map(|(_, v)| v).collect()),
            Aggregate::Struct => TypedValue::Struct(entries.into_iter().collect()),
        }
    }

    /// Empty struct.
    pub fn empty_struct() -> Self {
        TypedValue::Struct(IndexMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, TypedValue::Null)
    }

    /// Whether the value is a sequence, struct or map.
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            TypedValue::Sequence(_) | TypedValue::Struct(_) | TypedValue::Map(_)
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TypedValue::Scalar(Scalar::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TypedValue::Scalar(Scalar::Float(x)) => Some(*x),
            TypedValue::Scalar(Scalar::Int(n)) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedValue::Scalar(Scalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[TypedValue]> {
        match self {
            TypedValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&IndexMap<String, TypedValue>> {
        match self {
            TypedValue::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Field lookup on a struct.
    pub fn get(&self, key: &str) -> Option<&TypedValue> {
        self.as_struct().and_then(|fields| fields.get(key))
    }

    /// Text form of a scalar, empty for anything else.
    pub fn to_text(&self) -> String {
        match self {
            TypedValue::Scalar(s) => s.to_string(),
            TypedValue::Named(v) => v.value.to_text(),
            _ => String::new(),
        }
    }

    /// Number of direct members of an aggregate.
    pub fn len(&self) -> usize {
        match self {
            TypedValue::Sequence(items) => items.len(),
            TypedValue::Struct(fields) => fields.len(),
            TypedValue::Map(pairs) => pairs.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Turn any aggregate into a struct keyed by field name or position.
    pub(crate) fn into_fields(self) -> IndexMap<String, TypedValue> {
        match self {
            TypedValue::Struct(fields) => fields,
            TypedValue::Sequence(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            TypedValue::Map(pairs) => pairs
                .into_iter()
                .map(|(k, v)| (k.to_text(), v))
                .collect(),
            TypedValue::Null => IndexMap::new(),
            other => {
                let mut fields = IndexMap::new();
                fields.insert("!".to_string(), other);
                fields
            }
        }
    }
}

impl From<bool> for TypedValue {
    fn from(v: bool) -> Self {
        TypedValue::Scalar(Scalar::Bool(v))
    }
}

impl From<i64> for TypedValue {
    fn from(v: i64) -> Self {
        TypedValue::Scalar(Scalar::Int(v))
    }
}

impl From<i32> for TypedValue {
    fn from(v: i32) -> Self {
        TypedValue::Scalar(Scalar::Int(v as i64))
    }
}

impl From<f64> for TypedValue {
    fn from(v: f64) -> Self {
        TypedValue::Scalar(Scalar::Float(v))
    }
}

impl From<&str> for TypedValue {
    fn from(v: &str) -> Self {
        TypedValue::Scalar(Scalar::String(v.to_string()))
    }
}

impl From<String> for TypedValue {
    fn from(v: String) -> Self {
        TypedValue::Scalar(Scalar::String(v))
    }
}

impl<T: Into<TypedValue>> From<Vec<T>> for TypedValue {
    fn from(items: Vec<T>) -> Self {
        TypedValue::Sequence(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<TypedValue>> From<Option<T>> for TypedValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(TypedValue::Null)
    }
}

impl From<SoapVal> for TypedValue {
    fn from(v: SoapVal) -> Self {
        TypedValue::Named(Box::new(v))
    }
}

/// A value with explicit element name, schema type, namespaces and
/// attributes.
///
/// Serializes itself with its own name regardless of the name its
/// container would give it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoapVal {
    pub name: String,
    pub type_name: Option<String>,
    pub value: TypedValue,
    pub element_ns: Option<String>,
    pub type_ns: Option<String>,
    pub attributes: Vec<(String, String)>,
}

impl Default for SoapVal {
    fn default() -> Self {
        Self {
            name: "soapval".to_string(),
            type_name: None,
            value: TypedValue::Null,
            element_ns: None,
            type_ns: None,
            attributes: Vec::new(),
        }
    }
}

impl SoapVal {
    pub fn new(name: impl Into<String>, type_name: Option<&str>, value: impl Into<TypedValue>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.map(str::to_string),
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn with_element_ns(mut self, ns: impl Into<String>) -> Self {
        self.element_ns = Some(ns.into());
        self
    }

    pub fn with_type_ns(mut self, ns: impl Into<String>) -> Self {
        self.type_ns = Some(ns.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }
}
