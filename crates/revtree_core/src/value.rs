//! Field values.

use crate::address::{Address, Identifier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Type tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// UTF-8 string.
    String,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    Long,
    /// 64-bit float.
    Double,
    /// Boolean.
    Boolean,
    /// Byte string.
    Binary,
    /// Identifier.
    Id,
    /// Address.
    Address,
    /// List of strings.
    StringList,
    /// List of integers.
    IntegerList,
    /// List of longs.
    LongList,
    /// List of doubles.
    DoubleList,
    /// List of booleans.
    BooleanList,
    /// List of identifiers.
    IdList,
    /// List of addresses.
    AddressList,
    /// Set of strings.
    StringSet,
    /// Set of integers.
    IntegerSet,
    /// Set of longs.
    LongSet,
    /// Set of identifiers.
    IdSet,
    /// Set of addresses.
    AddressSet,
}

/// An immutable scalar or flat homogeneous collection held by a field.
///
/// A field without a value is distinct from a field holding an empty
/// collection.
///
/// Doubles compare by bit pattern, with every NaN equal to every other NaN,
/// so `0.0` and `-0.0` differ and NaN equals itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// UTF-8 string.
    String(String),
    /// 32-bit signed integer.
    Integer(i32),
    /// 64-bit signed integer.
    Long(i64),
    /// 64-bit float.
    Double(#[serde(with = "double_repr")] f64),
    /// Boolean.
    Boolean(bool),
    /// Byte string.
    Binary(Vec<u8>),
    /// Identifier.
    Id(Identifier),
    /// Address.
    Address(Address),
    /// List of strings.
    StringList(Vec<String>),
    /// List of integers.
    IntegerList(Vec<i32>),
    /// List of longs.
    LongList(Vec<i64>),
    /// List of doubles.
    DoubleList(#[serde(with = "double_repr::list")] Vec<f64>),
    /// List of booleans.
    BooleanList(Vec<bool>),
    /// List of identifiers.
    IdList(Vec<Identifier>),
    /// List of addresses.
    AddressList(Vec<Address>),
    /// Set of strings.
    StringSet(BTreeSet<String>),
    /// Set of integers.
    IntegerSet(BTreeSet<i32>),
    /// Set of longs.
    LongSet(BTreeSet<i64>),
    /// Set of identifiers.
    IdSet(BTreeSet<Identifier>),
    /// Set of addresses.
    AddressSet(BTreeSet<Address>),
}

impl Value {
    /// Returns the type tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::Integer(_) => ValueType::Integer,
            Value::Long(_) => ValueType::Long,
            Value::Double(_) => ValueType::Double,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Binary(_) => ValueType::Binary,
            Value::Id(_) => ValueType::Id,
            Value::Address(_) => ValueType::Address,
            Value::StringList(_) => ValueType::StringList,
            Value::IntegerList(_) => ValueType::IntegerList,
            Value::LongList(_) => ValueType::LongList,
            Value::DoubleList(_) => ValueType::DoubleList,
            Value::BooleanList(_) => ValueType::BooleanList,
            Value::IdList(_) => ValueType::IdList,
            Value::AddressList(_) => ValueType::AddressList,
            Value::StringSet(_) => ValueType::StringSet,
            Value::IntegerSet(_) => ValueType::IntegerSet,
            Value::LongSet(_) => ValueType::LongSet,
            Value::IdSet(_) => ValueType::IdSet,
            Value::AddressSet(_) => ValueType::AddressSet,
        }
    }

    /// Returns true if this value is a list or set.
    pub fn is_collection(&self) -> bool {
        self.len().is_some()
    }

    /// Returns the number of elements of a collection value, `None` for
    /// scalars.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::StringList(v) => Some(v.len()),
            Value::IntegerList(v) => Some(v.len()),
            Value::LongList(v) => Some(v.len()),
            Value::DoubleList(v) => Some(v.len()),
            Value::BooleanList(v) => Some(v.len()),
            Value::IdList(v) => Some(v.len()),
            Value::AddressList(v) => Some(v.len()),
            Value::StringSet(v) => Some(v.len()),
            Value::IntegerSet(v) => Some(v.len()),
            Value::LongSet(v) => Some(v.len()),
            Value::IdSet(v) => Some(v.len()),
            Value::AddressSet(v) => Some(v.len()),
            _ => None,
        }
    }

    /// Returns true if this is a collection with no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Get this value as a string slice, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a long. Integers widen losslessly.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(n) => Some(*n),
            Value::Integer(n) => Some(i64::from(*n)),
            _ => None,
        }
    }

    /// Get this value as a double, if it is one.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is binary.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as an identifier, if it is one.
    pub fn as_id(&self) -> Option<&Identifier> {
        match self {
            Value::Id(id) => Some(id),
            _ => None,
        }
    }

    /// Get this value as an address, if it is one.
    pub fn as_address(&self) -> Option<&Address> {
        match self {
            Value::Address(a) => Some(a),
            _ => None,
        }
    }
}

fn same_double(a: f64, b: f64) -> bool {
    a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => same_double(*a, *b),
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Id(a), Value::Id(b)) => a == b,
            (Value::Address(a), Value::Address(b)) => a == b,
            (Value::StringList(a), Value::StringList(b)) => a == b,
            (Value::IntegerList(a), Value::IntegerList(b)) => a == b,
            (Value::LongList(a), Value::LongList(b)) => a == b,
            (Value::DoubleList(a), Value::DoubleList(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_double(*x, *y))
            }
            (Value::BooleanList(a), Value::BooleanList(b)) => a == b,
            (Value::IdList(a), Value::IdList(b)) => a == b,
            (Value::AddressList(a), Value::AddressList(b)) => a == b,
            (Value::StringSet(a), Value::StringSet(b)) => a == b,
            (Value::IntegerSet(a), Value::IntegerSet(b)) => a == b,
            (Value::LongSet(a), Value::LongSet(b)) => a == b,
            (Value::IdSet(a), Value::IdSet(b)) => a == b,
            (Value::AddressSet(a), Value::AddressSet(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

/// Doubles as JSON numbers, except NaN and the infinities, which JSON
/// numbers cannot hold. Those are written as `"NaN"`, `"Infinity"` and
/// `"-Infinity"`.
mod double_repr {
    use serde::de::{self, Deserialize, Deserializer, Visitor};
    use serde::ser::{Serialize, Serializer};
    use std::fmt;

    pub(super) fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        Double(*value).serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Double::deserialize(deserializer).map(|d| d.0)
    }

    pub(super) mod list {
        use super::Double;
        use serde::{Deserialize, Deserializer, Serializer};

        pub(crate) fn serialize<S: Serializer>(
            values: &[f64],
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(values.iter().map(|&d| Double(d)))
        }

        pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<f64>, D::Error> {
            let doubles = Vec::<Double>::deserialize(deserializer)?;
            Ok(doubles.into_iter().map(|d| d.0).collect())
        }
    }

    struct Double(f64);

    impl Serialize for Double {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let d = self.0;
            if d.is_nan() {
                serializer.serialize_str("NaN")
            } else if d.is_infinite() {
                serializer.serialize_str(if d > 0.0 { "Infinity" } else { "-Infinity" })
            } else {
                serializer.serialize_f64(d)
            }
        }
    }

    impl<'de> Deserialize<'de> for Double {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserializer.deserialize_any(DoubleVisitor).map(Double)
        }
    }

    struct DoubleVisitor;

    impl Visitor<'_> for DoubleVisitor {
        type Value = f64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number, \"NaN\", \"Infinity\" or \"-Infinity\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
            match v {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                _ => Err(E::invalid_value(de::Unexpected::Str(v), &self)),
            }
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Binary(bytes)
    }
}

impl From<Identifier> for Value {
    fn from(id: Identifier) -> Self {
        Value::Id(id)
    }
}

impl From<Address> for Value {
    fn from(address: Address) -> Self {
        Value::Address(address)
    }
}
