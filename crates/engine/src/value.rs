//! The heterogeneous field value tree held by declared records.
//!
//! Maps use [`BTreeMap`] so traversal order is key-sorted by construction,
//! which is what makes reference collection reproducible independent of how
//! a build file happened to order its members.

use std::collections::BTreeMap;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::address::Address;
use crate::record::Record;

/// One field value inside a declared record.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  Str(String),
  List(Vec<Value>),
  Map(BTreeMap<String, Value>),
  /// A literal nested record.
  Record(Record),
  /// A fully-qualified address, produced during hydration.
  Address(Address),
}

impl Value {
  pub fn str(s: impl Into<String>) -> Self {
    Self::Str(s.into())
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Str(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_record(&self) -> Option<&Record> {
    match self {
      Self::Record(r) => Some(r),
      _ => None,
    }
  }
}

impl From<bool> for Value {
  fn from(v: bool) -> Self {
    Self::Bool(v)
  }
}

impl From<i64> for Value {
  fn from(v: i64) -> Self {
    Self::Int(v)
  }
}

impl From<&str> for Value {
  fn from(v: &str) -> Self {
    Self::Str(v.to_string())
  }
}

impl From<String> for Value {
  fn from(v: String) -> Self {
    Self::Str(v)
  }
}

impl Serialize for Value {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      Self::Null => serializer.serialize_unit(),
      Self::Bool(v) => serializer.serialize_bool(*v),
      Self::Int(v) => serializer.serialize_i64(*v),
      Self::Float(v) => serializer.serialize_f64(*v),
      Self::Str(v) => serializer.serialize_str(v),
      Self::List(items) => {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
          seq.serialize_element(item)?;
        }
        seq.end()
      }
      Self::Map(entries) => {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in entries {
          map.serialize_entry(key, value)?;
        }
        map.end()
      }
      Self::Record(record) => record.serialize(serializer),
      Self::Address(address) => address.serialize(serializer),
    }
  }
}
