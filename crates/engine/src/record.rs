//! Typed, field-bearing declared records and their static schemas.
//!
//! A [`Record`] is the raw or hydrated form of one declared object. Which of
//! its fields may hold address references is never discovered by runtime
//! scanning: every type registered in the [`SymbolTable`] carries a
//! [`RecordType`] schema that names its addressable fields, their optional
//! type constraints, and the two optional capability hooks (factory
//! substitution and self-validation) that run after hydration.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::value::Value;

/// The reserved dependency-list field. Its address strings are never eagerly
/// collected; consumers request them explicitly via a Dependencies selector.
pub const DEPENDENCIES_FIELD: &str = "dependencies";

/// Field injected at hydration with the record's declaring directory.
pub const SPEC_PATH_FIELD: &str = "spec_path";

/// Field injected at hydration with the top-level record's own address.
pub const ADDRESS_FIELD: &str = "address";

/// Field holding the record's local name within its directory.
pub const NAME_FIELD: &str = "name";

/// A declared record: a type name plus its fields.
///
/// Fields are held in a `BTreeMap`, so iteration is always in ascending field
/// name order. Records are immutable after construction in engine terms; the
/// builder methods exist for parsers and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
  type_name: String,
  fields: BTreeMap<String, Value>,
}

impl Record {
  pub fn new(type_name: impl Into<String>) -> Self {
    Self {
      type_name: type_name.into(),
      fields: BTreeMap::new(),
    }
  }

  pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
    self.fields.insert(name.into(), value.into());
    self
  }

  pub fn set(&mut self, name: impl Into<String>, value: Value) {
    self.fields.insert(name.into(), value);
  }

  pub fn type_name(&self) -> &str {
    &self.type_name
  }

  pub fn field(&self, name: &str) -> Option<&Value> {
    self.fields.get(name)
  }

  pub fn fields(&self) -> &BTreeMap<String, Value> {
    &self.fields
  }

  pub(crate) fn from_fields(type_name: String, fields: BTreeMap<String, Value>) -> Self {
    Self { type_name, fields }
  }
}

impl Serialize for Record {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
    map.serialize_entry("type", &self.type_name)?;
    for (key, value) in &self.fields {
      map.serialize_entry(key, value)?;
    }
    map.end()
  }
}

/// Constraint on the record type a resolved addressable field may hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeConstraint {
  Any,
  Exactly(String),
  OneOf(Vec<String>),
}

impl TypeConstraint {
  pub fn allows(&self, type_name: &str) -> bool {
    match self {
      Self::Any => true,
      Self::Exactly(expected) => expected == type_name,
      Self::OneOf(expected) => expected.iter().any(|e| e == type_name),
    }
  }
}

impl fmt::Display for TypeConstraint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Any => write!(f, "any record"),
      Self::Exactly(name) => write!(f, "a '{name}' record"),
      Self::OneOf(names) => write!(f, "one of [{}]", names.join(", ")),
    }
  }
}

/// Replaces a freshly hydrated record with a substitute.
pub type FactoryHook = Arc<dyn Fn(Record) -> Result<Record, String> + Send + Sync>;

/// Rejects a freshly hydrated record that fails its own invariants.
pub type ValidateHook = Arc<dyn Fn(&Record) -> Result<(), String> + Send + Sync>;

/// The static schema for one declarable record type.
pub struct RecordType {
  addressable: BTreeSet<String>,
  constraints: BTreeMap<String, TypeConstraint>,
  locatable: bool,
  factory: Option<FactoryHook>,
  validator: Option<ValidateHook>,
}

impl RecordType {
  pub fn new() -> Self {
    Self {
      addressable: BTreeSet::new(),
      constraints: BTreeMap::new(),
      locatable: true,
      factory: None,
      validator: None,
    }
  }

  /// Mark a field as addressable: strings in it parse as address references.
  pub fn addressable(mut self, field: impl Into<String>) -> Self {
    self.addressable.insert(field.into());
    self
  }

  /// Constrain the record type an addressable field resolves to.
  pub fn constraint(mut self, field: impl Into<String>, constraint: TypeConstraint) -> Self {
    let field = field.into();
    self.addressable.insert(field.clone());
    self.constraints.insert(field, constraint);
    self
  }

  /// Opt out of `spec_path` injection at hydration.
  pub fn not_locatable(mut self) -> Self {
    self.locatable = false;
    self
  }

  pub fn factory(mut self, hook: FactoryHook) -> Self {
    self.factory = Some(hook);
    self
  }

  pub fn validator(mut self, hook: ValidateHook) -> Self {
    self.validator = Some(hook);
    self
  }

  /// The dependency-list field is implicitly addressable on every type.
  pub fn is_addressable(&self, field: &str) -> bool {
    field == DEPENDENCIES_FIELD || self.addressable.contains(field)
  }

  pub fn constraint_for(&self, field: &str) -> &TypeConstraint {
    self.constraints.get(field).unwrap_or(&TypeConstraint::Any)
  }

  pub fn is_locatable(&self) -> bool {
    self.locatable
  }

  pub fn factory_hook(&self) -> Option<&FactoryHook> {
    self.factory.as_ref()
  }

  pub fn validate_hook(&self) -> Option<&ValidateHook> {
    self.validator.as_ref()
  }
}

impl Default for RecordType {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for RecordType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RecordType")
      .field("addressable", &self.addressable)
      .field("constraints", &self.constraints)
      .field("locatable", &self.locatable)
      .field("factory", &self.factory.is_some())
      .field("validator", &self.validator.is_some())
      .finish()
  }
}

/// The immutable table of declarable record types.
///
/// Provided by the embedding application; drives build file parsing and the
/// per-type identity rules registered with the engine.
#[derive(Debug, Clone)]
pub struct SymbolTable {
  types: Arc<BTreeMap<String, Arc<RecordType>>>,
}

impl SymbolTable {
  pub fn new(types: BTreeMap<String, Arc<RecordType>>) -> Self {
    Self {
      types: Arc::new(types),
    }
  }

  pub fn get(&self, type_name: &str) -> Option<&Arc<RecordType>> {
    self.types.get(type_name)
  }

  pub fn contains(&self, type_name: &str) -> bool {
    self.types.contains_key(type_name)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.types.keys().map(String::as_str)
  }
}

/// Convenience builder for symbol tables.
#[derive(Debug, Default)]
pub struct SymbolTableBuilder {
  types: BTreeMap<String, Arc<RecordType>>,
}

impl SymbolTableBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn define(mut self, name: impl Into<String>, record_type: RecordType) -> Self {
    self.types.insert(name.into(), Arc::new(record_type));
    self
  }

  pub fn build(self) -> SymbolTable {
    SymbolTable::new(self.types)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dependencies_field_is_always_addressable() {
    let schema = RecordType::new().addressable("config");
    assert!(schema.is_addressable("config"));
    assert!(schema.is_addressable(DEPENDENCIES_FIELD));
    assert!(!schema.is_addressable("x"));
  }

  #[test]
  fn constraint_marks_field_addressable() {
    let schema = RecordType::new().constraint("lib", TypeConstraint::Exactly("library".into()));
    assert!(schema.is_addressable("lib"));
    assert!(schema.constraint_for("lib").allows("library"));
    assert!(!schema.constraint_for("lib").allows("binary"));
    assert!(schema.constraint_for("other").allows("binary"));
  }

  #[test]
  fn record_serializes_with_type_tag() {
    let record = Record::new("library").with("x", 1i64);
    let json = serde_json::to_string(&record).unwrap();
    assert_eq!(json, r#"{"type":"library","x":1}"#);
  }
}
