//! The two-pass record hydration algorithm.
//!
//! Pass one ([`collect`]) walks a declared record's addressable fields in a
//! fixed, deterministic order — ascending field name, map values by ascending
//! key, list values in declared order — and gathers every address reference
//! it finds into a flat, ordered list, wrapped as an [`UnhydratedRecord`].
//! Strings in the reserved `dependencies` field are skipped entirely; those
//! addresses are only resolved when a consumer asks for them explicitly.
//!
//! Pass two ([`hydrate`]) re-walks the record in the *same* order, consuming
//! one resolved record per reference encountered, converting `dependencies`
//! strings to fully-qualified addresses without resolving them, then injects
//! `spec_path`/`address` and runs the type's factory and validation hooks.
//! The resolved list must match the collected list one-to-one and in order;
//! a mismatch is a programming error in the caller and panics.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::address::Address;
use crate::error::ResolveError;
use crate::namespace::AddressFamily;
use crate::record::{
  ADDRESS_FIELD, DEPENDENCIES_FIELD, Record, RecordType, SPEC_PATH_FIELD, SymbolTable,
};
use crate::value::Value;

/// A declared record plus the ordered addresses discovered inside its
/// addressable fields, before those references have been resolved.
///
/// Equality and hashing consider only the wrapped record, so structurally
/// identical results deduplicate regardless of which address produced them.
#[derive(Debug, Clone)]
pub struct UnhydratedRecord {
  address: Address,
  record: Record,
  references: Vec<Address>,
}

impl UnhydratedRecord {
  pub fn address(&self) -> &Address {
    &self.address
  }

  pub fn record(&self) -> &Record {
    &self.record
  }

  /// The collected references, in deterministic traversal order.
  pub fn references(&self) -> &[Address] {
    &self.references
  }
}

impl PartialEq for UnhydratedRecord {
  fn eq(&self, other: &Self) -> bool {
    self.record == other.record
  }
}

impl Eq for UnhydratedRecord {}

impl Hash for UnhydratedRecord {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.record.type_name().hash(state);
    for field in self.record.fields().keys() {
      field.hash(state);
    }
  }
}

/// The collection pass: look up `address` in its family and gather the
/// ordered references inside the record's addressable fields.
///
/// # Errors
///
/// `NotFound` if the address is absent (the message lists the family's valid
/// addresses), `Execute` for unknown record types or malformed references.
pub fn collect(
  family: &AddressFamily,
  address: &Address,
  symbols: &SymbolTable,
) -> Result<UnhydratedRecord, ResolveError> {
  let record = family.get(address).ok_or_else(|| ResolveError::NotFound {
    address: address.to_string(),
    available: family.addresses().iter().map(Address::to_string).collect(),
  })?;

  let mut references = Vec::new();
  collect_into(record, address, symbols, &mut references)?;
  Ok(UnhydratedRecord {
    address: address.clone(),
    record: record.clone(),
    references,
  })
}

fn collect_into(
  record: &Record,
  owner: &Address,
  symbols: &SymbolTable,
  out: &mut Vec<Address>,
) -> Result<(), ResolveError> {
  let schema = schema_for(record, owner, symbols)?;
  for (field, value) in record.fields() {
    if !schema.is_addressable(field) {
      continue;
    }
    match value {
      // BTreeMap iteration is already key-ascending.
      Value::Map(entries) => {
        for item in entries.values() {
          collect_item(field, item, owner, symbols, out)?;
        }
      }
      Value::List(items) => {
        for item in items {
          collect_item(field, item, owner, symbols, out)?;
        }
      }
      other => collect_item(field, other, owner, symbols, out)?,
    }
  }
  Ok(())
}

fn collect_item(
  field: &str,
  value: &Value,
  owner: &Address,
  symbols: &SymbolTable,
  out: &mut Vec<Address>,
) -> Result<(), ResolveError> {
  match value {
    Value::Str(spec) if field != DEPENDENCIES_FIELD => {
      let address = Address::parse(spec, owner.spec_path())
        .map_err(|e| ResolveError::bad_address(owner.to_string(), e))?;
      out.push(address);
    }
    // Literal nested records contribute their own references, even inside
    // the dependencies field.
    Value::Record(nested) => collect_into(nested, owner, symbols, out)?,
    _ => {}
  }
  Ok(())
}

/// The assembly pass: re-walk the record, zipping the resolved records back
/// into the fields their references came from.
///
/// # Panics
///
/// Panics if `resolved` does not match the collection pass's reference list
/// in length; that is a caller bug, not a recoverable condition.
pub fn hydrate(
  unhydrated: &UnhydratedRecord,
  resolved: &[Arc<Record>],
  symbols: &SymbolTable,
) -> Result<Record, ResolveError> {
  let mut cx = HydrateCx {
    owner: &unhydrated.address,
    resolved,
    next: 0,
    symbols,
  };
  let record = cx.rebuild_record(&unhydrated.record, true)?;
  if cx.next != resolved.len() {
    panic!(
      "hydration of {} consumed {} of {} resolved values; collection and \
       resolution are out of sync",
      unhydrated.address,
      cx.next,
      resolved.len()
    );
  }
  Ok(record)
}

struct HydrateCx<'a> {
  owner: &'a Address,
  resolved: &'a [Arc<Record>],
  next: usize,
  symbols: &'a SymbolTable,
}

impl HydrateCx<'_> {
  fn rebuild_record(&mut self, record: &Record, top_level: bool) -> Result<Record, ResolveError> {
    let schema = schema_for(record, self.owner, self.symbols)?;
    let mut fields = std::collections::BTreeMap::new();
    for (field, value) in record.fields() {
      let rebuilt = if !schema.is_addressable(field) {
        value.clone()
      } else {
        match value {
          Value::Map(entries) => {
            let mut out = std::collections::BTreeMap::new();
            for (key, item) in entries {
              out.insert(key.clone(), self.rebuild_item(field, &schema, item)?);
            }
            Value::Map(out)
          }
          Value::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
              out.push(self.rebuild_item(field, &schema, item)?);
            }
            Value::List(out)
          }
          other => self.rebuild_item(field, &schema, other)?,
        }
      };
      fields.insert(field.clone(), rebuilt);
    }

    if top_level {
      fields.insert(ADDRESS_FIELD.to_string(), Value::Address(self.owner.clone()));
    }
    if schema.is_locatable() {
      fields.insert(
        SPEC_PATH_FIELD.to_string(),
        Value::Str(self.owner.spec_path().to_string()),
      );
    }

    let mut hydrated = Record::from_fields(record.type_name().to_string(), fields);
    if let Some(factory) = schema.factory_hook() {
      hydrated = factory(hydrated).map_err(|detail| ResolveError::Validation {
        address: self.owner.to_string(),
        type_name: record.type_name().to_string(),
        detail,
      })?;
    }
    if let Some(validate) = schema.validate_hook() {
      validate(&hydrated).map_err(|detail| ResolveError::Validation {
        address: self.owner.to_string(),
        type_name: record.type_name().to_string(),
        detail,
      })?;
    }
    Ok(hydrated)
  }

  fn rebuild_item(
    &mut self,
    field: &str,
    schema: &RecordType,
    value: &Value,
  ) -> Result<Value, ResolveError> {
    match value {
      Value::Str(spec) if field == DEPENDENCIES_FIELD => {
        // Absolute-ize without resolving: the declaring context is about to
        // be lost, the targets are requested later by consumers.
        let address = Address::parse(spec, self.owner.spec_path())
          .map_err(|e| ResolveError::bad_address(self.owner.to_string(), e))?;
        Ok(Value::Address(address))
      }
      Value::Str(_) => {
        let consumed = self.resolved.get(self.next).unwrap_or_else(|| {
          panic!(
            "hydration of {} ran out of resolved values at field '{field}'; \
             collection and resolution are out of sync",
            self.owner
          )
        });
        self.next += 1;
        self.check_constraint(field, schema, consumed.type_name())?;
        Ok(Value::Record((**consumed).clone()))
      }
      Value::Record(nested) => {
        let rebuilt = self.rebuild_record(nested, false)?;
        self.check_constraint(field, schema, rebuilt.type_name())?;
        Ok(Value::Record(rebuilt))
      }
      other => Ok(other.clone()),
    }
  }

  fn check_constraint(
    &self,
    field: &str,
    schema: &RecordType,
    actual: &str,
  ) -> Result<(), ResolveError> {
    let constraint = schema.constraint_for(field);
    if constraint.allows(actual) {
      Ok(())
    } else {
      Err(ResolveError::TypeMismatch {
        address: self.owner.to_string(),
        field: field.to_string(),
        expected: constraint.to_string(),
        actual: actual.to_string(),
      })
    }
  }
}

fn schema_for<'a>(
  record: &Record,
  owner: &Address,
  symbols: &'a SymbolTable,
) -> Result<&'a Arc<RecordType>, ResolveError> {
  symbols.get(record.type_name()).ok_or_else(|| ResolveError::Execute {
    context: owner.to_string(),
    detail: format!("unknown record type '{}'", record.type_name()),
  })
}
