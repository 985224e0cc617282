//! Per-file and per-directory namespaces of declared records.
//!
//! An [`AddressMap`] holds the records declared by one build file; an
//! [`AddressFamily`] merges every map in one directory into the directory's
//! full namespace. Both conflict checks happen here, at construction time, so
//! a later resolution request can never trip over a duplicate declaration
//! mid-hydration: re-declaring an address within one file is an intra-file
//! conflict, and declaring it in two sibling files is a sibling conflict.

use std::collections::BTreeMap;

use crate::address::Address;
use crate::error::ResolveError;
use crate::record::Record;

/// The namespace declared by a single build file.
#[derive(Debug, Clone)]
pub struct AddressMap {
  file: String,
  dir: String,
  records: BTreeMap<Address, Record>,
}

impl AddressMap {
  /// Build a map from the `(name, record)` pairs a parser produced for one
  /// file, in declaration order.
  ///
  /// # Errors
  ///
  /// Returns `IntraFileConflict` if the same name is declared twice.
  pub fn new(
    file: impl Into<String>,
    entries: Vec<(String, Record)>,
  ) -> Result<Self, ResolveError> {
    let file = file.into();
    let dir = parent_dir(&file);
    let mut records = BTreeMap::new();
    for (name, record) in entries {
      let address = Address::new(dir.clone(), name);
      if let Some(_previous) = records.insert(address.clone(), record) {
        return Err(ResolveError::IntraFileConflict {
          file,
          name: address.name().to_string(),
        });
      }
    }
    Ok(Self { file, dir, records })
  }

  /// The path of the declaring build file.
  pub fn file(&self) -> &str {
    &self.file
  }

  /// The directory the file lives in.
  pub fn dir(&self) -> &str {
    &self.dir
  }

  pub fn records(&self) -> &BTreeMap<Address, Record> {
    &self.records
  }
}

/// The full namespace for one directory, merged from all of its build files.
///
/// May be empty (a directory with no build files), but callers always receive
/// a family object, never an absence.
#[derive(Debug, Clone)]
pub struct AddressFamily {
  dir: String,
  records: BTreeMap<Address, Record>,
}

impl AddressFamily {
  /// Merge the given maps into one family.
  ///
  /// # Errors
  ///
  /// Returns `SiblingConflict` if any address appears in two maps; the error
  /// names both files and the address's local name.
  pub fn new(dir: impl Into<String>, maps: Vec<AddressMap>) -> Result<Self, ResolveError> {
    let dir = dir.into();
    let mut records = BTreeMap::new();
    let mut declared_in: BTreeMap<Address, String> = BTreeMap::new();
    for map in maps {
      for (address, record) in map.records {
        if let Some(first_file) = declared_in.get(&address) {
          return Err(ResolveError::SiblingConflict {
            dir,
            name: address.name().to_string(),
            first_file: first_file.clone(),
            second_file: map.file,
          });
        }
        declared_in.insert(address.clone(), map.file.clone());
        records.insert(address, record);
      }
    }
    Ok(Self { dir, records })
  }

  pub fn dir(&self) -> &str {
    &self.dir
  }

  pub fn get(&self, address: &Address) -> Option<&Record> {
    self.records.get(address)
  }

  /// All declared addresses, in sorted order.
  pub fn addresses(&self) -> Vec<Address> {
    self.records.keys().cloned().collect()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }
}

/// The repo-relative directory of a repo-relative file path.
fn parent_dir(file: &str) -> String {
  match file.rsplit_once('/') {
    Some((dir, _)) => dir.to_string(),
    None => String::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn entry(name: &str) -> (String, Record) {
    (name.to_string(), Record::new("library"))
  }

  #[test]
  fn map_scopes_addresses_to_file_dir() {
    let map = AddressMap::new("lib/base/BUILD.json", vec![entry("core")]).unwrap();
    assert_eq!(map.dir(), "lib/base");
    assert!(map.records().contains_key(&Address::new("lib/base", "core")));
  }

  #[test]
  fn map_at_root_uses_empty_dir() {
    let map = AddressMap::new("BUILD.json", vec![entry("core")]).unwrap();
    assert_eq!(map.dir(), "");
  }

  #[test]
  fn intra_file_conflict() {
    let err = AddressMap::new("lib/BUILD.json", vec![entry("core"), entry("core")]).unwrap_err();
    match err {
      ResolveError::IntraFileConflict { file, name } => {
        assert_eq!(file, "lib/BUILD.json");
        assert_eq!(name, "core");
      }
      other => panic!("expected IntraFileConflict, got {other:?}"),
    }
  }

  #[test]
  fn family_is_union_of_disjoint_maps() {
    let first = AddressMap::new("lib/BUILD.json", vec![entry("alpha")]).unwrap();
    let second = AddressMap::new("lib/BUILD.extra.json", vec![entry("beta")]).unwrap();
    let family = AddressFamily::new("lib", vec![first, second]).unwrap();
    assert_eq!(
      family.addresses(),
      vec![Address::new("lib", "alpha"), Address::new("lib", "beta")]
    );
  }

  #[test]
  fn family_may_be_empty() {
    let family = AddressFamily::new("lib", vec![]).unwrap();
    assert!(family.is_empty());
    assert_eq!(family.len(), 0);
  }

  #[test]
  fn sibling_conflict_names_both_files() {
    let first = AddressMap::new("lib/BUILD.json", vec![entry("gamma")]).unwrap();
    let second = AddressMap::new("lib/BUILD.extra.json", vec![entry("gamma")]).unwrap();
    let err = AddressFamily::new("lib", vec![first, second]).unwrap_err();
    match err {
      ResolveError::SiblingConflict {
        dir,
        name,
        first_file,
        second_file,
      } => {
        assert_eq!(dir, "lib");
        assert_eq!(name, "gamma");
        assert_eq!(first_file, "lib/BUILD.json");
        assert_eq!(second_file, "lib/BUILD.extra.json");
      }
      other => panic!("expected SiblingConflict, got {other:?}"),
    }
  }
}
