//! The closed vocabulary of products and subjects the engine resolves over.
//!
//! A [`Subject`] is the value a product is being resolved *for*; a
//! [`ProductType`] names the kind of result being asked for; a
//! [`ProductValue`] is a resolved result. Subject shapes map one-to-one onto
//! products of the same shape, which is what the engine's is-a short-circuit
//! relies on: asking for the `Dir` product of a directory subject is already
//! answered by the subject itself.

use std::fmt;
use std::sync::Arc;

use crate::address::Address;
use crate::error::ResolveError;
use crate::fs::{FileContent, Listing, SubDirs};
use crate::hydrate::UnhydratedRecord;
use crate::namespace::AddressFamily;
use crate::parse::AddressMapper;
use crate::record::Record;

/// The kind of result a resolution request asks for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProductType {
  Address,
  Dir,
  FilePaths,
  Siblings,
  Descendants,
  Listing,
  BuildFiles,
  FileContents,
  SubDirs,
  Family,
  Unhydrated,
  Record,
  Addresses,
  Mapper,
  /// A record of one concrete declared type.
  Declared(String),
}

impl fmt::Display for ProductType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Declared(name) => write!(f, "'{name}'"),
      other => write!(f, "{other:?}"),
    }
  }
}

/// The shape of a subject, used by projection selectors to construct a new
/// subject from a projected field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectShape {
  Address,
  Dir,
  Files,
  Siblings,
  Descendants,
}

/// The value a product is resolved for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
  /// One declared address.
  Address(Address),
  /// A repo-relative directory.
  Dir(String),
  /// A concrete set of file paths.
  Files(Vec<String>),
  /// "Every address declared directly in this directory."
  Siblings(String),
  /// "Every address declared at or below this directory."
  Descendants(String),
}

impl Subject {
  /// The product this subject already *is*.
  pub fn product_type(&self) -> ProductType {
    match self {
      Self::Address(_) => ProductType::Address,
      Self::Dir(_) => ProductType::Dir,
      Self::Files(_) => ProductType::FilePaths,
      Self::Siblings(_) => ProductType::Siblings,
      Self::Descendants(_) => ProductType::Descendants,
    }
  }

  /// The subject itself as a product value, for the is-a short-circuit.
  pub fn as_value(&self) -> ProductValue {
    match self {
      Self::Address(address) => ProductValue::Address(address.clone()),
      Self::Dir(dir) => ProductValue::Dir(dir.clone()),
      Self::Files(paths) => ProductValue::FilePaths(Arc::new(paths.clone())),
      Self::Siblings(dir) => ProductValue::Siblings(dir.clone()),
      Self::Descendants(dir) => ProductValue::Descendants(dir.clone()),
    }
  }

  /// Build a subject of the given shape from a projected field value.
  pub fn from_projection(shape: SubjectShape, projected: Projected) -> Option<Self> {
    match (shape, projected) {
      (SubjectShape::Dir, Projected::Dir(dir)) => Some(Self::Dir(dir)),
      (SubjectShape::Files, Projected::Files(paths)) => Some(Self::Files(paths)),
      (SubjectShape::Siblings, Projected::Dir(dir)) => Some(Self::Siblings(dir)),
      (SubjectShape::Descendants, Projected::Dir(dir)) => Some(Self::Descendants(dir)),
      _ => None,
    }
  }
}

impl fmt::Display for Subject {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Address(address) => write!(f, "{address}"),
      Self::Dir(dir) => write!(f, "dir '{dir}'"),
      Self::Files(paths) => write!(f, "{} file(s)", paths.len()),
      Self::Siblings(dir) => write!(f, "{dir}:"),
      Self::Descendants(dir) => write!(f, "{dir}::"),
    }
  }
}

/// A field value extracted from a product by a projection selector.
#[derive(Debug, Clone)]
pub enum Projected {
  Dir(String),
  Files(Vec<String>),
}

/// A resolved product value. Cheap to clone: bulky payloads are `Arc`-shared.
#[derive(Debug, Clone)]
pub enum ProductValue {
  Address(Address),
  Dir(String),
  FilePaths(Arc<Vec<String>>),
  Siblings(String),
  Descendants(String),
  Listing(Arc<Listing>),
  BuildFiles(Arc<Vec<String>>),
  FileContents(Arc<Vec<FileContent>>),
  SubDirs(Arc<SubDirs>),
  Family(Arc<AddressFamily>),
  Unhydrated(Arc<UnhydratedRecord>),
  Record(Arc<Record>),
  Addresses(Arc<Vec<Address>>),
  Mapper(Arc<AddressMapper>),
  /// The ordered results of a Dependencies selector.
  Batch(Vec<ProductValue>),
}

impl ProductValue {
  /// Extract a named field for a projection selector.
  pub fn project(&self, field: &str) -> Option<Projected> {
    match (self, field) {
      (Self::Address(address), "spec_path") => {
        Some(Projected::Dir(address.spec_path().to_string()))
      }
      (Self::Siblings(dir) | Self::Descendants(dir), "directory") => {
        Some(Projected::Dir(dir.clone()))
      }
      (Self::BuildFiles(paths), "paths") => Some(Projected::Files((**paths).clone())),
      _ => None,
    }
  }

  /// Read a named field as an ordered list of new subjects, for a
  /// Dependencies selector.
  pub fn subject_list(&self, field: &str) -> Option<Vec<Subject>> {
    match (self, field) {
      (Self::Unhydrated(unhydrated), "dependencies") => Some(
        unhydrated
          .references()
          .iter()
          .cloned()
          .map(Subject::Address)
          .collect(),
      ),
      (Self::SubDirs(subdirs), "dirs") => Some(
        subdirs
          .dirs
          .iter()
          .cloned()
          .map(Subject::Dir)
          .collect(),
      ),
      (Self::Record(record), field) => match record.field(field)? {
        crate::value::Value::List(items) => items
          .iter()
          .map(|item| match item {
            crate::value::Value::Address(address) => Some(Subject::Address(address.clone())),
            _ => None,
          })
          .collect(),
        _ => None,
      },
      _ => None,
    }
  }

  pub fn expect_address(self) -> Result<Address, ResolveError> {
    match self {
      Self::Address(address) => Ok(address),
      other => Err(unexpected("Address", &other)),
    }
  }

  pub fn expect_dir(self) -> Result<String, ResolveError> {
    match self {
      Self::Dir(dir) => Ok(dir),
      other => Err(unexpected("Dir", &other)),
    }
  }

  pub fn expect_file_paths(self) -> Result<Arc<Vec<String>>, ResolveError> {
    match self {
      Self::FilePaths(paths) => Ok(paths),
      other => Err(unexpected("FilePaths", &other)),
    }
  }

  pub fn expect_listing(self) -> Result<Arc<Listing>, ResolveError> {
    match self {
      Self::Listing(listing) => Ok(listing),
      other => Err(unexpected("Listing", &other)),
    }
  }

  pub fn expect_file_contents(self) -> Result<Arc<Vec<FileContent>>, ResolveError> {
    match self {
      Self::FileContents(contents) => Ok(contents),
      other => Err(unexpected("FileContents", &other)),
    }
  }

  pub fn expect_family(self) -> Result<Arc<AddressFamily>, ResolveError> {
    match self {
      Self::Family(family) => Ok(family),
      other => Err(unexpected("Family", &other)),
    }
  }

  pub fn expect_unhydrated(self) -> Result<Arc<UnhydratedRecord>, ResolveError> {
    match self {
      Self::Unhydrated(unhydrated) => Ok(unhydrated),
      other => Err(unexpected("Unhydrated", &other)),
    }
  }

  pub fn expect_record(self) -> Result<Arc<Record>, ResolveError> {
    match self {
      Self::Record(record) => Ok(record),
      other => Err(unexpected("Record", &other)),
    }
  }

  pub fn expect_addresses(self) -> Result<Arc<Vec<Address>>, ResolveError> {
    match self {
      Self::Addresses(addresses) => Ok(addresses),
      other => Err(unexpected("Addresses", &other)),
    }
  }

  pub fn expect_mapper(self) -> Result<Arc<AddressMapper>, ResolveError> {
    match self {
      Self::Mapper(mapper) => Ok(mapper),
      other => Err(unexpected("Mapper", &other)),
    }
  }

  pub fn expect_batch(self) -> Result<Vec<ProductValue>, ResolveError> {
    match self {
      Self::Batch(values) => Ok(values),
      other => Err(unexpected("Batch", &other)),
    }
  }
}

fn unexpected(wanted: &str, got: &ProductValue) -> ResolveError {
  ResolveError::Internal(format!("rule input expected {wanted}, got {got:?}"))
}
