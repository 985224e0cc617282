//! Addresses identify declared records within the build namespace.
//!
//! An [`Address`] pairs the repo-relative directory a record was declared in
//! (its `spec_path`) with the record's local name. Address references written
//! inside build files are parsed relative to the directory of the declaring
//! file; target specs given on the command line are parsed relative to the
//! build root.

use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Errors raised while parsing address spec strings and target specs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
  /// The spec had no local name component.
  #[error("address spec '{0}' has an empty name")]
  EmptyName(String),

  /// The spec's directory component is not a valid repo-relative path.
  #[error("address spec '{0}' is not a valid repo-relative path: {1}")]
  BadPath(String, &'static str),
}

/// A globally unique identifier for one declared record.
///
/// Equality, ordering and hashing consider both fields. The directory of the
/// build root is the empty string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
  spec_path: String,
  name: String,
}

impl Address {
  pub fn new(spec_path: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      spec_path: spec_path.into(),
      name: name.into(),
    }
  }

  /// Parse an address reference relative to an owning directory.
  ///
  /// Supported forms:
  /// - `"name"` or `":name"` — a sibling of `relative_to`
  /// - `"some/dir:name"` — fully qualified
  /// - `"some/dir"` — directory with the default name (its basename)
  pub fn parse(spec: &str, relative_to: &str) -> Result<Self, AddressError> {
    if let Some((dir, name)) = spec.split_once(':') {
      if name.is_empty() {
        return Err(AddressError::EmptyName(spec.to_string()));
      }
      if name.contains(':') {
        return Err(AddressError::BadPath(spec.to_string(), "more than one ':'"));
      }
      if dir.is_empty() {
        Ok(Self::new(relative_to, name))
      } else {
        Ok(Self::new(normalize_dir(spec, dir)?, name))
      }
    } else if spec.contains('/') {
      let dir = normalize_dir(spec, spec)?;
      let name = dir
        .rsplit('/')
        .next()
        .unwrap_or(dir.as_str())
        .to_string();
      if name.is_empty() {
        return Err(AddressError::EmptyName(spec.to_string()));
      }
      Ok(Self::new(dir, name))
    } else if spec.is_empty() {
      Err(AddressError::EmptyName(spec.to_string()))
    } else {
      Ok(Self::new(relative_to, spec))
    }
  }

  /// The repo-relative directory this address lives in.
  pub fn spec_path(&self) -> &str {
    &self.spec_path
  }

  /// The local name within the directory.
  pub fn name(&self) -> &str {
    &self.name
  }
}

impl fmt::Display for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.spec_path, self.name)
  }
}

impl Serialize for Address {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.to_string())
  }
}

/// A command-line request for one or more addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
  /// `dir:name` — a single address.
  Single(Address),
  /// `dir:` — every address declared directly in `dir`.
  Siblings(String),
  /// `dir::` — every address declared at or below `dir`.
  Descendants(String),
}

impl TargetSpec {
  pub fn parse(spec: &str) -> Result<Self, AddressError> {
    if let Some(dir) = spec.strip_suffix("::") {
      Ok(Self::Descendants(normalize_dir(spec, dir)?))
    } else if let Some(dir) = spec.strip_suffix(':') {
      Ok(Self::Siblings(normalize_dir(spec, dir)?))
    } else {
      Ok(Self::Single(Address::parse(spec, "")?))
    }
  }
}

impl fmt::Display for TargetSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Single(address) => write!(f, "{address}"),
      Self::Siblings(dir) => write!(f, "{dir}:"),
      Self::Descendants(dir) => write!(f, "{dir}::"),
    }
  }
}

/// Normalize a repo-relative directory path: strip empty and `.` segments,
/// reject absolute paths and `..`.
pub(crate) fn normalize_dir(spec: &str, raw: &str) -> Result<String, AddressError> {
  if raw.starts_with('/') {
    return Err(AddressError::BadPath(
      spec.to_string(),
      "absolute paths are not allowed",
    ));
  }
  let mut parts = Vec::new();
  for segment in raw.split('/') {
    match segment {
      "" | "." => continue,
      ".." => {
        return Err(AddressError::BadPath(
          spec.to_string(),
          "'..' escapes the build root",
        ));
      }
      other => parts.push(other),
    }
  }
  Ok(parts.join("/"))
}
