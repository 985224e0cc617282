//! The unified error type for namespace construction and resolution.
//!
//! Every variant is cheap to clone so a single failure can fan out to all
//! concurrent waiters of one resolution key. `NoSource` is the only *soft*
//! error: it means a candidate rule could not be satisfied for a subject and
//! the engine should try the next candidate; every other variant aborts the
//! triggering request.

use thiserror::Error;

use crate::address::AddressError;

/// Errors that can occur while building namespaces or resolving products.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
  /// The same address is declared in two build files of one directory.
  #[error(
    "address '{name}' in directory '{dir}' is declared in both '{first_file}' and '{second_file}'"
  )]
  SiblingConflict {
    dir: String,
    name: String,
    first_file: String,
    second_file: String,
  },

  /// The same address is declared twice within one build file.
  #[error("address '{name}' is declared more than once in '{file}'")]
  IntraFileConflict { file: String, name: String },

  /// A build file's content could not be parsed.
  #[error("failed to parse '{file}' at line {line}, column {column}:\n{detail}")]
  Parse {
    file: String,
    line: usize,
    column: usize,
    detail: String,
  },

  /// A build file parsed but its declarations were semantically invalid.
  #[error("invalid declaration in {context}: {detail}")]
  Execute { context: String, detail: String },

  /// A requested address is absent from its directory's namespace.
  #[error("no record found at address '{address}'; did you mean one of:\n  {}", available.join("\n  "))]
  NotFound {
    address: String,
    available: Vec<String>,
  },

  /// A resolved value did not satisfy a field's declared type constraint.
  #[error(
    "field '{field}' of '{address}' expected {expected} but resolved to a '{actual}' record"
  )]
  TypeMismatch {
    address: String,
    field: String,
    expected: String,
    actual: String,
  },

  /// A hydrated record's self-check rejected it.
  #[error("'{address}' is not a valid '{type_name}': {detail}")]
  Validation {
    address: String,
    type_name: String,
    detail: String,
  },

  /// No rule could supply the product for the subject. Soft: the engine moves
  /// on to the next candidate rule, and only surfaces this if none succeeds.
  #[error("no source of {product} for {subject}")]
  NoSource { product: String, subject: String },

  /// More than one rule supplied the product for the subject.
  #[error("more than one source of {product} for {subject}")]
  MultipleSources { product: String, subject: String },

  /// A member of an explicitly requested dependency list had no source.
  #[error("no source of explicit dependency {subject}")]
  NoDependencySource { subject: String },

  /// A resolution request reached back into a key it is computing.
  #[error("cycle detected: {from} depends on {to}, which depends back on {from}")]
  Cycle { from: String, to: String },

  /// A filesystem collaborator call failed.
  #[error("io error for '{path}': {detail}")]
  Io { path: String, detail: String },

  /// An internal invariant was violated.
  #[error("internal error: {0}")]
  Internal(String),
}

impl ResolveError {
  /// Whether this error marks an unsatisfiable rule rather than a failure.
  pub fn is_soft(&self) -> bool {
    matches!(self, Self::NoSource { .. })
  }

  /// Wrap an [`AddressError`] raised while handling declarations in `context`
  /// (a build file path or an owning address).
  pub(crate) fn bad_address(context: impl Into<String>, err: AddressError) -> Self {
    Self::Execute {
      context: context.into(),
      detail: err.to_string(),
    }
  }
}
