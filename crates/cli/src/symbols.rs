//! The built-in symbol table the CLI registers with the engine.
//!
//! Embedding applications supply their own record types; this small set is
//! enough to drive the engine over real directories from the command line.

use std::sync::Arc;

use qry_engine::{Record, RecordType, SymbolTable, SymbolTableBuilder, TypeConstraint, Value};

pub fn builtin_symbols() -> SymbolTable {
  SymbolTableBuilder::new()
    .define("library", RecordType::new().addressable("config"))
    .define(
      "binary",
      RecordType::new()
        .addressable("config")
        .constraint("lib", TypeConstraint::Exactly("library".to_string())),
    )
    .define("resources", RecordType::new())
    .define(
      "remote",
      RecordType::new().validator(Arc::new(|record: &Record| match record.field("url") {
        Some(Value::Str(url)) if !url.is_empty() => Ok(()),
        _ => Err("a non-empty 'url' field is required".to_string()),
      })),
    )
    .build()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn all_builtin_types_are_registered() {
    let symbols = builtin_symbols();
    for name in ["library", "binary", "resources", "remote"] {
      assert!(symbols.contains(name), "missing type {name}");
    }
  }
}
