//! The declaration-execution collaborator boundary.
//!
//! Turning one build file's bytes into declared records is the only place
//! arbitrary declaration content is interpreted, and the engine treats it as
//! a black box behind the [`SourceParser`] trait: same bytes in, same records
//! out, or a parse/execute error. [`JsonParser`] is the in-tree, purely
//! data-driven implementation — a build file is a JSON array of objects, each
//! carrying `"type"` and `"name"` plus its fields.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ResolveError;
use crate::namespace::AddressMap;
use crate::record::{ADDRESS_FIELD, NAME_FIELD, Record, SPEC_PATH_FIELD, SymbolTable};
use crate::value::Value;

/// Parses one build file into `(name, record)` pairs in declaration order.
///
/// Implementations must be deterministic for identical input bytes.
pub trait SourceParser: Send + Sync {
  fn parse(
    &self,
    file: &str,
    content: &[u8],
    symbols: &SymbolTable,
  ) -> Result<Vec<(String, Record)>, ResolveError>;
}

/// Bundles the symbol table, the parser and the build file name pattern.
///
/// Injected into the parsing rules through a Literal selector, so the rules
/// themselves stay pure data transforms.
pub struct AddressMapper {
  symbols: SymbolTable,
  parser: Arc<dyn SourceParser>,
  build_stem: String,
}

impl AddressMapper {
  pub fn new(symbols: SymbolTable, parser: Arc<dyn SourceParser>) -> Self {
    Self {
      symbols,
      parser,
      build_stem: "BUILD".to_string(),
    }
  }

  /// Override the default `BUILD` file name stem.
  pub fn with_build_stem(mut self, stem: impl Into<String>) -> Self {
    self.build_stem = stem.into();
    self
  }

  pub fn symbols(&self) -> &SymbolTable {
    &self.symbols
  }

  /// Whether a file name matches the build file pattern: `STEM.json` or
  /// `STEM.<anything>.json`.
  pub fn is_build_file(&self, name: &str) -> bool {
    name.strip_prefix(&self.build_stem)
      .and_then(|rest| rest.strip_prefix('.'))
      .is_some_and(|_| name.ends_with(".json"))
  }

  /// Parse one build file into its conflict-checked [`AddressMap`].
  pub fn parse_address_map(
    &self,
    file: &str,
    content: &[u8],
  ) -> Result<AddressMap, ResolveError> {
    let entries = self.parser.parse(file, content, &self.symbols)?;
    AddressMap::new(file, entries)
  }
}

impl fmt::Debug for AddressMapper {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AddressMapper")
      .field("build_stem", &self.build_stem)
      .field("symbols", &self.symbols.names().collect::<Vec<_>>())
      .finish()
  }
}

/// The in-tree [`SourceParser`]: a build file is a JSON array of objects.
#[derive(Debug, Default, Clone)]
pub struct JsonParser;

impl SourceParser for JsonParser {
  fn parse(
    &self,
    file: &str,
    content: &[u8],
    symbols: &SymbolTable,
  ) -> Result<Vec<(String, Record)>, ResolveError> {
    let root: serde_json::Value = serde_json::from_slice(content).map_err(|e| {
      ResolveError::Parse {
        file: file.to_string(),
        line: e.line(),
        column: e.column(),
        detail: format!("{e}\n{}", snippet(content, e.line())),
      }
    })?;

    let serde_json::Value::Array(elements) = root else {
      return Err(execute(file, "top-level value must be an array of declarations"));
    };

    let mut entries = Vec::with_capacity(elements.len());
    for element in elements {
      let serde_json::Value::Object(mut members) = element else {
        return Err(execute(file, "each declaration must be a JSON object"));
      };
      let type_name = match members.remove("type") {
        Some(serde_json::Value::String(t)) => t,
        Some(_) => return Err(execute(file, "declaration 'type' must be a string")),
        None => return Err(execute(file, "declaration is missing a 'type' member")),
      };
      if !symbols.contains(&type_name) {
        return Err(execute(
          file,
          &format!(
            "unknown declaration type '{type_name}'; known types: {}",
            symbols.names().collect::<Vec<_>>().join(", ")
          ),
        ));
      }
      let name = match members.get(NAME_FIELD) {
        Some(serde_json::Value::String(n)) if !n.is_empty() => n.clone(),
        Some(_) => return Err(execute(file, "declaration 'name' must be a non-empty string")),
        None => return Err(execute(file, "declaration is missing a 'name' member")),
      };

      let mut fields = BTreeMap::new();
      for (key, value) in members {
        if key == SPEC_PATH_FIELD || key == ADDRESS_FIELD {
          return Err(execute(
            file,
            &format!("declaration '{name}' sets reserved field '{key}'"),
          ));
        }
        fields.insert(key, convert(value, symbols));
      }
      entries.push((name, Record::from_fields(type_name, fields)));
    }
    Ok(entries)
  }
}

/// Convert parsed JSON into the engine's value tree. An object whose `type`
/// member names a registered record type becomes a literal nested record;
/// every other object is a plain map.
fn convert(json: serde_json::Value, symbols: &SymbolTable) -> Value {
  match json {
    serde_json::Value::Null => Value::Null,
    serde_json::Value::Bool(b) => Value::Bool(b),
    serde_json::Value::Number(n) => {
      if let Some(i) = n.as_i64() {
        Value::Int(i)
      } else {
        Value::Float(n.as_f64().unwrap_or(f64::NAN))
      }
    }
    serde_json::Value::String(s) => Value::Str(s),
    serde_json::Value::Array(items) => {
      Value::List(items.into_iter().map(|i| convert(i, symbols)).collect())
    }
    serde_json::Value::Object(mut members) => {
      let nested_type = match members.get("type") {
        Some(serde_json::Value::String(t)) if symbols.contains(t) => Some(t.clone()),
        _ => None,
      };
      if let Some(type_name) = nested_type {
        members.remove("type");
        let fields = members
          .into_iter()
          .map(|(k, v)| (k, convert(v, symbols)))
          .collect();
        Value::Record(Record::from_fields(type_name, fields))
      } else {
        Value::Map(
          members
            .into_iter()
            .map(|(k, v)| (k, convert(v, symbols)))
            .collect(),
        )
      }
    }
  }
}

fn execute(file: &str, detail: &str) -> ResolveError {
  ResolveError::Execute {
    context: file.to_string(),
    detail: detail.to_string(),
  }
}

/// A few lines of context around a parse failure, offending line marked.
fn snippet(content: &[u8], line: usize) -> String {
  let text = String::from_utf8_lossy(content);
  let first = line.saturating_sub(3).max(1);
  let mut out = String::new();
  for (idx, content_line) in text.lines().enumerate() {
    let number = idx + 1;
    if number < first || number > line + 3 {
      continue;
    }
    let marker = if number == line { ">" } else { " " };
    out.push_str(&format!("{marker} {number:>4} | {content_line}\n"));
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::address::Address;
  use crate::record::{RecordType, SymbolTableBuilder};

  fn symbols() -> SymbolTable {
    SymbolTableBuilder::new()
      .define("library", RecordType::new().addressable("config"))
      .define("binary", RecordType::new())
      .build()
  }

  fn mapper() -> AddressMapper {
    AddressMapper::new(symbols(), Arc::new(JsonParser))
  }

  #[test]
  fn build_file_pattern() {
    let mapper = mapper();
    assert!(mapper.is_build_file("BUILD.json"));
    assert!(mapper.is_build_file("BUILD.extra.json"));
    assert!(!mapper.is_build_file("BUILDx.json"));
    assert!(!mapper.is_build_file("BUILD.txt"));
    assert!(!mapper.is_build_file("build.json"));
  }

  #[test]
  fn parses_declarations_in_order() {
    let content = br#"[
      {"type": "library", "name": "alpha", "x": 1},
      {"type": "binary", "name": "beta"}
    ]"#;
    let entries = JsonParser.parse("lib/BUILD.json", content, &symbols()).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0, "alpha");
    assert_eq!(entries[0].1.type_name(), "library");
    assert_eq!(entries[0].1.field("x"), Some(&Value::Int(1)));
    assert_eq!(entries[0].1.field("name"), Some(&Value::str("alpha")));
    assert_eq!(entries[1].0, "beta");
  }

  #[test]
  fn syntax_error_carries_position_and_snippet() {
    let content = b"[\n  {\"type\": \"library\", \"name\": }\n]";
    let err = JsonParser.parse("BUILD.json", content, &symbols()).unwrap_err();
    match err {
      ResolveError::Parse { file, line, detail, .. } => {
        assert_eq!(file, "BUILD.json");
        assert_eq!(line, 2);
        assert!(detail.contains(">    2 |"), "snippet missing marker: {detail}");
      }
      other => panic!("expected Parse, got {other:?}"),
    }
  }

  #[test]
  fn unknown_type_is_execute_error() {
    let content = br#"[{"type": "jar", "name": "x"}]"#;
    let err = JsonParser.parse("BUILD.json", content, &symbols()).unwrap_err();
    match err {
      ResolveError::Execute { detail, .. } => assert!(detail.contains("jar")),
      other => panic!("expected Execute, got {other:?}"),
    }
  }

  #[test]
  fn missing_name_is_execute_error() {
    let content = br#"[{"type": "library"}]"#;
    assert!(matches!(
      JsonParser.parse("BUILD.json", content, &symbols()),
      Err(ResolveError::Execute { .. })
    ));
  }

  #[test]
  fn reserved_fields_are_rejected() {
    let content = br#"[{"type": "library", "name": "x", "spec_path": "lib"}]"#;
    assert!(matches!(
      JsonParser.parse("BUILD.json", content, &symbols()),
      Err(ResolveError::Execute { .. })
    ));
  }

  #[test]
  fn nested_object_with_known_type_becomes_record() {
    let content = br#"[{
      "type": "library", "name": "x",
      "config": {"type": "binary", "flag": true},
      "meta": {"type": "unregistered", "flag": true}
    }]"#;
    let entries = JsonParser.parse("BUILD.json", content, &symbols()).unwrap();
    let record = &entries[0].1;
    assert!(matches!(record.field("config"), Some(Value::Record(r)) if r.type_name() == "binary"));
    assert!(matches!(record.field("meta"), Some(Value::Map(_))));
  }

  #[test]
  fn duplicate_name_is_intra_file_conflict() {
    let content = br#"[
      {"type": "library", "name": "dup"},
      {"type": "binary", "name": "dup"}
    ]"#;
    let err = mapper().parse_address_map("lib/BUILD.json", content).unwrap_err();
    match err {
      ResolveError::IntraFileConflict { file, name } => {
        assert_eq!(file, "lib/BUILD.json");
        assert_eq!(name, "dup");
      }
      other => panic!("expected IntraFileConflict, got {other:?}"),
    }
  }

  #[test]
  fn address_map_scopes_to_file_directory() {
    let content = br#"[{"type": "library", "name": "core"}]"#;
    let map = mapper().parse_address_map("lib/base/BUILD.json", content).unwrap();
    assert!(map.records().contains_key(&Address::new("lib/base", "core")));
  }
}
