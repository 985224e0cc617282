//! End-to-end resolution over real build directories.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;

use qry_engine::{
  Address, AddressMapper, JsonParser, ProductType, ProductValue, Record, RecordType, ResolveError,
  Resolver, Rule, RuleRegistry, Selector, SourceParser, Subject, SymbolTable, SymbolTableBuilder,
  TargetSpec, Value, graph_rules,
};

fn symbols() -> SymbolTable {
  SymbolTableBuilder::new()
    .define(
      "library",
      RecordType::new().addressable("config").addressable("sources"),
    )
    .define("binary", RecordType::new().addressable("config"))
    .build()
}

/// A parser wrapper that counts invocations, for the single-flight tests.
struct CountingParser {
  inner: JsonParser,
  calls: Arc<AtomicUsize>,
}

impl SourceParser for CountingParser {
  fn parse(
    &self,
    file: &str,
    content: &[u8],
    symbols: &SymbolTable,
  ) -> Result<Vec<(String, Record)>, ResolveError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.inner.parse(file, content, symbols)
  }
}

struct Fixture {
  _temp: TempDir,
  resolver: Resolver,
  parse_calls: Arc<AtomicUsize>,
}

/// Build a temp build root from `(path, content)` pairs and wire a resolver
/// over it, optionally with extra consumer rules.
fn fixture_with_rules(
  files: &[(&str, &str)],
  extra_rules: impl FnOnce(&Arc<AddressMapper>) -> Vec<Rule>,
) -> Fixture {
  let temp = TempDir::new().unwrap();
  for (path, content) in files {
    let absolute = temp.path().join(path);
    std::fs::create_dir_all(absolute.parent().unwrap()).unwrap();
    std::fs::write(absolute, content).unwrap();
  }
  let parse_calls = Arc::new(AtomicUsize::new(0));
  let parser = CountingParser {
    inner: JsonParser,
    calls: Arc::clone(&parse_calls),
  };
  let mapper = Arc::new(AddressMapper::new(symbols(), Arc::new(parser)));
  let fs = Arc::new(qry_engine::OsFileSystem::new(temp.path()));
  let mut rules = graph_rules(Arc::clone(&mapper), fs);
  rules.extend(extra_rules(&mapper));
  Fixture {
    _temp: temp,
    resolver: Resolver::new(RuleRegistry::new(rules)),
    parse_calls,
  }
}

fn fixture(files: &[(&str, &str)]) -> Fixture {
  fixture_with_rules(files, |_| vec![])
}

async fn hydrated(resolver: &Resolver, spec: &str) -> Result<Arc<Record>, ResolveError> {
  let address = Address::parse(spec, "").unwrap();
  resolver
    .resolve(ProductType::Record, Subject::Address(address))
    .await?
    .expect_record()
}

#[tokio::test]
async fn family_is_the_union_of_sibling_files() {
  let fx = fixture(&[
    (
      "lib/BUILD.json",
      r#"[{"type": "library", "name": "alpha", "x": 1}]"#,
    ),
    (
      "lib/BUILD.extra.json",
      r#"[{"type": "library", "name": "beta", "config": "alpha"}]"#,
    ),
    ("lib/ignored.txt", "not a build file"),
  ]);

  let addresses = fx
    .resolver
    .addresses(&TargetSpec::parse("lib:").unwrap())
    .await
    .unwrap();
  assert_eq!(
    addresses,
    vec![Address::new("lib", "alpha"), Address::new("lib", "beta")]
  );
}

#[tokio::test]
async fn referenced_field_hydrates_to_the_referenced_record() {
  let fx = fixture(&[
    (
      "lib/BUILD.json",
      r#"[{"type": "library", "name": "alpha", "x": 1}]"#,
    ),
    (
      "lib/BUILD.extra.json",
      r#"[{"type": "binary", "name": "beta", "config": "alpha"}]"#,
    ),
  ]);

  let beta = hydrated(&fx.resolver, "lib:beta").await.unwrap();
  let config = beta.field("config").unwrap().as_record().unwrap();
  assert_eq!(config.type_name(), "library");
  assert_eq!(config.field("x"), Some(&Value::Int(1)));
  // The referenced record is itself hydrated: it carries its spec_path.
  assert_eq!(config.field("spec_path"), Some(&Value::str("lib")));
  assert_eq!(beta.field("address"), Some(&Value::Address(Address::new("lib", "beta"))));
}

#[tokio::test]
async fn references_cross_directories() {
  let fx = fixture(&[
    (
      "app/BUILD.json",
      r#"[{"type": "binary", "name": "main", "config": "lib/base:core"}]"#,
    ),
    (
      "lib/base/BUILD.json",
      r#"[{"type": "library", "name": "core"}]"#,
    ),
  ]);

  let main = hydrated(&fx.resolver, "app:main").await.unwrap();
  let config = main.field("config").unwrap().as_record().unwrap();
  assert_eq!(config.field("spec_path"), Some(&Value::str("lib/base")));
}

#[tokio::test]
async fn sibling_conflict_names_both_files_and_the_address() {
  let fx = fixture(&[
    ("lib/BUILD.json", r#"[{"type": "library", "name": "gamma"}]"#),
    (
      "lib/BUILD.extra.json",
      r#"[{"type": "library", "name": "gamma"}]"#,
    ),
  ]);

  let err = hydrated(&fx.resolver, "lib:gamma").await.unwrap_err();
  match err {
    ResolveError::SiblingConflict {
      name,
      first_file,
      second_file,
      ..
    } => {
      assert_eq!(name, "gamma");
      assert_eq!(first_file, "lib/BUILD.extra.json");
      assert_eq!(second_file, "lib/BUILD.json");
    }
    other => panic!("expected SiblingConflict, got {other:?}"),
  }
}

#[tokio::test]
async fn intra_file_conflict_wins_over_cross_file_merge() {
  let fx = fixture(&[
    (
      "lib/BUILD.json",
      r#"[
        {"type": "library", "name": "dup"},
        {"type": "library", "name": "dup"}
      ]"#,
    ),
    ("lib/BUILD.extra.json", r#"[{"type": "library", "name": "dup"}]"#),
  ]);

  let err = hydrated(&fx.resolver, "lib:dup").await.unwrap_err();
  assert!(
    matches!(err, ResolveError::IntraFileConflict { ref file, .. } if file == "lib/BUILD.json"),
    "got {err:?}"
  );
}

#[tokio::test]
async fn unknown_address_lists_the_valid_ones() {
  let fx = fixture(&[(
    "lib/BUILD.json",
    r#"[{"type": "library", "name": "alpha"}]"#,
  )]);

  let err = hydrated(&fx.resolver, "lib:nope").await.unwrap_err();
  match err {
    ResolveError::NotFound { address, available } => {
      assert_eq!(address, "lib:nope");
      assert_eq!(available, vec!["lib:alpha".to_string()]);
    }
    other => panic!("expected NotFound, got {other:?}"),
  }
}

#[tokio::test]
async fn parse_failure_surfaces_as_resolution_failure() {
  let fx = fixture(&[("lib/BUILD.json", "[ not json")]);
  let err = hydrated(&fx.resolver, "lib:anything").await.unwrap_err();
  assert!(matches!(err, ResolveError::Parse { .. }), "got {err:?}");
}

#[tokio::test]
async fn descendant_spec_enumerates_the_whole_tree() {
  let fx = fixture(&[
    ("BUILD.json", r#"[{"type": "library", "name": "root"}]"#),
    ("lib/BUILD.json", r#"[{"type": "library", "name": "mid"}]"#),
    (
      "lib/deep/BUILD.json",
      r#"[{"type": "library", "name": "leaf"}]"#,
    ),
    ("other/note.txt", "no declarations here"),
  ]);

  let addresses = fx
    .resolver
    .addresses(&TargetSpec::parse("::").unwrap())
    .await
    .unwrap();
  assert_eq!(
    addresses,
    vec![
      Address::new("", "root"),
      Address::new("lib", "mid"),
      Address::new("lib/deep", "leaf"),
    ]
  );

  let scoped = fx
    .resolver
    .addresses(&TargetSpec::parse("lib::").unwrap())
    .await
    .unwrap();
  assert_eq!(
    scoped,
    vec![Address::new("lib", "mid"), Address::new("lib/deep", "leaf")]
  );
}

#[tokio::test]
async fn products_for_spec_hydrates_every_address_in_order() {
  let fx = fixture(&[(
    "lib/BUILD.json",
    r#"[
      {"type": "library", "name": "a"},
      {"type": "library", "name": "b"}
    ]"#,
  )]);

  let products = fx
    .resolver
    .products_for_spec(&TargetSpec::parse("lib:").unwrap(), ProductType::Record)
    .await
    .unwrap();
  assert_eq!(products.len(), 2);
  assert_eq!(products[0].0, Address::new("lib", "a"));
  assert_eq!(products[1].0, Address::new("lib", "b"));
}

#[tokio::test]
async fn dependencies_are_lazy_but_requestable() {
  let fx = fixture_with_rules(
    &[
      (
        "lib/BUILD.json",
        r#"[{"type": "library", "name": "it", "dependencies": ["dep"]}]"#,
      ),
      (
        "lib/BUILD.extra.json",
        r#"[{"type": "library", "name": "dep", "y": 2}]"#,
      ),
    ],
    |_mapper| {
      // A consumer rule that explicitly asks for the products of the
      // dependency list, the only way those addresses ever resolve.
      vec![Rule::from_fn(
        "dependency-closure",
        ProductType::Declared("closure".to_string()),
        vec![Selector::dependencies(
          ProductType::Record,
          ProductType::Record,
          "dependencies",
        )],
        |_subject, inputs| async move { Ok(inputs.into_iter().next().expect("one input")) },
      )]
    },
  );

  // Eager hydration leaves the dependency unresolved -- as an address.
  let it = hydrated(&fx.resolver, "lib:it").await.unwrap();
  let Some(Value::List(deps)) = it.field("dependencies") else {
    panic!("dependencies should stay a list");
  };
  assert_eq!(deps[0], Value::Address(Address::new("lib", "dep")));

  // But the explicit request resolves the dependency's record.
  let address = Address::new("lib", "it");
  let batch = fx
    .resolver
    .resolve(
      ProductType::Declared("closure".to_string()),
      Subject::Address(address),
    )
    .await
    .unwrap()
    .expect_batch()
    .unwrap();
  assert_eq!(batch.len(), 1);
  let dep = batch.into_iter().next().unwrap().expect_record().unwrap();
  assert_eq!(dep.field("y"), Some(&Value::Int(2)));
}

#[tokio::test]
async fn concurrent_hydration_parses_each_file_once() {
  let fx = fixture(&[(
    "lib/BUILD.json",
    r#"[{"type": "library", "name": "alpha", "x": 1}]"#,
  )]);

  let left = hydrated(&fx.resolver, "lib:alpha");
  let right = hydrated(&fx.resolver, "lib:alpha");
  let (left, right) = tokio::join!(left, right);
  let (left, right) = (left.unwrap(), right.unwrap());

  assert_eq!(left.field("x"), right.field("x"));
  assert_eq!(fx.parse_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn mutual_references_report_a_cycle() {
  let fx = fixture(&[(
    "lib/BUILD.json",
    r#"[
      {"type": "library", "name": "ping", "config": "pong"},
      {"type": "library", "name": "pong", "config": "ping"}
    ]"#,
  )]);

  let err = hydrated(&fx.resolver, "lib:ping").await.unwrap_err();
  assert!(matches!(err, ResolveError::Cycle { .. }), "got {err:?}");
}

#[tokio::test]
async fn empty_directory_yields_an_empty_family() {
  let fx = fixture(&[("lib/note.txt", "nothing declared")]);
  let addresses = fx
    .resolver
    .addresses(&TargetSpec::parse("lib:").unwrap())
    .await
    .unwrap();
  assert!(addresses.is_empty());
}

#[tokio::test]
async fn declared_type_products_filter_by_type() {
  let fx = fixture(&[(
    "lib/BUILD.json",
    r#"[
      {"type": "library", "name": "lib"},
      {"type": "binary", "name": "bin"}
    ]"#,
  )]);

  let as_library = fx
    .resolver
    .resolve(
      ProductType::Declared("library".to_string()),
      Subject::Address(Address::new("lib", "lib")),
    )
    .await
    .unwrap()
    .expect_record()
    .unwrap();
  assert_eq!(as_library.type_name(), "library");

  let err = fx
    .resolver
    .resolve(
      ProductType::Declared("library".to_string()),
      Subject::Address(Address::new("lib", "bin")),
    )
    .await
    .unwrap_err();
  assert!(matches!(err, ResolveError::NoSource { .. }), "got {err:?}");
}
