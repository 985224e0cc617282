//! The rule registry and the built-in rule set.
//!
//! A [`Rule`] is an immutable triple: the product it outputs, the ordered
//! selectors describing its inputs, and an async transform invoked with the
//! resolved selector values in declared order. [`graph_rules`] builds the
//! engine-owned rule list — namespace parsing, reference collection, record
//! hydration, filesystem plumbing and address enumeration — plus one identity
//! rule per symbol table entry so downstream record types can be requested
//! directly without the engine knowing their shapes.
//!
//! The registry is an explicitly constructed value handed to the resolver at
//! startup; there is no ambient global rule table.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::ResolveError;
use crate::fs::FileSystem;
use crate::hydrate;
use crate::namespace::AddressFamily;
use crate::parse::AddressMapper;
use crate::product::{ProductType, ProductValue, Subject, SubjectShape};
use crate::select::Selector;

/// The boxed future a transform returns.
pub type TransformFuture =
  Pin<Box<dyn Future<Output = Result<ProductValue, ResolveError>> + Send>>;

/// A rule's transform: from the subject and the resolved selector values (in
/// declared order) to one output value.
pub type Transform =
  Arc<dyn Fn(Subject, Vec<ProductValue>) -> TransformFuture + Send + Sync>;

/// One registered computation rule.
#[derive(Clone)]
pub struct Rule {
  name: &'static str,
  product: ProductType,
  selectors: Vec<Selector>,
  transform: Transform,
}

impl Rule {
  pub fn new(
    name: &'static str,
    product: ProductType,
    selectors: Vec<Selector>,
    transform: Transform,
  ) -> Self {
    Self {
      name,
      product,
      selectors,
      transform,
    }
  }

  /// Build a rule from a plain async closure, boxing its future.
  pub fn from_fn<F, Fut>(
    name: &'static str,
    product: ProductType,
    selectors: Vec<Selector>,
    f: F,
  ) -> Self
  where
    F: Fn(Subject, Vec<ProductValue>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ProductValue, ResolveError>> + Send + 'static,
  {
    let transform: Transform =
      Arc::new(move |subject, inputs| -> TransformFuture { Box::pin(f(subject, inputs)) });
    Self::new(name, product, selectors, transform)
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  pub fn product(&self) -> &ProductType {
    &self.product
  }

  pub fn selectors(&self) -> &[Selector] {
    &self.selectors
  }

  pub fn invoke(&self, subject: Subject, inputs: Vec<ProductValue>) -> TransformFuture {
    (self.transform)(subject, inputs)
  }
}

impl std::fmt::Debug for Rule {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Rule")
      .field("name", &self.name)
      .field("product", &self.product)
      .field("selectors", &self.selectors.len())
      .finish()
  }
}

/// An immutable index of rules by output product, preserving registration
/// order among candidates for the same product.
#[derive(Debug)]
pub struct RuleRegistry {
  by_product: HashMap<ProductType, Vec<Rule>>,
}

impl RuleRegistry {
  pub fn new(rules: Vec<Rule>) -> Self {
    let mut by_product: HashMap<ProductType, Vec<Rule>> = HashMap::new();
    for rule in rules {
      by_product.entry(rule.product.clone()).or_default().push(rule);
    }
    Self { by_product }
  }

  /// Candidate rules for a product, in registration order.
  pub fn candidates(&self, product: &ProductType) -> &[Rule] {
    self
      .by_product
      .get(product)
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }
}

fn boxed<F>(future: F) -> TransformFuture
where
  F: Future<Output = Result<ProductValue, ResolveError>> + Send + 'static,
{
  Box::pin(future)
}

/// The built-in rule set for resolving declared records out of build files.
pub fn graph_rules(mapper: Arc<AddressMapper>, fs: Arc<dyn FileSystem>) -> Vec<Rule> {
  let mut rules = vec![
    hydrate_rule(&mapper),
    collect_rule(&mapper),
    parse_family_rule(&mapper),
    filter_build_files_rule(&mapper),
    list_dir_rule(&fs),
    read_files_rule(&fs),
    walk_dirs_rule(&fs),
    descend_rule(),
    sibling_addresses_rule(),
    descendant_addresses_rule(),
  ];
  for type_name in mapper.symbols().names() {
    rules.push(declared_identity_rule(type_name.to_string()));
  }
  rules
}

/// `Record ⇐ hydrate(Unhydrated, each collected reference as Record)`.
fn hydrate_rule(mapper: &Arc<AddressMapper>) -> Rule {
  let mapper = Arc::clone(mapper);
  Rule::new(
    "hydrate-record",
    ProductType::Record,
    vec![
      Selector::direct(ProductType::Unhydrated),
      Selector::dependencies(ProductType::Record, ProductType::Unhydrated, "dependencies"),
    ],
    Arc::new(move |_subject, inputs| {
      let mapper = Arc::clone(&mapper);
      boxed(async move {
        let mut inputs = inputs.into_iter();
        let unhydrated = next_input(&mut inputs)?.expect_unhydrated()?;
        let batch = next_input(&mut inputs)?.expect_batch()?;
        let resolved = batch
          .into_iter()
          .map(ProductValue::expect_record)
          .collect::<Result<Vec<_>, _>>()?;
        let record = hydrate::hydrate(&unhydrated, &resolved, mapper.symbols())?;
        Ok(ProductValue::Record(Arc::new(record)))
      })
    }),
  )
}

/// `Unhydrated ⇐ collect(Family of the address's directory, Address)`.
fn collect_rule(mapper: &Arc<AddressMapper>) -> Rule {
  let mapper = Arc::clone(mapper);
  Rule::new(
    "collect-references",
    ProductType::Unhydrated,
    vec![
      Selector::projection(
        ProductType::Family,
        SubjectShape::Dir,
        "spec_path",
        ProductType::Address,
      ),
      Selector::direct(ProductType::Address),
    ],
    Arc::new(move |_subject, inputs| {
      let mapper = Arc::clone(&mapper);
      boxed(async move {
        let mut inputs = inputs.into_iter();
        let family = next_input(&mut inputs)?.expect_family()?;
        let address = next_input(&mut inputs)?.expect_address()?;
        let unhydrated = hydrate::collect(&family, &address, mapper.symbols())?;
        Ok(ProductValue::Unhydrated(Arc::new(unhydrated)))
      })
    }),
  )
}

/// `Family ⇐ parse + merge every build file of the directory`.
fn parse_family_rule(mapper: &Arc<AddressMapper>) -> Rule {
  let literal = ProductValue::Mapper(Arc::clone(mapper));
  Rule::new(
    "parse-family",
    ProductType::Family,
    vec![
      Selector::literal(literal, ProductType::Mapper),
      Selector::direct(ProductType::Dir),
      Selector::projection(
        ProductType::FileContents,
        SubjectShape::Files,
        "paths",
        ProductType::BuildFiles,
      ),
    ],
    Arc::new(move |_subject, inputs| {
      boxed(async move {
        let mut inputs = inputs.into_iter();
        let mapper = next_input(&mut inputs)?.expect_mapper()?;
        let dir = next_input(&mut inputs)?.expect_dir()?;
        let contents = next_input(&mut inputs)?.expect_file_contents()?;
        let mut maps = Vec::with_capacity(contents.len());
        for file in contents.iter() {
          maps.push(mapper.parse_address_map(&file.path, &file.content)?);
        }
        let family = AddressFamily::new(dir, maps)?;
        Ok(ProductValue::Family(Arc::new(family)))
      })
    }),
  )
}

/// `BuildFiles ⇐ the directory listing filtered by the build file pattern`.
fn filter_build_files_rule(mapper: &Arc<AddressMapper>) -> Rule {
  let literal = ProductValue::Mapper(Arc::clone(mapper));
  Rule::new(
    "filter-build-files",
    ProductType::BuildFiles,
    vec![
      Selector::literal(literal, ProductType::Mapper),
      Selector::direct(ProductType::Listing),
    ],
    Arc::new(move |_subject, inputs| {
      boxed(async move {
        let mut inputs = inputs.into_iter();
        let mapper = next_input(&mut inputs)?.expect_mapper()?;
        let listing = next_input(&mut inputs)?.expect_listing()?;
        let files = listing
          .files
          .iter()
          .filter(|path| mapper.is_build_file(basename(path)))
          .cloned()
          .collect();
        Ok(ProductValue::BuildFiles(Arc::new(files)))
      })
    }),
  )
}

fn list_dir_rule(fs: &Arc<dyn FileSystem>) -> Rule {
  let fs = Arc::clone(fs);
  Rule::new(
    "list-dir",
    ProductType::Listing,
    vec![Selector::direct(ProductType::Dir)],
    Arc::new(move |_subject, inputs| {
      let fs = Arc::clone(&fs);
      boxed(async move {
        let dir = single_input(inputs)?.expect_dir()?;
        let listing = fs.list_dir(&dir).await?;
        Ok(ProductValue::Listing(Arc::new(listing)))
      })
    }),
  )
}

fn read_files_rule(fs: &Arc<dyn FileSystem>) -> Rule {
  let fs = Arc::clone(fs);
  Rule::new(
    "read-files",
    ProductType::FileContents,
    vec![Selector::direct(ProductType::FilePaths)],
    Arc::new(move |_subject, inputs| {
      let fs = Arc::clone(&fs);
      boxed(async move {
        let paths = single_input(inputs)?.expect_file_paths()?;
        let contents = fs.read_files(&paths).await?;
        Ok(ProductValue::FileContents(Arc::new(contents)))
      })
    }),
  )
}

fn walk_dirs_rule(fs: &Arc<dyn FileSystem>) -> Rule {
  let fs = Arc::clone(fs);
  Rule::new(
    "walk-dirs",
    ProductType::SubDirs,
    vec![Selector::direct(ProductType::Dir)],
    Arc::new(move |_subject, inputs| {
      let fs = Arc::clone(&fs);
      boxed(async move {
        let dir = single_input(inputs)?.expect_dir()?;
        let subdirs = fs.walk_dirs(&dir).await?;
        Ok(ProductValue::SubDirs(Arc::new(subdirs)))
      })
    }),
  )
}

/// Launches the recursive walk for a descendants subject by projecting it
/// down to its directory.
fn descend_rule() -> Rule {
  Rule::new(
    "descend-subdirs",
    ProductType::SubDirs,
    vec![Selector::projection(
      ProductType::SubDirs,
      SubjectShape::Dir,
      "directory",
      ProductType::Descendants,
    )],
    Arc::new(move |_subject, inputs| boxed(async move { single_input(inputs) })),
  )
}

/// `Addresses ⇐ the keys of one directory's family`.
fn sibling_addresses_rule() -> Rule {
  Rule::new(
    "sibling-addresses",
    ProductType::Addresses,
    vec![Selector::projection(
      ProductType::Family,
      SubjectShape::Dir,
      "directory",
      ProductType::Siblings,
    )],
    Arc::new(move |_subject, inputs| {
      boxed(async move {
        let family = single_input(inputs)?.expect_family()?;
        Ok(ProductValue::Addresses(Arc::new(family.addresses())))
      })
    }),
  )
}

/// `Addresses ⇐ the union of every family in the directory closure`.
fn descendant_addresses_rule() -> Rule {
  Rule::new(
    "descendant-addresses",
    ProductType::Addresses,
    vec![Selector::dependencies(
      ProductType::Family,
      ProductType::SubDirs,
      "dirs",
    )],
    Arc::new(move |_subject, inputs| {
      boxed(async move {
        let batch = single_input(inputs)?.expect_batch()?;
        let mut addresses = Vec::new();
        for value in batch {
          addresses.extend(value.expect_family()?.addresses());
        }
        addresses.sort();
        addresses.dedup();
        Ok(ProductValue::Addresses(Arc::new(addresses)))
      })
    }),
  )
}

/// Lets a concrete declared type be requested directly: identity over the
/// hydrated record when the type matches, soft no-source otherwise.
fn declared_identity_rule(type_name: String) -> Rule {
  let product = ProductType::Declared(type_name.clone());
  let result_product = product.clone();
  Rule::new(
    "declared-identity",
    product,
    vec![Selector::direct(ProductType::Record)],
    Arc::new(move |subject, inputs| {
      let type_name = type_name.clone();
      let product = result_product.clone();
      boxed(async move {
        let record = single_input(inputs)?.expect_record()?;
        if record.type_name() == type_name {
          Ok(ProductValue::Record(record))
        } else {
          Err(ResolveError::NoSource {
            product: product.to_string(),
            subject: subject.to_string(),
          })
        }
      })
    }),
  )
}

fn next_input(
  inputs: &mut impl Iterator<Item = ProductValue>,
) -> Result<ProductValue, ResolveError> {
  inputs
    .next()
    .ok_or_else(|| ResolveError::Internal("rule received too few inputs".to_string()))
}

fn single_input(inputs: Vec<ProductValue>) -> Result<ProductValue, ResolveError> {
  let mut inputs = inputs.into_iter();
  let first = next_input(&mut inputs)?;
  if inputs.next().is_some() {
    return Err(ResolveError::Internal("rule received too many inputs".to_string()));
  }
  Ok(first)
}

fn basename(path: &str) -> &str {
  path.rsplit('/').next().unwrap_or(path)
}
