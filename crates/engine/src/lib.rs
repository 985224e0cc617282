//! qry-engine: a declarative resolution engine over build file namespaces.
//!
//! Given a build root whose directories declare typed records in build files,
//! the engine resolves typed *products* for requested *subjects* — an
//! address, a directory, a set of files — by matching a registered set of
//! computation rules, recursively satisfying each rule's declared inputs,
//! and merging per-directory declarations into a conflict-checked namespace.
//!
//! Typical embedding:
//!
//! ```no_run
//! use std::sync::Arc;
//! use qry_engine::{
//!   AddressMapper, JsonParser, OsFileSystem, ProductType, Resolver, RuleRegistry,
//!   RecordType, Subject, SymbolTableBuilder, graph_rules,
//! };
//!
//! # async fn example() -> Result<(), qry_engine::ResolveError> {
//! let symbols = SymbolTableBuilder::new()
//!   .define("library", RecordType::new().addressable("config"))
//!   .build();
//! let mapper = Arc::new(AddressMapper::new(symbols, Arc::new(JsonParser)));
//! let fs = Arc::new(OsFileSystem::new("."));
//! let resolver = Resolver::new(RuleRegistry::new(graph_rules(mapper, fs)));
//!
//! let address = qry_engine::Address::parse("lib/base:core", "")
//!   .map_err(|e| qry_engine::ResolveError::Internal(e.to_string()))?;
//! let record = resolver
//!   .resolve(ProductType::Record, Subject::Address(address))
//!   .await?
//!   .expect_record()?;
//! # let _ = record;
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod engine;
pub mod error;
pub mod fs;
pub mod hydrate;
pub mod namespace;
pub mod parse;
pub mod product;
pub mod record;
pub mod rules;
pub mod select;
pub mod value;

pub use address::{Address, AddressError, TargetSpec};
pub use engine::Resolver;
pub use error::ResolveError;
pub use fs::{FileContent, FileSystem, Listing, OsFileSystem, SubDirs};
pub use hydrate::UnhydratedRecord;
pub use namespace::{AddressFamily, AddressMap};
pub use parse::{AddressMapper, JsonParser, SourceParser};
pub use product::{ProductType, ProductValue, Subject, SubjectShape};
pub use record::{
  Record, RecordType, SymbolTable, SymbolTableBuilder, TypeConstraint,
};
pub use rules::{Rule, RuleRegistry, graph_rules};
pub use select::Selector;
pub use value::Value;
