//! qry - resolve declared build targets from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use qry_engine::{
  AddressMapper, JsonParser, OsFileSystem, ProductType, Resolver, RuleRegistry, TargetSpec,
  graph_rules,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod symbols;

/// qry - declarative build target resolution
#[derive(Parser)]
#[command(name = "qry")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Build root directory
  #[arg(long, global = true, default_value = ".")]
  root: PathBuf,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Print the addresses a target spec denotes
  List {
    /// Target spec: `dir:name`, `dir:` or `dir::`
    spec: String,
  },

  /// Hydrate and print every record a target spec denotes
  Show {
    /// Target spec: `dir:name`, `dir:` or `dir::`
    spec: String,

    /// Print records as JSON instead of text
    #[arg(long)]
    json: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_filter = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
    )
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let resolver = build_resolver(&cli.root)?;

  match cli.command {
    Commands::List { spec } => cmd_list(&resolver, &spec).await,
    Commands::Show { spec, json } => cmd_show(&resolver, &spec, json).await,
  }
}

fn build_resolver(root: &PathBuf) -> Result<Resolver> {
  let root = root
    .canonicalize()
    .with_context(|| format!("build root '{}' does not exist", root.display()))?;
  debug!(root = %root.display(), "build root resolved");
  let mapper = Arc::new(AddressMapper::new(
    symbols::builtin_symbols(),
    Arc::new(JsonParser),
  ));
  let fs = Arc::new(OsFileSystem::new(root));
  Ok(Resolver::new(RuleRegistry::new(graph_rules(mapper, fs))))
}

fn parse_spec(spec: &str) -> Result<TargetSpec> {
  TargetSpec::parse(spec).with_context(|| format!("invalid target spec '{spec}'"))
}

async fn cmd_list(resolver: &Resolver, spec: &str) -> Result<()> {
  let spec = parse_spec(spec)?;
  let addresses = resolver
    .addresses(&spec)
    .await
    .with_context(|| format!("failed to resolve '{spec}'"))?;
  debug!(%spec, count = addresses.len(), "addresses resolved");
  for address in addresses {
    println!("{address}");
  }
  Ok(())
}

async fn cmd_show(resolver: &Resolver, spec: &str, json: bool) -> Result<()> {
  let spec = parse_spec(spec)?;
  let products = resolver
    .products_for_spec(&spec, ProductType::Record)
    .await
    .with_context(|| format!("failed to resolve '{spec}'"))?;
  debug!(%spec, count = products.len(), "records hydrated");

  for (address, value) in products {
    let record = value
      .expect_record()
      .with_context(|| format!("unexpected product for '{address}'"))?;
    if json {
      println!("{}", serde_json::to_string_pretty(&*record)?);
    } else {
      println!("{address} ({})", record.type_name());
      for (field, value) in record.fields() {
        println!("  {field} = {}", serde_json::to_string(value)?);
      }
    }
  }
  Ok(())
}
