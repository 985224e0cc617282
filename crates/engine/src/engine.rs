//! The recursive resolution engine.
//!
//! `resolve(product, subject)` finds the registered rules whose output
//! matches the product, resolves each rule's selectors (recursing back into
//! `resolve` as needed), and invokes the transform with the resolved values
//! in declared order. Sibling selectors and dependency-list members resolve
//! concurrently; results are re-ordered to declaration order before the
//! transform runs.
//!
//! Rule-computed results are memoized per `(product, subject)` key with a
//! single-flight guarantee: concurrent requests for one key collapse onto one
//! computation, all requesters receive the same result, and failures are
//! delivered to every waiter but never cached. A per-key dependency graph
//! guards against cyclic requests, which would otherwise deadlock on their
//! own in-flight entry.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::debug;

use crate::address::{Address, TargetSpec};
use crate::error::ResolveError;
use crate::product::{ProductType, ProductValue, Subject};
use crate::rules::{Rule, RuleRegistry};
use crate::select::Selector;

/// One memoization key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
  product: ProductType,
  subject: Subject,
}

impl std::fmt::Display for Key {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} for {}", self.product, self.subject)
  }
}

/// The published state of one in-flight computation.
#[derive(Debug, Clone)]
enum Flight {
  Pending,
  Done(Result<ProductValue, ResolveError>),
}

enum CacheEntry {
  Done(ProductValue),
  InFlight(watch::Receiver<Flight>),
}

/// Tracks which keys depend on which, for cycle detection. Edges persist for
/// the resolver's lifetime.
#[derive(Default)]
struct KeyGraph {
  graph: DiGraph<(), ()>,
  nodes: HashMap<Key, NodeIndex>,
}

impl KeyGraph {
  fn node(&mut self, key: &Key) -> NodeIndex {
    if let Some(index) = self.nodes.get(key) {
      *index
    } else {
      let index = self.graph.add_node(());
      self.nodes.insert(key.clone(), index);
      index
    }
  }

  /// Record that `parent` awaits `child`, failing if that closes a cycle.
  fn record_edge(&mut self, parent: &Key, child: &Key) -> Result<(), ResolveError> {
    let parent_index = self.node(parent);
    let child_index = self.node(child);
    if parent_index == child_index
      || has_path_connecting(&self.graph, child_index, parent_index, None)
    {
      return Err(ResolveError::Cycle {
        from: parent.to_string(),
        to: child.to_string(),
      });
    }
    self.graph.update_edge(parent_index, child_index, ());
    Ok(())
  }
}

struct ResolverInner {
  registry: RuleRegistry,
  cache: Mutex<HashMap<Key, CacheEntry>>,
  keys: Mutex<KeyGraph>,
}

/// The resolution engine. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Resolver {
  inner: Arc<ResolverInner>,
}

type ResolveFuture = Pin<Box<dyn Future<Output = Result<ProductValue, ResolveError>> + Send>>;

impl Resolver {
  pub fn new(registry: RuleRegistry) -> Self {
    Self {
      inner: Arc::new(ResolverInner {
        registry,
        cache: Mutex::new(HashMap::new()),
        keys: Mutex::new(KeyGraph::default()),
      }),
    }
  }

  /// Resolve one product for one subject.
  pub fn resolve(&self, product: ProductType, subject: Subject) -> ResolveFuture {
    self.resolve_with_parent(product, subject, None)
  }

  /// The addresses a target spec denotes.
  pub async fn addresses(&self, spec: &TargetSpec) -> Result<Vec<Address>, ResolveError> {
    match spec {
      TargetSpec::Single(address) => Ok(vec![address.clone()]),
      TargetSpec::Siblings(dir) => {
        let value = self
          .resolve(ProductType::Addresses, Subject::Siblings(dir.clone()))
          .await?;
        Ok((*value.expect_addresses()?).clone())
      }
      TargetSpec::Descendants(dir) => {
        let value = self
          .resolve(ProductType::Addresses, Subject::Descendants(dir.clone()))
          .await?;
        Ok((*value.expect_addresses()?).clone())
      }
    }
  }

  /// Resolve `product` for every address a spec denotes, in address order.
  pub async fn products_for_spec(
    &self,
    spec: &TargetSpec,
    product: ProductType,
  ) -> Result<Vec<(Address, ProductValue)>, ResolveError> {
    let addresses = self.addresses(spec).await?;
    let mut set = JoinSet::new();
    for (index, address) in addresses.iter().cloned().enumerate() {
      let this = self.clone();
      let product = product.clone();
      set.spawn(async move {
        let value = this.resolve(product, Subject::Address(address)).await;
        (index, value)
      });
    }
    let mut values: Vec<Option<ProductValue>> = vec![None; addresses.len()];
    while let Some(joined) = set.join_next().await {
      let (index, value) =
        joined.map_err(|e| ResolveError::Internal(format!("resolution task failed: {e}")))?;
      values[index] = Some(value?);
    }
    Ok(
      addresses
        .into_iter()
        .zip(values.into_iter().map(|v| v.expect("all indices filled")))
        .collect(),
    )
  }

  fn resolve_with_parent(
    &self,
    product: ProductType,
    subject: Subject,
    parent: Option<Key>,
  ) -> ResolveFuture {
    let this = self.clone();
    Box::pin(async move { this.do_resolve(product, subject, parent).await })
  }

  async fn do_resolve(
    &self,
    product: ProductType,
    subject: Subject,
    parent: Option<Key>,
  ) -> Result<ProductValue, ResolveError> {
    // is-a short-circuit: the subject already is the requested product.
    if product == subject.product_type() {
      return Ok(subject.as_value());
    }

    let key = Key { product, subject };
    if let Some(parent) = &parent {
      self.inner.keys.lock().expect("key graph poisoned").record_edge(parent, &key)?;
    }

    loop {
      enum Action {
        Done(ProductValue),
        Lead(watch::Sender<Flight>),
        Wait(watch::Receiver<Flight>),
      }

      let action = {
        let mut cache = self.inner.cache.lock().expect("cache poisoned");
        match cache.get(&key) {
          Some(CacheEntry::Done(value)) => Action::Done(value.clone()),
          Some(CacheEntry::InFlight(rx)) => Action::Wait(rx.clone()),
          None => {
            let (tx, rx) = watch::channel(Flight::Pending);
            cache.insert(key.clone(), CacheEntry::InFlight(rx));
            Action::Lead(tx)
          }
        }
      };

      match action {
        Action::Done(value) => return Ok(value),
        Action::Lead(tx) => {
          let result = self.compute(&key).await;
          {
            let mut cache = self.inner.cache.lock().expect("cache poisoned");
            match &result {
              Ok(value) => {
                cache.insert(key.clone(), CacheEntry::Done(value.clone()));
              }
              Err(_) => {
                // Failures are delivered to waiters but never cached.
                cache.remove(&key);
              }
            }
          }
          let _ = tx.send(Flight::Done(result.clone()));
          return result;
        }
        Action::Wait(mut rx) => {
          loop {
            let published = match &*rx.borrow() {
              Flight::Done(result) => Some(result.clone()),
              Flight::Pending => None,
            };
            if let Some(result) = published {
              return result;
            }
            if rx.changed().await.is_err() {
              // The leader was dropped without publishing. Evict the stale
              // flight and go around again; some requester re-leads.
              let mut cache = self.inner.cache.lock().expect("cache poisoned");
              if let Some(CacheEntry::InFlight(current)) = cache.get(&key)
                && current.same_channel(&rx)
              {
                cache.remove(&key);
              }
              break;
            }
          }
        }
      }
    }
  }

  /// Try every candidate rule for a key. Exactly one must succeed.
  async fn compute(&self, key: &Key) -> Result<ProductValue, ResolveError> {
    let candidates = self.inner.registry.candidates(&key.product);
    let mut matches: Vec<(&'static str, ProductValue)> = Vec::new();
    for rule in candidates {
      match self.apply_rule(rule, key).await {
        Ok(value) => matches.push((rule.name(), value)),
        Err(err) if err.is_soft() => {
          debug!(rule = rule.name(), key = %key, "rule not satisfiable");
        }
        Err(err) => return Err(err),
      }
    }
    match matches.len() {
      0 => Err(ResolveError::NoSource {
        product: key.product.to_string(),
        subject: key.subject.to_string(),
      }),
      1 => {
        let (rule, value) = matches.pop().expect("one match");
        debug!(rule, key = %key, "resolved");
        Ok(value)
      }
      _ => Err(ResolveError::MultipleSources {
        product: key.product.to_string(),
        subject: key.subject.to_string(),
      }),
    }
  }

  /// Resolve a rule's selectors concurrently and invoke its transform with
  /// the values in declared order.
  async fn apply_rule(&self, rule: &Rule, key: &Key) -> Result<ProductValue, ResolveError> {
    let mut set = JoinSet::new();
    for (index, selector) in rule.selectors().iter().cloned().enumerate() {
      let this = self.clone();
      let subject = key.subject.clone();
      let parent = key.clone();
      set.spawn(async move {
        let value = this.resolve_selector(selector, subject, parent).await;
        (index, value)
      });
    }

    let mut inputs: Vec<Option<ProductValue>> = vec![None; rule.selectors().len()];
    while let Some(joined) = set.join_next().await {
      let (index, value) =
        joined.map_err(|e| ResolveError::Internal(format!("selector task failed: {e}")))?;
      // The first failure aborts the rule; dropping the set cancels the
      // remaining selector tasks without publishing anything.
      inputs[index] = Some(value?);
    }
    let inputs = inputs
      .into_iter()
      .map(|v| v.expect("all selector slots filled"))
      .collect();

    rule.invoke(key.subject.clone(), inputs).await
  }

  async fn resolve_selector(
    &self,
    selector: Selector,
    subject: Subject,
    parent: Key,
  ) -> Result<ProductValue, ResolveError> {
    match selector {
      Selector::Literal { value, .. } => Ok(value),
      Selector::Direct { product } => {
        self
          .resolve_with_parent(product, subject, Some(parent))
          .await
      }
      Selector::Dependencies {
        product,
        dep_product,
        field,
      } => {
        let dep_value = self
          .resolve_with_parent(dep_product.clone(), subject.clone(), Some(parent.clone()))
          .await?;
        let members = dep_value.subject_list(&field).ok_or_else(|| {
          ResolveError::Internal(format!(
            "{dep_product} for {subject} has no subject list in field '{field}'"
          ))
        })?;

        let mut set = JoinSet::new();
        for (index, member) in members.iter().cloned().enumerate() {
          let this = self.clone();
          let product = product.clone();
          let parent = parent.clone();
          set.spawn(async move {
            let value = this
              .resolve_with_parent(product, member.clone(), Some(parent))
              .await;
            (index, member, value)
          });
        }

        let mut values: Vec<Option<ProductValue>> = vec![None; members.len()];
        while let Some(joined) = set.join_next().await {
          let (index, member, value) =
            joined.map_err(|e| ResolveError::Internal(format!("member task failed: {e}")))?;
          match value {
            Ok(value) => values[index] = Some(value),
            // A missing source for an explicitly requested member is hard,
            // unlike the soft no-source of the list product itself.
            Err(err) if err.is_soft() => {
              return Err(ResolveError::NoDependencySource {
                subject: member.to_string(),
              });
            }
            Err(err) => return Err(err),
          }
        }
        Ok(ProductValue::Batch(
          values
            .into_iter()
            .map(|v| v.expect("all member slots filled"))
            .collect(),
        ))
      }
      Selector::Projection {
        product,
        projected,
        field,
        input,
      } => {
        let input_value = self
          .resolve_with_parent(input.clone(), subject.clone(), Some(parent.clone()))
          .await?;
        let extracted = input_value.project(&field).ok_or_else(|| {
          ResolveError::Internal(format!(
            "{input} for {subject} has no projectable field '{field}'"
          ))
        })?;
        let new_subject = Subject::from_projection(projected, extracted).ok_or_else(|| {
          ResolveError::Internal(format!(
            "field '{field}' of {input} cannot form a {projected:?} subject"
          ))
        })?;
        self
          .resolve_with_parent(product, new_subject, Some(parent))
          .await
      }
    }
  }
}
