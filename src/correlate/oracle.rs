//! Resolution oracles
//!
//! The correlator asks one question per surviving candidate: does the symbol
//! at this offset resolve to an action definition? The answer comes from an
//! external, possibly slow and cross-file service behind `ResolutionOracle`.
//!
//! `ChasingOracle` answers it by breadth-first search over navigation
//! relations (definition, type definition, implementation) with a hop
//! ceiling and a visited set, so re-export chains and aliases are followed
//! without looping.

use crate::extract::ActionDefinitionSpan;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;

/// Default ceiling on navigation hops per resolution
pub const DEFAULT_MAX_HOPS: usize = 4;

/// Decides whether the symbol at `offset` in `document` is an action
#[async_trait]
pub trait ResolutionOracle: Send + Sync {
    async fn resolve(&self, document: &str, offset: usize) -> Result<bool>;
}

/// Adapter turning an async closure into a `ResolutionOracle`
pub struct FnOracle<F> {
    f: F,
}

/// Wrap `f(document, offset)` as an oracle
pub fn oracle_fn<F, Fut>(f: F) -> FnOracle<F>
where
    F: Fn(String, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool>> + Send + 'static,
{
    FnOracle { f }
}

#[async_trait]
impl<F, Fut> ResolutionOracle for FnOracle<F>
where
    F: Fn(String, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool>> + Send + 'static,
{
    async fn resolve(&self, document: &str, offset: usize) -> Result<bool> {
        (self.f)(document.to_string(), offset).await
    }
}

/// A position in some document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub document: String,
    pub offset: usize,
}

impl Location {
    pub fn new(document: impl Into<String>, offset: usize) -> Self {
        Self {
            document: document.into(),
            offset,
        }
    }
}

/// Navigation relation followed during a chase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Definition,
    TypeDefinition,
    Implementation,
}

impl Relation {
    pub fn all() -> &'static [Relation] {
        &[Relation::Definition, Relation::TypeDefinition, Relation::Implementation]
    }
}

/// Symbol navigation service consulted by `ChasingOracle`
#[async_trait]
pub trait NavigationProvider: Send + Sync {
    /// Locations `relation` leads to from `location`
    async fn locate(&self, relation: Relation, location: &Location) -> Result<Vec<Location>>;

    /// Action definitions of a document
    async fn action_definitions(&self, document: &str) -> Result<Vec<ActionDefinitionSpan>>;
}

/// Bounded breadth-first resolution over a `NavigationProvider`
pub struct ChasingOracle<P> {
    provider: P,
    max_hops: usize,
}

impl<P: NavigationProvider> ChasingOracle<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            max_hops: DEFAULT_MAX_HOPS,
        }
    }

    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Whether `location` is on an action's name or inside its body
    async fn lands_on_action(
        &self,
        location: &Location,
        cache: &mut HashMap<String, Vec<ActionDefinitionSpan>>,
    ) -> bool {
        if !cache.contains_key(&location.document) {
            let spans = match self.provider.action_definitions(&location.document).await {
                Ok(spans) => spans,
                Err(e) => {
                    tracing::debug!("No definitions for {}: {}", location.document, e);
                    Vec::new()
                }
            };
            cache.insert(location.document.clone(), spans);
        }
        cache
            .get(&location.document)
            .is_some_and(|spans| spans.iter().any(|s| s.covers(location.offset)))
    }
}

#[async_trait]
impl<P: NavigationProvider> ResolutionOracle for ChasingOracle<P> {
    async fn resolve(&self, document: &str, offset: usize) -> Result<bool> {
        let start = Location::new(document, offset);
        let mut visited = HashSet::from([start.clone()]);
        let mut worklist = VecDeque::from([(start, 0usize)]);
        let mut definitions = HashMap::new();

        while let Some((location, hops)) = worklist.pop_front() {
            if hops >= self.max_hops {
                continue;
            }
            for &relation in Relation::all() {
                let targets = match self.provider.locate(relation, &location).await {
                    Ok(targets) => targets,
                    Err(e) => {
                        tracing::debug!("{:?} lookup failed at {:?}: {}", relation, location, e);
                        continue;
                    }
                };
                for target in targets {
                    if !visited.insert(target.clone()) {
                        continue;
                    }
                    if self.lands_on_action(&target, &mut definitions).await {
                        tracing::debug!("{}@{} resolves to action in {}", document, offset, target.document);
                        return Ok(true);
                    }
                    worklist.push_back((target, hops + 1));
                }
            }
        }

        Ok(false)
    }
}

/// Oracle error helper for providers and closures
pub fn oracle_error(message: impl Into<String>) -> Error {
    Error::Oracle(message.into())
}
