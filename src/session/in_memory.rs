use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use super::{
    Fact, FactEntry, FactHandle, ObjectFilter, RuleSession, SessionError, SessionProvider,
    SessionResult,
};
use crate::types::TypeRegistry;

type Condition = Arc<dyn Fn(&Fact) -> bool + Send + Sync>;
type Action = Arc<dyn Fn(&mut Fact, &mut Vec<Fact>) + Send + Sync>;

pub const DEFAULT_MAX_FIRINGS: usize = 10_000;

/// A single-fact production: when a fact of `fact_type` satisfies `when`,
/// `then` may modify it and push new facts to insert.
#[derive(Clone)]
pub struct Rule {
    pub name: String,
    pub fact_type: String,
    pub salience: i32,
    when: Condition,
    then: Action,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("fact_type", &self.fact_type)
            .field("salience", &self.salience)
            .finish()
    }
}

impl Rule {
    pub fn new<W, T>(name: &str, fact_type: &str, when: W, then: T) -> Self
    where
        W: Fn(&Fact) -> bool + Send + Sync + 'static,
        T: Fn(&mut Fact, &mut Vec<Fact>) + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            fact_type: fact_type.to_string(),
            salience: 0,
            when: Arc::new(when),
            then: Arc::new(then),
        }
    }

    pub fn with_salience(mut self, salience: i32) -> Self {
        self.salience = salience;
        self
    }
}

struct StoredFact {
    fact: Fact,
    version: u64,
}

/// Working memory plus a naive forward-chaining agenda.
///
/// An activation is a (rule, fact, fact version) triple and fires at most
/// once; modifying a fact bumps its version and makes it eligible again.
/// Rules are tried by descending salience, then declaration order, and facts
/// by insertion order, so firing is deterministic.
pub struct InMemorySession {
    rules: Arc<Vec<Rule>>,
    facts: BTreeMap<FactHandle, StoredFact>,
    fired: HashSet<(usize, FactHandle, u64)>,
    next_handle: u64,
    max_firings: usize,
    disposed: bool,
}

impl InMemorySession {
    pub fn new(rules: Arc<Vec<Rule>>, max_firings: usize) -> Self {
        Self {
            rules,
            facts: BTreeMap::new(),
            fired: HashSet::new(),
            next_handle: 0,
            max_firings,
            disposed: false,
        }
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.disposed {
            Err(SessionError::Disposed)
        } else {
            Ok(())
        }
    }

    fn store(&mut self, fact: Fact) -> FactHandle {
        self.next_handle += 1;
        let handle = FactHandle(self.next_handle);
        self.facts.insert(handle, StoredFact { fact, version: 0 });
        handle
    }

    fn agenda_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.rules.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(self.rules[i].salience));
        order
    }

    fn next_activation(&self, order: &[usize]) -> Option<(usize, FactHandle)> {
        for &rule_index in order {
            let rule = &self.rules[rule_index];
            for (handle, stored) in &self.facts {
                if stored.fact.fact_type != rule.fact_type {
                    continue;
                }
                if self.fired.contains(&(rule_index, *handle, stored.version)) {
                    continue;
                }
                if (rule.when)(&stored.fact) {
                    return Some((rule_index, *handle));
                }
            }
        }
        None
    }
}

#[async_trait]
impl RuleSession for InMemorySession {
    async fn insert(&mut self, fact: Fact) -> SessionResult<FactHandle> {
        self.ensure_open()?;
        let handle = self.store(fact);
        trace!("inserted fact {}", handle);
        Ok(handle)
    }

    async fn fire_all_rules(&mut self) -> SessionResult<usize> {
        self.ensure_open()?;
        let order = self.agenda_order();
        let mut firings = 0;

        while let Some((rule_index, handle)) = self.next_activation(&order) {
            if firings >= self.max_firings {
                return Err(SessionError::FixpointNotReached {
                    limit: self.max_firings,
                });
            }
            let rule = self.rules[rule_index].clone();
            let Some(stored) = self.facts.get_mut(&handle) else {
                break;
            };
            self.fired.insert((rule_index, handle, stored.version));

            let mut updated = stored.fact.clone();
            let mut inserted = Vec::new();
            (rule.then)(&mut updated, &mut inserted);
            if updated != stored.fact {
                stored.fact = updated;
                stored.version += 1;
            }
            for fact in inserted {
                self.store(fact);
            }

            firings += 1;
            debug!("rule '{}' fired on {}", rule.name, handle);
        }
        Ok(firings)
    }

    async fn get_objects(&self, filter: &ObjectFilter) -> SessionResult<Vec<FactEntry>> {
        self.ensure_open()?;
        Ok(self
            .facts
            .iter()
            .filter(|(_, stored)| filter.accepts(&stored.fact))
            .map(|(handle, stored)| FactEntry {
                handle: *handle,
                fact: stored.fact.clone(),
            })
            .collect())
    }

    async fn dispose(&mut self) -> SessionResult<()> {
        self.facts.clear();
        self.fired.clear();
        self.disposed = true;
        Ok(())
    }

    fn set_max_firings(&mut self, max_firings: usize) {
        self.max_firings = max_firings;
    }
}

/// Builds a fresh [`InMemorySession`] over a fixed rule set on every
/// acquisition.
#[derive(Clone)]
pub struct InMemorySessionProvider {
    registry: Arc<TypeRegistry>,
    rules: Arc<Vec<Rule>>,
}

impl InMemorySessionProvider {
    pub fn new(registry: TypeRegistry, rules: Vec<Rule>) -> Self {
        Self {
            registry: Arc::new(registry),
            rules: Arc::new(rules),
        }
    }
}

#[async_trait]
impl SessionProvider for InMemorySessionProvider {
    async fn acquire(&self) -> SessionResult<Box<dyn RuleSession>> {
        Ok(Box::new(InMemorySession::new(
            self.rules.clone(),
            DEFAULT_MAX_FIRINGS,
        )))
    }

    fn type_registry(&self) -> Arc<TypeRegistry> {
        self.registry.clone()
    }
}
