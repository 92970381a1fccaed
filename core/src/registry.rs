//! Active-context registry: finalized contexts grouped by owning class

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::context::EvaluationContext;
use crate::error::{Error, Result};
use crate::traits::ReportSink;

type Contexts = BTreeMap<String, Arc<EvaluationContext>>;

/// Class identity -> test name -> finalized context
///
/// Shared through `Arc` by every harness of a run. A class's entry is
/// created lazily and wiped by [`begin_run`](Self::begin_run) so a rerun
/// never reports stale contexts.
#[derive(Default)]
pub struct ActiveContextRegistry {
    groups: Mutex<HashMap<String, Contexts>>,
}

impl ActiveContextRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh run for a class, dropping whatever it registered before
    pub fn begin_run(&self, group: &str) {
        if let Some(stale) = self.lock().insert(group.to_string(), Contexts::new()) {
            if !stale.is_empty() {
                tracing::debug!(group, stale = stale.len(), "Cleared stale contexts");
            }
        }
    }

    /// Register a finalized context under its class
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the same test was already registered for
    /// this run of the class.
    pub fn register(&self, context: Arc<EvaluationContext>) -> Result<()> {
        let mut groups = self.lock();
        let contexts = groups.entry(context.group().to_string()).or_default();

        if contexts.contains_key(context.test_name()) {
            return Err(Error::config(format!(
                "context for '{}' already registered in '{}'",
                context.test_name(),
                context.group()
            )));
        }

        contexts.insert(context.test_name().to_string(), context);
        Ok(())
    }

    /// Snapshot of one class's contexts, keyed by test name
    pub fn contexts(&self, group: &str) -> Contexts {
        self.lock().get(group).cloned().unwrap_or_default()
    }

    /// Whether a context for `test_name` is registered in a class
    pub fn contains(&self, group: &str, test_name: &str) -> bool {
        self.lock()
            .get(group)
            .is_some_and(|contexts| contexts.contains_key(test_name))
    }

    /// Number of contexts registered for a class
    pub fn len(&self, group: &str) -> usize {
        self.lock().get(group).map_or(0, BTreeMap::len)
    }

    /// Whether nothing is registered for any class
    pub fn is_empty(&self) -> bool {
        self.lock().values().all(BTreeMap::is_empty)
    }

    /// Known class identities, sorted
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<_> = self.lock().keys().cloned().collect();
        groups.sort();
        groups
    }

    /// Drop a class's entry, returning its contexts
    pub fn clear(&self, group: &str) -> Contexts {
        self.lock().remove(group).unwrap_or_default()
    }

    /// Hand a class's contexts to every sink
    ///
    /// Every sink runs even if an earlier one fails; the first failure is
    /// returned. A class with no contexts produces no report.
    ///
    /// # Errors
    ///
    /// Returns `Error::Report` naming the failed sink.
    pub fn publish(&self, group: &str, sinks: &[Arc<dyn ReportSink>]) -> Result<()> {
        let contexts = self.contexts(group);
        if contexts.is_empty() {
            tracing::debug!(group, "No evaluated tests, skipping report");
            return Ok(());
        }

        let mut first_error = None;
        for sink in sinks {
            if let Err(e) = sink.generate_report(&contexts) {
                tracing::error!(group, sink = sink.name(), error = %e, "Report sink failed");
                first_error.get_or_insert_with(|| Error::report(format!("{}: {e}", sink.name())));
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Contexts>> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ActiveContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveContextRegistry")
            .field("groups", &self.groups())
            .finish()
    }
}
