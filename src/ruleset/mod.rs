//! Rule sets and the hot-swappable rule store.

mod compiler;

pub use compiler::RuleCompiler;

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::decision::Decision;
use crate::rule::{FilterRegistry, Rule};
use crate::{Request, Target};

/// An immutable, ordered collection of compiled rules plus a default target.
///
/// Rules are matched in declaration order and the first match wins.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    default_target: Target,
}

impl RuleSet {
    /// Create a rule set from compiled rules.
    pub fn new(rules: Vec<Rule>, default_target: Target) -> Self {
        Self {
            rules,
            default_target,
        }
    }

    /// An empty rule set that always falls back.
    pub fn empty(default_target: Target) -> Self {
        Self::new(Vec::new(), default_target)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Default target name, possibly `Auto`; resolved by the selector.
    pub fn default_target(&self) -> &Target {
        &self.default_target
    }

    /// Find the first matching rule.
    pub fn find(&self, request: &Request, is_https: bool, filters: &FilterRegistry) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|rule| rule.matches(request, is_https, filters))
    }

    /// Select targets for a request.
    ///
    /// Returns the first matching rule's targets and attributes, or the
    /// `fallback` targets with no attributes when nothing matches.
    pub fn select(
        &self,
        request: &Request,
        is_https: bool,
        filters: &FilterRegistry,
        fallback: Vec<Target>,
    ) -> Decision {
        match self.find(request, is_https, filters) {
            Some(rule) => Decision::matched(rule.targets().to_vec(), rule.attrs()),
            None => Decision::fallback(fallback),
        }
    }
}

/// Process-wide slot holding the current [`RuleSet`].
///
/// Readers take a snapshot with [`RuleStore::load`]; a reload publishes a
/// fully built replacement in one atomic pointer swap. In-flight matches keep
/// using the snapshot they loaded.
pub struct RuleStore {
    current: ArcSwap<RuleSet>,
    /// Incremented on every successful replacement
    generation: AtomicU64,
}

impl RuleStore {
    pub fn new(ruleset: RuleSet) -> Self {
        Self {
            current: ArcSwap::from_pointee(ruleset),
            generation: AtomicU64::new(0),
        }
    }

    /// Snapshot of the current rule set.
    pub fn load(&self) -> Arc<RuleSet> {
        self.current.load_full()
    }

    /// Atomically replace the current rule set.
    pub fn store(&self, ruleset: RuleSet) {
        let count = ruleset.len();
        self.current.store(Arc::new(ruleset));
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!("Installed rule set with {} rules (generation {})", count, generation);
    }

    /// Compile and install a new rule set.
    ///
    /// On failure the current rule set stays in effect and the error is
    /// logged and returned.
    pub fn reload(&self, compiler: &RuleCompiler) -> crate::Result<()> {
        match compiler.compile() {
            Ok(ruleset) => {
                self.store(ruleset);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to reload rules, keeping previous set: {}", e);
                Err(e)
            }
        }
    }

    /// Number of successful replacements so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for RuleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleStore")
            .field("rules", &self.current.load().len())
            .field("generation", &self.generation())
            .finish()
    }
}
