//! Scoped evaluation contexts.
//!
//! A [`ScopedContext`] carries everything a node of a tree-shaped
//! evaluation pass needs to see: the merged local-variable surface, the
//! current selection target, the shared ID-sequence counters and the active
//! capability tags.  Contexts are never mutated in place; a traversal
//! derives a child when descending into a node that introduces bindings and
//! simply drops it when ascending back out.
//!
//! Derivation shares every unchanged field by reference: a child's variable
//! store is a fresh [`OverlayMap`] layer wrapping the parent's, the counter
//! table is the same table for the whole lineage, and the capability-tag
//! set is never copied.  Ancestor state lives exactly as long as the
//! longest-lived descendant referencing it.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::counter::SeqCounters;
use crate::overlay::OverlayMap;

/// Reserved variable name that sets the selection target through a variable
/// map.  A map passed to [`ScopedContext::add_local_variables`] containing
/// this key behaves exactly like
/// [`ScopedContext::add_local_variables_and_selection_target`].
pub const SELECTION_TARGET_VAR: &str = "%%SELECTION_TARGET%%";

// ── Errors ────────────────────────────────────────────────────────────────────

/// Error produced by context operations.
#[derive(Debug, PartialEq, Eq)]
pub enum ContextError {
    /// [`ScopedContext::last_id_seq`] was called for an id that has never
    /// been assigned a sequence number.  Asking for "previous" before any
    /// "current" existed is a bug in the traversal driver, so this
    /// propagates instead of returning a sentinel.
    NoPriorSequence(String),
}

impl std::fmt::Display for ContextError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextError::NoPriorSequence(id) => {
                write!(f, "no prior sequence for id \"{id}\"")
            }
        }
    }
}

impl std::error::Error for ContextError {}

// ── Selection ─────────────────────────────────────────────────────────────────

/// Tri-state selection target: never set, or explicitly set (possibly to
/// nothing).  The tagged form makes the invalid "not set but has a value"
/// combination unrepresentable.
#[derive(Debug, Clone)]
enum Selection<V> {
    Unset,
    Set(Option<V>),
}

// ── ScopedContext ─────────────────────────────────────────────────────────────

/// One scope of a tree-shaped evaluation pass.
///
/// `Clone` is cheap: every field is either shared by reference or a small
/// value.
#[derive(Debug, Clone)]
pub struct ScopedContext<V> {
    vars: Arc<OverlayMap<String, V>>,
    selection: Selection<V>,
    counters: SeqCounters,
    capabilities: Arc<HashSet<String>>,
}

impl<V> ScopedContext<V> {
    /// Root context over `base` with a fresh counter table and no selection
    /// target.
    pub fn new(base: IndexMap<String, V>, capabilities: HashSet<String>) -> Self {
        Self::with_counters(base, capabilities, SeqCounters::new())
    }

    /// Root context with the selection target explicitly set (possibly to
    /// nothing).
    pub fn with_selection_target(
        base: IndexMap<String, V>,
        target: Option<V>,
        capabilities: HashSet<String>,
    ) -> Self {
        let mut context = Self::new(base, capabilities);
        context.selection = Selection::Set(target);
        context
    }

    /// Root context drawing sequence numbers from an externally-owned
    /// counter table.
    pub fn with_counters(
        base: IndexMap<String, V>,
        capabilities: HashSet<String>,
        counters: SeqCounters,
    ) -> Self {
        ScopedContext {
            vars: Arc::new(OverlayMap::from(base)),
            selection: Selection::Unset,
            counters,
            capabilities: Arc::new(capabilities),
        }
    }

    // ── Derivation ────────────────────────────────────────────────────────

    /// Derive a child scope with `vars` layered over this scope's
    /// variables.
    ///
    /// An empty `vars` returns a structural clone of `self`; callers must
    /// not rely on referential identity either way.  If `vars` contains
    /// [`SELECTION_TARGET_VAR`], the call behaves like
    /// [`add_local_variables_and_selection_target`](Self::add_local_variables_and_selection_target)
    /// with that entry's value as the new target, so the selection can
    /// never silently revert to a value read before the merge.  The
    /// reserved entry stays visible as an ordinary variable.
    pub fn add_local_variables(&self, vars: IndexMap<String, V>) -> Self
    where
        V: Clone,
    {
        if vars.is_empty() {
            return self.clone();
        }
        if let Some(target) = vars.get(SELECTION_TARGET_VAR) {
            let target = target.clone();
            return self.add_local_variables_and_selection_target(vars, Some(target));
        }
        ScopedContext {
            vars: self.merge_local_variables(vars),
            selection: self.selection.clone(),
            counters: self.counters.clone(),
            capabilities: Arc::clone(&self.capabilities),
        }
    }

    /// Derive a child scope with a new selection target and unchanged
    /// variables (no new overlay layer is created).
    pub fn set_selection_target(&self, target: Option<V>) -> Self {
        ScopedContext {
            vars: Arc::clone(&self.vars),
            selection: Selection::Set(target),
            counters: self.counters.clone(),
            capabilities: Arc::clone(&self.capabilities),
        }
    }

    /// Derive a child scope applying both effects in one step: `vars`
    /// layered over this scope's variables and the selection target set.
    pub fn add_local_variables_and_selection_target(
        &self,
        vars: IndexMap<String, V>,
        target: Option<V>,
    ) -> Self
    where
        V: Clone,
    {
        ScopedContext {
            vars: self.merge_local_variables(vars),
            selection: Selection::Set(target),
            counters: self.counters.clone(),
            capabilities: Arc::clone(&self.capabilities),
        }
    }

    fn merge_local_variables(&self, vars: IndexMap<String, V>) -> Arc<OverlayMap<String, V>>
    where
        V: Clone,
    {
        if vars.is_empty() {
            return Arc::clone(&self.vars);
        }
        Arc::new(OverlayMap::wrap_with(Arc::clone(&self.vars), vars))
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    /// The merged variable surface of this scope.
    pub fn local_variables(&self) -> &OverlayMap<String, V> {
        &self.vars
    }

    /// Look a variable up through the whole scope chain.
    pub fn variable(&self, name: &str) -> Option<&V> {
        self.vars.get(name)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// The current selection target, if one was set to an actual value.
    /// Use [`has_selection_target`](Self::has_selection_target) to tell
    /// "explicitly set to nothing" apart from "never set".
    pub fn selection_target(&self) -> Option<&V> {
        match &self.selection {
            Selection::Set(target) => target.as_ref(),
            Selection::Unset => None,
        }
    }

    /// Whether a selection target was explicitly set, even to nothing.
    pub fn has_selection_target(&self) -> bool {
        matches!(self.selection, Selection::Set(_))
    }

    /// The capability tags active for this lineage.
    pub fn capability_tags(&self) -> &HashSet<String> {
        &self.capabilities
    }

    pub fn has_capability(&self, tag: &str) -> bool {
        self.capabilities.contains(tag)
    }

    /// The counter table shared across this lineage.
    pub fn counters(&self) -> &SeqCounters {
        &self.counters
    }

    // ── ID sequences ──────────────────────────────────────────────────────

    /// Current sequence number for `id` (first call returns 1), advancing
    /// the lineage-shared counter.
    pub fn take_id_seq(&self, id: &str) -> u64 {
        self.counters.take(id)
    }

    /// Sequence number the next [`take_id_seq`](Self::take_id_seq) would
    /// return, without advancing anything.
    pub fn peek_id_seq(&self, id: &str) -> u64 {
        self.counters.peek(id)
    }

    /// Last sequence number handed out for `id`.
    pub fn last_id_seq(&self, id: &str) -> Result<u64, ContextError> {
        self.counters
            .previous(id)
            .ok_or_else(|| ContextError::NoPriorSequence(id.to_owned()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
