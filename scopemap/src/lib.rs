//! Layered variable scopes for tree-shaped evaluation passes.
//!
//! This crate gives each node of a nested evaluation pass (e.g. a
//! templating engine walking a document tree) its own local variable
//! bindings while still seeing everything visible from enclosing scopes,
//! without copying ancestor state:
//!
//! - [`OverlayMap`] — a key/value layer over a frozen, shared base map,
//!   masking base entries with tombstones instead of mutating them
//! - [`ScopedContext`] — an immutable scope object deriving children that
//!   share unchanged state by reference: variables, a tri-state selection
//!   target, lineage-shared ID-sequence counters and capability tags
//! - [`SeqCounters`] — the shared counter table, safe to hit from parallel
//!   sibling subtrees
//!
//! # Quick start
//!
//! ```rust
//! use indexmap::IndexMap;
//! use scopemap::ScopedContext;
//!
//! let base = IndexMap::from([("title".to_owned(), "home")]);
//! let root: ScopedContext<&str> = ScopedContext::new(base, Default::default());
//!
//! let child = root.add_local_variables(IndexMap::from([("item".to_owned(), "apple")]));
//! assert_eq!(child.variable("title"), Some(&"home")); // inherited
//! assert_eq!(child.variable("item"), Some(&"apple")); // local
//! assert!(!root.has_variable("item")); // never leaks upward
//!
//! assert_eq!(child.take_id_seq("row"), 1);
//! assert_eq!(root.take_id_seq("row"), 2); // counters are lineage-wide
//! ```

pub mod context;
pub mod counter;
pub mod overlay;

// Re-exports for convenience.
pub use context::{ContextError, ScopedContext, SELECTION_TARGET_VAR};
pub use counter::SeqCounters;
pub use overlay::OverlayMap;
