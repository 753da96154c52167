//! The exposed value graph.
//!
//! A [`Globals`] graph describes everything the embedder grants to sandboxed
//! code: plain data passed by value, callables passed as capabilities, and
//! nested namespaces of the same. The graph is a discriminated tree (every
//! node carries an explicit tag rather than being sniffed at runtime), and
//! keys are held in sorted order so splitting is deterministic.

use std::collections::BTreeMap;

use crate::table::HostFunction;

/// One node of the exposed value graph.
///
/// Arrays are values here, not containers. A callable inside an array
/// element cannot be expressed and is therefore never silently dropped;
/// only keyed namespaces are traversed for capabilities.
#[derive(Debug, Clone)]
pub enum Global {
    /// Data reproducible by value on the far side (primitives, null,
    /// arrays, or any pre-built JSON structure treated as opaque data).
    Value(serde_json::Value),
    /// A callable crossing the boundary as a capability token.
    Function(HostFunction),
    /// A nested keyed mapping, traversed recursively.
    Namespace(BTreeMap<String, Global>),
}

/// The full graph of globals granted to one session.
///
/// # Example
///
/// ```
/// use belljar_capability::{Globals, HostFunction};
/// use serde_json::json;
///
/// let globals = Globals::new()
///     .value("answer", json!(42))
///     .function("greet", HostFunction::from_sync(|_| Ok(json!("hello"))))
///     .namespace(
///         "store",
///         Globals::new()
///             .value("region", json!("eu"))
///             .function("get", HostFunction::from_sync(|_| Ok(json!(null)))),
///     );
///
/// assert_eq!(globals.len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Globals {
    entries: BTreeMap<String, Global>,
}

impl Globals {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value passed by value. Replaces any previous entry at `key`.
    pub fn value(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.entries.insert(key.into(), Global::Value(value));
        self
    }

    /// Add a callable capability. Replaces any previous entry at `key`.
    pub fn function(mut self, key: impl Into<String>, function: HostFunction) -> Self {
        self.entries.insert(key.into(), Global::Function(function));
        self
    }

    /// Add a nested namespace. Replaces any previous entry at `key`.
    pub fn namespace(mut self, key: impl Into<String>, inner: Globals) -> Self {
        self.entries
            .insert(key.into(), Global::Namespace(inner.entries));
        self
    }

    /// Add a pre-built node.
    pub fn insert(mut self, key: impl Into<String>, node: Global) -> Self {
        self.entries.insert(key.into(), node);
        self
    }

    /// The top-level entries, keyed in sorted order.
    pub fn entries(&self) -> &BTreeMap<String, Global> {
        &self.entries
    }

    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Globals> for Global {
    fn from(globals: Globals) -> Self {
        Global::Namespace(globals.entries)
    }
}
