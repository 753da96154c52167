//! The capability splitter.
//!
//! [`split`] walks an exposed value graph once and partitions it into the
//! constants tree (data reproducible by value on the far side) and the
//! methods tree (callable positions replaced by capability tokens), while
//! filling the session's dispatch table. The walk is pure with respect to
//! its input; only the table accumulates.

use std::collections::BTreeMap;

use crate::graph::{Global, Globals};
use crate::table::CapabilityTable;
use crate::tree::MethodNode;

/// The three outputs of splitting one exposed graph.
#[derive(Debug)]
pub struct SplitGlobals {
    /// Pass-by-value half, ready for the serialization boundary.
    pub constants: serde_json::Map<String, serde_json::Value>,
    /// Token half; keys with no capabilities below them are absent.
    pub methods: BTreeMap<String, MethodNode>,
    /// Dispatch table, tokens assigned in traversal order.
    pub table: CapabilityTable,
}

/// Split a value graph into constants, methods, and the capability table.
///
/// Traversal is depth-first with keys in sorted order, so token assignment
/// is deterministic for a given graph. A nested namespace always contributes
/// a constants subtree (even an empty one, so the far side sees the object
/// exist), but contributes a methods subtree only when at least one token
/// lives below it.
pub fn split(globals: &Globals) -> SplitGlobals {
    let mut table = CapabilityTable::new();
    let (constants, methods) = split_level(globals.entries(), "", &mut table);
    SplitGlobals {
        constants,
        methods,
        table,
    }
}

fn split_level(
    entries: &BTreeMap<String, Global>,
    path: &str,
    table: &mut CapabilityTable,
) -> (
    serde_json::Map<String, serde_json::Value>,
    BTreeMap<String, MethodNode>,
) {
    let mut constants = serde_json::Map::new();
    let mut methods = BTreeMap::new();

    for (key, node) in entries {
        match node {
            Global::Value(value) => {
                constants.insert(key.clone(), value.clone());
            }
            Global::Function(function) => {
                let token = table.push(join(path, key), function.clone());
                methods.insert(key.clone(), MethodNode::Token(token));
            }
            Global::Namespace(children) => {
                let (child_constants, child_methods) =
                    split_level(children, &join(path, key), table);
                constants.insert(key.clone(), serde_json::Value::Object(child_constants));
                if !child_methods.is_empty() {
                    methods.insert(key.clone(), MethodNode::Branch(child_methods));
                }
            }
        }
    }

    (constants, methods)
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}
