//! The methods tree: the parallel, capability-only shadow of a split graph.
//!
//! On the wire a token position is a bare JSON number and a branch is a JSON
//! object, so the far side can walk the tree without any tagging overhead.
//! Subtrees with no capabilities below them are omitted entirely at split
//! time; an absent key tells the reconstruction side it can skip proxy
//! creation for that whole region.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::table::Token;

/// One node of the methods tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MethodNode {
    /// A callable position, replaced by its capability token.
    Token(Token),
    /// A nested mapping with at least one token somewhere below it.
    Branch(BTreeMap<String, MethodNode>),
}

impl MethodNode {
    /// Count the tokens in this subtree.
    pub fn token_count(&self) -> usize {
        match self {
            MethodNode::Token(_) => 1,
            MethodNode::Branch(children) => children.values().map(MethodNode::token_count).sum(),
        }
    }
}

/// Count the tokens across a whole methods tree.
pub fn token_count(tree: &BTreeMap<String, MethodNode>) -> usize {
    tree.values().map(MethodNode::token_count).sum()
}
