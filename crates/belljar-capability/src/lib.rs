//! Belljar Capability Model
//!
//! This crate provides the capability model for the Belljar script sandbox:
//! the exposed value graph, the splitter that partitions it for the boundary
//! crossing, and the per-session dispatch table.
//!
//! # Capability-Based Exposure
//!
//! Sandboxed code can only reach what the embedder explicitly grants:
//!
//! - Plain data crosses the boundary **by value** (the constants tree).
//! - Callables never cross at all: each is replaced **in place** by an
//!   integer [`Token`] into the host-side [`CapabilityTable`] (the methods
//!   tree), and the isolated side only ever calls through that indirection.
//! - Absence from the graph guarantees absence from the sandbox.
//!
//! # Usage
//!
//! ```
//! use belljar_capability::{split, Globals, HostFunction};
//! use serde_json::json;
//!
//! let globals = Globals::new()
//!     .value("answer", json!(42))
//!     .function("hello", HostFunction::from_sync(|_| Ok(json!("hi"))));
//!
//! let out = split(&globals);
//! assert_eq!(out.table.len(), 1);
//! assert_eq!(out.constants["answer"], json!(42));
//! ```

pub mod graph;
pub mod split;
pub mod table;
pub mod tree;

// Re-export main types
pub use graph::{Global, Globals};
pub use split::{SplitGlobals, split};
pub use table::{CapabilityTable, HostFunction, HostFuture, HostResult, Token};
pub use tree::MethodNode;
