//! Belljar Core - Host Orchestrator
//!
//! This crate provides the host side of the Belljar script sandbox:
//!
//! - [`Session`]: one sandbox instance's lifecycle (`create`, `run`,
//!   `dispose`)
//! - [`policy`]: default-deny policy assembly
//! - [`escape`] and [`document`]: markup embedding for the container
//! - capability dispatch against the session's table
//!
//! # Quick Start
//!
//! ```ignore
//! use belljar_core::prelude::*;
//!
//! let session = Session::create(&globals, SessionOptions::default(), &container, events).await?;
//! let value = session.run("return answer * 2").await?;
//! session.dispose();
//! ```
//!
//! # Security Model
//!
//! The orchestrator never hands a function reference across the boundary.
//! Callables are split out of the exposed graph into a per-session table and
//! replaced by integer tokens; the only inbound surface is `invoke`, which
//! resolves a token against that table and treats anything out of range as
//! a silent no-op. Disposal closes the channel first, so a disposed session
//! can never carry traffic again.

pub mod config;
pub mod document;
pub mod error;
pub mod escape;
pub mod policy;
pub mod session;

mod dispatch;

// Re-export main types
pub use config::{DEFAULT_CREATE_TIMEOUT, SessionOptions};
pub use document::container_document;
pub use error::{SessionError, SessionResult};
pub use escape::{escape_attribute, neutralize_script_close};
pub use policy::{POLICY_BASELINE, assemble};
pub use session::{Session, SessionId};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```ignore
/// use belljar_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::SessionOptions;
    pub use crate::error::{SessionError, SessionResult};
    pub use crate::session::{Session, SessionId};
}
