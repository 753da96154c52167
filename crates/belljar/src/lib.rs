//! # Belljar - Capability-Scoped Script Sandbox
//!
//! Belljar runs untrusted script inside a host application while exposing a
//! controlled, capability-scoped set of host-provided values and functions
//! to it.
//!
//! ## Features
//!
//! - **Capability security**: callables never cross the boundary; sandboxed
//!   code holds integer tokens resolved through a per-session table
//! - **Implicitly-asynchronous execution**: code bodies may `await` host
//!   calls and suspend at the top level
//! - **Scrubbed guest scope**: a fresh realm, allow-list by construction,
//!   with the engine's escape-capable surface pinned to `undefined`
//! - **Observability**: session events and per-session metrics
//!
//! ## Quick Start
//!
//! ```ignore
//! use belljar::prelude::*;
//! use serde_json::json;
//!
//! let runtime = Belljar::builder().build();
//!
//! let session = runtime
//!     .session()
//!     .expose_value("answer", json!(42))
//!     .expose_function("greet", HostFunction::from_sync(|args| {
//!         Ok(json!(format!("hello {}", args[0])))
//!     }))
//!     .create()
//!     .await?;
//!
//! let value = session.run("return await greet(answer)").await?;
//! assert_eq!(value, json!("hello 42"));
//! session.dispose();
//! ```
//!
//! ## Security Model
//!
//! 1. **No ambient authority**: the guest scope contains the ECMAScript
//!    intrinsics plus exactly what the embedder exposes
//! 2. **Tokens, not references**: every exposed callable is an index into a
//!    host-side table, dead once the session is disposed
//! 3. **Default-deny policy**: the container policy denies all resource
//!    loading unless the embedder relaxes it
//! 4. **Local failure**: a broken run never poisons the session; a broken
//!    session never poisons the host
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Your Application                     │
//! ├─────────────────────────────────────────────────────────┤
//! │                    belljar (facade)                     │
//! │                 ┌───────────────────┐                   │
//! │                 │  Belljar Builder  │                   │
//! │                 └─────────┬─────────┘                   │
//! │                           │                             │
//! │  ┌───────────────┬───────┴────────┬─────────────────┐  │
//! │  │ belljar-core  │ belljar-       │ belljar-observe │  │
//! │  │ (sessions,    │ capability     │ (events,        │  │
//! │  │  policy)      │ (split, table) │  metrics)       │  │
//! │  ├───────────────┴────────────────┴─────────────────┤  │
//! │  │        belljar-bridge (channel, relay)           │  │
//! │  ├──────────────────────────────────────────────────┤  │
//! │  │        belljar-guest (script engine)             │  │
//! │  └──────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use belljar_bridge::{Container, ThreadContainer};
use belljar_capability::{Global, Globals, HostFunction};
use belljar_core::{Session, SessionError, SessionOptions};
use belljar_guest::GuestLimits;
use belljar_observe::{EventDispatcher, EventSubscriber};

// Re-export from sub-crates
pub use belljar_bridge;
pub use belljar_capability;
pub use belljar_core;
pub use belljar_guest;
pub use belljar_observe;

/// Main entry point for Belljar.
pub struct Belljar {
    container: Arc<dyn Container>,
    events: Arc<EventDispatcher>,
}

impl Belljar {
    /// Create a new runtime builder.
    pub fn builder() -> BelljarBuilder {
        BelljarBuilder::new()
    }

    /// Create a runtime with default configuration.
    pub fn with_defaults() -> Belljar {
        BelljarBuilder::new().build()
    }

    /// Start building a sandbox session.
    pub fn session(&self) -> SessionBuilder<'_> {
        SessionBuilder {
            runtime: self,
            globals: Globals::new(),
            options: SessionOptions::default(),
        }
    }

    /// The runtime's event dispatcher.
    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }
}

impl std::fmt::Debug for Belljar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Belljar")
            .field("subscribers", &self.events.subscriber_count())
            .finish()
    }
}

/// Builder for configuring the Belljar runtime.
pub struct BelljarBuilder {
    limits: GuestLimits,
    container: Option<Arc<dyn Container>>,
    subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl BelljarBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            limits: GuestLimits::default(),
            container: None,
            subscribers: Vec::new(),
        }
    }

    /// Set the engine resource limits applied to every guest context.
    pub fn with_guest_limits(mut self, limits: GuestLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Use a custom isolation container instead of the thread-backed one.
    pub fn with_container(mut self, container: Arc<dyn Container>) -> Self {
        self.container = Some(container);
        self
    }

    /// Subscribe to session events.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Build the runtime.
    pub fn build(self) -> Belljar {
        let events = Arc::new(EventDispatcher::new());
        for subscriber in self.subscribers {
            events.subscribe(subscriber);
        }

        let container = self.container.unwrap_or_else(|| {
            Arc::new(ThreadContainer::new(belljar_guest::inner_spawn(
                self.limits,
            )))
        });

        tracing::debug!(
            subscribers = events.subscriber_count(),
            "Built Belljar runtime"
        );
        Belljar { container, events }
    }
}

impl Default for BelljarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for one sandbox session.
pub struct SessionBuilder<'a> {
    runtime: &'a Belljar,
    globals: Globals,
    options: SessionOptions,
}

impl SessionBuilder<'_> {
    /// Expose a value passed by value.
    pub fn expose_value(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.globals = self.globals.value(key, value);
        self
    }

    /// Expose a callable capability.
    pub fn expose_function(mut self, key: impl Into<String>, function: HostFunction) -> Self {
        self.globals = self.globals.function(key, function);
        self
    }

    /// Expose a nested namespace.
    pub fn expose_namespace(mut self, key: impl Into<String>, inner: Globals) -> Self {
        self.globals = self.globals.namespace(key, inner);
        self
    }

    /// Expose a pre-built graph node.
    pub fn expose(mut self, key: impl Into<String>, node: Global) -> Self {
        self.globals = self.globals.insert(key, node);
        self
    }

    /// Expose a whole graph at once, merging over anything set so far.
    pub fn expose_globals(mut self, globals: Globals) -> Self {
        for (key, node) in globals.entries() {
            self.globals = self.globals.insert(key.clone(), node.clone());
        }
        self
    }

    /// Append policy relaxations to the default-deny baseline.
    pub fn policy(mut self, extra: impl Into<String>) -> Self {
        self.options = self.options.with_policy(extra);
        self
    }

    /// Set the session debug name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options = self.options.with_name(name);
        self
    }

    /// Set the creation timeout.
    pub fn create_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.options = self.options.with_create_timeout(timeout);
        self
    }

    /// Create the session.
    pub async fn create(self) -> Result<Session, SessionError> {
        Session::create(
            &self.globals,
            self.options,
            self.runtime.container.as_ref(),
            Arc::clone(&self.runtime.events),
        )
        .await
    }
}

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```ignore
/// use belljar::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{Belljar, BelljarBuilder, SessionBuilder};
    pub use belljar_capability::{Global, Globals, HostFunction};
    pub use belljar_core::{Session, SessionError, SessionId, SessionOptions};
    pub use belljar_guest::GuestLimits;
    pub use belljar_observe::{EventDispatcher, EventSubscriber, SessionEvent};
}
