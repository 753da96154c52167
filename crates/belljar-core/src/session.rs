//! Sandbox session lifecycle.
//!
//! A [`Session`] is the embedder's handle on one sandbox instance: it is
//! produced fully constructed (container up, globals split and installed)
//! and afterwards exposes exactly `run` and `dispose`. The capability table
//! and the installed constants are fixed for the session's lifetime; the
//! only state transition left is `disposed: false → true`, exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use belljar_bridge::channel::Channel;
use belljar_bridge::container::{Container, ContainerHandle, ContainerSpec};
use belljar_bridge::port::RelayMessage;
use belljar_bridge::protocol::{InstallParams, METHOD_INSTALL, METHOD_RUN, RunParams};
use belljar_capability::{CapabilityTable, Globals, split};
use belljar_observe::{EventDispatcher, MetricsCollector, MetricsSnapshot, RunOutcome, SessionEvent};

use crate::config::SessionOptions;
use crate::dispatch::TableDispatcher;
use crate::error::{SessionError, SessionResult};
use crate::{document, policy};

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct SessionInner {
    id: SessionId,
    name: String,
    channel: Channel,
    container: ContainerHandle,
    table: Arc<CapabilityTable>,
    disposed: AtomicBool,
    /// Serializes `run` calls: exactly one is outstanding at a time.
    run_gate: Mutex<()>,
    events: Arc<EventDispatcher>,
    metrics: Arc<MetricsCollector>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        // A dropped handle behaves like a disposed one; without this the
        // channel driver would keep the container threads parked forever.
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.channel.close();
            self.container.release();
        }
    }
}

/// One sandbox instance, from creation to disposal.
///
/// Cheap to clone; all clones share the same session state, so disposing
/// any clone disposes them all.
///
/// # Example
///
/// ```ignore
/// let session = Session::create(&globals, SessionOptions::default(), &container, events).await?;
/// let value = session.run("return answer * 2").await?;
/// session.dispose();
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Create a sandbox session.
    ///
    /// Splits the global graph, starts the container, pushes the startup
    /// program through the relay init envelope, and installs the split
    /// globals into the guest. Any failure along the way surfaces as
    /// [`SessionError::Construction`].
    pub async fn create(
        globals: &Globals,
        options: SessionOptions,
        container: &dyn Container,
        events: Arc<EventDispatcher>,
    ) -> SessionResult<Session> {
        let id = SessionId::new();
        let name = options
            .name
            .unwrap_or_else(|| format!("belljar-{}", &id.to_string()[..8]));

        let split_globals = split(globals);
        let assembled_policy = policy::assemble(&options.policy_extra);
        let startup = belljar_guest::startup_source();
        let container_document = document::container_document(&assembled_policy, &startup);

        let (port, handle) = container
            .start(ContainerSpec {
                name: name.clone(),
                policy: assembled_policy,
                document: container_document,
            })
            .map_err(|err| SessionError::Construction(err.to_string()))?;

        if port
            .send(RelayMessage::Init {
                name: name.clone(),
                inner_program_source: startup,
            })
            .is_err()
        {
            handle.release();
            return Err(SessionError::Construction(
                "container link closed".to_string(),
            ));
        }

        let table = Arc::new(split_globals.table);
        let metrics = Arc::new(MetricsCollector::new());
        let dispatcher = TableDispatcher::new(
            Arc::clone(&table),
            Arc::clone(&events),
            Arc::clone(&metrics),
        );
        let channel = Channel::new(port, Arc::new(dispatcher));

        let install = InstallParams {
            constants: split_globals.constants,
            methods: split_globals.methods,
        };
        let params = serde_json::to_value(&install)
            .map_err(|err| SessionError::Construction(err.to_string()))?;

        debug!(session = %id, name = %name, "Installing globals");
        let installed =
            tokio::time::timeout(options.create_timeout, channel.call(METHOD_INSTALL, params))
                .await;
        match installed {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                channel.close();
                handle.release();
                return Err(SessionError::Construction(err.to_string()));
            }
            Err(_) => {
                channel.close();
                handle.release();
                return Err(SessionError::Construction(format!(
                    "guest did not initialize within {:?}",
                    options.create_timeout
                )));
            }
        }

        info!(session = %id, name = %name, capabilities = table.len(), "Session created");
        events.emit(SessionEvent::SessionCreated {
            name: name.clone(),
            capability_count: table.len(),
        });

        Ok(Session {
            inner: Arc::new(SessionInner {
                id,
                name,
                channel,
                container: handle,
                table,
                disposed: AtomicBool::new(false),
                run_gate: Mutex::new(()),
                events,
                metrics,
            }),
        })
    }

    /// Execute one code body in the session.
    ///
    /// The code compiles as the body of an implicitly-asynchronous function;
    /// an explicit `return` supplies the resolved value (structurally
    /// cloned, never a live reference), falling off the end yields null.
    /// One run is outstanding at a time; overlapping calls queue. A failed
    /// run leaves the session usable, and global state it set before
    /// failing persists into later runs.
    pub async fn run(&self, code: &str) -> SessionResult<serde_json::Value> {
        if self.is_disposed() {
            return Err(SessionError::Disposed);
        }

        let _gate = self.inner.run_gate.lock().await;
        // Disposal may have happened while queued behind another run.
        if self.is_disposed() {
            return Err(SessionError::Disposed);
        }

        self.inner.events.emit(SessionEvent::RunStarted {
            code_len: code.len(),
        });
        let params = serde_json::to_value(RunParams {
            code: code.to_string(),
        })
        .map_err(|err| SessionError::Bridge(err.to_string()))?;

        let start = Instant::now();
        let result = self
            .inner
            .channel
            .call(METHOD_RUN, params)
            .await
            .map_err(SessionError::from_run_error);
        let duration = start.elapsed();

        let outcome = match &result {
            Ok(_) => RunOutcome::Resolved,
            Err(SessionError::Compile(_)) => RunOutcome::CompileFailed,
            Err(SessionError::Disposed) => RunOutcome::Disposed,
            Err(_) => RunOutcome::RuntimeFailed,
        };
        if let Err(err) = &result {
            debug!(session = %self.inner.id, error = %err, "Run failed");
        }
        self.inner.metrics.record_run(result.is_ok(), duration);
        self.inner
            .events
            .emit(SessionEvent::RunCompleted { outcome, duration });

        result
    }

    /// Dispose of the session. Idempotent.
    ///
    /// Closes the channel (no further traffic in either direction, and any
    /// pending `run` rejects with [`SessionError::Disposed`]), then releases
    /// the container. Results of nested invocations arriving after this
    /// point are discarded.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(session = %self.inner.id, name = %self.inner.name, "Disposing session");
        self.inner.channel.close();
        self.inner.container.release();
        self.inner.events.emit(SessionEvent::SessionDisposed {
            name: self.inner.name.clone(),
        });
    }

    /// Check whether the session has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the session ID.
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Get the session debug name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of capabilities exposed to this session.
    pub fn capability_count(&self) -> usize {
        self.inner.table.len()
    }

    /// The document the session's container was loaded with.
    pub fn container_document(&self) -> &str {
        self.inner.container.document()
    }

    /// Snapshot of the session's metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
