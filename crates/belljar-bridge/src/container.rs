//! The isolation container boundary.
//!
//! A [`Container`] brings up one isolated execution environment and hands
//! back the host-facing port of its relay. The container is trusted to
//! provide genuine isolation once started; this crate ships
//! [`ThreadContainer`], which realizes the boundary as dedicated OS threads
//! (relay + inner context), each owning a private script engine instance and
//! sharing nothing with the embedder beyond the port.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{debug, info};

use crate::port::Port;
use crate::relay::{InnerSpawn, spawn_relay};

/// Errors constructing a container.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The container's threads could not be spawned.
    #[error("failed to start container: {0}")]
    Spawn(#[from] std::io::Error),
}

/// What a container needs to come up.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Debug name of the sandbox.
    pub name: String,
    /// Assembled isolation policy for the container.
    pub policy: String,
    /// The container document embedding the policy and the relay payload.
    pub document: String,
}

/// Handle on a running container.
///
/// Releasing is idempotent and does not force threads down: the relay and
/// inner context unwind on their own once the host's port half is dropped,
/// which the channel does when it closes.
#[derive(Debug)]
pub struct ContainerHandle {
    name: String,
    document: String,
    released: AtomicBool,
}

impl ContainerHandle {
    /// The sandbox debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The document the container was loaded with.
    pub fn document(&self) -> &str {
        &self.document
    }

    /// Release the container. Idempotent.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(name = %self.name, "Container released");
    }

    /// Check whether the container has been released.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// An isolation boundary that can host one sandbox.
pub trait Container: Send + Sync {
    /// Start the container described by `spec`.
    ///
    /// Returns the host-facing port (the relay's outer end) and the handle
    /// used at disposal.
    fn start(&self, spec: ContainerSpec) -> Result<(Port, ContainerHandle), ContainerError>;
}

/// Container realized as dedicated threads in the host process.
///
/// The inner execution context is created by the spawner passed at
/// construction, once the relay receives the init envelope.
pub struct ThreadContainer {
    spawn_inner: Arc<InnerSpawn>,
}

impl ThreadContainer {
    /// Create a container that starts inner contexts with `spawn_inner`.
    pub fn new(spawn_inner: Arc<InnerSpawn>) -> Self {
        Self { spawn_inner }
    }
}

impl Container for ThreadContainer {
    fn start(&self, spec: ContainerSpec) -> Result<(Port, ContainerHandle), ContainerError> {
        let (host_port, relay_port) = Port::pair();
        // The relay thread is detached: it unwinds when either port side
        // closes, so the handle does not need to keep it.
        spawn_relay(relay_port, Arc::clone(&self.spawn_inner))?;

        info!(name = %spec.name, "Container started");
        Ok((
            host_port,
            ContainerHandle {
                name: spec.name,
                document: spec.document,
                released: AtomicBool::new(false),
            },
        ))
    }
}

impl std::fmt::Debug for ThreadContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadContainer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::RelayMessage;

    fn spec() -> ContainerSpec {
        ContainerSpec {
            name: "test".to_string(),
            policy: "default-src 'none'".to_string(),
            document: "<html></html>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_start_and_release() {
        let container = ThreadContainer::new(Arc::new(|_port, _boot| Ok(())));
        let (port, handle) = container.start(spec()).unwrap();

        assert_eq!(handle.name(), "test");
        assert_eq!(handle.document(), "<html></html>");
        assert!(!handle.is_released());

        handle.release();
        handle.release();
        assert!(handle.is_released());
        drop(port);
    }

    #[tokio::test]
    async fn test_inner_context_reachable_through_relay() {
        let container = ThreadContainer::new(Arc::new(|mut port: Port, _boot| {
            std::thread::Builder::new()
                .name("inner".to_string())
                .spawn(move || {
                    while let Some(RelayMessage::Payload { body }) = port.blocking_recv() {
                        let _ = port.send(RelayMessage::Payload {
                            body: body.to_uppercase(),
                        });
                    }
                })?;
            Ok(())
        }));

        let (host, _handle) = container.start(spec()).unwrap();
        host.send(RelayMessage::Init {
            name: "test".to_string(),
            inner_program_source: String::new(),
        })
        .unwrap();
        host.send(RelayMessage::Payload {
            body: "hello".to_string(),
        })
        .unwrap();

        let (_tx, mut rx) = host.split();
        assert_eq!(
            rx.recv().await,
            Some(RelayMessage::Payload {
                body: "HELLO".to_string()
            })
        );
    }
}
