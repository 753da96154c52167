//! Belljar Bridge
//!
//! This crate provides the transport plumbing between the Belljar host
//! orchestrator and the isolated guest runtime:
//!
//! - [`Port`]: one endpoint of an ordered, reliable in-memory duplex link
//! - [`Frame`] and friends: the JSON request/response wire protocol
//! - [`Channel`]: `call(method, params)` / serve semantics with correlation
//!   ids, and close-time forcing of pending calls
//! - the relay: a passive forwarder inside the container that consumes one
//!   `init` envelope and then moves payloads verbatim
//! - [`Container`] / [`ThreadContainer`]: the isolation boundary abstraction
//!   and its thread-backed realization
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Host                                                         │
//! │  ┌───────────┐   Port    ┌───────────────────────────────┐   │
//! │  │  Channel  │◄─────────►│ Container                     │   │
//! │  └───────────┘           │  ┌───────┐  Port  ┌─────────┐ │   │
//! │                          │  │ Relay │◄──────►│  Guest  │ │   │
//! │                          │  └───────┘        └─────────┘ │   │
//! │                          └───────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The relay never interprets payload bodies; the channel never knows it is
//! talking through a relay. Disposal is a channel close: pending calls are
//! forced to a terminal error and the port cascade tears the container's
//! threads down.

pub mod channel;
pub mod container;
pub mod port;
pub mod protocol;
pub mod relay;

// Re-export main types
pub use channel::{Channel, ChannelError, RequestHandler};
pub use container::{Container, ContainerError, ContainerHandle, ContainerSpec, ThreadContainer};
pub use port::{Port, PortClosed, RelayMessage};
pub use protocol::{
    CallResult, FaultKind, Frame, InstallParams, InvokeParams, METHOD_INSTALL, METHOD_INVOKE,
    METHOD_RUN, RunParams, WireFault,
};
pub use relay::{GuestBoot, InnerSpawn, spawn_relay};
