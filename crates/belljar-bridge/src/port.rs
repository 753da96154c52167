//! In-memory duplex message link and the relay envelope.
//!
//! A [`Port`] is one endpoint of a point-to-point link: ordered, reliable,
//! and usable from both async tasks (host side) and plain threads (guest
//! side, via [`Port::blocking_recv`]). Everything that crosses a port is a
//! [`RelayMessage`]: a single `init` envelope to start the bridge, then
//! opaque payloads that intermediaries forward verbatim.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Messages carried across the container boundary.
///
/// Only `init` has meaning to the relay. The payload body is an opaque
/// string (in practice an encoded [`Frame`](crate::protocol::Frame)), and
/// nothing between the two channel endpoints ever looks inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMessage {
    /// Sent exactly once to start the bridge. Carries the debug name of the
    /// inner context and the program it must evaluate at startup.
    #[serde(rename_all = "camelCase")]
    Init {
        /// Debug name for the inner context.
        name: String,
        /// Startup program evaluated by the inner context before anything
        /// else.
        inner_program_source: String,
    },
    /// Opaque payload forwarded verbatim in both directions.
    Payload {
        /// The encoded frame; not interpreted in transit.
        body: String,
    },
}

/// Error returned when sending on a port whose peer is gone.
#[derive(Debug, Error)]
#[error("port closed")]
pub struct PortClosed;

/// One endpoint of an in-memory duplex link.
#[derive(Debug)]
pub struct Port {
    tx: UnboundedSender<RelayMessage>,
    rx: UnboundedReceiver<RelayMessage>,
}

impl Port {
    /// Create a connected pair of endpoints.
    pub fn pair() -> (Port, Port) {
        let (left_tx, right_rx) = mpsc::unbounded_channel();
        let (right_tx, left_rx) = mpsc::unbounded_channel();
        (
            Port {
                tx: left_tx,
                rx: left_rx,
            },
            Port {
                tx: right_tx,
                rx: right_rx,
            },
        )
    }

    /// Send a message to the peer.
    pub fn send(&self, message: RelayMessage) -> Result<(), PortClosed> {
        self.tx.send(message).map_err(|_| PortClosed)
    }

    /// Clone the sending half.
    pub fn sender(&self) -> UnboundedSender<RelayMessage> {
        self.tx.clone()
    }

    /// Receive the next message, awaiting inside an async context.
    ///
    /// Returns `None` once the peer's sending half is dropped.
    pub async fn recv(&mut self) -> Option<RelayMessage> {
        self.rx.recv().await
    }

    /// Receive the next message, blocking the current thread.
    ///
    /// Must not be called from inside an async runtime.
    pub fn blocking_recv(&mut self) -> Option<RelayMessage> {
        self.rx.blocking_recv()
    }

    /// Split into raw sending and receiving halves.
    pub fn split(
        self,
    ) -> (
        UnboundedSender<RelayMessage>,
        UnboundedReceiver<RelayMessage>,
    ) {
        (self.tx, self.rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_is_duplex() {
        let (a, mut b) = Port::pair();

        a.send(RelayMessage::Payload {
            body: "ping".to_string(),
        })
        .unwrap();
        b.send(RelayMessage::Payload {
            body: "pong".to_string(),
        })
        .unwrap();

        assert_eq!(
            b.recv().await,
            Some(RelayMessage::Payload {
                body: "ping".to_string()
            })
        );
        let (_, mut a_rx) = a.split();
        assert_eq!(
            a_rx.recv().await,
            Some(RelayMessage::Payload {
                body: "pong".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_order_is_preserved() {
        let (a, mut b) = Port::pair();
        for i in 0..10 {
            a.send(RelayMessage::Payload {
                body: i.to_string(),
            })
            .unwrap();
        }
        for i in 0..10 {
            assert_eq!(
                b.recv().await,
                Some(RelayMessage::Payload {
                    body: i.to_string()
                })
            );
        }
    }

    #[tokio::test]
    async fn test_recv_none_after_peer_drop() {
        let (a, mut b) = Port::pair();
        drop(a);
        assert_eq!(b.recv().await, None);
    }

    #[test]
    fn test_send_fails_after_peer_drop() {
        let (a, b) = Port::pair();
        drop(b);
        assert!(
            a.send(RelayMessage::Payload {
                body: String::new()
            })
            .is_err()
        );
    }

    #[test]
    fn test_init_wire_shape() {
        let init = RelayMessage::Init {
            name: "worker".to_string(),
            inner_program_source: "1;".to_string(),
        };
        let json = serde_json::to_string(&init).unwrap();
        assert_eq!(
            json,
            r#"{"type":"init","name":"worker","innerProgramSource":"1;"}"#
        );
    }
}
