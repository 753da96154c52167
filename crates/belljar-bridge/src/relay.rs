//! The relay: a passive forwarder living inside the isolation container.
//!
//! The relay consumes exactly one [`RelayMessage::Init`] from the host-facing
//! port, uses it to start the inner execution context, and from then on moves
//! payloads verbatim in both directions without looking inside them. It has
//! no protocol knowledge beyond the init envelope.

use std::thread;

use tracing::{debug, warn};

use crate::port::{Port, RelayMessage};

/// Startup information extracted from the init envelope.
#[derive(Debug, Clone)]
pub struct GuestBoot {
    /// Debug name for the inner context.
    pub name: String,
    /// Program the inner context evaluates before serving requests.
    pub source: String,
}

/// Factory that brings up the inner execution context on its own thread.
///
/// Receives the guest end of a fresh port pair and the boot information from
/// the init envelope. Errors are container-construction failures.
pub type InnerSpawn = dyn Fn(Port, GuestBoot) -> std::io::Result<()> + Send + Sync;

/// Start the relay on a dedicated thread.
pub fn spawn_relay(
    outer: Port,
    spawn_inner: std::sync::Arc<InnerSpawn>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("belljar-relay".to_string())
        .spawn(move || relay_main(outer, spawn_inner))
}

fn relay_main(outer: Port, spawn_inner: std::sync::Arc<InnerSpawn>) {
    let (outer_tx, mut outer_rx) = outer.split();

    // The bridge starts with exactly one init envelope.
    let boot = match outer_rx.blocking_recv() {
        Some(RelayMessage::Init {
            name,
            inner_program_source,
        }) => GuestBoot {
            name,
            source: inner_program_source,
        },
        Some(other) => {
            warn!(message = ?other, "First relay message was not init; tearing down");
            return;
        }
        None => return,
    };

    debug!(name = %boot.name, "Relay received init; starting inner context");

    let (relay_side, guest_side) = Port::pair();
    let (inner_tx, mut inner_rx) = relay_side.split();

    if let Err(err) = spawn_inner(guest_side, boot) {
        // Dropping both outer halves here surfaces the failure to the host
        // as a closed channel.
        warn!(error = %err, "Inner context failed to start");
        return;
    }

    // Inner -> outer on its own thread; outer -> inner on this one. Each
    // pump exits when its source closes, and dropping its sender cascades
    // the shutdown to the other side.
    let pump = thread::Builder::new()
        .name("belljar-relay-up".to_string())
        .spawn(move || {
            while let Some(message) = inner_rx.blocking_recv() {
                if outer_tx.send(message).is_err() {
                    break;
                }
            }
        });

    while let Some(message) = outer_rx.blocking_recv() {
        if inner_tx.send(message).is_err() {
            break;
        }
    }
    drop(inner_tx);

    if let Ok(pump) = pump {
        let _ = pump.join();
    }
}
