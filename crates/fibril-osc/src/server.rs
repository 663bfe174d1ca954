//! The two service loops: UDP ingest and the fixed-cadence allocator tick.
//!
//! One mutex guards the engine state. The ingest thread holds it briefly
//! per datagram; the scheduler holds it for the allocator compute step,
//! snapshots the voice array, and emits outside the critical section.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use fibril_core::{Allocator, ChangeEmitter, OutboundEvent, SystemState, Voice, NUM_VOICES};

use crate::osc;

/// State shared between the ingest and scheduler threads.
pub struct Shared {
    pub state: SystemState,
    pub dirty: bool,
}

impl Shared {
    pub fn new() -> Self {
        Self { state: SystemState::new(), dirty: false }
    }
}

impl Default for Shared {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocking receive loop: decode, route, apply under the lock. Malformed
/// traffic is logged and dropped; the loop only exits on shutdown or a
/// fatal socket error.
pub fn ingest_loop(socket: UdpSocket, shared: Arc<Mutex<Shared>>, running: Arc<AtomicBool>) {
    let mut buf = [0u8; 2048];
    while running.load(Ordering::Relaxed) {
        let len = match socket.recv_from(&mut buf) {
            Ok((len, _)) => len,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => {
                error!("inbound socket failed: {e}");
                running.store(false, Ordering::Relaxed);
                break;
            }
        };

        let messages = match osc::decode(&buf[..len]) {
            Ok(messages) => messages,
            Err(e) => {
                warn!("dropping malformed packet ({len} bytes): {e}");
                continue;
            }
        };

        let Ok(mut shared) = shared.lock() else {
            error!("state mutex poisoned, ingest stopping");
            running.store(false, Ordering::Relaxed);
            break;
        };
        for message in &messages {
            let Some(event) = osc::route(message) else {
                warn!("dropping unroutable message {}", message.address);
                continue;
            };
            match shared.state.apply(event) {
                Ok(true) => shared.dirty = true,
                Ok(false) => {}
                Err(e) => warn!("dropping out-of-range event: {e}"),
            }
        }
    }
    info!("ingest loop stopped");
}

/// Fixed-cadence allocator driver. Emits a full resync on entry, then
/// change-only deltas after each allocating tick.
pub fn scheduler_loop(
    shared: Arc<Mutex<Shared>>,
    running: Arc<AtomicBool>,
    mut allocator: Allocator,
    socket: UdpSocket,
    target: SocketAddr,
    tick: Duration,
) {
    let mut emitter = {
        let Ok(guard) = shared.lock() else {
            error!("state mutex poisoned before startup");
            return;
        };
        ChangeEmitter::new(&guard.state.voices)
    };

    let mut events = Vec::with_capacity(NUM_VOICES * 2 + 1);
    {
        let snapshot = match shared.lock() {
            Ok(guard) => guard.state.voices,
            Err(_) => return,
        };
        emitter.full_resync(&snapshot, &mut events);
        send_events(&socket, target, &events);
        info!("startup resync sent ({} events)", events.len());
    }

    let mut next_tick = Instant::now() + tick;
    while running.load(Ordering::Relaxed) {
        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        }
        next_tick += tick;
        if next_tick < Instant::now() {
            // A stall happened; rebase rather than burst to catch up.
            next_tick = Instant::now() + tick;
        }

        let snapshot: Option<[Voice; NUM_VOICES]> = {
            let Ok(mut guard) = shared.lock() else {
                error!("state mutex poisoned, scheduler stopping");
                running.store(false, Ordering::Relaxed);
                break;
            };
            let edge_pending = guard.state.previous_sustain != guard.state.sustain;
            if guard.dirty || edge_pending {
                guard.dirty = false;
                allocator.allocate(&mut guard.state);
                debug!("{}", guard.state.readout());
                Some(guard.state.voices)
            } else {
                None
            }
        };

        if let Some(voices) = snapshot {
            events.clear();
            emitter.diff(&voices, &mut events);
            send_events(&socket, target, &events);
        }
    }
    info!("scheduler loop stopped");
}

/// Fire the deltas at the host. A send failure is logged and skipped;
/// transient loss is bounded by the tick period and never reaches the
/// allocator.
fn send_events(socket: &UdpSocket, target: SocketAddr, events: &[OutboundEvent]) {
    for event in events {
        let bytes = osc::encode_event(event);
        if let Err(e) = socket.send_to(&bytes, target) {
            warn!("send failed for {event:?}: {e}");
        }
    }
}
