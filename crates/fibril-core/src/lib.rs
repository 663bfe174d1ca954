//! Core voice-allocation engine for fibril.
//!
//! Pure state and algorithms only: no sockets, no wall clock, no I/O. The
//! OSC front-end crate owns the wire format and the tick scheduler and
//! drives this crate through [`SystemState::apply`] and
//! [`Allocator::allocate`].

pub mod allocator;
pub mod constants;
pub mod curve;
pub mod emitter;
pub mod gray;
pub mod harmony;
pub mod rank;
pub mod state;
pub mod sustain;

pub use allocator::{AllocOutcome, Allocator};
pub use constants::*;
pub use emitter::{ChangeEmitter, OutboundEvent};
pub use gray::{density_of, gray_to_gci};
pub use harmony::{midi_note_name, MAJOR_SCALE, WHOLE_TONE_SCALE};
pub use rank::Rank;
pub use state::{ControlEvent, StateError, SystemState, Voice};
pub use sustain::SustainState;
