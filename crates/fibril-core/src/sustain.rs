//! Piano-style sustain latch. Pedal edges snapshot or release the frozen
//! voice set; while held, the allocator may only add voices.

use log::debug;

use crate::state::SystemState;

/// Latch state derived from the pedal pair at each tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SustainState {
    Off,
    Held,
}

impl SustainState {
    pub fn of(state: &SystemState) -> Self {
        if state.sustain {
            SustainState::Held
        } else {
            SustainState::Off
        }
    }
}

/// Apply the pedal edge for this tick, then align `previous_sustain`.
///
/// Rising edge: every sounding voice is latched at its current MIDI
/// (first-encountered wins on defensive duplicates). Falling edge: the
/// frozen set empties and every latch flag clears. Level states are no-ops.
pub fn apply_pedal_edge(state: &mut SystemState) -> SustainState {
    match (state.previous_sustain, state.sustain) {
        (false, true) => {
            for i in 0..state.voices.len() {
                let (id, midi, volume) = {
                    let v = &state.voices[i];
                    (v.id, v.midi_note, v.volume)
                };
                if volume && state.frozen.insert(id, midi) {
                    state.voices[i].sustained = true;
                }
            }
            debug!("sustain rising edge: {} voices latched", state.frozen.len());
        }
        (true, false) => {
            state.frozen.clear();
            for voice in state.voices.iter_mut() {
                voice.sustained = false;
            }
            debug!("sustain falling edge: latch released");
        }
        _ => {}
    }
    state.previous_sustain = state.sustain;
    SustainState::of(state)
}
