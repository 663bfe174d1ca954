// Invariant sweeps under randomized (but seeded) controller traffic.

use std::collections::BTreeSet;

use fibril_core::{density_of, Allocator, ControlEvent, SystemState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

struct Engine {
    state: SystemState,
    alloc: Allocator,
    dirty: bool,
}

impl Engine {
    fn new(seed: u64) -> Self {
        Self { state: SystemState::new(), alloc: Allocator::new(seed), dirty: false }
    }

    fn send(&mut self, event: ControlEvent) {
        if self.state.apply(event).expect("well-formed event") {
            self.dirty = true;
        }
    }

    fn tick(&mut self) {
        if self.dirty {
            self.alloc.allocate(&mut self.state);
            self.dirty = false;
        }
    }
}

/// The allocation contract at a tick boundary: unique sounding notes,
/// consistent latch bookkeeping, density derivation, full release on
/// pedal up.
fn assert_invariants(state: &SystemState, context: &str) {
    assert_eq!(state.voices.len(), 48);
    assert_eq!(state.ranks.len(), 8);

    let sounding: Vec<u8> = state.sounding_midis().collect();
    let unique: BTreeSet<u8> = sounding.iter().copied().collect();
    assert_eq!(
        unique.len(),
        sounding.len(),
        "{context}: duplicate sounding MIDI in {sounding:?}"
    );

    let mut frozen_midis = BTreeSet::new();
    for &(vid, midi) in state.frozen.iter() {
        assert!(
            frozen_midis.insert(midi),
            "{context}: duplicate frozen MIDI {midi}"
        );
        let voice = &state.voices[usize::from(vid - 1)];
        assert_eq!(voice.midi_note, midi, "{context}: frozen voice {vid} repitched");
        assert!(voice.volume, "{context}: frozen voice {vid} silenced");
        assert!(voice.sustained, "{context}: frozen voice {vid} unlatched");
    }

    for voice in &state.voices {
        if voice.sustained {
            assert!(voice.volume, "{context}: sustained voice {} silent", voice.id);
        }
    }
    if !state.sustain && state.previous_sustain == state.sustain {
        assert!(
            state.voices.iter().all(|v| !v.sustained),
            "{context}: latch survived pedal release"
        );
        assert!(state.frozen.is_empty(), "{context}: frozen set survived release");
    }

    for rank in &state.ranks {
        assert_eq!(
            rank.density,
            density_of(rank.grey_code),
            "{context}: rank {} density drifted from its grey code",
            rank.number
        );
    }
}

fn random_event(rng: &mut StdRng) -> ControlEvent {
    match rng.gen_range(0..5) {
        0 => ControlEvent::RankBit {
            rank: rng.gen_range(1..=8),
            slot: rng.gen_range(0..4),
            value: rng.gen_range(0..2),
        },
        1 => ControlEvent::RankPriority {
            rank: rng.gen_range(1..=8),
            priority: rng.gen_range(1..=8),
        },
        2 => ControlEvent::RankTonicization {
            rank: rng.gen_range(1..=8),
            tonicization: rng.gen_range(1..=9),
        },
        3 => ControlEvent::Sustain(rng.gen_bool(0.5)),
        _ => ControlEvent::KeyCenter(rng.gen_range(0..=127)),
    }
}

#[test]
fn invariants_hold_under_random_traffic() {
    let mut engine = Engine::new(1234);
    let mut rng = StdRng::seed_from_u64(5678);

    for step in 0..500 {
        // A small burst per tick, like a controller gesture.
        for _ in 0..rng.gen_range(1..4) {
            engine.send(random_event(&mut rng));
        }
        engine.tick();
        assert_invariants(&engine.state, &format!("step {step}"));
    }
}

#[test]
fn duplicate_prevention_under_held_pedal_stress() {
    let mut engine = Engine::new(42);
    for rank in 1..=8 {
        for slot in 0..4 {
            engine.send(ControlEvent::RankBit { rank, slot, value: 1 });
        }
    }
    engine.send(ControlEvent::Sustain(true));
    engine.tick();
    assert_invariants(&engine.state, "after saturation");

    let mut rng = StdRng::seed_from_u64(77);
    for step in 0..1000 {
        let rank = rng.gen_range(1..=8);
        let slot = rng.gen_range(0..4);
        let value = rng.gen_range(0..2);
        engine.send(ControlEvent::RankBit { rank, slot, value });
        engine.tick();
        assert_invariants(&engine.state, &format!("stress step {step}"));
    }

    engine.send(ControlEvent::Sustain(false));
    engine.tick();
    assert_invariants(&engine.state, "after release");
    assert!(engine.state.voices.iter().all(|v| !v.sustained));
}

#[test]
fn malformed_events_leave_state_untouched() {
    let mut engine = Engine::new(9);
    engine.send(ControlEvent::RankBit { rank: 2, slot: 0, value: 1 });
    engine.tick();
    let snapshot = engine.state.clone();

    for bad in [
        ControlEvent::RankBit { rank: 0, slot: 0, value: 1 },
        ControlEvent::RankBit { rank: 12, slot: 0, value: 1 },
        ControlEvent::RankBit { rank: 2, slot: 7, value: 1 },
        ControlEvent::RankPriority { rank: 2, priority: 0 },
        ControlEvent::RankTonicization { rank: 2, tonicization: 0 },
        ControlEvent::KeyCenter(200),
    ] {
        assert!(engine.state.apply(bad).is_err(), "{bad:?} must be rejected");
    }
    engine.tick();

    assert_eq!(engine.state.voices, snapshot.voices);
    assert_eq!(engine.state.ranks, snapshot.ranks);
    assert_eq!(engine.state.key_center, snapshot.key_center);
}
