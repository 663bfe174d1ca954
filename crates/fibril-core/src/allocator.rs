//! The probabilistic voice allocator. Each pass rebuilds the voice pool to
//! match the target chord implied by the active ranks, under the sustain
//! latch, register, and voice-leading constraints.

use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::constants::{MIDI_RANGE, NUM_VOICES, REGISTER_WIDTH};
use crate::curve::{gaussian, voice_leading_mask};
use crate::state::SystemState;
use crate::sustain::apply_pedal_edge;

/// What happened to one requested note, for logging and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocOutcome {
    /// A silent voice was reused.
    Allocated { voice: u8, midi: u8 },
    /// A sounding voice was repitched.
    Stolen { voice: u8, midi: u8 },
    /// No admissible voice was left; the note was dropped.
    Skipped,
}

/// Allocator state: the PRNG that makes a run reproducible and the scratch
/// probability map rebuilt every pass.
pub struct Allocator {
    rng: StdRng,
    map: [f32; MIDI_RANGE],
}

impl Allocator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            map: [0.0; MIDI_RANGE],
        }
    }

    /// Run one allocation pass over `state`. Never fails; degraded input
    /// manifests as fewer sounding voices.
    pub fn allocate(&mut self, state: &mut SystemState) {
        apply_pedal_edge(state);
        let held = state.sustain;

        let active: Vec<usize> = {
            let mut ranks: Vec<usize> = (0..state.ranks.len())
                .filter(|&i| state.ranks[i].density > 0)
                .collect();
            // Priority 1 is processed first; rank number breaks ties.
            ranks.sort_by_key(|&i| (state.ranks[i].priority, state.ranks[i].number));
            ranks
        };

        if active.is_empty() {
            for voice in state.voices.iter_mut() {
                if voice.volume && !voice.sustained {
                    voice.volume = false;
                }
            }
            state.self_heal();
            state.debug_check_invariants();
            return;
        }

        let total_density: usize = active
            .iter()
            .map(|&i| usize::from(state.ranks[i].density))
            .sum();
        let available = (NUM_VOICES - state.frozen.len()).min(total_density);

        let mut allowed = [false; MIDI_RANGE];
        for &i in &active {
            let mask = state.ranks[i].destination_mask(state.key_center);
            for (bin, &ok) in allowed.iter_mut().zip(mask.iter()) {
                *bin |= ok;
            }
        }

        self.evict_invalid(state, &allowed);
        self.evict_excess(state, available);
        self.ensure_rooted(state, &active, held);
        self.build_map(state, &active);
        self.fill(state, available, held);

        state.self_heal();
        state.debug_check_invariants();
    }

    /// Silence non-frozen voices whose note is no longer a valid
    /// destination of any active rank, e.g. after a key-center or
    /// tonicization change. Frozen voices ride out the change.
    fn evict_invalid(&mut self, state: &mut SystemState, allowed: &[bool; MIDI_RANGE]) {
        for voice in state.voices.iter_mut() {
            if voice.volume && !voice.sustained && !allowed[usize::from(voice.midi_note)] {
                voice.volume = false;
                trace!("retired voice {} (midi {} out of key)", voice.id, voice.midi_note);
            }
        }
    }

    /// Silence the highest-pitched non-frozen voices until at most
    /// `available` remain sounding.
    fn evict_excess(&mut self, state: &mut SystemState, available: usize) {
        let mut sounding: Vec<(u8, u8)> = state
            .voices
            .iter()
            .filter(|v| v.volume && !v.sustained)
            .map(|v| (v.midi_note, v.id))
            .collect();
        if sounding.len() <= available {
            return;
        }
        sounding.sort_by(|a, b| b.cmp(a)); // highest pitch first, then highest id
        for &(midi, id) in sounding.iter().take(sounding.len() - available) {
            state.voices[usize::from(id - 1)].volume = false;
            trace!("evicted voice {id} (midi {midi})");
        }
    }

    /// Guarantee each active rank a harmonic anchor: when neither the rank
    /// root nor its perfect fifth sounds in any octave, force the root at a
    /// priority-chosen octave. Frozen voices are never overwritten.
    fn ensure_rooted(&mut self, state: &mut SystemState, active: &[usize], held: bool) {
        for &i in active {
            let (root_pc, priority, number) = {
                let rank = &state.ranks[i];
                (rank.tonic_pc(state.key_center), rank.priority, rank.number)
            };
            let fifth_pc = (root_pc + 7) % 12;
            if state.pitch_class_sounding(root_pc) || state.pitch_class_sounding(fifth_pc) {
                continue;
            }

            let base_octave = 4 + (8 - priority) * 2 / 8;
            let midi = (root_pc + base_octave * 12).min(127);
            let outcome = Self::place(state, midi, held);
            debug!("rank {number} rooted at midi {midi}: {outcome:?}");
        }
    }

    /// Overlay the per-rank probability curves into the global map and
    /// normalize it to sum 1.
    fn build_map(&mut self, state: &SystemState, active: &[usize]) {
        self.map = [0.0; MIDI_RANGE];
        let sounding: Vec<u8> = state.sounding_midis().collect();

        for &i in active {
            let rank = &state.ranks[i];
            let destinations = rank.destination_mask(state.key_center);
            let lead = voice_leading_mask(&sounding, rank.lead_direction());
            let center = f32::from(state.key_center)
                + ((f32::from(rank.priority) + 7.0) / 2.0 - 4.0) * 12.0;
            let register = gaussian(center, REGISTER_WIDTH);
            let weight = (9.0 - f32::from(rank.priority)) / 8.0;

            for midi in 0..MIDI_RANGE {
                if destinations[midi] {
                    self.map[midi] += lead[midi] * register[midi] * weight;
                }
            }
        }

        let total: f32 = self.map.iter().sum();
        if total > 0.0 {
            for bin in self.map.iter_mut() {
                *bin /= total;
            }
        }
    }

    /// Sample notes without replacement until the pass has allocated its
    /// quota or the residual distribution is exhausted. The quota counts
    /// every sounding voice, latched ones included: a pedal press alone
    /// allocates nothing, and held voices stack further only when the
    /// density demand rises above what already sounds.
    fn fill(&mut self, state: &mut SystemState, available: usize, held: bool) {
        let mut needed = available.saturating_sub(state.sounding_count());
        let mut forbidden = [false; MIDI_RANGE];
        for midi in state.sounding_midis() {
            forbidden[usize::from(midi)] = true;
        }

        while needed > 0 {
            let Some(midi) = self.sample(&forbidden) else {
                debug!("probability map exhausted with {needed} slots unfilled");
                break;
            };
            forbidden[usize::from(midi)] = true;
            match Self::place(state, midi, held) {
                AllocOutcome::Skipped => {
                    debug!("no voice left for midi {midi}");
                    break;
                }
                outcome => {
                    trace!("{outcome:?}");
                    needed -= 1;
                }
            }
        }
    }

    /// One weighted draw from the map, excluding forbidden bins. Returns
    /// None when the residual mass is zero.
    fn sample(&mut self, forbidden: &[bool; MIDI_RANGE]) -> Option<u8> {
        let total: f32 = self
            .map
            .iter()
            .zip(forbidden.iter())
            .filter(|(_, &skip)| !skip)
            .map(|(&p, _)| p)
            .sum();
        if total <= 0.0 {
            return None;
        }

        let roll = self.rng.gen::<f32>() * total;
        let mut cumulative = 0.0;
        let mut last = None;
        for midi in 0..MIDI_RANGE {
            if forbidden[midi] || self.map[midi] <= 0.0 {
                continue;
            }
            cumulative += self.map[midi];
            last = Some(midi as u8);
            if roll <= cumulative {
                return last;
            }
        }
        last // rounding fell off the end; take the final admissible bin
    }

    /// Give `midi` a voice: the lowest-id silent non-frozen voice if any,
    /// otherwise steal the highest-pitched non-frozen sounding voice
    /// (ties to the higher id). New voices are latched while the pedal is
    /// held.
    fn place(state: &mut SystemState, midi: u8, held: bool) -> AllocOutcome {
        let slot = state
            .voices
            .iter()
            .position(|v| !v.volume && !v.sustained);

        let (idx, outcome) = match slot {
            Some(idx) => {
                let id = state.voices[idx].id;
                (idx, AllocOutcome::Allocated { voice: id, midi })
            }
            None => {
                let victim = state
                    .voices
                    .iter()
                    .filter(|v| v.volume && !v.sustained)
                    .max_by_key(|v| (v.midi_note, v.id));
                match victim {
                    Some(v) => {
                        let id = v.id;
                        (usize::from(id - 1), AllocOutcome::Stolen { voice: id, midi })
                    }
                    None => return AllocOutcome::Skipped,
                }
            }
        };

        let id = state.voices[idx].id;
        state.voices[idx].midi_note = midi;
        state.voices[idx].volume = true;
        state.voices[idx].sustained = false;
        if held && state.frozen.insert(id, midi) {
            state.voices[idx].sustained = true;
        }
        outcome
    }
}
