//! Aggregate engine state: the 8 ranks, the 48-voice pool, the sustain
//! latch, and the ingest layer that folds decoded control events into it.

use fnv::FnvHashSet;
use log::debug;
use smallvec::SmallVec;
use thiserror::Error;

use crate::constants::{DEFAULT_KEY_CENTER, NUM_RANKS, NUM_VOICES};
use crate::rank::Rank;

/// Control surface events after wire decoding. Payload ranges are validated
/// by [`SystemState::apply`]; out-of-range events are rejected, logged by
/// the caller, and dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlEvent {
    RankBit { rank: u8, slot: u8, value: u8 },
    RankPriority { rank: u8, priority: u8 },
    RankTonicization { rank: u8, tonicization: u8 },
    Sustain(bool),
    KeyCenter(u8),
}

/// Rejected control input. These never stop the pipeline; the ingest task
/// logs and drops the offending event.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    #[error("rank number {0} outside 1..=8")]
    RankRange(u8),

    #[error("gray bit slot {0} outside 0..=3")]
    SlotRange(u8),

    #[error("priority {0} outside 1..=8")]
    PriorityRange(u8),

    #[error("tonicization {0} outside 1..=9")]
    TonicizationRange(u8),

    #[error("key center {0} outside MIDI 0..=127")]
    KeyCenterRange(u8),
}

/// One polyphonic slot. `sustained` marks a voice latched by the pedal; the
/// allocator never touches such a voice until the latch is released.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Voice {
    pub id: u8,
    pub midi_note: u8,
    pub volume: bool,
    pub sustained: bool,
}

/// Pedal-latched voices: `(voice id, MIDI)` pairs unique by MIDI, with a
/// hash set mirror for O(1) duplicate checks during sampling.
#[derive(Clone, Debug, Default)]
pub struct FrozenSet {
    entries: SmallVec<[(u8, u8); NUM_VOICES]>,
    midis: FnvHashSet<u8>,
}

impl FrozenSet {
    /// Insert a latched voice. Returns false (and leaves the set untouched)
    /// when the MIDI value is already latched.
    pub fn insert(&mut self, voice_id: u8, midi: u8) -> bool {
        if self.midis.contains(&midi) {
            return false;
        }
        self.entries.push((voice_id, midi));
        self.midis.insert(midi);
        true
    }

    pub fn contains_midi(&self, midi: u8) -> bool {
        self.midis.contains(&midi)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.midis.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(u8, u8)> {
        self.entries.iter()
    }

    /// Drop entries whose MIDI duplicates an earlier entry, returning the
    /// voice ids that were removed. Keeps first-encountered entries.
    fn dedupe(&mut self) -> SmallVec<[u8; 4]> {
        let mut seen = FnvHashSet::default();
        let mut dropped = SmallVec::new();
        self.entries.retain(|&mut (vid, midi)| {
            if seen.insert(midi) {
                true
            } else {
                dropped.push(vid);
                false
            }
        });
        self.midis = seen;
        dropped
    }
}

/// Complete engine state observed by the allocator at each tick.
#[derive(Clone, Debug)]
pub struct SystemState {
    pub sustain: bool,
    pub previous_sustain: bool,
    pub key_center: u8,
    pub ranks: [Rank; NUM_RANKS],
    pub voices: [Voice; NUM_VOICES],
    pub frozen: FrozenSet,
}

impl Default for SystemState {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemState {
    pub fn new() -> Self {
        let ranks = std::array::from_fn(|i| Rank::new(i as u8 + 1));
        let voices = std::array::from_fn(|i| Voice {
            id: i as u8 + 1,
            midi_note: DEFAULT_KEY_CENTER,
            volume: false,
            sustained: false,
        });
        Self {
            sustain: false,
            previous_sustain: false,
            key_center: DEFAULT_KEY_CENTER,
            ranks,
            voices,
            frozen: FrozenSet::default(),
        }
    }

    /// Fold one control event into the state. Returns `Ok(true)` iff a
    /// stored value actually changed — the dirty signal for the scheduler.
    pub fn apply(&mut self, event: ControlEvent) -> Result<bool, StateError> {
        match event {
            ControlEvent::RankBit { rank, slot, value } => {
                let r = self.rank_mut(rank)?;
                if slot >= 4 {
                    return Err(StateError::SlotRange(slot));
                }
                let bit = u8::from(value != 0);
                if r.grey_code[usize::from(slot)] == bit {
                    return Ok(false);
                }
                r.update_bit(usize::from(slot), bit);
                debug!(
                    "rank {rank} bit {slot} -> {bit}: gci={} density={}",
                    r.gci, r.density
                );
                Ok(true)
            }
            ControlEvent::RankPriority { rank, priority } => {
                let r = self.rank_mut(rank)?;
                if r.priority == priority {
                    return Ok(false);
                }
                r.update_priority(priority)?;
                debug!("rank {rank} priority -> {priority}");
                Ok(true)
            }
            ControlEvent::RankTonicization { rank, tonicization } => {
                let r = self.rank_mut(rank)?;
                if r.tonicization == tonicization {
                    return Ok(false);
                }
                r.update_tonicization(tonicization)?;
                debug!("rank {rank} tonicization -> {tonicization}");
                Ok(true)
            }
            ControlEvent::Sustain(down) => {
                if self.sustain == down {
                    return Ok(false);
                }
                self.sustain = down;
                debug!("sustain pedal {}", if down { "down" } else { "up" });
                Ok(true)
            }
            ControlEvent::KeyCenter(midi) => {
                if midi > 127 {
                    return Err(StateError::KeyCenterRange(midi));
                }
                if self.key_center == midi {
                    return Ok(false);
                }
                self.key_center = midi;
                debug!("key center -> {midi}");
                Ok(true)
            }
        }
    }

    fn rank_mut(&mut self, number: u8) -> Result<&mut Rank, StateError> {
        if !(1..=NUM_RANKS as u8).contains(&number) {
            return Err(StateError::RankRange(number));
        }
        Ok(&mut self.ranks[usize::from(number - 1)])
    }

    pub fn sounding_count(&self) -> usize {
        self.voices.iter().filter(|v| v.volume).count()
    }

    pub fn non_frozen_sounding_count(&self) -> usize {
        self.voices.iter().filter(|v| v.volume && !v.sustained).count()
    }

    /// MIDI values of all sounding voices, frozen included.
    pub fn sounding_midis(&self) -> impl Iterator<Item = u8> + '_ {
        self.voices.iter().filter(|v| v.volume).map(|v| v.midi_note)
    }

    /// True when any sounding voice carries the pitch class `pc`.
    pub fn pitch_class_sounding(&self, pc: u8) -> bool {
        self.sounding_midis().any(|m| m % 12 == pc)
    }

    /// Restore uniqueness of sounding and frozen MIDI values after an
    /// allocator pass. Frozen entries win: entries
    /// are deduplicated by MIDI keep-first, voices of dropped entries are
    /// silenced, then later-id non-frozen duplicates are silenced. No-op on
    /// healthy state.
    pub fn self_heal(&mut self) {
        for vid in self.frozen.dedupe() {
            let voice = &mut self.voices[usize::from(vid - 1)];
            voice.volume = false;
            voice.sustained = false;
        }

        let mut seen = FnvHashSet::default();
        for &(_, midi) in self.frozen.iter() {
            seen.insert(midi);
        }
        for voice in self.voices.iter_mut() {
            if !voice.volume || voice.sustained {
                continue;
            }
            if !seen.insert(voice.midi_note) {
                voice.volume = false;
            }
        }

        if !self.sustain {
            for voice in self.voices.iter_mut() {
                voice.sustained = false;
            }
        }
    }

    /// Human-readable summary for diagnostic logs: sorted active notes,
    /// active ranks, key parameters.
    pub fn readout(&self) -> String {
        use std::fmt::Write;

        let mut notes: Vec<u8> = self.sounding_midis().collect();
        notes.sort_unstable();
        let names: Vec<String> = notes
            .iter()
            .map(|&m| crate::harmony::midi_note_name(m))
            .collect();

        let mut s = String::new();
        let _ = write!(
            s,
            "key={} sustain={} frozen={} active[{}]: {}",
            crate::harmony::midi_note_name(self.key_center),
            if self.sustain { "down" } else { "up" },
            self.frozen.len(),
            notes.len(),
            if names.is_empty() { "(none)".to_string() } else { names.join(" ") },
        );
        for rank in self.ranks.iter().filter(|r| r.density > 0) {
            let _ = write!(
                s,
                " | R{} p{} t{} gci={} d={}",
                rank.number, rank.priority, rank.tonicization, rank.gci, rank.density
            );
        }
        s
    }

    /// Debug-build invariant sweep. Pool sizes are fixed by construction;
    /// everything else is checked here.
    pub fn debug_check_invariants(&self) {
        #[cfg(debug_assertions)]
        {
            let mut midis = FnvHashSet::default();
            for voice in self.voices.iter().filter(|v| v.volume) {
                assert!(
                    midis.insert(voice.midi_note),
                    "duplicate sounding MIDI {}",
                    voice.midi_note
                );
            }
            let mut frozen_midis = FnvHashSet::default();
            for &(vid, midi) in self.frozen.iter() {
                let voice = &self.voices[usize::from(vid - 1)];
                assert!(frozen_midis.insert(midi), "duplicate frozen MIDI {midi}");
                assert_eq!(voice.midi_note, midi, "frozen voice {vid} repitched");
                assert!(voice.volume, "frozen voice {vid} silenced");
                assert!(voice.sustained, "frozen voice {vid} lost its latch");
            }
            for voice in &self.voices {
                if voice.sustained {
                    assert!(voice.volume, "sustained voice {} is silent", voice.id);
                }
                if !self.sustain && self.previous_sustain == self.sustain {
                    assert!(!voice.sustained, "latch survived pedal release");
                }
            }
        }
    }
}
