//! Per-rank state: the 4-bit Gray pattern plus the quantities derived from
//! it, and the harmonic destination set the rank may voice.

use crate::constants::MIDI_RANGE;
use crate::gray::{density_of, gray_to_gci};
use crate::harmony::{fit_intervals, DEGREE_OFFSETS};
use crate::state::StateError;

/// Tonicization value selecting the whole-tone subtonic variant.
pub const SUBTONIC: u8 = 9;

/// One of the eight controller groups. Identity (`number`) is fixed at
/// startup; everything else is mutated by the ingest layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rank {
    pub number: u8,
    pub priority: u8,
    pub tonicization: u8,
    pub grey_code: [u8; 4],
    pub gci: u8,
    pub previous_gci: u8,
    pub density: u8,
}

impl Rank {
    pub fn new(number: u8) -> Self {
        Self {
            number,
            priority: number,
            tonicization: number.min(8),
            grey_code: [0; 4],
            gci: 0,
            previous_gci: 0,
            density: 0,
        }
    }

    /// Write one Gray bit and refresh the derived quantities. The previous
    /// GCI is recorded first so the allocator can infer voice-leading
    /// direction. `slot` outside 0..4 is a programmer error.
    pub fn update_bit(&mut self, slot: usize, value: u8) {
        assert!(slot < 4, "gray bit slot {slot} out of range");
        self.previous_gci = self.gci;
        self.grey_code[slot] = u8::from(value != 0);
        self.gci = gray_to_gci(self.grey_code);
        self.density = density_of(self.grey_code);
    }

    pub fn update_priority(&mut self, priority: u8) -> Result<(), StateError> {
        if !(1..=8).contains(&priority) {
            return Err(StateError::PriorityRange(priority));
        }
        self.priority = priority;
        Ok(())
    }

    pub fn update_tonicization(&mut self, tonicization: u8) -> Result<(), StateError> {
        if !(1..=9).contains(&tonicization) {
            return Err(StateError::TonicizationRange(tonicization));
        }
        self.tonicization = tonicization;
        Ok(())
    }

    /// Pitch class of the rank tonic for a given key center. Degrees 1..=8
    /// follow the major scale; 9 sits a tritone above the key center.
    pub fn tonic_pc(&self, key_center: u8) -> u8 {
        let kc_pc = key_center % 12;
        let offset = if self.tonicization == SUBTONIC {
            6
        } else {
            DEGREE_OFFSETS[usize::from(self.tonicization - 1)]
        };
        (kc_pc + offset) % 12
    }

    /// Direction of the most recent Gray change: +1 rising, -1 falling,
    /// 0 unchanged.
    pub fn lead_direction(&self) -> i8 {
        (i16::from(self.gci) - i16::from(self.previous_gci)).signum() as i8
    }

    /// Indicator over MIDI 0..=127 of every note this rank may voice,
    /// spanning all octaves of its fitted intervals.
    pub fn destination_mask(&self, key_center: u8) -> [bool; MIDI_RANGE] {
        let mut mask = [false; MIDI_RANGE];
        let tonic = self.tonic_pc(key_center);
        let whole_tone = self.tonicization == SUBTONIC;
        for interval in fit_intervals(tonic, key_center % 12, whole_tone) {
            for octave in 0..11i16 {
                let midi = i16::from(tonic) + interval + octave * 12;
                if (0..MIDI_RANGE as i16).contains(&midi) {
                    mask[midi as usize] = true;
                }
            }
        }
        mask
    }
}
