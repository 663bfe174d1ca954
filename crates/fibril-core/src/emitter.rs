//! Minimal-delta output layer. Diffs each allocator pass against the last
//! emitted voice snapshot and produces only the fields that moved.

use crate::constants::NUM_VOICES;
use crate::state::Voice;

/// One outbound update for the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutboundEvent {
    VoiceMidi { voice: u8, midi: u8 },
    VoiceVolume { voice: u8, on: bool },
    ActiveCount(u32),
}

/// Per-voice cache of the last emitted `(midi, volume)` pair.
pub struct ChangeEmitter {
    cache: [(u8, bool); NUM_VOICES],
    last_active: u32,
}

impl ChangeEmitter {
    /// Seed the cache from the initial voice array without emitting.
    /// Callers that want a startup resync use [`ChangeEmitter::full_resync`]
    /// instead.
    pub fn new(voices: &[Voice; NUM_VOICES]) -> Self {
        Self {
            cache: std::array::from_fn(|i| (voices[i].midi_note, voices[i].volume)),
            last_active: voices.iter().filter(|v| v.volume).count() as u32,
        }
    }

    /// Emit every voice plus the active count, and prime the cache. Used
    /// once at startup so a freshly attached host converges immediately.
    pub fn full_resync(&mut self, voices: &[Voice; NUM_VOICES], out: &mut Vec<OutboundEvent>) {
        for voice in voices {
            out.push(OutboundEvent::VoiceMidi { voice: voice.id, midi: voice.midi_note });
            out.push(OutboundEvent::VoiceVolume { voice: voice.id, on: voice.volume });
        }
        self.last_active = voices.iter().filter(|v| v.volume).count() as u32;
        out.push(OutboundEvent::ActiveCount(self.last_active));
        self.cache = std::array::from_fn(|i| (voices[i].midi_note, voices[i].volume));
    }

    /// Append the delta between the cache and `voices` to `out`. The cache
    /// tracks what the host has been told, so silent-to-silent MIDI drift
    /// is swallowed now and surfaces as a normal MIDI change the moment the
    /// voice turns audible.
    pub fn diff(&mut self, voices: &[Voice; NUM_VOICES], out: &mut Vec<OutboundEvent>) {
        for (i, voice) in voices.iter().enumerate() {
            let (cached_midi, cached_volume) = self.cache[i];
            let audible = voice.volume || cached_volume;

            if voice.midi_note != cached_midi && audible {
                out.push(OutboundEvent::VoiceMidi { voice: voice.id, midi: voice.midi_note });
                self.cache[i].0 = voice.midi_note;
            }
            if voice.volume != cached_volume {
                out.push(OutboundEvent::VoiceVolume { voice: voice.id, on: voice.volume });
                self.cache[i].1 = voice.volume;
            }
        }

        let active = voices.iter().filter(|v| v.volume).count() as u32;
        if active != self.last_active {
            out.push(OutboundEvent::ActiveCount(active));
            self.last_active = active;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SystemState;

    fn voices() -> [Voice; NUM_VOICES] {
        SystemState::new().voices
    }

    #[test]
    fn no_change_emits_nothing() {
        let v = voices();
        let mut emitter = ChangeEmitter::new(&v);
        let mut out = Vec::new();
        emitter.diff(&v, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn new_note_emits_midi_volume_and_count() {
        let mut v = voices();
        let mut emitter = ChangeEmitter::new(&v);
        v[0].midi_note = 64;
        v[0].volume = true;

        let mut out = Vec::new();
        emitter.diff(&v, &mut out);
        assert_eq!(
            out,
            vec![
                OutboundEvent::VoiceMidi { voice: 1, midi: 64 },
                OutboundEvent::VoiceVolume { voice: 1, on: true },
                OutboundEvent::ActiveCount(1),
            ]
        );

        // Emitting again with no further change is silent.
        out.clear();
        emitter.diff(&v, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn silencing_emits_volume_only() {
        let mut v = voices();
        v[2].midi_note = 72;
        v[2].volume = true;
        let mut emitter = ChangeEmitter::new(&v);

        v[2].volume = false;
        let mut out = Vec::new();
        emitter.diff(&v, &mut out);
        assert_eq!(
            out,
            vec![
                OutboundEvent::VoiceVolume { voice: 3, on: false },
                OutboundEvent::ActiveCount(0),
            ]
        );
    }

    #[test]
    fn silent_midi_drift_is_swallowed_but_remembered() {
        let mut v = voices();
        let mut emitter = ChangeEmitter::new(&v);

        v[0].midi_note = 99; // silent voice repitched by a steal-then-evict
        let mut out = Vec::new();
        emitter.diff(&v, &mut out);
        assert!(out.is_empty(), "silent-to-silent drift must not emit");

        v[0].volume = true;
        emitter.diff(&v, &mut out);
        assert_eq!(
            out,
            vec![
                OutboundEvent::VoiceMidi { voice: 1, midi: 99 },
                OutboundEvent::VoiceVolume { voice: 1, on: true },
                OutboundEvent::ActiveCount(1),
            ],
            "the drifted note surfaces when the voice turns audible"
        );
    }

    #[test]
    fn full_resync_covers_every_voice() {
        let v = voices();
        let mut emitter = ChangeEmitter::new(&v);
        let mut out = Vec::new();
        emitter.full_resync(&v, &mut out);
        assert_eq!(out.len(), NUM_VOICES * 2 + 1);
        assert_eq!(*out.last().unwrap(), OutboundEvent::ActiveCount(0));
    }
}
