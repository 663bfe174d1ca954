//! Scale tables and the interval-snapping rules that decide which pitch
//! classes a rank may voice.

/// Major scale intervals from the key center.
pub const MAJOR_SCALE: [u8; 7] = [0, 2, 4, 5, 7, 9, 11];

/// Whole-tone scale intervals, used by the subtonic (tonicization 9) rank.
pub const WHOLE_TONE_SCALE: [u8; 6] = [0, 2, 4, 6, 8, 10];

/// Semitone offsets of scale degrees 1..=8 within the major scale.
/// Degree 8 folds back to the octave (offset 0).
pub const DEGREE_OFFSETS: [u8; 8] = [0, 2, 4, 5, 7, 9, 11, 0];

/// Harmonic candidate intervals over a rank tonic, in preference order:
/// root, 5th, 3rd, 2nd, 4th, 6th, 7th, 9th, 11th.
pub const CANDIDATE_INTERVALS: [i16; 9] = [0, 7, 4, 2, 5, 9, 11, 14, 17];

// Intervals never voiced: the sharp 5 (tritone) and flat 13.
const FORBIDDEN: [i16; 2] = [6, 20];

fn is_forbidden(interval: i16) -> bool {
    FORBIDDEN.contains(&interval)
}

fn in_scale(pc: i16, key_pc: u8, scale: &[u8]) -> bool {
    let rel = (pc - i16::from(key_pc)).rem_euclid(12) as u8;
    scale.contains(&rel)
}

/// Smallest non-zero adjustment in `direction` (+1/-1 semitone steps) that
/// lands `pc` on a note of `scale` anchored at `key_pc`. Capped at 6
/// semitones; a cap hit returns 0 (cannot happen for the scales above).
fn closest_in_scale(pc: i16, key_pc: u8, scale: &[u8], direction: i16) -> i16 {
    let mut adjustment = 0;
    for _ in 0..6 {
        adjustment += direction;
        if in_scale(pc + adjustment, key_pc, scale) {
            return adjustment;
        }
    }
    0
}

/// Whether an out-of-key candidate prefers the upward adjustment in the
/// major-scale path. Seconds and fourths resolve up; sevenths and elevenths
/// resolve down; everything else takes the closer option.
fn major_prefers_up(interval: i16, up_adj: i16, down_adj: i16) -> bool {
    match interval {
        2 | 5 => true,
        11 | 17 => false,
        _ => up_adj.abs() <= down_adj.abs(),
    }
}

/// Fit the harmonic candidates over `tonic_pc` into the scale anchored at
/// `key_pc`, returning the adjusted intervals. `whole_tone` selects the
/// subtonic variant, which always snaps to the closer in-scale neighbor.
pub fn fit_intervals(tonic_pc: u8, key_pc: u8, whole_tone: bool) -> Vec<i16> {
    let scale: &[u8] = if whole_tone {
        &WHOLE_TONE_SCALE
    } else {
        &MAJOR_SCALE
    };

    let mut fitted = Vec::with_capacity(CANDIDATE_INTERVALS.len());
    for &interval in &CANDIDATE_INTERVALS {
        let pc = i16::from(tonic_pc) + interval;
        if in_scale(pc, key_pc, scale) {
            if !is_forbidden(interval) {
                fitted.push(interval);
            }
            continue;
        }

        let up_adj = closest_in_scale(pc, key_pc, scale, 1);
        let down_adj = closest_in_scale(pc, key_pc, scale, -1);
        let up = interval + up_adj;
        let down = interval + down_adj;

        if is_forbidden(up) {
            if !is_forbidden(down) {
                fitted.push(down);
            }
            // Both directions forbidden: the candidate is dropped.
        } else if is_forbidden(down) {
            fitted.push(up);
        } else {
            let prefer_up = if whole_tone {
                up_adj.abs() <= down_adj.abs()
            } else {
                major_prefers_up(interval, up_adj, down_adj)
            };
            fitted.push(if prefer_up { up } else { down });
        }
    }
    fitted
}

/// MIDI note to note name, e.g. 60 -> "C4".
pub fn midi_note_name(midi: u8) -> String {
    const NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    let octave = i16::from(midi) / 12 - 1;
    format!("{}{}", NAMES[usize::from(midi) % 12], octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tonic_rank_in_c_keeps_diatonic_candidates() {
        // Rank tonic = key center: every candidate is already diatonic and
        // must survive unchanged.
        let fitted = fit_intervals(0, 0, false);
        assert!(fitted.contains(&0), "root must survive");
        assert!(fitted.contains(&7), "fifth must survive");
        assert!(fitted.contains(&4), "third must survive");
        for &interval in &fitted {
            assert!(!matches!(interval, 6 | 20), "forbidden interval {interval}");
            let pc = interval.rem_euclid(12) as u8;
            assert!(
                MAJOR_SCALE.contains(&(pc % 12)),
                "interval {interval} (pc {pc}) left the key"
            );
        }
    }

    #[test]
    fn fitted_intervals_always_land_in_scale() {
        for key_pc in 0..12u8 {
            for tonic_pc in 0..12u8 {
                for whole_tone in [false, true] {
                    let scale: &[u8] = if whole_tone {
                        &WHOLE_TONE_SCALE
                    } else {
                        &MAJOR_SCALE
                    };
                    for &interval in &fit_intervals(tonic_pc, key_pc, whole_tone) {
                        let pc = i16::from(tonic_pc) + interval;
                        assert!(
                            in_scale(pc, key_pc, scale),
                            "tonic {tonic_pc} key {key_pc} wt {whole_tone}: \
                             interval {interval} out of scale"
                        );
                        assert!(!matches!(interval, 6 | 20));
                    }
                }
            }
        }
    }

    #[test]
    fn whole_tone_snaps_to_closer_neighbor() {
        // Tonic on the key center: the 5th (7 semitones) is off the
        // whole-tone grid. Its lower neighbor is the forbidden tritone, so
        // it must land on 8.
        let fitted = fit_intervals(0, 0, true);
        assert!(!fitted.contains(&6));
        assert!(fitted.contains(&8), "fifth should snap up to 8, got {fitted:?}");
    }

    #[test]
    fn note_names() {
        assert_eq!(midi_note_name(60), "C4");
        assert_eq!(midi_note_name(69), "A4");
        assert_eq!(midi_note_name(0), "C-1");
        assert_eq!(midi_note_name(127), "G9");
    }
}
