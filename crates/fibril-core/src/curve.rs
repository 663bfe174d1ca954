//! Probability-shaping curves overlaid by the allocator: a Gaussian register
//! bias per rank and a voice-leading mask derived from Gray-code motion.

use crate::constants::{LEAD_FAR, LEAD_NEAR_MAX, LEAD_STATIC, MIDI_RANGE};

/// Gaussian over MIDI 0..=127 centered at `center`. `width` spans roughly
/// three standard deviations.
pub fn gaussian(center: f32, width: f32) -> [f32; MIDI_RANGE] {
    let sigma = width / 3.0;
    let mut curve = [0.0; MIDI_RANGE];
    for (midi, bin) in curve.iter_mut().enumerate() {
        let delta = midi as f32 - center;
        *bin = (-(delta * delta) / (2.0 * sigma * sigma)).exp();
    }
    curve
}

/// Voice-leading mask for one rank, normalized so its maximum is 1.
///
/// Boosts accumulate over a neutral baseline of 1, so notes far from the
/// current voicing stay admissible at reduced weight. `direction` is the
/// sign of the rank's GCI motion: rising motion boosts notes 1-2 semitones
/// above each sounding note by `(3 - d)` and 3-5 above by 0.5; falling
/// motion mirrors this below; flat motion gives a small boost within +/-2.
/// With nothing sounding the mask is neutral.
pub fn voice_leading_mask(sounding: &[u8], direction: i8) -> [f32; MIDI_RANGE] {
    let mut mask = [1.0f32; MIDI_RANGE];
    if sounding.is_empty() {
        return mask;
    }

    for &note in sounding {
        for (midi, bin) in mask.iter_mut().enumerate() {
            let distance = midi as i16 - i16::from(note);
            let boost = match direction {
                1 if (1..=2).contains(&distance) => LEAD_NEAR_MAX - distance as f32,
                1 if (3..=5).contains(&distance) => LEAD_FAR,
                -1 if (-2..=-1).contains(&distance) => LEAD_NEAR_MAX - (-distance) as f32,
                -1 if (-5..=-3).contains(&distance) => LEAD_FAR,
                0 if distance.abs() <= 2 => LEAD_STATIC,
                _ => 0.0,
            };
            *bin += boost;
        }
    }

    let max = mask.iter().copied().fold(0.0f32, f32::max);
    if max > 0.0 {
        for bin in mask.iter_mut() {
            *bin /= max;
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaussian_peaks_at_center_and_decays() {
        let curve = gaussian(60.0, 18.0);
        assert!((curve[60] - 1.0).abs() < 1e-6);
        assert!(curve[60] > curve[66]);
        assert!(curve[66] > curve[72]);
        assert!(curve[0] < 1e-6, "tails must vanish");
    }

    #[test]
    fn upward_mask_boosts_just_above_sounding_notes() {
        let mask = voice_leading_mask(&[60], 1);
        let baseline = 1.0 / 3.0; // unboosted bins over the (1 + 2) peak
        assert!((mask[61] - 1.0).abs() < 1e-6, "+1 semitone carries the max");
        assert!(mask[62] > mask[63], "+2 beats the far band");
        assert!(mask[63] > baseline && mask[65] > baseline, "far band reaches +5");
        assert!((mask[66] - baseline).abs() < 1e-6, "+6 falls back to baseline");
        assert!(
            (mask[59] - baseline).abs() < 1e-6,
            "no downward boost when rising"
        );
    }

    #[test]
    fn downward_mask_mirrors_upward() {
        let up = voice_leading_mask(&[60], 1);
        let down = voice_leading_mask(&[60], -1);
        for d in 1..=5usize {
            assert!((up[60 + d] - down[60 - d]).abs() < 1e-6, "asymmetry at {d}");
        }
    }

    #[test]
    fn flat_mask_hugs_sounding_notes() {
        let mask = voice_leading_mask(&[60], 0);
        for midi in 58..=62usize {
            assert!((mask[midi] - 1.0).abs() < 1e-6);
        }
        let baseline = 1.0 / 1.3;
        assert!((mask[57] - baseline).abs() < 1e-6);
        assert!((mask[63] - baseline).abs() < 1e-6);
    }

    #[test]
    fn empty_sounding_set_is_neutral() {
        let mask = voice_leading_mask(&[], 1);
        assert!(mask.iter().all(|&p| (p - 1.0).abs() < 1e-6));
    }

    #[test]
    fn mask_maximum_is_one() {
        let mask = voice_leading_mask(&[40, 60, 62, 80], 1);
        let max = mask.iter().copied().fold(0.0f32, f32::max);
        assert!((max - 1.0).abs() < 1e-6);
    }
}
