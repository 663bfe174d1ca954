// Shared engine tuning constants used by both the core and the OSC front-end.

// Pool sizes (fixed by the controller hardware)
pub const NUM_VOICES: usize = 48; // polyphonic voice slots
pub const NUM_RANKS: usize = 8; // symbolic controller groups
pub const MIDI_RANGE: usize = 128; // probability map bins

// Scheduling
pub const DEFAULT_TICK_MS: u64 = 18; // allocator cadence

// Wire defaults
pub const DEFAULT_LISTEN_PORT: u16 = 1761; // inbound OSC
pub const DEFAULT_SEND_PORT: u16 = 8998; // outbound OSC

// Harmony
pub const DEFAULT_KEY_CENTER: u8 = 60; // middle C

// Register bias
pub const REGISTER_WIDTH: f32 = 18.0; // Gaussian width in semitones (~3 sigma)

// Voice-leading mask boosts
pub const LEAD_NEAR_MAX: f32 = 3.0; // (3 - d) for d in 1..=2
pub const LEAD_FAR: f32 = 0.5; // d in 3..=5
pub const LEAD_STATIC: f32 = 0.3; // |d| <= 2 when direction is flat

/// Popcount-to-density table: a rank with n set Gray bits contributes
/// `DENSITY_TABLE[n]` voices.
pub const DENSITY_TABLE: [u8; 5] = [0, 2, 3, 4, 6];
