// Named tuning constants for decoding, segmentation and lap analysis.
// Invariants: algorithms read thresholds from here or from config structs built on these values.

// Wire layout.
pub const MAGIC: u32 = 0x4737_5330;
pub const IV_OFFSET: usize = 0x40;
pub const IV_XOR: u32 = 0xDEAD_BEAF;
pub const MIN_ENCRYPTED_SIZE: usize = IV_OFFSET + 4;
/// Core fields are read through offset 0x92 inclusive.
pub const MIN_PACKET_SIZE: usize = 0x93;
pub const CAR_ID_OFFSET: usize = 0x124;
pub const FULL_PACKET_SIZE: usize = 0x128;

// Session.
pub const SAMPLE_RING_CAP: usize = 6_000;
pub const MIN_LAP_POINTS: usize = 10;
pub const POSITION_ZERO_EPS: f32 = 1e-6;
pub const SESSION_RESET_REGRESSION_MS: i64 = 2_000;

// Freeze heuristic.
pub const FREEZE_TIMEOUT_MS: u64 = 700;
pub const FREEZE_MOVE_EPS_SQ: f32 = 1e-4;
pub const FREEZE_PEDAL_IDLE_PCT: f32 = 1.0;
pub const FREEZE_SPEED_IDLE_KMH: f32 = 1.0;

// Geometry.
pub const START_GATE_LOOKAHEAD: usize = 5;
pub const START_GATE_HALF_LEN: f64 = 20.0;
pub const DEGENERATE_DISTANCE_EPS: f64 = 1e-9;

// Corner detection.
pub const DEFAULT_BINS: usize = 300;
pub const CURVATURE_SMOOTH_WINDOW: usize = 7;
pub const CURVATURE_THRESHOLD: f64 = 0.020;
pub const CORNER_MAX_GAP: usize = 2;
pub const CORNER_MIN_LEN: usize = 6;
pub const DIRECTION_BALANCE_EPS: f64 = 1e-9;

// Coaching rows.
pub const BRAKE_ONSET_PCT: f64 = 10.0;
pub const THROTTLE_ONSET_PCT: f64 = 20.0;
pub const ONSET_HOLD_BINS: usize = 3;
pub const ONSET_PAD_BINS: usize = 15;

// Race-engineer events.
pub const FUEL_BUCKETS_PCT: [u8; 3] = [10, 25, 50];
