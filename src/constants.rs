pub const WINDOW_TITLE: &str = "Arctic Engine";
pub const WINDOW_SIZE: (u32, u32) = (800, 500);

pub const DEFAULT_MASTER_VOLUME: f32 = 0.7;

pub const SAMPLE_RATE: u32 = 44100;
pub const CHANNELS: u16 = 2;
pub const BUFFER_COUNT: usize = 10;
pub const BUFFER_DURATION_US: u64 = 10_000;

/// Platform wheel units per notch.
pub const WHEEL_DELTA: f32 = 120.;

pub const DATA_DIRECTORY: &str = "data";
