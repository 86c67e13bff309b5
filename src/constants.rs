use std::time::Duration;

pub const MIB: usize = 1024 * 1024;

pub const DEFAULT_CHUNK_SIZE_MB: f64 = 100.0;
pub const DEFAULT_INTENSITY: u8 = 5;

pub const LOW_PERCENTAGE: u8 = 30;
pub const MID_PERCENTAGE: u8 = 50;
pub const HIGH_PERCENTAGE: u8 = 75;

/// Value written to the first byte of every page by the initial touch.
pub const TOUCH_SENTINEL: u8 = 1;
/// Fallback page size when the platform cannot be queried.
pub const FALLBACK_PAGE_SIZE: usize = 4096;
/// Stride used by the scanning workers when sampling bytes.
pub const SAMPLE_STRIDE: usize = 4096;

pub const WALKER_PREFERRED_CHUNK_BYTES: usize = 50 * MIB;
pub const WALKER_WINDOW_BYTES: usize = MIB;
pub const WALKER_WINDOW_PAUSE: Duration = Duration::from_millis(1);
pub const WALKER_PASS_PAUSE: Duration = Duration::from_millis(500);

pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
pub const CPU_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

pub const TARGET_NICENESS: i32 = -10;
pub const OOM_SCORE_ADJ_PATH: &str = "/proc/self/oom_score_adj";
pub const OOM_SCORE_ADJ_MIN: &str = "-1000";
