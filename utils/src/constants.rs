use log::LevelFilter;

pub const DEFAULT_LEVEL_FILTER: LevelFilter = LevelFilter::Info;
/// Retries performed by the SDK (with adaptive backoff) before a request is considered failed.
pub const SDK_MAX_ATTEMPTS: u32 = 15;
