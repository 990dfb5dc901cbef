use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Milliseconds since the unix epoch, as carried by `Stat::ctime`/`Stat::mtime`
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
