use std::time::SystemTime;

/// Milliseconds since the unix epoch. All throttle and watchdog timestamps
/// in the session are absolute epoch millis; `0` means "unset / long ago".
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
