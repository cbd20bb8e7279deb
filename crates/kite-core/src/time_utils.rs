/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Returns true while `now_ms` is strictly before `expires_at_ms - margin_ms`.
pub fn is_fresh_with_margin_ms(expires_at_ms: u64, margin_ms: u64, now_ms: u64) -> bool {
    now_ms < expires_at_ms.saturating_sub(margin_ms)
}
