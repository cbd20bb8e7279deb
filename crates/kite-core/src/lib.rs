//! Foundational low-level utilities shared across Kite crates.
//!
//! Provides atomic file-write helpers (including owner-only secret files),
//! millisecond clock helpers used by expiry math, and tracing bootstrap.

pub mod atomic_io;
pub mod logging;
pub mod time_utils;

pub use atomic_io::{
    create_private_dir_all, stage_private_text, write_private_text_atomic, StagedWrite,
};
pub use logging::init_tracing;
pub use time_utils::{current_unix_timestamp_ms, is_fresh_with_margin_ms};

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use super::*;

    #[test]
    fn unit_current_unix_timestamp_ms_is_past_2020() {
        let now_ms = current_unix_timestamp_ms();
        assert!(now_ms > 1_577_836_800_000);
    }

    #[test]
    fn unit_is_fresh_with_margin_ms_respects_boundary() {
        let expires = 10_000_000;
        let margin = 300_000;
        assert!(is_fresh_with_margin_ms(expires, margin, expires - margin - 1));
        assert!(!is_fresh_with_margin_ms(expires, margin, expires - margin));
        assert!(!is_fresh_with_margin_ms(expires, margin, expires + 1));
    }

    #[test]
    fn unit_is_fresh_with_margin_ms_saturates_small_expiry() {
        assert!(!is_fresh_with_margin_ms(10, 300_000, 0));
    }

    #[test]
    fn functional_write_private_text_atomic_writes_content() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("sample.txt");
        write_private_text_atomic(&path, "hello world").expect("write");
        let contents = read_to_string(&path).expect("read");
        assert_eq!(contents, "hello world");
    }
}
