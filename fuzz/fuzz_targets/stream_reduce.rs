#![no_main]

use kite_provider::{classify_stream_line, StreamReducer};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let input = String::from_utf8_lossy(data);
    let mut reducer = StreamReducer::new();
    let mut pushed = 0;
    for line in input.split('\n') {
        if let Some(event) = classify_stream_line(line) {
            reducer.push(event);
            pushed += 1;
        }
    }
    assert_eq!(reducer.events_seen(), pushed);
    let outcome = reducer.finish();
    if outcome.is_error {
        assert!(outcome.text.starts_with("Error: "));
    }
});
