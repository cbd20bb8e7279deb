#![no_main]

use kite_provider::{classify_stream_line, parse_stream_line, StreamEvent};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data);
    let parsed = parse_stream_line(&line);
    let classified = classify_stream_line(&line);
    match parsed {
        Ok(None) => assert!(classified.is_none()),
        Ok(Some(event)) => assert_eq!(classified, Some(event)),
        Err(_) => assert!(matches!(classified, Some(StreamEvent::Unparsed { .. }))),
    }
});
