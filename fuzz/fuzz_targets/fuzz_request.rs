#![no_main]

use libfuzzer_sys::fuzz_target;
use ua_protocol::protocol::Request;

fuzz_target!(|data: &[u8]| {
    if let Ok(request) = Request::parse_bytes(data) {
        // Parsed requests must survive their own wire form
        let reparsed = Request::parse(&request.to_string());
        assert_eq!(reparsed.ok(), Some(request));
    }
});
