//! Fuzz target for encode/decode boundary behavior.
//!
//! Decodes arbitrary bytes and, when a frame parses, re-encodes it and
//! decodes again; the second decode must succeed and reproduce the payload.

#![no_main]

use libfuzzer_sys::fuzz_target;
use slipstream_proto::Frame;

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = Frame::decode(data) else {
        return;
    };

    let mut wire = Vec::new();
    frame.encode(&mut wire).expect("decoded frame must re-encode");

    let again = Frame::decode(&wire).expect("re-encoded frame must decode");
    assert_eq!(frame.payload, again.payload);
    assert_eq!(frame.header.command_raw(), again.header.command_raw());
});
