//! Fuzz target for Frame::decode
//!
//! Feeds arbitrary byte sequences to the frame decoder to find parser
//! panics, integer overflows in size handling, and buffer over-reads.
//!
//! The decoder should NEVER panic; every invalid input must return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use slipstream_proto::Frame;

fuzz_target!(|data: &[u8]| {
    let _ = Frame::decode(data);
});
