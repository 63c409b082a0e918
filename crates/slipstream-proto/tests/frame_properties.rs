//! Property tests for the wire codec.
//!
//! Encode ∘ decode must be the identity on all well-formed frames up to the
//! protocol ceiling; anything claiming more than the ceiling must fail to
//! parse rather than allocate.

use proptest::prelude::*;
use slipstream_proto::{Command, Frame, FrameHeader, ProtocolError};

fn any_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::Hello),
        Just(Command::ServerSettings),
        Just(Command::ServerFull),
        Just(Command::WrongVersion),
        Just(Command::Banned),
        Just(Command::Welcome),
        Just(Command::UserInfo),
        Just(Command::UserJoin),
        Just(Command::UserLeave),
        Just(Command::StreamRegister),
        Just(Command::StreamData),
        Just(Command::Chat),
        Just(Command::PrivChat),
        Just(Command::GameCmd),
        Just(Command::VehicleData),
        Just(Command::UseVehicle),
        Just(Command::Delete),
    ]
}

proptest! {
    #[test]
    fn frame_round_trip(
        command in any_command(),
        source in any::<u32>(),
        stream_id in any::<u32>(),
        payload in proptest::collection::vec(any::<u8>(), 0..=FrameHeader::MAX_PAYLOAD_SIZE as usize),
    ) {
        let frame = Frame::new(command, source, stream_id, payload.clone());

        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("well-formed frame should encode");

        let parsed = Frame::decode(&wire).expect("encoded frame should decode");
        prop_assert_eq!(parsed.command(), Some(command));
        prop_assert_eq!(parsed.header.source(), source);
        prop_assert_eq!(parsed.header.stream_id(), stream_id);
        prop_assert_eq!(parsed.payload.as_ref(), payload.as_slice());
    }

    #[test]
    fn oversized_claim_fails_to_parse(
        command in any_command(),
        source in any::<u32>(),
        oversize in (FrameHeader::MAX_PAYLOAD_SIZE + 1)..=u32::MAX,
    ) {
        let mut wire = FrameHeader::new(command, source, 0).to_bytes().to_vec();
        wire[12..16].copy_from_slice(&oversize.to_le_bytes());

        let result = Frame::decode(&wire);
        let is_payload_too_large = matches!(result, Err(ProtocolError::PayloadTooLarge { .. }));
        prop_assert!(is_payload_too_large);
    }

    #[test]
    fn truncated_payload_fails_to_parse(
        command in any_command(),
        payload in proptest::collection::vec(any::<u8>(), 1..256),
        cut in 0usize..16,
    ) {
        let frame = Frame::new(command, 1, 0, payload);
        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("should encode");

        // Chop somewhere inside the payload (never the full frame).
        let keep = wire.len() - 1 - (cut % frame.payload.len().min(16));
        let result = Frame::decode(&wire[..keep.max(FrameHeader::SIZE)]);
        prop_assert!(result.is_err());
    }
}
