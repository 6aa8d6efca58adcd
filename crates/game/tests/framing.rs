use proptest::prelude::*;

use strata::net::{FrameError, MessageSplitter, MessageType};
use strata::{Command, NetMessage, RawPacket};

fn keyframe(frame: i32) -> RawPacket {
    NetMessage::KeyFrame { frame }.encode().unwrap()
}

#[test]
fn truncated_command_resyncs_on_next_message() {
    let mut buf = keyframe(1).to_vec();
    // COMMAND header declaring 500 bytes that never arrive
    buf.extend_from_slice(&[11, 0xf4, 0x01]);
    for _ in 0..3 {
        buf.extend_from_slice(&NetMessage::NewFrame.encode().unwrap());
    }
    buf.extend_from_slice(&keyframe(7));

    let parts: Vec<_> = MessageSplitter::new(&buf).collect();
    assert_eq!(parts.len(), 6);
    assert_eq!(parts[0], Ok(&keyframe(1)[..]));
    assert!(matches!(
        parts[1],
        Err(FrameError::Truncated {
            kind: MessageType::Command,
            declared: 500,
            ..
        })
    ));
    assert!(parts[2..5].iter().all(|p| *p == Ok(&[2u8][..])));
    assert_eq!(parts[5], Ok(&keyframe(7)[..]));
}

#[test]
fn truncated_command_body_is_not_split_into_messages() {
    // COMMAND declaring 30 bytes whose first six would parse as a keyframe
    // or a path checksum
    let mut buf = vec![11, 30, 0, 1, 10, 0, 0, 0, 0];
    buf.extend_from_slice(&NetMessage::NewFrame.encode().unwrap());
    buf.extend_from_slice(&[1, 16, 0, 0, 0]);

    let parts: Vec<_> = MessageSplitter::new(&buf).collect();
    assert!(matches!(parts[0], Err(FrameError::Truncated { declared: 30, .. })));
    let good: Vec<&[u8]> = parts.into_iter().filter_map(Result::ok).collect();
    assert_eq!(good, vec![&[2u8][..], &[1, 16, 0, 0, 0][..]]);
}

fn message() -> impl Strategy<Value = NetMessage> {
    prop_oneof![
        any::<i32>().prop_map(|frame| NetMessage::KeyFrame { frame }),
        Just(NetMessage::NewFrame),
        (0u8..16, "[a-z ]{0,40}").prop_map(|(player, text)| NetMessage::SystemMsg { player, text }),
        (0u8..16, any::<bool>()).prop_map(|(player, paused)| NetMessage::Pause { player, paused }),
        (0u8..16, -200i32..200, prop::collection::vec(-1e4f32..1e4, 0..8)).prop_map(
            |(player, id, params)| NetMessage::Command {
                player,
                command: Command::new(id).with_params(params),
            }
        ),
    ]
}

proptest! {
    #[test]
    fn back_to_back_messages_split_exactly(messages in prop::collection::vec(message(), 1..24)) {
        let encoded: Vec<RawPacket> = messages.iter().map(|m| m.encode().unwrap()).collect();
        let buf: Vec<u8> = encoded.iter().flat_map(|p| p.iter().copied()).collect();

        let parts: Vec<&[u8]> = MessageSplitter::new(&buf).map(|p| p.unwrap()).collect();
        prop_assert_eq!(parts.len(), encoded.len());
        for (part, packet) in parts.iter().zip(&encoded) {
            prop_assert_eq!(*part, packet.bytes());
            prop_assert_eq!(&NetMessage::decode(part).unwrap(), &NetMessage::decode(packet).unwrap());
        }
    }

    #[test]
    fn garbage_never_yields_overlapping_messages(buf in prop::collection::vec(any::<u8>(), 0..256)) {
        let mut splitter = MessageSplitter::new(&buf);
        let mut cursor = 0usize;
        while let Some(part) = splitter.next() {
            if let Ok(slice) = part {
                let start = slice.as_ptr() as usize - buf.as_ptr() as usize;
                prop_assert!(start >= cursor);
                cursor = start + slice.len();
                prop_assert!(cursor <= buf.len());
                prop_assert_eq!(strata::net::message_length(slice), Ok(slice.len()));
            }
            prop_assert!(splitter.position() >= cursor);
        }
    }
}
