use std::time::{Duration, Instant};

use strata::net::{PacketLossSimulation, SimulatedTransport};
use strata::{ChannelConfig, ConnectionChannel, LoopbackTransport, NetMessage, RawPacket};

fn keyframe(frame: i32) -> RawPacket {
    NetMessage::KeyFrame { frame }.encode().unwrap()
}

fn drain(channel: &mut ConnectionChannel) -> Vec<RawPacket> {
    std::iter::from_fn(|| channel.receive()).collect()
}

#[test]
fn rebind_replays_unacked_before_new_traffic() {
    let (a1, b1) = LoopbackTransport::pair();
    let mut client = ConnectionChannel::new(a1, ChannelConfig::default());
    let mut server = ConnectionChannel::new(b1, ChannelConfig::default());
    let now = Instant::now();

    for frame in 0..3 {
        client.send(&keyframe(frame)).unwrap();
    }
    client.flush(now).unwrap();
    assert_eq!(drain(&mut server).len(), 3);
    server.flush(now).unwrap();
    client.receive();
    assert_eq!(client.unacked_chunks(), 0);

    // these reach the old link and die with it
    for frame in 3..6 {
        client.send(&keyframe(frame)).unwrap();
    }
    client.flush(now).unwrap();

    let (a2, b2) = LoopbackTransport::pair();
    assert!(server.rebind(Box::new(b2)));
    assert!(client.rebind(Box::new(a2)));

    client.send(&keyframe(6)).unwrap();
    client.flush(now).unwrap();

    let replayed = drain(&mut server);
    assert_eq!(replayed, (3..7).map(keyframe).collect::<Vec<_>>());
}

#[test]
fn lossy_link_still_delivers_everything_in_order() {
    let (a, b) = LoopbackTransport::pair();
    let loss = PacketLossSimulation {
        duplicate_percent: 10.0,
        ..PacketLossSimulation::lossy(30.0)
    };
    let mut client = ConnectionChannel::new(
        SimulatedTransport::new(a, loss.clone(), 11),
        ChannelConfig::default(),
    );
    let mut server =
        ConnectionChannel::new(SimulatedTransport::new(b, loss, 12), ChannelConfig::default());

    let sent: Vec<RawPacket> = (0..200).map(keyframe).collect();
    let mut pending = sent.chunks(2);

    let start = Instant::now();
    let mut received = Vec::new();
    for step in 0..2000u64 {
        let now = start + Duration::from_millis(step * 50);
        for packet in pending.next().unwrap_or_default() {
            client.send(packet).unwrap();
        }
        client.flush(now).unwrap();
        received.extend(drain(&mut server));
        server.flush(now).unwrap();
        client.receive();
        if received.len() == sent.len() && client.unacked_chunks() == 0 {
            break;
        }
    }

    assert_eq!(received, sent);
    assert_eq!(client.unacked_chunks(), 0);
    assert!(client.stats().packets_resent > 0);
}

#[test]
fn game_data_larger_than_a_datagram_arrives_whole() {
    let (a, b) = LoopbackTransport::pair();
    let mut host = ConnectionChannel::new(a, ChannelConfig::default());
    let mut peer = ConnectionChannel::new(b, ChannelConfig::default());

    let text = "lorem ipsum ".repeat(1000);
    let message = NetMessage::SystemMsg {
        player: 255,
        text: text.chars().take(8000).collect(),
    }
    .encode()
    .unwrap();
    assert!(message.len() > 1400);

    host.send(&message).unwrap();
    host.send(&NetMessage::NewFrame.encode().unwrap()).unwrap();
    host.flush(Instant::now()).unwrap();

    assert_eq!(peer.receive(), Some(message));
    assert_eq!(peer.receive(), Some(NetMessage::NewFrame.encode().unwrap()));
}
