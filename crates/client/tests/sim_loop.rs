mod common;

use std::time::Instant;

use proptest::prelude::*;

use common::*;
use strata::command::CMD_MOVE;
use strata::net::{ChatMessage, TO_ALLIES, TO_EVERYONE};
use strata::{Command, NetMessage};
use strata_client::{ClientEvent, SessionState};

fn move_to(x: f32, z: f32) -> Command {
    Command::new(CMD_MOVE).with_params([x, 0.0, z])
}

/// Frames 1..=frames with orders for both players sprinkled in.
fn scripted_game(frames: i32) -> Vec<NetMessage> {
    let mut stream = vec![
        NetMessage::Select {
            player: 0,
            units: vec![0, 1, 2],
        },
        NetMessage::Select {
            player: 1,
            units: vec![4, 5],
        },
    ];
    for frame in 1..=frames {
        if frame % 7 == 0 {
            stream.push(NetMessage::Command {
                player: (frame % 2) as u8,
                command: move_to(frame as f32 * 10.0, 300.0),
            });
        }
        stream.push(FakeServer::frame(frame));
    }
    stream
}

#[test]
fn handshake_and_start() {
    let (mut server, mut alice) = scripted("alice");
    let mut now = Instant::now();
    server.start_game(&duel(), 0);

    assert!(tick_until(&mut alice, &mut now, 5, |p| {
        p.sim.session().state() == SessionState::Playing
    }));
    assert_eq!(alice.sim.session().player(), Some(0));
    assert!(alice.events.contains(&ClientEvent::Connected { player: 0 }));
    assert!(alice.events.contains(&ClientEvent::GameStarted));
    assert_eq!(alice.sim.session().roster().len(), 2);

    server.pump();
    assert!(server.inbox.contains(&NetMessage::PlayerName {
        player: 0,
        name: "alice".into(),
    }));
}

#[test]
fn identical_streams_give_identical_checksums() {
    let (mut server_a, mut a) = scripted("alice");
    let (mut server_b, mut b) = scripted("bob");
    let mut now = Instant::now();

    server_a.start_game(&duel(), 0);
    server_b.start_game(&duel(), 1);
    server_a.send_all(scripted_game(40));
    server_b.send_all(scripted_game(40));

    assert!(tick_until(&mut a, &mut now, 50, |p| p.sim.frame() == 40));
    assert!(tick_until(&mut b, &mut now, 50, |p| p.sim.frame() == 40));
    assert_eq!(a.sim.checksums().len(), 40);
    assert_eq!(a.sim.checksums(), b.sim.checksums());

    // each frame was reported with the checksum it produced
    server_a.pump();
    let reported: Vec<u32> = server_a
        .inbox
        .iter()
        .filter_map(|m| match m {
            NetMessage::SyncResponse { checksum, .. } => Some(*checksum),
            _ => None,
        })
        .collect();
    assert_eq!(reported, a.sim.checksums());
}

#[test]
fn orders_change_the_outcome() {
    let (mut server_a, mut a) = scripted("alice");
    let (mut server_b, mut b) = scripted("alice");
    let mut now = Instant::now();

    server_a.start_game(&duel(), 0);
    server_b.start_game(&duel(), 0);
    server_a.send_all(scripted_game(20));
    let mut quiet = scripted_game(20);
    quiet.retain(|m| !matches!(m, NetMessage::Command { .. }));
    server_b.send_all(quiet);

    assert!(tick_until(&mut a, &mut now, 30, |p| p.sim.frame() == 20));
    assert!(tick_until(&mut b, &mut now, 30, |p| p.sim.frame() == 20));
    assert_eq!(a.sim.checksums()[..6], b.sim.checksums()[..6]);
    assert_ne!(a.sim.checksums()[19], b.sim.checksums()[19]);
}

#[test]
fn catch_up_is_bounded_and_drains() {
    let (mut server, mut alice) = scripted("alice");
    let mut now = Instant::now();
    server.start_game(&duel(), 0);
    assert!(tick_until(&mut alice, &mut now, 5, |p| {
        p.sim.session().state() == SessionState::Playing
    }));

    // a stall, then a burst
    server.send_all((1..=60).map(FakeServer::frame));
    let cap = alice.sim.pacer().max_frames_per_tick();
    let mut backlog = alice.sim.buffered_frames();
    assert_eq!(backlog, 60);
    while backlog > 0 {
        now += TICK;
        let steps = alice.tick(now);
        assert!(steps <= cap, "{steps} frames in one tick");
        let left = alice.sim.buffered_frames();
        assert!(left < backlog, "backlog stuck at {left}");
        backlog = left;
    }
    assert_eq!(alice.sim.frame(), 60);
}

#[test]
fn keyframe_is_echoed_before_its_frame_runs() {
    let (mut server, mut alice) = scripted("alice");
    let mut now = Instant::now();
    server.start_game(&duel(), 0);
    server.send_all((1..=159).map(FakeServer::frame));
    assert!(tick_until(&mut alice, &mut now, 200, |p| p.sim.frame() == 159));

    server.send_all([NetMessage::KeyFrame { frame: 160 }]);
    assert!(tick_until(&mut alice, &mut now, 10, |p| p.sim.frame() == 160));

    server.pump();
    let echo = server
        .inbox
        .iter()
        .position(|m| *m == NetMessage::KeyFrame { frame: 160 })
        .expect("keyframe 160 not echoed");
    let sync = server
        .inbox
        .iter()
        .position(|m| matches!(m, NetMessage::SyncResponse { frame: 160, .. }))
        .expect("frame 160 not reported");
    assert!(echo < sync);
}

#[test]
fn out_of_sequence_keyframe_does_not_advance() {
    let (mut server, mut alice) = scripted("alice");
    let mut now = Instant::now();
    server.start_game(&duel(), 0);
    server.send_all((1..=3).map(FakeServer::frame));
    assert!(tick_until(&mut alice, &mut now, 10, |p| p.sim.frame() == 3));

    server.send_all([NetMessage::KeyFrame { frame: 16 }]);
    tick_until(&mut alice, &mut now, 5, |_| false);
    assert_eq!(alice.sim.frame(), 3);

    server.pump();
    assert!(!server.inbox.contains(&NetMessage::KeyFrame { frame: 16 }));
}

#[test]
fn spectator_ally_chat_is_hidden_from_players() {
    let setup = duel().with_player("carol", 0, true);
    let (mut server, mut alice) = scripted("alice");
    let mut now = Instant::now();
    server.start_game(&setup, 0);
    server.send_all([
        NetMessage::Chat(ChatMessage::new(2, TO_ALLIES, "spec talk")),
        NetMessage::Chat(ChatMessage::new(1, TO_ALLIES, "bob's plan")),
        NetMessage::Chat(ChatMessage::new(2, TO_EVERYONE, "hello all")),
    ]);

    assert!(tick_until(&mut alice, &mut now, 10, |p| !p.chat_lines().is_empty()));
    assert_eq!(alice.chat_lines(), ["hello all"]);
}

#[test]
fn pause_and_quit_drive_the_state() {
    let (mut server, mut alice) = scripted("alice");
    let mut now = Instant::now();
    server.start_game(&duel(), 0);
    server.send_all([
        NetMessage::NewFrame,
        NetMessage::Pause {
            player: 1,
            paused: true,
        },
    ]);
    assert!(tick_until(&mut alice, &mut now, 10, |p| {
        p.sim.session().state() == SessionState::Paused
    }));
    assert!(alice.sim.pacer().is_paused());

    server.send_all([
        NetMessage::Pause {
            player: 1,
            paused: false,
        },
        NetMessage::UserSpeed {
            player: 1,
            speed: 2.0,
        },
        NetMessage::Quit {
            reason: "Server shutdown".into(),
        },
    ]);
    assert!(tick_until(&mut alice, &mut now, 10, |p| p.sim.session().is_ended()));
    assert_eq!(alice.sim.pacer().speed(), 2.0);
    assert_eq!(alice.sim.session().end_reason(), Some("Server shutdown"));
    assert!(alice.events.contains(&ClientEvent::Ended {
        reason: "Server shutdown".into(),
    }));
}

#[test]
fn rejection_ends_the_session() {
    let (mut server, mut alice) = scripted("alice");
    let mut now = Instant::now();
    server.send_all([NetMessage::RejectConnect {
        reason: "Wrong password".into(),
    }]);
    assert!(tick_until(&mut alice, &mut now, 5, |p| p.sim.session().is_ended()));
    assert!(alice.events.contains(&ClientEvent::Rejected {
        reason: "Wrong password".into(),
    }));
    assert_eq!(alice.sim.steps(), 0);
}

#[test]
fn progress_reports_are_consumed_while_counting() {
    let (mut server, mut alice) = scripted("alice");
    let mut now = Instant::now();
    server.start_game(&duel(), 0);
    assert!(tick_until(&mut alice, &mut now, 5, |p| {
        p.sim.session().state() == SessionState::Playing
    }));
    server.send_all([
        NetMessage::NewFrame,
        NetMessage::GameFrameProgress { frame: 90 },
        NetMessage::NewFrame,
    ]);
    assert_eq!(alice.sim.buffered_frames(), 2);
    assert_eq!(alice.sim.session().server_frame(), 90);
}

fn side_message(kind: u8, value: i16) -> NetMessage {
    match kind {
        0 => NetMessage::Command {
            player: 1,
            command: move_to(value as f32, 0.0),
        },
        1 => NetMessage::Select {
            player: 0,
            units: vec![value.rem_euclid(8)],
        },
        2 => NetMessage::Chat(ChatMessage::new(1, TO_EVERYONE, value.to_string())),
        3 => NetMessage::AiCommand {
            player: 0,
            ai: 0,
            unit: value.rem_euclid(8),
            command: move_to(0.0, value as f32),
        },
        _ => NetMessage::SystemMsg {
            player: 255,
            text: format!("note {value}"),
        },
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn no_frame_runs_without_its_frame_message(
        messages in prop::collection::vec((0u8..5, any::<i16>()), 0..40),
        ticks in 1usize..8,
    ) {
        let (mut server, mut alice) = scripted("alice");
        let mut now = Instant::now();
        server.start_game(&duel(), 0);
        server.send_all(messages.iter().map(|&(kind, value)| side_message(kind, value)));

        tick_until(&mut alice, &mut now, ticks, |_| false);
        prop_assert_eq!(alice.sim.steps(), 0);
        prop_assert_eq!(alice.sim.frame(), 0);

        server.send_all([NetMessage::NewFrame]);
        tick_until(&mut alice, &mut now, 3, |_| false);
        prop_assert_eq!(alice.sim.steps(), 1);
    }
}
