mod common;

use std::thread;
use std::time::Duration;

use strata::net::{ChatMessage, LeaveReason, TO_EVERYONE, TeamAction, UdpTransport};
use strata::{NETWORK_VERSION, NetMessage, SERVER_PLAYER};
use strata_server::{AdminCommand, GameServer, ServerEvent};

use common::{TestClient, attempt, config, duel, run_for, run_until, solo};

const WAIT: Duration = Duration::from_secs(3);

fn position(inbox: &[NetMessage], wanted: impl Fn(&NetMessage) -> bool) -> usize {
    inbox
        .iter()
        .position(wanted)
        .expect("message never arrived")
}

fn connect(server: &mut GameServer, client: &mut TestClient) {
    assert!(run_until(server, &mut [client], WAIT, |_, c| c[0].player.is_some()));
}

/// Connects and loads every client, then waits for the first frames.
fn start(server: &mut GameServer, clients: &mut [&mut TestClient]) {
    for client in clients.iter_mut() {
        connect(server, client);
    }
    for client in clients.iter_mut() {
        client.join();
    }
    assert!(run_until(server, clients, WAIT, |s, _| s.frame() > 0));
}

#[test]
fn handshake_delivers_game_data_then_player_number() {
    let mut server = GameServer::new(solo(), config()).unwrap();
    let mut alice = TestClient::local(&mut server, "alice");

    assert!(run_until(&mut server, &mut [&mut alice], WAIT, |_, c| {
        c[0].inbox.len() >= 2
    }));
    match &alice.inbox[0] {
        NetMessage::GameData(data) => {
            assert_eq!(data.random_seed, 1234);
            assert_eq!(data.setup().unwrap().players[0].name, "alice");
        }
        other => panic!("expected game data first, got {other:?}"),
    }
    assert_eq!(alice.inbox[1], NetMessage::SetPlayerNum { player: 0 });

    let events: Vec<ServerEvent> = server.drain_events().collect();
    assert!(events.contains(&ServerEvent::PlayerConnected {
        player: 0,
        name: "alice".into(),
        reconnect: false,
    }));
    assert!(server.participants()[0].is_local);
}

#[test]
fn frames_follow_the_start_sequence() {
    let mut server = GameServer::new(solo(), config()).unwrap();
    let mut alice = TestClient::local(&mut server, "alice");
    connect(&mut server, &mut alice);
    alice.join();

    assert!(run_until(&mut server, &mut [&mut alice], WAIT, |_, c| {
        c[0].frames().len() >= 20
    }));

    let inbox = &alice.inbox;
    let countdown = position(inbox, |m| *m == NetMessage::StartPlaying { countdown: 1 });
    let start_pos = position(inbox, |m| matches!(m, NetMessage::StartPos { player: 0, .. }));
    let game_id = position(inbox, |m| matches!(m, NetMessage::GameId { .. }));
    let seed = position(inbox, |m| *m == NetMessage::RandSeed { seed: 1234 });
    let go = position(inbox, |m| *m == NetMessage::StartPlaying { countdown: 0 });
    let first_frame = position(inbox, |m| {
        matches!(m, NetMessage::NewFrame | NetMessage::KeyFrame { .. })
    });
    assert!(countdown < start_pos);
    assert!(start_pos < game_id && game_id < seed && seed < go);
    assert!(go < first_frame);

    let frames = alice.frames();
    for (i, frame) in frames.iter().enumerate().take(20) {
        let number = i as i32 + 1;
        if number % 16 == 0 {
            assert_eq!(**frame, NetMessage::KeyFrame { frame: number });
        } else {
            assert_eq!(**frame, NetMessage::NewFrame);
        }
    }
    assert!(server.frame() >= 20);
    assert!(server.drain_events().any(|e| e == ServerEvent::GameStarted));
}

#[test]
fn wrong_network_version_is_rejected() {
    let mut server = GameServer::new(solo(), config()).unwrap();
    let hello = NetMessage::AttemptConnect {
        version: NETWORK_VERSION + 1,
        name: "alice".into(),
        password: String::new(),
        engine_version: "old".into(),
        reconnect: false,
        netloss: 0,
    }
    .encode()
    .unwrap();
    let mut client = TestClient::over(server.connect_local(), "alice", &hello);

    assert!(run_until(&mut server, &mut [&mut client], WAIT, |_, c| {
        c[0].quit_reason().is_some()
    }));
    let reason = client.quit_reason().unwrap();
    assert!(reason.starts_with("Connection rejected: Wrong network version"), "{reason}");
    assert!(client.player.is_none());
    assert!(!server.participants()[0].is_linked());
    assert!(
        server
            .drain_events()
            .any(|e| matches!(e, ServerEvent::ConnectionDenied { .. }))
    );
}

#[test]
fn unknown_and_duplicate_names_are_rejected() {
    let mut server = GameServer::new(solo(), config()).unwrap();
    let mut mallory = TestClient::local(&mut server, "mallory");
    assert!(run_until(&mut server, &mut [&mut mallory], WAIT, |_, c| {
        c[0].quit_reason().is_some()
    }));
    assert_eq!(
        mallory.quit_reason(),
        Some("Connection rejected: User name not authorized to connect")
    );

    let mut alice = TestClient::local(&mut server, "alice");
    connect(&mut server, &mut alice);
    let mut twin = TestClient::local(&mut server, "alice");
    assert!(run_until(&mut server, &mut [&mut twin], WAIT, |_, c| {
        c[0].quit_reason().is_some()
    }));
    assert_eq!(
        twin.quit_reason(),
        Some("Connection rejected: User is already ingame")
    );
    assert!(server.participants()[0].is_linked());
}

#[test]
fn remote_players_need_their_password() {
    let mut setup = solo();
    setup.players[0].password = "secret".into();
    let mut server = GameServer::new(setup, config()).unwrap();
    let addr = server.listen("127.0.0.1:0").unwrap();

    let mut guess = TestClient::over(
        UdpTransport::connect(addr).unwrap(),
        "alice",
        &attempt("alice", "guess", false),
    );
    assert!(run_until(&mut server, &mut [&mut guess], WAIT, |_, c| {
        c[0].quit_reason().is_some()
    }));
    assert_eq!(
        guess.quit_reason(),
        Some("Connection rejected: Incorrect password")
    );

    let mut alice = TestClient::over(
        UdpTransport::connect(addr).unwrap(),
        "alice",
        &attempt("alice", "secret", false),
    );
    connect(&mut server, &mut alice);
    assert_eq!(alice.player, Some(0));
    assert!(!server.participants()[0].is_local);
}

#[test]
fn messages_claiming_another_sender_are_dropped() {
    let mut server = GameServer::new(duel(), config()).unwrap();
    let mut alice = TestClient::local(&mut server, "alice");
    let mut bob = TestClient::local(&mut server, "bob");
    connect(&mut server, &mut alice);
    connect(&mut server, &mut bob);

    alice.send(NetMessage::Chat(ChatMessage::new(1, TO_EVERYONE, "i am bob")));
    assert!(run_until(&mut server, &mut [&mut alice, &mut bob], WAIT, |_, c| {
        c[1].system_messages()
            .iter()
            .any(|m| m.contains("claiming to be player 1"))
    }));
    assert!(!bob.inbox.iter().any(|m| matches!(m, NetMessage::Chat(_))));

    alice.send(NetMessage::Chat(ChatMessage::new(0, TO_EVERYONE, "hi bob")));
    assert!(run_until(&mut server, &mut [&mut alice, &mut bob], WAIT, |_, c| {
        c[1].inbox
            .iter()
            .any(|m| matches!(m, NetMessage::Chat(chat) if chat.text == "hi bob"))
    }));
}

#[test]
fn diverging_checksums_are_reported() {
    let mut server = GameServer::new(duel(), config()).unwrap();
    let mut alice = TestClient::local(&mut server, "alice");
    let mut bob = TestClient::local(&mut server, "bob");
    bob.sync_salt = Some(0xdead_beef);
    start(&mut server, &mut [&mut alice, &mut bob]);

    assert!(run_until(&mut server, &mut [&mut alice, &mut bob], WAIT, |_, c| {
        c[0].system_messages()
            .iter()
            .any(|m| m.starts_with("Sync error for bob in frame"))
    }));
    let desync = server
        .drain_events()
        .find_map(|e| match e {
            ServerEvent::Desync { players, .. } => Some(players),
            _ => None,
        })
        .expect("no desync event");
    assert_eq!(desync, vec![1]);
    assert!(server.participants()[1].desynced);
    assert!(!server.participants()[0].desynced);
}

fn team_died(player: u8, team: u8) -> NetMessage {
    NetMessage::Team {
        player,
        action: TeamAction::TeamDied { team },
    }
}

#[test]
fn dedicated_server_takes_team_deaths_from_players() {
    let mut server = GameServer::new(duel(), config()).unwrap();
    let addr = server.listen("127.0.0.1:0").unwrap();
    let mut alice = TestClient::over(
        UdpTransport::connect(addr).unwrap(),
        "alice",
        &attempt("alice", "", false),
    );
    let mut bob = TestClient::over(
        UdpTransport::connect(addr).unwrap(),
        "bob",
        &attempt("bob", "", false),
    );
    start(&mut server, &mut [&mut alice, &mut bob]);
    assert!(server.participants().iter().all(|p| !p.is_local));

    bob.send(team_died(1, 0));
    assert!(run_until(&mut server, &mut [&mut alice, &mut bob], WAIT, |s, _| {
        s.participants()[0].spectator
    }));
    assert!(!server.teams()[0].active);
    assert!(!server.participants()[1].spectator);
    assert!(run_until(&mut server, &mut [&mut alice, &mut bob], WAIT, |_, c| {
        c[0].inbox.contains(&team_died(1, 0))
    }));
}

#[test]
fn hosted_server_takes_team_deaths_only_from_the_host() {
    let mut server = GameServer::new(duel(), config()).unwrap();
    let addr = server.listen("127.0.0.1:0").unwrap();
    let mut alice = TestClient::local(&mut server, "alice");
    let mut bob = TestClient::over(
        UdpTransport::connect(addr).unwrap(),
        "bob",
        &attempt("bob", "", false),
    );
    start(&mut server, &mut [&mut alice, &mut bob]);

    bob.send(team_died(1, 0));
    run_for(&mut server, &mut [&mut alice, &mut bob], Duration::from_millis(100));
    assert!(!server.participants()[0].spectator);
    assert!(server.teams()[0].active);

    alice.send(team_died(0, 1));
    assert!(run_until(&mut server, &mut [&mut alice, &mut bob], WAIT, |s, _| {
        s.participants()[1].spectator
    }));
}

#[test]
fn reconnect_moves_the_link_and_keeps_the_stream() {
    let mut cfg = config();
    cfg.allow_reconnect = true;
    cfg.reconnect_window = Duration::ZERO;
    let mut server = GameServer::new(solo(), cfg).unwrap();
    let mut alice = TestClient::local(&mut server, "alice");
    start(&mut server, &mut [&mut alice]);
    assert!(run_until(&mut server, &mut [&mut alice], WAIT, |_, c| c[0].frame >= 5));

    thread::sleep(Duration::from_millis(5));
    let transport = server.connect_local();
    assert!(alice.channel.rebind(Box::new(transport)));
    alice
        .channel
        .send_handshake(&attempt("alice", "", true))
        .unwrap();

    let before = alice.frame;
    assert!(run_until(&mut server, &mut [&mut alice], WAIT, |_, c| {
        c[0].frame > before + 10
    }));
    assert!(server.drain_events().any(|e| e
        == ServerEvent::PlayerConnected {
            player: 0,
            name: "alice".into(),
            reconnect: true,
        }));

    // every frame arrived exactly once, in order
    for (i, message) in alice.frames().iter().enumerate() {
        if let NetMessage::KeyFrame { frame } = message {
            assert_eq!(*frame, i as i32 + 1);
        }
    }
    assert!(alice.frame >= 16);
}

#[test]
fn host_can_kick_through_a_server_command() {
    let mut server = GameServer::new(duel(), config()).unwrap();
    let mut alice = TestClient::local(&mut server, "alice");
    let mut bob = TestClient::local(&mut server, "bob");
    connect(&mut server, &mut alice);
    connect(&mut server, &mut bob);

    alice.send(NetMessage::CCommand {
        command: "kickbynum".into(),
        extra: "1".into(),
    });
    assert!(run_until(&mut server, &mut [&mut alice, &mut bob], WAIT, |_, c| {
        c[1].quit_reason().is_some()
    }));
    assert_eq!(bob.quit_reason(), Some("Kicked from the battle"));
    assert!(alice.inbox.contains(&NetMessage::PlayerLeft {
        player: 1,
        reason: LeaveReason::Kicked,
    }));
    assert!(!server.participants()[1].is_linked());
}

#[test]
fn admin_pause_stops_frames() {
    let mut server = GameServer::new(solo(), config()).unwrap();
    let admin = server.admin();
    let mut alice = TestClient::local(&mut server, "alice");
    start(&mut server, &mut [&mut alice]);

    admin.send(AdminCommand::Pause(true)).unwrap();
    assert!(run_until(&mut server, &mut [&mut alice], WAIT, |_, c| {
        c[0].inbox.contains(&NetMessage::Pause {
            player: SERVER_PLAYER,
            paused: true,
        })
    }));
    let paused_at = server.frame();
    run_for(&mut server, &mut [&mut alice], Duration::from_millis(200));
    assert_eq!(server.frame(), paused_at);

    admin.send(AdminCommand::SingleStep).unwrap();
    run_for(&mut server, &mut [&mut alice], Duration::from_millis(20));
    assert_eq!(server.frame(), paused_at + 1);
}

#[test]
fn recorded_game_replays_to_a_viewer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("duel.sdfz");

    let mut cfg = config();
    cfg.record_demo = Some(path.clone());
    let mut server = GameServer::new(solo(), cfg).unwrap();
    let game_id = server.game_id();
    let mut alice = TestClient::local(&mut server, "alice");
    start(&mut server, &mut [&mut alice]);
    assert!(run_until(&mut server, &mut [&mut alice], WAIT, |_, c| {
        c[0].frames().len() >= 10
    }));
    alice.send(NetMessage::Chat(ChatMessage::new(0, TO_EVERYONE, "gg")));
    assert!(run_until(&mut server, &mut [&mut alice], WAIT, |_, c| {
        c[0].inbox.iter().any(|m| matches!(m, NetMessage::Chat(_)))
    }));
    let recorded_frames = server.frame();
    server.shutdown();
    alice.pump();
    assert_eq!(alice.quit_reason(), Some("Server shutdown"));

    let mut replay = GameServer::playback(&path, config()).unwrap();
    assert_eq!(replay.game_id(), game_id);
    let mut viewer = TestClient::local(&mut replay, "viewer");
    connect(&mut replay, &mut viewer);
    assert_eq!(viewer.player, Some(1));
    viewer.join();

    assert!(run_until(
        &mut replay,
        &mut [&mut viewer],
        Duration::from_secs(10),
        |_, c| c[0].system_messages().contains(&"End of demo")
    ));
    assert!(viewer.inbox.contains(&NetMessage::GameId { id: game_id }));
    assert_eq!(viewer.frames().len() as i32, recorded_frames);
    assert!(viewer.inbox.iter().any(|m| matches!(
        m,
        NetMessage::Chat(chat) if chat.from == 0 && chat.text == "gg"
    )));
}
