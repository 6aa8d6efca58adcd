mod common;

use std::thread;
use std::time::{Duration, Instant};

use common::*;
use strata::command::CMD_MOVE;
use strata::net::{PeerId, TO_EVERYONE, UdpTransport};
use strata::Command;
use strata_client::{
    ClientConfig, ClientEvent, ClientSession, ClientSimLoop, SessionState, host_game,
};
use strata_server::{GameServer, ServerEvent};

const WAIT: Duration = Duration::from_secs(5);

fn march(peer: &mut Peer, units: &[i16], x: f32, z: f32) {
    let session = peer.sim.session_mut();
    session.select(units).unwrap();
    session
        .send_command(Command::new(CMD_MOVE).with_params([x, 0.0, z]))
        .unwrap();
}

#[test]
fn two_players_stay_in_sync() {
    let mut server = GameServer::new(duel(), server_config()).unwrap();
    let mut alice = Peer::local(&mut server, "alice");
    let mut bob = Peer::local(&mut server, "bob");

    assert!(run_until(&mut server, &mut [&mut alice, &mut bob], WAIT, |_, p| {
        p.iter().all(|p| p.sim.frame() >= 5)
    }));
    march(&mut alice, &[0, 1], 800.0, 800.0);
    march(&mut bob, &[4, 5, 6], 100.0, 2000.0);
    assert!(run_until(&mut server, &mut [&mut alice, &mut bob], WAIT, |_, p| {
        p.iter().all(|p| p.sim.frame() >= 60)
    }));

    let common = alice.sim.checksums().len().min(bob.sim.checksums().len());
    assert!(common >= 60);
    assert_eq!(alice.sim.checksums()[..common], bob.sim.checksums()[..common]);
    assert!(!server
        .drain_events()
        .any(|e| matches!(e, ServerEvent::Desync { .. })));
    assert_eq!(alice.sim.session().state(), SessionState::Playing);
}

#[test]
fn reconnect_keeps_chat_order() {
    let mut cfg = server_config();
    cfg.allow_reconnect = true;
    cfg.reconnect_window = Duration::ZERO;
    let mut server = GameServer::new(duel(), cfg).unwrap();
    let mut alice = Peer::local(&mut server, "alice");
    let mut bob = Peer::local(&mut server, "bob");
    assert!(run_until(&mut server, &mut [&mut alice, &mut bob], WAIT, |_, p| {
        p.iter().all(|p| p.sim.frame() >= 5)
    }));

    for i in 0..5 {
        alice.sim.session_mut().send_chat(TO_EVERYONE, format!("line {i}")).unwrap();
    }
    thread::sleep(Duration::from_millis(5));
    let transport = server.connect_local();
    assert!(alice.sim.session_mut().reconnect(Box::new(transport)).unwrap());
    for i in 5..10 {
        alice.sim.session_mut().send_chat(TO_EVERYONE, format!("line {i}")).unwrap();
    }

    assert!(run_until(&mut server, &mut [&mut alice, &mut bob], WAIT, |_, p| {
        p[1].chat_lines().len() >= 10
    }));
    let expected: Vec<String> = (0..10).map(|i| format!("line {i}")).collect();
    assert_eq!(bob.chat_lines(), expected);

    // alice kept simulating on the new link
    let frame = alice.sim.frame();
    assert!(run_until(&mut server, &mut [&mut alice, &mut bob], WAIT, |_, p| {
        p.iter().all(|p| p.sim.frame() > frame + 10)
    }));
    assert_eq!(
        alice.sim.checksums()[..frame as usize],
        bob.sim.checksums()[..frame as usize]
    );
}

#[test]
fn reconnect_over_udp_moves_to_the_new_socket() {
    let mut cfg = server_config();
    cfg.allow_reconnect = true;
    cfg.reconnect_window = Duration::ZERO;
    let mut server = GameServer::new(duel(), cfg).unwrap();
    let addr = server.listen("127.0.0.1:0").unwrap();
    let session = ClientSession::connect(addr, ClientConfig::new("alice")).unwrap();
    let mut alice = Peer {
        sim: ClientSimLoop::reference(session).with_checksum_log(),
        events: Vec::new(),
    };
    let mut bob = Peer::local(&mut server, "bob");
    assert!(run_until(&mut server, &mut [&mut alice, &mut bob], WAIT, |_, p| {
        p.iter().all(|p| p.sim.frame() >= 5)
    }));

    alice.sim.session_mut().send_chat(TO_EVERYONE, "before").unwrap();
    thread::sleep(Duration::from_millis(5));
    let transport = UdpTransport::connect(addr).unwrap();
    let new_local = transport.local_addr();
    assert!(alice.sim.session_mut().reconnect(Box::new(transport)).unwrap());
    alice.sim.session_mut().send_chat(TO_EVERYONE, "after").unwrap();

    let frame = alice.sim.frame();
    assert!(run_until(&mut server, &mut [&mut alice, &mut bob], WAIT, |_, p| {
        p[1].chat_lines().len() >= 2 && p.iter().all(|p| p.sim.frame() > frame + 10)
    }));
    assert_eq!(bob.chat_lines(), ["before", "after"]);
    assert_eq!(alice.sim.session().state(), SessionState::Playing);
    assert_eq!(server.participants().len(), 2);
    assert_eq!(
        alice.sim.session().peer(),
        PeerId::Udp {
            local: new_local,
            remote: addr
        }
    );

    let common = alice.sim.checksums().len().min(bob.sim.checksums().len());
    assert_eq!(alice.sim.checksums()[..common], bob.sim.checksums()[..common]);
}

#[test]
fn replaying_a_demo_reproduces_the_checksums() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("solo.sdfz");

    let mut cfg = server_config();
    cfg.record_demo = Some(path.clone());
    let mut server = GameServer::new(solo(), cfg).unwrap();
    let mut alice = Peer::local(&mut server, "alice");
    assert!(run_until(&mut server, &mut [&mut alice], WAIT, |_, p| {
        p[0].sim.frame() >= 5
    }));
    march(&mut alice, &[0, 1, 2], 1500.0, 700.0);
    assert!(run_until(&mut server, &mut [&mut alice], WAIT, |_, p| {
        p[0].sim.frame() >= 40
    }));

    server.shutdown();
    let recorded = server.frame();
    let mut now = Instant::now();
    assert!(tick_until(&mut alice, &mut now, 100, |p| p.sim.session().is_ended()));
    assert_eq!(alice.sim.frame(), recorded);

    let mut replay = GameServer::playback(&path, server_config()).unwrap();
    let mut viewer = Peer::local(&mut replay, "viewer");
    assert!(run_until(
        &mut replay,
        &mut [&mut viewer],
        Duration::from_secs(10),
        |_, p| p[0].sim.frame() >= recorded
            && p[0].system_messages().contains(&"End of demo")
    ));

    assert_eq!(viewer.sim.checksums(), alice.sim.checksums());
}

#[test]
fn hosting_runs_server_and_local_player() {
    let config = ClientConfig::new("alice");
    let (host, mut alice) = host_game(solo(), server_config(), None, config).unwrap();
    assert!(host.addr().is_none());

    let start = Instant::now();
    let mut events = Vec::new();
    while alice.frame() < 10 && start.elapsed() < WAIT {
        alice.update(Instant::now()).unwrap();
        events.extend(alice.session_mut().drain_events());
        thread::sleep(Duration::from_millis(2));
    }
    assert!(alice.frame() >= 10);
    assert!(events.contains(&ClientEvent::GameStarted));
    assert!(host.is_running());

    let server = host.stop().unwrap();
    assert!(server.frame() >= 10);
    assert_eq!(server.participants()[0].name, "alice");
}

#[test]
fn spectator_joins_midgame_over_udp() {
    let mut setup = solo();
    setup.allow_additional_players = true;
    let mut server = GameServer::new(setup, server_config()).unwrap();
    let addr = server.listen("127.0.0.1:0").unwrap();
    let mut alice = Peer::local(&mut server, "alice");
    assert!(run_until(&mut server, &mut [&mut alice], WAIT, |_, p| {
        p[0].sim.frame() >= 5
    }));

    let session = ClientSession::connect(addr, ClientConfig::new("watcher")).unwrap();
    let mut watcher = Peer {
        sim: ClientSimLoop::reference(session).with_checksum_log(),
        events: Vec::new(),
    };
    assert!(run_until(&mut server, &mut [&mut alice, &mut watcher], WAIT, |_, p| {
        p[1].sim.frame() >= 20
    }));

    let me = watcher.sim.session().player().unwrap();
    let entry = watcher.sim.session().roster().get(me).unwrap();
    assert!(entry.spectator);
    assert_eq!(entry.name, "watcher");
    let frame = watcher.sim.checksums().len().min(alice.sim.checksums().len());
    assert!(frame >= 5);
    assert_eq!(
        watcher.sim.checksums()[..frame],
        alice.sim.checksums()[..frame]
    );
    assert!(alice.events.iter().any(|e| matches!(
        e,
        ClientEvent::PlayerJoined { name, .. } if name == "watcher"
    )));
}
