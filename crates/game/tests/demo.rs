use strata::{
    DemoHeader, DemoReader, DemoTrailer, DemoWriter, GameData, GameSetup, NetMessage, RawPacket,
};

fn setup() -> GameSetup {
    GameSetup::new("Tabula", "BA")
        .with_player("alice", 0, false)
        .with_player("bob", 1, false)
        .with_team(0, 0)
        .with_team(1, 1)
}

#[test]
fn recorded_game_plays_back_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("game.sdfz");

    let data = GameData::from_setup(&setup(), 1234).unwrap();
    let header = DemoHeader {
        setup_script: data.setup_script().to_string(),
        map_checksum: 1,
        mod_checksum: 2,
        random_seed: 1234,
        game_id: [9; 16],
        start_time: 1_750_000_000,
    };

    let stream: Vec<RawPacket> = vec![
        NetMessage::StartPlaying { countdown: 0 }.encode().unwrap(),
        NetMessage::NewFrame.encode().unwrap(),
        NetMessage::SystemMsg {
            player: 0,
            text: "gg".into(),
        }
        .encode()
        .unwrap(),
        NetMessage::KeyFrame { frame: 16 }.encode().unwrap(),
    ];

    let mut writer = DemoWriter::create(&path, &header).unwrap();
    for (i, packet) in stream.iter().enumerate() {
        writer.record(i as f32 / 30.0, packet).unwrap();
    }
    writer
        .finish(&DemoTrailer {
            final_frame: 16,
            game_time: 0.53,
            winning_ally_teams: vec![0],
        })
        .unwrap();
    drop(writer);

    let mut reader = DemoReader::open_file(&path).unwrap();
    assert_eq!(reader.header(), &header);
    let replay = GameSetup::from_json(&reader.header().setup_script).unwrap();
    assert_eq!(replay.players.len(), 2);

    let packets: Vec<RawPacket> = reader
        .by_ref()
        .map(|record| record.unwrap().packet)
        .collect();
    assert_eq!(packets, stream);
    assert_eq!(reader.trailer().unwrap().final_frame, 16);
}
