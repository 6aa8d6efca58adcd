use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use strata::net::{MessageType, TO_EVERYONE};
use strata::{DemoError, DemoHeader, DemoReader, DemoRecord, MAX_PLAYERS, RawPacket};

/// Pulls recorded packets out of a demo as the game clock reaches them.
pub struct DemoPlayback {
    reader: DemoReader<Box<dyn Read + Send>>,
    pending: Option<DemoRecord>,
}

impl DemoPlayback {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DemoError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader(reader: impl Read + Send + 'static) -> Result<Self, DemoError> {
        let boxed: Box<dyn Read + Send> = Box::new(reader);
        Ok(Self {
            reader: DemoReader::open(boxed)?,
            pending: None,
        })
    }

    pub fn header(&self) -> &DemoHeader {
        self.reader.header()
    }

    pub fn records_read(&self) -> u64 {
        self.reader.records_read()
    }

    pub fn is_finished(&self) -> bool {
        self.pending.is_none() && self.reader.is_done()
    }

    /// The next record stamped at or before `game_time`, if any.
    pub fn next_due(&mut self, game_time: f32) -> Result<Option<DemoRecord>, DemoError> {
        if self.pending.is_none() {
            self.pending = self.reader.next_record()?;
        }
        match &self.pending {
            Some(record) if record.game_time <= game_time => Ok(self.pending.take()),
            _ => Ok(None),
        }
    }

    /// The next record regardless of its time stamp.
    pub fn next_any(&mut self) -> Result<Option<DemoRecord>, DemoError> {
        match self.pending.take() {
            Some(record) => Ok(Some(record)),
            None => self.reader.next_record(),
        }
    }
}

/// Maps player numbers recorded in a demo onto the roster slots replaying
/// them. Live spectators joining the playback take slots in between, so
/// recorded player `n` is the `n`th slot that came from the demo.
#[derive(Debug, Clone)]
pub struct PlayerNumberMap {
    map: [u8; 256],
}

impl Default for PlayerNumberMap {
    fn default() -> Self {
        let mut map = [0u8; 256];
        for (i, slot) in map.iter_mut().enumerate() {
            *slot = i as u8;
        }
        Self { map }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("recorded player {recorded} maps to {mapped}, past the end of the roster")]
pub struct InvalidPlayerNumber {
    pub recorded: u8,
    pub mapped: u8,
}

impl PlayerNumberMap {
    /// `from_demo[i]` tells whether roster slot `i` replays a recorded player.
    pub fn rebuild(&mut self, from_demo: &[bool]) {
        let mut slot = 0usize;
        for i in 0..256usize {
            if i < MAX_PLAYERS {
                while slot < from_demo.len() && !from_demo[slot] {
                    slot += 1;
                }
                self.map[i] = slot.min(u8::MAX as usize) as u8;
            } else {
                self.map[i] = i as u8;
            }
            slot += 1;
        }
    }

    pub fn get(&self, recorded: u8) -> u8 {
        self.map[recorded as usize]
    }

    fn adjust(&self, recorded: u8, roster_len: usize) -> Result<u8, InvalidPlayerNumber> {
        let mapped = self.get(recorded);
        if mapped as usize >= roster_len && (mapped as usize) < MAX_PLAYERS {
            return Err(InvalidPlayerNumber { recorded, mapped });
        }
        Ok(mapped)
    }

    /// Rewrites the player ids embedded in a recorded packet.
    pub fn remap(
        &self,
        packet: &RawPacket,
        roster_len: usize,
    ) -> Result<RawPacket, InvalidPlayerNumber> {
        let Some(kind) = packet.message_type() else {
            return Ok(packet.clone());
        };
        let Some(offset) = kind.player_offset() else {
            return Ok(packet.clone());
        };
        let Some(&recorded) = packet.get(offset) else {
            return Ok(packet.clone());
        };

        let mut out = packet.with_byte(offset, self.adjust(recorded, roster_len)?);
        if kind == MessageType::Chat
            && let Some(&destination) = packet.get(3)
            && destination < TO_EVERYONE
        {
            out = out.with_byte(3, self.adjust(destination, roster_len)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use strata::net::{ChatMessage, TO_ALLIES};
    use strata::{DemoWriter, NetMessage, SERVER_PLAYER};

    use super::*;

    #[test]
    fn live_slots_are_skipped() {
        let mut map = PlayerNumberMap::default();
        // slot 1 is a live spectator who joined the playback
        map.rebuild(&[true, false, true, true]);
        assert_eq!(map.get(0), 0);
        assert_eq!(map.get(1), 2);
        assert_eq!(map.get(2), 3);
        assert_eq!(map.get(SERVER_PLAYER), SERVER_PLAYER);
    }

    #[test]
    fn chat_destination_follows_the_sender() {
        let mut map = PlayerNumberMap::default();
        map.rebuild(&[false, true, true]);

        let direct = NetMessage::Chat(ChatMessage::new(0, 1u8, "hi")).encode().unwrap();
        let remapped = NetMessage::decode(&map.remap(&direct, 3).unwrap()).unwrap();
        assert_eq!(
            remapped,
            NetMessage::Chat(ChatMessage::new(1, 2u8, "hi"))
        );

        let allies = NetMessage::Chat(ChatMessage::new(0, TO_ALLIES, "gg")).encode().unwrap();
        let remapped = NetMessage::decode(&map.remap(&allies, 3).unwrap()).unwrap();
        assert_eq!(
            remapped,
            NetMessage::Chat(ChatMessage::new(1, TO_ALLIES, "gg"))
        );
    }

    #[test]
    fn players_past_the_roster_are_rejected() {
        let mut map = PlayerNumberMap::default();
        map.rebuild(&[true]);
        let pause = NetMessage::Pause {
            player: 4,
            paused: true,
        }
        .encode()
        .unwrap();
        assert!(map.remap(&pause, 1).is_err());

        let frame = NetMessage::NewFrame.encode().unwrap();
        assert_eq!(map.remap(&frame, 1).unwrap(), frame);
    }

    #[test]
    fn records_are_released_by_time() {
        let header = DemoHeader {
            setup_script: "{}".into(),
            map_checksum: 0,
            mod_checksum: 0,
            random_seed: 1,
            game_id: [0; 16],
            start_time: 0,
        };
        let mut writer = DemoWriter::new(Vec::new(), &header).unwrap();
        let frame = NetMessage::NewFrame.encode().unwrap();
        writer.record(0.0, &frame).unwrap();
        writer.record(1.0, &frame).unwrap();
        let bytes = writer.into_inner();

        let mut playback = DemoPlayback::from_reader(Cursor::new(bytes)).unwrap();
        assert!(playback.next_due(0.5).unwrap().is_some());
        assert!(playback.next_due(0.5).unwrap().is_none());
        assert!(!playback.is_finished());
        assert!(playback.next_due(1.0).unwrap().is_some());
        assert!(playback.next_due(9.0).unwrap().is_none());
        assert!(playback.is_finished());
    }
}
