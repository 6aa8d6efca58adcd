use super::codec::{CodecResult, PackPacket, UnpackPacket};
use super::message::MessageType;
use super::packet::RawPacket;

pub const TO_ALLIES: u8 = 127;
pub const TO_SPECTATORS: u8 = 126;
pub const TO_EVERYONE: u8 = 125;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatDestination {
    Allies,
    Spectators,
    Everyone,
    Player(u8),
}

impl From<u8> for ChatDestination {
    fn from(value: u8) -> Self {
        match value {
            TO_ALLIES => ChatDestination::Allies,
            TO_SPECTATORS => ChatDestination::Spectators,
            TO_EVERYONE => ChatDestination::Everyone,
            player => ChatDestination::Player(player),
        }
    }
}

impl From<ChatDestination> for u8 {
    fn from(value: ChatDestination) -> Self {
        match value {
            ChatDestination::Allies => TO_ALLIES,
            ChatDestination::Spectators => TO_SPECTATORS,
            ChatDestination::Everyone => TO_EVERYONE,
            ChatDestination::Player(player) => player,
        }
    }
}

/// What the visibility filter needs to know about either end of a chat line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatParty {
    pub player: u8,
    pub ally_team: u8,
    pub spectator: bool,
    pub full_view: bool,
}

impl ChatParty {
    fn spectating(&self) -> bool {
        self.spectator || self.full_view
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub from: u8,
    pub destination: ChatDestination,
    pub text: String,
}

impl ChatMessage {
    pub fn new(from: u8, destination: impl Into<ChatDestination>, text: impl Into<String>) -> Self {
        Self {
            from,
            destination: destination.into(),
            text: text.into(),
        }
    }

    pub fn is_visible_to(&self, sender: &ChatParty, recipient: &ChatParty) -> bool {
        if sender.player == recipient.player {
            return true;
        }
        match self.destination {
            ChatDestination::Everyone => true,
            ChatDestination::Spectators => recipient.spectating(),
            ChatDestination::Player(target) => recipient.player == target,
            ChatDestination::Allies => {
                if sender.spectator {
                    recipient.spectating()
                } else {
                    recipient.spectating()
                        || (!recipient.spectator && recipient.ally_team == sender.ally_team)
                }
            }
        }
    }

    pub fn recipients<'a>(
        &self,
        sender: &ChatParty,
        parties: impl IntoIterator<Item = &'a ChatParty>,
    ) -> Vec<u8> {
        parties
            .into_iter()
            .filter(|party| party.player != sender.player && self.is_visible_to(sender, party))
            .map(|party| party.player)
            .collect()
    }

    pub fn pack(&self) -> CodecResult<RawPacket> {
        let mut packet = PackPacket::sized_u8(MessageType::Chat.code());
        packet.write(self.from).write(u8::from(self.destination));
        packet.write_str(&self.text)?;
        packet.finish()
    }

    pub fn unpack(data: &[u8]) -> CodecResult<Self> {
        let mut reader = UnpackPacket::new(data, 2);
        let from = reader.read::<u8>()?;
        let destination = reader.read::<u8>()?.into();
        let text = reader.read_string()?;
        Ok(Self {
            from,
            destination,
            text,
        })
    }
}
