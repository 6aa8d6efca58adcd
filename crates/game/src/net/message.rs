//! The message catalog: one entry per wire type code, with the length rule
//! a receiver needs to split a buffer into messages without understanding
//! their contents.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthRule {
    /// Total length including the type byte.
    Fixed(usize),
    /// A `u8` total length follows the type byte.
    U8Prefixed,
    /// A `u16` total length follows the type byte.
    U16Prefixed,
}

impl LengthRule {
    pub fn header_len(self) -> usize {
        match self {
            LengthRule::Fixed(len) => len,
            LengthRule::U8Prefixed => 2,
            LengthRule::U16Prefixed => 3,
        }
    }
}

/// Which side may originate a message. Servers relay client messages, so
/// this only restricts what a client is allowed to send upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Server,
    Client,
    Any,
}

macro_rules! catalog {
    ($($variant:ident = $code:literal, $len:expr, $origin:ident, $player:expr;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum MessageType {
            $($variant = $code,)*
        }

        impl MessageType {
            pub const ALL: &'static [MessageType] = &[$(MessageType::$variant,)*];

            pub fn length_rule(self) -> LengthRule {
                match self {
                    $(MessageType::$variant => $len,)*
                }
            }

            pub fn origin(self) -> Origin {
                match self {
                    $(MessageType::$variant => Origin::$origin,)*
                }
            }

            /// Byte offset of the embedded sending-player id, if the message
            /// carries one.
            pub fn player_offset(self) -> Option<usize> {
                match self {
                    $(MessageType::$variant => $player,)*
                }
            }
        }

        impl TryFrom<u8> for MessageType {
            type Error = u8;

            fn try_from(code: u8) -> Result<Self, u8> {
                match code {
                    $($code => Ok(MessageType::$variant),)*
                    other => Err(other),
                }
            }
        }
    };
}

use LengthRule::{Fixed, U16Prefixed, U8Prefixed};

catalog! {
    KeyFrame = 1, Fixed(5), Any, None;
    NewFrame = 2, Fixed(1), Server, None;
    Quit = 3, U16Prefixed, Any, None;
    StartPlaying = 4, Fixed(5), Any, None;
    SetPlayerNum = 5, Fixed(2), Server, Some(1);
    PlayerName = 6, U8Prefixed, Client, Some(2);
    Chat = 7, U8Prefixed, Any, Some(2);
    RandSeed = 8, Fixed(5), Server, None;
    GameId = 9, Fixed(17), Server, None;
    PathChecksum = 10, Fixed(6), Client, Some(1);
    Command = 11, U16Prefixed, Client, Some(3);
    Select = 12, U16Prefixed, Client, Some(3);
    Pause = 13, Fixed(3), Any, Some(1);
    AiCommand = 14, U16Prefixed, Client, Some(3);
    AiCommands = 15, U16Prefixed, Client, Some(3);
    AiShare = 16, U16Prefixed, Client, Some(3);
    UserSpeed = 19, Fixed(6), Any, Some(1);
    InternalSpeed = 20, Fixed(5), Server, None;
    CpuUsage = 21, Fixed(5), Client, None;
    DirectControl = 22, Fixed(2), Client, Some(1);
    DcUpdate = 23, Fixed(7), Client, Some(1);
    Share = 26, Fixed(12), Client, Some(1);
    SetShare = 27, Fixed(11), Client, Some(1);
    PlayerStat = 29, Fixed(22), Client, Some(1);
    GameOver = 30, U8Prefixed, Client, Some(2);
    MapDraw = 31, U8Prefixed, Client, Some(2);
    SyncResponse = 33, Fixed(10), Client, Some(1);
    SystemMsg = 35, U16Prefixed, Any, Some(3);
    StartPos = 36, Fixed(16), Any, Some(1);
    PlayerInfo = 38, Fixed(10), Server, Some(1);
    PlayerLeft = 39, Fixed(3), Server, Some(1);
    LogMsg = 49, U16Prefixed, Client, Some(3);
    LuaMsg = 50, U16Prefixed, Client, Some(3);
    Team = 51, Fixed(5), Client, Some(1);
    GameData = 52, U16Prefixed, Server, None;
    Alliance = 53, Fixed(4), Client, Some(1);
    CCommand = 54, U16Prefixed, Any, None;
    ClientData = 61, U16Prefixed, Client, Some(3);
    AttemptConnect = 65, U16Prefixed, Client, None;
    RejectConnect = 66, U16Prefixed, Server, None;
    AiCreated = 70, U8Prefixed, Client, Some(2);
    AiStateChanged = 71, Fixed(4), Client, Some(1);
    CreateNewPlayer = 75, U16Prefixed, Server, Some(3);
    AiCommandTracked = 76, U16Prefixed, Client, Some(3);
    GameFrameProgress = 77, Fixed(5), Server, None;
}

impl MessageType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_frame_advance(self) -> bool {
        matches!(self, MessageType::NewFrame | MessageType::KeyFrame)
    }

    /// Messages whose loss would break lockstep or lose a player's order.
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            MessageType::KeyFrame
                | MessageType::NewFrame
                | MessageType::SyncResponse
                | MessageType::Command
                | MessageType::Select
                | MessageType::AiCommand
                | MessageType::AiCommandTracked
                | MessageType::AiCommands
                | MessageType::AiShare
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("empty buffer")]
    Empty,
    #[error("unknown message type {0}")]
    UnknownType(u8),
    #[error("{kind:?} declares {declared} bytes, {available} available")]
    Truncated {
        kind: MessageType,
        declared: usize,
        available: usize,
    },
    #[error("{kind:?} declares {declared} bytes, shorter than its header")]
    BadLength { kind: MessageType, declared: usize },
}

/// Total length of the message starting at `buf[0]`.
pub fn message_length(buf: &[u8]) -> Result<usize, FrameError> {
    let Some(&code) = buf.first() else {
        return Err(FrameError::Empty);
    };
    let kind = MessageType::try_from(code).map_err(FrameError::UnknownType)?;
    let rule = kind.length_rule();

    let declared = match rule {
        LengthRule::Fixed(len) => len,
        LengthRule::U8Prefixed => match buf.get(1) {
            Some(&len) => len as usize,
            None => {
                return Err(FrameError::Truncated {
                    kind,
                    declared: rule.header_len(),
                    available: buf.len(),
                });
            }
        },
        LengthRule::U16Prefixed => match buf.get(1..3) {
            Some(raw) => u16::from_le_bytes([raw[0], raw[1]]) as usize,
            None => {
                return Err(FrameError::Truncated {
                    kind,
                    declared: rule.header_len(),
                    available: buf.len(),
                });
            }
        },
    };

    if declared < rule.header_len() {
        return Err(FrameError::BadLength { kind, declared });
    }
    if declared > buf.len() {
        return Err(FrameError::Truncated {
            kind,
            declared,
            available: buf.len(),
        });
    }
    Ok(declared)
}

/// Number of whole messages `buf` splits into, or `None` if it does not split
/// cleanly. A streaming split may end in a partial message.
fn clean_split_count(mut buf: &[u8], streaming: bool) -> Option<usize> {
    let mut count = 0;
    while !buf.is_empty() {
        match message_length(buf) {
            Ok(len) => {
                buf = &buf[len..];
                count += 1;
            }
            Err(FrameError::Truncated { .. }) if streaming => break,
            Err(_) => return None,
        }
    }
    Some(count)
}

/// Splits a buffer of back-to-back messages.
///
/// A message whose declared length is malformed is reported and skipped
/// together with its header. The cursor then resumes at the later offset
/// from which the rest of the buffer splits into the most messages; on a tie
/// the later offset wins, so bytes the bad message claimed are not carved
/// into extra messages. An unknown type code ends a complete buffer, since
/// its length cannot be known.
#[derive(Debug, Clone)]
pub struct MessageSplitter<'a> {
    buf: &'a [u8],
    pos: usize,
    streaming: bool,
}

impl<'a> MessageSplitter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            streaming: false,
        }
    }

    /// For a buffer that is still being filled. A message running past the
    /// end stops the split without being consumed, and an unknown type code
    /// is skipped like a bad length instead of ending the buffer.
    pub fn streaming(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            streaming: true,
        }
    }

    /// Offset of the first byte not yet consumed.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn resync_from(&self, start: usize) -> usize {
        let mut best: Option<(usize, usize)> = None;
        for candidate in start.min(self.buf.len())..self.buf.len() {
            let Some(count) = clean_split_count(&self.buf[candidate..], self.streaming) else {
                continue;
            };
            match best {
                Some((most, _)) if count < most || (count == 0 && most == 0) => {}
                _ => best = Some((count, candidate)),
            }
        }
        best.map_or(self.buf.len(), |(_, offset)| offset)
    }
}

impl<'a> Iterator for MessageSplitter<'a> {
    type Item = Result<&'a [u8], FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buf.len() {
            return None;
        }

        match message_length(&self.buf[self.pos..]) {
            Ok(len) => {
                let message = &self.buf[self.pos..self.pos + len];
                self.pos += len;
                Some(Ok(message))
            }
            Err(FrameError::Truncated { .. }) if self.streaming => None,
            Err(err @ FrameError::UnknownType(_)) if self.streaming => {
                self.pos = self.resync_from(self.pos + 1);
                Some(Err(err))
            }
            Err(err @ FrameError::UnknownType(_)) | Err(err @ FrameError::Empty) => {
                self.pos = self.buf.len();
                Some(Err(err))
            }
            Err(
                err @ (FrameError::Truncated { kind, .. } | FrameError::BadLength { kind, .. }),
            ) => {
                self.pos = self.resync_from(self.pos + kind.length_rule().header_len());
                Some(Err(err))
            }
        }
    }
}
