use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use super::message::MessageType;

/// Immutable encoded message. Cloning shares the buffer, so one broadcast
/// can sit in many outbound queues without copying.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RawPacket(Arc<[u8]>);

impl RawPacket {
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn type_code(&self) -> Option<u8> {
        self.0.first().copied()
    }

    pub fn message_type(&self) -> Option<MessageType> {
        self.type_code().and_then(|code| MessageType::try_from(code).ok())
    }

    /// Copy with one byte replaced; used when rewriting player ids.
    pub fn with_byte(&self, index: usize, value: u8) -> Self {
        let mut bytes = self.0.to_vec();
        if let Some(slot) = bytes.get_mut(index) {
            *slot = value;
        }
        Self::from_vec(bytes)
    }
}

impl Deref for RawPacket {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for RawPacket {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for RawPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message_type() {
            Some(kind) => write!(f, "RawPacket({:?}, {} bytes)", kind, self.0.len()),
            None => write!(f, "RawPacket(type {:?}, {} bytes)", self.type_code(), self.0.len()),
        }
    }
}
