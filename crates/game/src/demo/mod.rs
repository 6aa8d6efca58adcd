//! Demo files: the recorded broadcast stream of one game.
//!
//! ```text
//! [MAGIC "STRATADM"] [VERSION u8] [header]
//! { RECORD_PACKET f32 game_time, u32 len, [u8; len] }*
//! [RECORD_TRAILER i32 final_frame, f32 game_time, u32 n, [u8; n] winners]?
//! ```
//!
//! Integers are little-endian. Strings and byte blobs carry a `u32` length.
//! A file cut off by a crash has no trailer and still plays back.

mod reader;
mod writer;

use std::io::{self, Read, Write};

use crate::net::{MessageSplitter, RawPacket};

pub use reader::DemoReader;
pub use writer::DemoWriter;

pub const MAGIC: [u8; 8] = *b"STRATADM";
pub const FORMAT_VERSION: u8 = 1;

const RECORD_PACKET: u8 = 1;
const RECORD_TRAILER: u8 = 2;
const MAX_RECORD_LEN: usize = u16::MAX as usize;
const MAX_SCRIPT_LEN: usize = 16 << 20;

#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    #[error("demo i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("not a demo file")]
    InvalidMagic,
    #[error("unsupported demo version {found}")]
    UnsupportedVersion { found: u8 },
    #[error("malformed demo record: {0}")]
    MalformedRecord(String),
    #[error("unknown demo record tag {0}")]
    UnknownRecord(u8),
}

/// Everything a player needs to reproduce the recorded game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoHeader {
    pub setup_script: String,
    pub map_checksum: u32,
    pub mod_checksum: u32,
    pub random_seed: u32,
    pub game_id: [u8; 16],
    /// Seconds since the unix epoch when recording started.
    pub start_time: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DemoRecord {
    /// Game time in seconds at which the server broadcast the packet.
    pub game_time: f32,
    pub packet: RawPacket,
}

impl DemoRecord {
    /// The messages packed into the record. A record may hold several
    /// back-to-back messages.
    pub fn messages(&self) -> MessageSplitter<'_> {
        MessageSplitter::new(self.packet.bytes())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DemoTrailer {
    pub final_frame: i32,
    pub game_time: f32,
    pub winning_ally_teams: Vec<u8>,
}

fn write_u32(w: &mut dyn Write, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_blob(w: &mut dyn Write, bytes: &[u8]) -> Result<(), DemoError> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| DemoError::MalformedRecord(format!("{} byte blob", bytes.len())))?;
    write_u32(w, len)?;
    w.write_all(bytes)?;
    Ok(())
}

fn read_array<const N: usize>(r: &mut dyn Read) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_u32(r: &mut dyn Read) -> io::Result<u32> {
    read_array::<4>(r).map(u32::from_le_bytes)
}

fn read_blob(r: &mut dyn Read, limit: usize) -> Result<Vec<u8>, DemoError> {
    let len = read_u32(r)? as usize;
    if len > limit {
        return Err(DemoError::MalformedRecord(format!(
            "{len} byte blob exceeds {limit}"
        )));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Turns an EOF in the middle of a record into a malformed-record error.
fn truncated(err: io::Error, what: &str) -> DemoError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        DemoError::MalformedRecord(format!("truncated {what}"))
    } else {
        DemoError::Io(err)
    }
}
