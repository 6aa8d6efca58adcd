use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::net::RawPacket;

use super::{
    DemoError, DemoHeader, DemoRecord, DemoTrailer, FORMAT_VERSION, MAGIC, MAX_RECORD_LEN,
    MAX_SCRIPT_LEN, RECORD_PACKET, RECORD_TRAILER, read_array, read_blob, read_u32, truncated,
};

/// Reads a demo file record by record. The header is validated on open.
#[derive(Debug)]
pub struct DemoReader<R: Read> {
    reader: R,
    header: DemoHeader,
    trailer: Option<DemoTrailer>,
    records_read: u64,
    done: bool,
}

impl DemoReader<BufReader<File>> {
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self, DemoError> {
        let file = File::open(path)?;
        Self::open(BufReader::new(file))
    }
}

impl<R: Read> DemoReader<R> {
    pub fn open(mut reader: R) -> Result<Self, DemoError> {
        let magic = read_array::<8>(&mut reader)?;
        if magic != MAGIC {
            return Err(DemoError::InvalidMagic);
        }
        let [version] = read_array::<1>(&mut reader)?;
        if version != FORMAT_VERSION {
            return Err(DemoError::UnsupportedVersion { found: version });
        }

        let script = read_blob(&mut reader, MAX_SCRIPT_LEN)?;
        let setup_script = String::from_utf8(script)
            .map_err(|_| DemoError::MalformedRecord("setup script is not utf-8".into()))?;
        let header = DemoHeader {
            setup_script,
            map_checksum: read_u32(&mut reader)?,
            mod_checksum: read_u32(&mut reader)?,
            random_seed: read_u32(&mut reader)?,
            game_id: read_array::<16>(&mut reader)?,
            start_time: u64::from_le_bytes(read_array::<8>(&mut reader)?),
        };

        Ok(Self {
            reader,
            header,
            trailer: None,
            records_read: 0,
            done: false,
        })
    }

    pub fn header(&self) -> &DemoHeader {
        &self.header
    }

    /// Present once the reader has reached it.
    pub fn trailer(&self) -> Option<&DemoTrailer> {
        self.trailer.as_ref()
    }

    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Next recorded packet, or `None` at the trailer or end of file.
    pub fn next_record(&mut self) -> Result<Option<DemoRecord>, DemoError> {
        if self.done {
            return Ok(None);
        }
        let mut tag = [0u8; 1];
        match self.reader.read_exact(&mut tag) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                self.done = true;
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        }

        match tag[0] {
            RECORD_PACKET => {
                let game_time = read_array::<4>(&mut self.reader)
                    .map(f32::from_le_bytes)
                    .map_err(|e| truncated(e, "record time"))?;
                let bytes = read_blob(&mut self.reader, MAX_RECORD_LEN).map_err(|e| match e {
                    DemoError::Io(io) => truncated(io, "record body"),
                    other => other,
                })?;
                if bytes.is_empty() {
                    return Err(DemoError::MalformedRecord("empty packet".into()));
                }
                self.records_read += 1;
                Ok(Some(DemoRecord {
                    game_time,
                    packet: RawPacket::from_vec(bytes),
                }))
            }
            RECORD_TRAILER => {
                let final_frame = read_array::<4>(&mut self.reader)
                    .map(i32::from_le_bytes)
                    .map_err(|e| truncated(e, "trailer"))?;
                let game_time = read_array::<4>(&mut self.reader)
                    .map(f32::from_le_bytes)
                    .map_err(|e| truncated(e, "trailer"))?;
                let winning_ally_teams = read_blob(&mut self.reader, u8::MAX as usize)?;
                self.trailer = Some(DemoTrailer {
                    final_frame,
                    game_time,
                    winning_ally_teams,
                });
                self.done = true;
                Ok(None)
            }
            other => {
                self.done = true;
                Err(DemoError::UnknownRecord(other))
            }
        }
    }
}

impl<R: Read> Iterator for DemoReader<R> {
    type Item = Result<DemoRecord, DemoError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
