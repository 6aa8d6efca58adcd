use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::net::RawPacket;

use super::{
    DemoError, DemoHeader, DemoTrailer, FORMAT_VERSION, MAGIC, RECORD_PACKET, RECORD_TRAILER,
    write_blob, write_u32,
};

/// Streams broadcast packets to a demo file as the game runs.
pub struct DemoWriter<W: Write> {
    writer: W,
    records_written: u64,
    finished: bool,
}

impl DemoWriter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>, header: &DemoHeader) -> Result<Self, DemoError> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), header)
    }
}

impl<W: Write> DemoWriter<W> {
    /// Writes the file header immediately.
    pub fn new(mut writer: W, header: &DemoHeader) -> Result<Self, DemoError> {
        writer.write_all(&MAGIC)?;
        writer.write_all(&[FORMAT_VERSION])?;
        write_blob(&mut writer, header.setup_script.as_bytes())?;
        write_u32(&mut writer, header.map_checksum)?;
        write_u32(&mut writer, header.mod_checksum)?;
        write_u32(&mut writer, header.random_seed)?;
        writer.write_all(&header.game_id)?;
        writer.write_all(&header.start_time.to_le_bytes())?;
        Ok(Self {
            writer,
            records_written: 0,
            finished: false,
        })
    }

    pub fn record(&mut self, game_time: f32, packet: &RawPacket) -> Result<(), DemoError> {
        if self.finished {
            return Err(DemoError::MalformedRecord(
                "record after trailer".to_string(),
            ));
        }
        self.writer.write_all(&[RECORD_PACKET])?;
        self.writer.write_all(&game_time.to_le_bytes())?;
        write_blob(&mut self.writer, packet.bytes())?;
        self.records_written += 1;
        Ok(())
    }

    /// Appends the trailer and flushes. Further records are refused.
    pub fn finish(&mut self, trailer: &DemoTrailer) -> Result<(), DemoError> {
        if self.finished {
            return Ok(());
        }
        self.writer.write_all(&[RECORD_TRAILER])?;
        self.writer.write_all(&trailer.final_frame.to_le_bytes())?;
        self.writer.write_all(&trailer.game_time.to_le_bytes())?;
        write_blob(&mut self.writer, &trailer.winning_ally_teams)?;
        self.writer.flush()?;
        self.finished = true;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), DemoError> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
