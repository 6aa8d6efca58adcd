use super::packet::RawPacket;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("truncated packet: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("packet of {size} bytes does not fit its {limit} byte size field")]
    Oversize { size: usize, limit: usize },
    #[error("string at offset {0} has no terminator inside the packet")]
    UnterminatedString(usize),
    #[error("string contains an embedded NUL")]
    EmbeddedNul,
    #[error("string is not valid utf-8")]
    InvalidUtf8,
    #[error("{len} trailing bytes at offset {offset} are not a whole number of {width} byte values")]
    RaggedTail {
        offset: usize,
        len: usize,
        width: usize,
    },
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Fixed-width scalar with a little-endian wire representation.
pub trait WireScalar: Copy {
    const SIZE: usize;

    fn put(self, out: &mut Vec<u8>);

    /// `bytes` is at least `SIZE` long.
    fn get(bytes: &[u8]) -> Self;
}

macro_rules! wire_scalar {
    ($($ty:ty),*) => {
        $(
            impl WireScalar for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn put(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn get(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

wire_scalar!(u8, i8, u16, i16, u32, i32, u64, i64, f32);

impl WireScalar for bool {
    const SIZE: usize = 1;

    fn put(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn get(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeField {
    None,
    U8,
    U16,
}

impl SizeField {
    fn width(self) -> usize {
        match self {
            SizeField::None => 0,
            SizeField::U8 => 1,
            SizeField::U16 => 2,
        }
    }

    fn limit(self) -> usize {
        match self {
            SizeField::None => usize::MAX,
            SizeField::U8 => u8::MAX as usize,
            SizeField::U16 => u16::MAX as usize,
        }
    }
}

/// Field-by-field packet writer. The type byte goes first; a size-prefixed
/// message gets its total length patched in by [`PackPacket::finish`].
#[derive(Debug)]
pub struct PackPacket {
    buf: Vec<u8>,
    size_field: SizeField,
}

impl PackPacket {
    pub fn fixed(type_code: u8) -> Self {
        Self::new(type_code, SizeField::None)
    }

    pub fn sized_u8(type_code: u8) -> Self {
        Self::new(type_code, SizeField::U8)
    }

    pub fn sized_u16(type_code: u8) -> Self {
        Self::new(type_code, SizeField::U16)
    }

    pub fn new(type_code: u8, size_field: SizeField) -> Self {
        let mut buf = Vec::with_capacity(16);
        buf.push(type_code);
        buf.resize(1 + size_field.width(), 0);
        Self { buf, size_field }
    }

    pub fn write<T: WireScalar>(&mut self, value: T) -> &mut Self {
        value.put(&mut self.buf);
        self
    }

    pub fn write_slice<T: WireScalar>(&mut self, values: &[T]) -> &mut Self {
        self.buf.reserve(values.len() * T::SIZE);
        for value in values {
            value.put(&mut self.buf);
        }
        self
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Appends the UTF-8 bytes followed by a NUL terminator.
    pub fn write_str(&mut self, value: &str) -> CodecResult<&mut Self> {
        if value.as_bytes().contains(&0) {
            return Err(CodecError::EmbeddedNul);
        }
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(0);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.len() <= 1 + self.size_field.width()
    }

    pub fn finish(mut self) -> CodecResult<RawPacket> {
        let size = self.buf.len();
        if size > self.size_field.limit() {
            return Err(CodecError::Oversize {
                size,
                limit: self.size_field.limit(),
            });
        }
        match self.size_field {
            SizeField::None => {}
            SizeField::U8 => self.buf[1] = size as u8,
            SizeField::U16 => self.buf[1..3].copy_from_slice(&(size as u16).to_le_bytes()),
        }
        Ok(RawPacket::from_vec(self.buf))
    }
}

/// Cursor over a received message. Every read checks the remaining length
/// first and never advances past a failed read.
#[derive(Debug, Clone)]
pub struct UnpackPacket<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> UnpackPacket<'a> {
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn ensure(&self, needed: usize) -> CodecResult<()> {
        if self.remaining() < needed {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    pub fn read<T: WireScalar>(&mut self) -> CodecResult<T> {
        self.ensure(T::SIZE)?;
        let value = T::get(&self.data[self.pos..]);
        self.pos += T::SIZE;
        Ok(value)
    }

    pub fn read_vec<T: WireScalar>(&mut self, count: usize) -> CodecResult<Vec<T>> {
        self.ensure(count.saturating_mul(T::SIZE))?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(T::get(&self.data[self.pos..]));
            self.pos += T::SIZE;
        }
        Ok(values)
    }

    /// Reads as many whole `T` as the rest of the buffer holds.
    /// Reads every value left in the packet, which must hold a whole number
    /// of them.
    pub fn read_remaining<T: WireScalar>(&mut self) -> CodecResult<Vec<T>> {
        let len = self.remaining();
        if len % T::SIZE != 0 {
            return Err(CodecError::RaggedTail {
                offset: self.pos,
                len,
                width: T::SIZE,
            });
        }
        let count = len / T::SIZE;
        let values = self.read_vec(count)?;
        self.pos = self.data.len();
        Ok(values)
    }

    pub fn read_bytes(&mut self, count: usize) -> CodecResult<&'a [u8]> {
        self.ensure(count)?;
        let bytes = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    pub fn read_rest(&mut self) -> &'a [u8] {
        let bytes = &self.data[self.pos.min(self.data.len())..];
        self.pos = self.data.len();
        bytes
    }

    pub fn read_string(&mut self) -> CodecResult<String> {
        let start = self.pos;
        let rest = self.data.get(start..).unwrap_or_default();
        let Some(end) = rest.iter().position(|&b| b == 0) else {
            return Err(CodecError::UnterminatedString(start));
        };
        let text = std::str::from_utf8(&rest[..end]).map_err(|_| CodecError::InvalidUtf8)?;
        self.pos = start + end + 1;
        Ok(text.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_are_little_endian() {
        let mut packet = PackPacket::fixed(7);
        packet.write(0x0102_0304u32).write(-2i16).write(1.5f32);
        let raw = packet.finish().unwrap();

        assert_eq!(&raw[..7], &[7, 4, 3, 2, 1, 0xfe, 0xff]);
        let mut reader = UnpackPacket::new(&raw, 1);
        assert_eq!(reader.read::<u32>().unwrap(), 0x0102_0304);
        assert_eq!(reader.read::<i16>().unwrap(), -2);
        assert_eq!(reader.read::<f32>().unwrap(), 1.5);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_size_prefix_is_patched() {
        let mut packet = PackPacket::sized_u16(11);
        packet.write(3u8).write_slice(&[1.0f32, 2.0]);
        let raw = packet.finish().unwrap();

        assert_eq!(raw.len(), 12);
        assert_eq!(u16::from_le_bytes([raw[1], raw[2]]), 12);
    }

    #[test]
    fn test_u8_size_overflow() {
        let mut packet = PackPacket::sized_u8(7);
        packet.write_bytes(&[b'x'; 300]);
        assert!(matches!(
            packet.finish(),
            Err(CodecError::Oversize { limit: 255, .. })
        ));
    }

    #[test]
    fn test_truncated_read_does_not_advance() {
        let data = [1u8, 2, 3];
        let mut reader = UnpackPacket::new(&data, 1);

        let err = reader.read::<u32>().unwrap_err();
        assert_eq!(
            err,
            CodecError::Truncated {
                offset: 1,
                needed: 4,
                available: 2
            }
        );
        assert_eq!(reader.position(), 1);
        assert_eq!(reader.read::<u16>().unwrap(), 0x0302);
    }

    #[test]
    fn test_strings() {
        let mut packet = PackPacket::sized_u8(6);
        packet.write(2u8).write_str("commander").unwrap();
        let raw = packet.finish().unwrap();

        let mut reader = UnpackPacket::new(&raw, 2);
        assert_eq!(reader.read::<u8>().unwrap(), 2);
        assert_eq!(reader.read_string().unwrap(), "commander");

        let unterminated = [6u8, 4, b'a', b'b'];
        let mut reader = UnpackPacket::new(&unterminated, 2);
        assert_eq!(reader.read_string(), Err(CodecError::UnterminatedString(2)));

        let mut packet = PackPacket::fixed(6);
        assert!(packet.write_str("a\0b").is_err());
    }

    #[test]
    fn test_read_remaining_rejects_partial_tail() {
        let data = [0u8, 1, 0, 2, 0, 9];
        let mut reader = UnpackPacket::new(&data, 1);
        assert_eq!(
            reader.read_remaining::<i16>(),
            Err(CodecError::RaggedTail {
                offset: 1,
                len: 5,
                width: 2
            })
        );
        assert_eq!(reader.remaining(), 5);

        let mut reader = UnpackPacket::new(&data[..5], 1);
        assert_eq!(reader.read_remaining::<i16>().unwrap(), vec![1, 2]);
        assert_eq!(reader.remaining(), 0);
    }
}
