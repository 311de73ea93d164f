//! Byte-level cursor and writer for class file structures.

use crate::error::{VignetteError, VignetteResult};

/// Decodes the modified UTF-8 encoding used by class file `Utf8` entries.
pub fn decode_mutf8(input: &[u8]) -> VignetteResult<String> {
    String::from_utf16(&decode_mutf8_units(input)?)
        .map_err(|_| VignetteError::format("invalid UTF-16 sequence"))
}

/// Decodes modified UTF-8 into UTF-16 code units. Unpaired surrogates are
/// legal in class files and are returned as is.
pub fn decode_mutf8_units(input: &[u8]) -> VignetteResult<Vec<u16>> {
    let mut units: Vec<u16> = Vec::with_capacity(input.len());
    let mut index = 0;
    while index < input.len() {
        let byte = input[index];
        index += 1;

        match byte {
            0x00 => {
                return Err(VignetteError::format("embedded NUL inside MUTF-8 string"));
            }
            0x01..=0x7f => {
                units.push(byte as u16);
            }
            0xc0..=0xdf => {
                if index >= input.len() {
                    return Err(VignetteError::format("truncated MUTF-8 sequence"));
                }
                let b2 = input[index];
                index += 1;
                let value = (((byte & 0x1f) as u16) << 6) | ((b2 & 0x3f) as u16);
                units.push(value);
            }
            0xe0..=0xef => {
                if index + 1 >= input.len() {
                    return Err(VignetteError::format(
                        "truncated three-byte MUTF-8 sequence",
                    ));
                }
                let b2 = input[index];
                let b3 = input[index + 1];
                index += 2;
                let value = (((byte & 0x0f) as u16) << 12)
                    | (((b2 & 0x3f) as u16) << 6)
                    | ((b3 & 0x3f) as u16);
                units.push(value);
            }
            _ => {
                return Err(VignetteError::format("unsupported MUTF-8 leading byte"));
            }
        }
    }
    Ok(units)
}

/// Encodes `value` as modified UTF-8: NUL takes two bytes and supplementary
/// characters are written as surrogate pairs of three bytes each.
pub fn encode_mutf8(value: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007f => bytes.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                bytes.push(0xc0 | ((unit >> 6) as u8 & 0x1f));
                bytes.push(0x80 | (unit as u8 & 0x3f));
            }
            _ => {
                bytes.push(0xe0 | ((unit >> 12) as u8 & 0x0f));
                bytes.push(0x80 | ((unit >> 6) as u8 & 0x3f));
                bytes.push(0x80 | (unit as u8 & 0x3f));
            }
        }
    }
    bytes
}

/// Simple cursor for reading class file structures from an in-memory buffer.
///
/// All multi-byte values are big-endian, as mandated by the class file format.
pub struct ClassReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ClassReader<'a> {
    /// Creates a new reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        ClassReader { data, offset: 0 }
    }

    /// Returns the current position within the underlying slice.
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Returns the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    /// Advances the cursor by `len` bytes without reading them.
    pub fn skip(&mut self, len: usize) -> VignetteResult<()> {
        self.ensure(len)?;
        self.offset += len;
        Ok(())
    }

    /// Reads `len` bytes and returns a borrowed slice.
    pub fn read_bytes(&mut self, len: usize) -> VignetteResult<&'a [u8]> {
        self.ensure(len)?;
        let start = self.offset;
        let end = self.offset + len;
        self.offset = end;
        Ok(&self.data[start..end])
    }

    /// Reads a fixed-size array from the stream.
    pub fn read_array<const N: usize>(&mut self) -> VignetteResult<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut array = [0u8; N];
        array.copy_from_slice(bytes);
        Ok(array)
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> VignetteResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16(&mut self) -> VignetteResult<u16> {
        Ok(u16::from_be_bytes(self.read_array::<2>()?))
    }

    /// Reads a big-endian `u32`.
    pub fn read_u32(&mut self) -> VignetteResult<u32> {
        Ok(u32::from_be_bytes(self.read_array::<4>()?))
    }

    /// Reads a big-endian `u64`.
    pub fn read_u64(&mut self) -> VignetteResult<u64> {
        Ok(u64::from_be_bytes(self.read_array::<8>()?))
    }

    /// Reads a `u16` length followed by that many modified UTF-8 bytes.
    pub fn read_mutf8(&mut self) -> VignetteResult<String> {
        let len = self.read_u16()? as usize;
        decode_mutf8(self.read_bytes(len)?)
    }

    /// Reads a `u16` count followed by that many `u16` values.
    pub fn read_u16_table(&mut self) -> VignetteResult<Vec<u16>> {
        let count = self.read_u16()? as usize;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_u16()?);
        }
        Ok(values)
    }

    fn ensure(&self, len: usize) -> VignetteResult<()> {
        if self
            .offset
            .checked_add(len)
            .is_some_and(|end| end <= self.data.len())
        {
            Ok(())
        } else {
            Err(VignetteError::UnexpectedEof {
                offset: self.offset,
                expected: len,
            })
        }
    }
}

/// Convenience builder for emitting class file structures to memory.
#[derive(Default)]
pub struct ClassWriter {
    buffer: Vec<u8>,
}

impl ClassWriter {
    pub fn new() -> Self {
        ClassWriter { buffer: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ClassWriter {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    pub fn position(&self) -> usize {
        self.buffer.len()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes a `u16` length-prefixed modified UTF-8 string.
    pub fn write_mutf8(&mut self, value: &str) -> VignetteResult<()> {
        let bytes = encode_mutf8(value);
        let len = u16::try_from(bytes.len())
            .map_err(|_| VignetteError::format("string constant exceeds 65535 bytes"))?;
        self.write_u16(len);
        self.write_bytes(&bytes);
        Ok(())
    }

    /// Writes a `u16` count followed by the values.
    pub fn write_u16_table(&mut self, values: &[u16]) -> VignetteResult<()> {
        self.write_u16(table_len(values.len())?);
        for value in values {
            self.write_u16(*value);
        }
        Ok(())
    }
}

/// Converts a collection size to the `u16` count used throughout the format.
pub fn table_len(len: usize) -> VignetteResult<u16> {
    u16::try_from(len).map_err(|_| VignetteError::format(format!("table of {len} entries exceeds 65535")))
}

/// Class file version pair as stored after the magic number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClassVersion {
    pub major: u16,
    pub minor: u16,
}

impl ClassVersion {
    pub const MAGIC: u32 = 0xCAFE_BABE;
    /// Highest major version accepted (Java 25).
    pub const MAX_MAJOR: u16 = 69;

    pub const fn new(major: u16, minor: u16) -> Self {
        ClassVersion { major, minor }
    }

    pub fn read(reader: &mut ClassReader<'_>) -> VignetteResult<Self> {
        let magic = reader.read_u32()?;
        if magic != Self::MAGIC {
            return Err(VignetteError::InvalidMagic { found: magic });
        }
        let minor = reader.read_u16()?;
        let major = reader.read_u16()?;
        if major > Self::MAX_MAJOR {
            return Err(VignetteError::UnsupportedVersion { major, minor });
        }
        Ok(ClassVersion { major, minor })
    }

    pub fn write(&self, writer: &mut ClassWriter) {
        writer.write_u32(Self::MAGIC);
        writer.write_u16(self.minor);
        writer.write_u16(self.major);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ClassReader, ClassVersion, ClassWriter, decode_mutf8, decode_mutf8_units, encode_mutf8,
    };
    use crate::error::{VignetteError, VignetteResult};

    #[test]
    fn mutf8_encodes_nul_and_supplementary_characters() -> VignetteResult<()> {
        let value = "a\u{0}\u{2603}\u{1F600}";
        let bytes = encode_mutf8(value);
        assert_eq!(&bytes[..3], &[b'a', 0xc0, 0x80]);
        assert!(!bytes.contains(&0));
        // the emoji becomes two three-byte surrogate halves
        assert_eq!(bytes.len(), 1 + 2 + 3 + 6);
        assert_eq!(decode_mutf8(&bytes)?, value);
        Ok(())
    }

    #[test]
    fn lone_surrogates_decode_to_units_but_not_strings() -> VignetteResult<()> {
        let high_surrogate = [0xed, 0xa0, 0x80];
        assert_eq!(decode_mutf8_units(&high_surrogate)?, vec![0xd800]);
        assert!(decode_mutf8(&high_surrogate).is_err());
        assert!(decode_mutf8_units(&[0xe0, 0x80]).is_err());
        Ok(())
    }

    #[test]
    fn reader_reports_truncated_input() {
        let mut reader = ClassReader::new(&[0x00, 0x01, 0x02]);
        assert_eq!(reader.read_u16().ok(), Some(1));
        match reader.read_u16() {
            Err(VignetteError::UnexpectedEof { offset, expected }) => {
                assert_eq!(offset, 2);
                assert_eq!(expected, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn version_header_round_trips_and_rejects_bad_magic() -> VignetteResult<()> {
        let mut writer = ClassWriter::new();
        ClassVersion::new(52, 0).write(&mut writer);
        let bytes = writer.into_inner();
        assert_eq!(&bytes[..4], &[0xca, 0xfe, 0xba, 0xbe]);
        let version = ClassVersion::read(&mut ClassReader::new(&bytes))?;
        assert_eq!(version, ClassVersion::new(52, 0));

        let bad = [0u8, 0, 0, 0, 0, 0, 0, 52];
        assert!(matches!(
            ClassVersion::read(&mut ClassReader::new(&bad)),
            Err(VignetteError::InvalidMagic { found: 0 })
        ));
        Ok(())
    }
}
