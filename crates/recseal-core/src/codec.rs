//! # Byte Codec
//!
//! Little building blocks for the per-channel wire format: unsigned LEB128
//! varints, length-prefixed strings and raw byte runs. The reader tracks its
//! offset so that every [`DecodeError`] points at the failing byte.

use crate::error::DecodeError;

/// Maximum encoded length of a `u64` varint.
const MAX_VARINT_LEN: usize = 10;

/// Append-only encoder.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, b: u8) {
        self.buf.push(b);
    }

    /// Write an unsigned LEB128 varint.
    pub fn write_varint(&mut self, mut v: u64) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    /// Write bytes with no length prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write `varint(len) || bytes`.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.write_raw(bytes);
    }

    /// Write `varint(len) || utf8`.
    pub fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    /// Write `varint(count)` followed by each string.
    pub fn write_str_list<S: AsRef<str>>(&mut self, items: &[S]) {
        self.write_varint(items.len() as u64);
        for item in items {
            self.write_str(item.as_ref());
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume the writer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over an immutable byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Start reading at offset 0.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset.
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Unread byte count.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// True once every byte was consumed.
    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    /// Read exactly `n` bytes.
    pub fn read_raw(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEof {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Read a fixed-size array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_raw(N)?);
        Ok(out)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_raw(1)?[0])
    }

    /// Read an unsigned LEB128 varint.
    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let start = self.pos;
        let mut value: u64 = 0;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.read_u8()?;
            let chunk = u64::from(byte & 0x7f);
            if i == MAX_VARINT_LEN - 1 && chunk > 1 {
                return Err(DecodeError::VarintOverflow { offset: start });
            }
            value |= chunk << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DecodeError::VarintOverflow { offset: start })
    }

    /// Read a varint that must fit a `u32`.
    pub fn read_varint_u32(&mut self) -> Result<u32, DecodeError> {
        let start = self.pos;
        let v = self.read_varint()?;
        u32::try_from(v).map_err(|_| DecodeError::VarintOverflow { offset: start })
    }

    /// Read a varint used as a length, bounded by the unread input.
    fn read_len(&mut self) -> Result<usize, DecodeError> {
        let start = self.pos;
        let len = self.read_varint()?;
        match usize::try_from(len) {
            Ok(n) if n <= self.remaining() => Ok(n),
            _ => Err(DecodeError::UnexpectedEof {
                offset: start,
                needed: usize::try_from(len)
                    .unwrap_or(usize::MAX)
                    .saturating_sub(self.remaining()),
            }),
        }
    }

    /// Read `varint(len) || bytes`.
    pub fn read_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_len()?;
        self.read_raw(len)
    }

    /// Read `varint(len) || utf8`.
    pub fn read_str(&mut self) -> Result<&'a str, DecodeError> {
        let offset = self.pos;
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8 { offset })
    }

    /// Read `varint(count)` strings.
    pub fn read_str_list(&mut self) -> Result<Vec<String>, DecodeError> {
        let count = self.read_len()?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.read_str()?.to_string());
        }
        Ok(out)
    }

    /// Fail if any bytes remain.
    pub fn finish(&self) -> Result<(), DecodeError> {
        if self.is_at_end() {
            Ok(())
        } else {
            Err(DecodeError::TrailingBytes {
                offset: self.pos,
                remaining: self.remaining(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_known_encodings() {
        let cases: [(u64, &[u8]); 5] = [
            (0, &[0x00]),
            (127, &[0x7f]),
            (128, &[0x80, 0x01]),
            (300, &[0xac, 0x02]),
            (u64::MAX, &[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01]),
        ];
        for (value, expected) in cases {
            let mut w = ByteWriter::new();
            w.write_varint(value);
            assert_eq!(w.clone().into_bytes(), expected, "encoding {value}");
            let mut r = ByteReader::new(expected);
            assert_eq!(r.read_varint().unwrap(), value);
            assert!(r.is_at_end());
        }
    }

    #[test]
    fn varint_overflow_rejected() {
        let bytes = [0xff; 11];
        let mut r = ByteReader::new(&bytes);
        assert_eq!(
            r.read_varint(),
            Err(DecodeError::VarintOverflow { offset: 0 })
        );
        let bytes = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x02];
        let mut r = ByteReader::new(&bytes);
        assert!(matches!(r.read_varint(), Err(DecodeError::VarintOverflow { .. })));
    }

    #[test]
    fn truncated_string_reports_eof() {
        let mut w = ByteWriter::new();
        w.write_str("hello");
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes[..3]);
        assert!(matches!(r.read_str(), Err(DecodeError::UnexpectedEof { .. })));
    }

    #[test]
    fn invalid_utf8_rejected() {
        let bytes = [0x02, 0xc3, 0x28];
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_str(), Err(DecodeError::InvalidUtf8 { offset: 0 }));
    }

    #[test]
    fn str_list_roundtrip() {
        let mut w = ByteWriter::new();
        w.write_str_list(&["a", "", "ünïcode"]);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_str_list().unwrap(), vec!["a", "", "ünïcode"]);
        r.finish().unwrap();
    }

    #[test]
    fn finish_reports_trailing_bytes() {
        let bytes = [0x01, 0x02];
        let mut r = ByteReader::new(&bytes);
        r.read_u8().unwrap();
        assert_eq!(
            r.finish(),
            Err(DecodeError::TrailingBytes {
                offset: 1,
                remaining: 1
            })
        );
    }

    #[test]
    fn huge_length_prefix_does_not_allocate() {
        let mut w = ByteWriter::new();
        w.write_varint(u64::MAX);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert!(matches!(r.read_str_list(), Err(DecodeError::UnexpectedEof { .. })));
    }
}
