//! Frame codec for envelope payloads
//!
//! Integers are written as 7-bit groups, most significant group first, with
//! the high bit set on every group except the last. Values are taken as
//! unsigned 32-bit before grouping, so negative numbers always take 5 bytes.
//!
//! Strings are a length integer followed by the raw UTF-8 bytes. A negative
//! length marks an absent value and is followed by nothing.
//!
//! Fields written in sequence concatenate into one buffer. The remote service
//! decodes each verb's fields in a fixed order, so writers must match it.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// Longest encoding of a 32-bit value
const MAX_INT_LEN: usize = 5;

/// Length written for an absent string
const ABSENT_LEN: i32 = -1;

/// Append the variable-length encoding of `value` to `buf`
pub fn encode_int(value: i32, buf: &mut impl BufMut) {
    let mut v = value as u32;
    let mut scratch = [0u8; MAX_INT_LEN];

    // Fill from the tail: the last group has no continuation bit.
    let mut start = MAX_INT_LEN - 1;
    scratch[start] = (v & 0x7F) as u8;
    v >>= 7;
    while v != 0 {
        start -= 1;
        scratch[start] = (v & 0x7F) as u8 | 0x80;
        v >>= 7;
    }

    buf.put_slice(&scratch[start..]);
}

/// Decode one integer from the front of `buf`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_int(buf: &[u8]) -> Result<(i32, usize), FrameError> {
    let mut acc: u64 = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if i == MAX_INT_LEN {
            return Err(FrameError::VarintOverflow(0));
        }
        acc = (acc << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            if acc > u64::from(u32::MAX) {
                return Err(FrameError::VarintOverflow(0));
            }
            // Values above i32::MAX wrap to negative (subtract 2^32).
            return Ok((acc as u32 as i32, i + 1));
        }
    }

    Err(FrameError::Truncated(0))
}

/// Append a length-prefixed string, or the absent marker for `None`.
///
/// Strings longer than `i32::MAX` bytes cannot be framed; nothing is written
/// for them.
pub fn encode_str(value: Option<&str>, buf: &mut impl BufMut) -> Result<(), FrameError> {
    match value {
        Some(s) => {
            encode_int(string_len(s.len())?, buf);
            buf.put_slice(s.as_bytes());
        }
        None => encode_int(ABSENT_LEN, buf),
    }
    Ok(())
}

fn string_len(len: usize) -> Result<i32, FrameError> {
    i32::try_from(len).map_err(|_| FrameError::StringTooLong(len))
}

/// Decode one string from the front of `buf`.
///
/// Returns the string (`None` for the absent marker) and bytes consumed.
pub fn decode_str(buf: &[u8]) -> Result<(Option<&str>, usize), FrameError> {
    let (len, header) = decode_int(buf)?;
    if len < 0 {
        return Ok((None, header));
    }

    let len = len as usize;
    let rest = &buf[header..];
    if rest.len() < len {
        return Err(FrameError::LengthOutOfBounds {
            declared: len,
            remaining: rest.len(),
        });
    }

    let s = std::str::from_utf8(&rest[..len])?;
    Ok((Some(s), header + len))
}

/// Sequential writer producing one contiguous payload.
///
/// The first encoding error is kept and reported by [`finish`](Self::finish);
/// later writes are ignored.
#[derive(Debug, Default)]
pub struct FrameWriter {
    buf: BytesMut,
    error: Option<FrameError>,
}

impl FrameWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_int(&mut self, value: i32) -> &mut Self {
        if self.error.is_none() {
            encode_int(value, &mut self.buf);
        }
        self
    }

    /// Write a boolean as integer 1 or 0
    pub fn write_flag(&mut self, value: bool) -> &mut Self {
        self.write_int(i32::from(value))
    }

    pub fn write_str(&mut self, value: &str) -> &mut Self {
        self.put_str(Some(value));
        self
    }

    pub fn write_opt_str(&mut self, value: Option<&str>) -> &mut Self {
        self.put_str(value);
        self
    }

    fn put_str(&mut self, value: Option<&str>) {
        if self.error.is_none() {
            self.error = encode_str(value, &mut self.buf).err();
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume the writer and return the payload
    pub fn finish(self) -> Result<Bytes, FrameError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.buf.freeze()),
        }
    }
}

/// Sequential reader over a payload produced by [`FrameWriter`]
#[derive(Debug, Clone)]
pub struct FrameReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> FrameReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    pub fn read_int(&mut self) -> Result<i32, FrameError> {
        let (value, used) = decode_int(&self.buf[self.offset..]).map_err(|e| self.at_offset(e))?;
        self.offset += used;
        Ok(value)
    }

    pub fn read_flag(&mut self) -> Result<bool, FrameError> {
        Ok(self.read_int()? != 0)
    }

    /// Read a string; `None` when the writer stored the absent marker
    pub fn read_str(&mut self) -> Result<Option<&'a str>, FrameError> {
        let buf: &'a [u8] = self.buf;
        let (value, used) = decode_str(&buf[self.offset..]).map_err(|e| self.at_offset(e))?;
        self.offset += used;
        Ok(value)
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn at_offset(&self, err: FrameError) -> FrameError {
        match err {
            FrameError::Truncated(_) => FrameError::Truncated(self.offset),
            FrameError::VarintOverflow(_) => FrameError::VarintOverflow(self.offset),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn int_bytes(value: i32) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_int(value, &mut buf);
        buf
    }

    #[test]
    fn test_int_byte_layout() {
        assert_eq!(int_bytes(0), vec![0x00]);
        assert_eq!(int_bytes(1), vec![0x01]);
        assert_eq!(int_bytes(127), vec![0x7F]);
        assert_eq!(int_bytes(128), vec![0x81, 0x00]);
        assert_eq!(int_bytes(300), vec![0x82, 0x2C]);
        assert_eq!(int_bytes(16_384), vec![0x81, 0x80, 0x00]);
        assert_eq!(int_bytes(i32::MAX), vec![0x87, 0xFF, 0xFF, 0xFF, 0x7F]);
    }

    #[test]
    fn test_negative_ints_wrap_to_unsigned() {
        assert_eq!(int_bytes(-1), vec![0x8F, 0xFF, 0xFF, 0xFF, 0x7F]);
        assert_eq!(int_bytes(i32::MIN), vec![0x88, 0x80, 0x80, 0x80, 0x00]);
    }

    #[test]
    fn test_decode_wraps_above_i32_max() {
        let (value, used) = decode_int(&[0x88, 0x80, 0x80, 0x80, 0x00]).unwrap();
        assert_eq!(value, i32::MIN);
        assert_eq!(used, 5);

        let (value, _) = decode_int(&[0x8F, 0xFF, 0xFF, 0xFF, 0x7F]).unwrap();
        assert_eq!(value, -1);
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let (value, used) = decode_int(&[0x82, 0x2C, 0xFF, 0xFF]).unwrap();
        assert_eq!(value, 300);
        assert_eq!(used, 2);
    }

    #[test]
    fn test_truncated_int_rejected() {
        assert_eq!(decode_int(&[]), Err(FrameError::Truncated(0)));
        assert_eq!(decode_int(&[0x81, 0x80]), Err(FrameError::Truncated(0)));
    }

    #[test]
    fn test_oversized_int_rejected() {
        assert_eq!(
            decode_int(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00]),
            Err(FrameError::VarintOverflow(0))
        );
        // Five groups, but 35 significant bits
        assert_eq!(
            decode_int(&[0xFF, 0xFF, 0xFF, 0xFF, 0x7F]),
            Err(FrameError::VarintOverflow(0))
        );
    }

    #[test]
    fn test_string_layout() {
        let mut buf = Vec::new();
        encode_str(Some("hé"), &mut buf).unwrap();
        assert_eq!(buf, vec![0x03, b'h', 0xC3, 0xA9]);
    }

    #[test]
    fn test_empty_string() {
        let mut buf = Vec::new();
        encode_str(Some(""), &mut buf).unwrap();
        assert_eq!(buf, vec![0x00]);
        assert_eq!(decode_str(&buf).unwrap(), (Some(""), 1));
    }

    #[test]
    fn test_absent_string_consumes_only_marker() {
        let mut writer = FrameWriter::new();
        writer.write_opt_str(None).write_int(7);
        let payload = writer.finish().unwrap();

        let mut reader = FrameReader::new(&payload);
        assert_eq!(reader.read_str().unwrap(), None);
        assert_eq!(reader.position(), 5);
        assert_eq!(reader.read_int().unwrap(), 7);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_string_length_must_fit_in_32_bits() {
        let max = i32::MAX as usize;
        assert_eq!(string_len(max), Ok(i32::MAX));
        assert_eq!(string_len(max + 1), Err(FrameError::StringTooLong(max + 1)));
    }

    #[test]
    fn test_declared_length_past_end_rejected() {
        let err = decode_str(&[0x05, b'a', b'b']).unwrap_err();
        assert_eq!(
            err,
            FrameError::LengthOutOfBounds {
                declared: 5,
                remaining: 2
            }
        );
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let err = decode_str(&[0x02, 0xC3, 0x28]).unwrap_err();
        assert!(matches!(err, FrameError::InvalidUtf8(_)));
    }

    #[test]
    fn test_reader_reports_offset_of_truncation() {
        let mut reader = FrameReader::new(&[0x01, 0x81]);
        assert_eq!(reader.read_int().unwrap(), 1);
        assert_eq!(reader.read_int(), Err(FrameError::Truncated(1)));
    }

    #[test]
    fn test_flag_round_trip() {
        let mut writer = FrameWriter::new();
        writer.write_flag(true).write_flag(false);
        let payload = writer.finish().unwrap();
        assert_eq!(&payload[..], &[0x01, 0x00]);

        let mut reader = FrameReader::new(&payload);
        assert!(reader.read_flag().unwrap());
        assert!(!reader.read_flag().unwrap());
    }

    proptest! {
        #[test]
        fn int_round_trips(v in any::<i32>()) {
            let buf = int_bytes(v);
            prop_assert!(buf.len() <= MAX_INT_LEN);
            prop_assert_eq!(decode_int(&buf).unwrap(), (v, buf.len()));
        }

        #[test]
        fn string_round_trips(s in ".*") {
            let mut buf = Vec::new();
            encode_str(Some(&s), &mut buf).unwrap();
            let (decoded, used) = decode_str(&buf).unwrap();
            prop_assert_eq!(decoded, Some(s.as_str()));
            prop_assert_eq!(used, buf.len());
        }

        #[test]
        fn mixed_sequence_decodes_in_order(a in any::<i32>(), b in ".*", c in any::<i32>()) {
            let mut writer = FrameWriter::new();
            writer.write_int(a).write_str(&b).write_int(c);
            let payload = writer.finish().unwrap();

            let mut reader = FrameReader::new(&payload);
            prop_assert_eq!(reader.read_int().unwrap(), a);
            prop_assert_eq!(reader.read_str().unwrap(), Some(b.as_str()));
            prop_assert_eq!(reader.read_int().unwrap(), c);
            prop_assert!(reader.is_empty());
        }
    }
}
