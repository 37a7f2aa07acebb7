// Binary stream primitives shared by the segment and note codecs.
//
// Layout conventions: unsigned LEB128 varints for counts and rows, zigzag
// varints for signed payload integers, little-endian f64, strings as
// varint length + UTF-8 bytes.

use crate::error::DecodeError;
use crate::row::Row;
use crate::timing::TimingData;

/// Growable output buffer.
#[derive(Debug, Clone, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_varint(&mut self, mut value: u32) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    pub fn write_signed(&mut self, value: i32) {
        self.write_varint(((value << 1) ^ (value >> 31)) as u32);
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_str(&mut self, value: &str) {
        self.write_varint(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over an input buffer with a sticky failure flag: once a read fails,
/// every later read returns [`DecodeError::StreamFailed`].
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            failed: false,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn fail(&mut self, error: DecodeError) -> DecodeError {
        self.failed = true;
        error
    }

    /// Marks the stream as failed because a decoded byte or number is not a
    /// legal value for `what`.
    pub fn invalid(&mut self, what: &'static str, value: u32) -> DecodeError {
        self.fail(DecodeError::InvalidValue { what, value })
    }

    pub fn unknown_tag(&mut self, tag: u8) -> DecodeError {
        self.fail(DecodeError::UnknownTag(tag))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.failed {
            return Err(DecodeError::StreamFailed);
        }
        let remaining = self.remaining();
        if remaining < n {
            return Err(self.fail(DecodeError::Truncated {
                needed: n,
                remaining,
            }));
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_varint(&mut self) -> Result<u32, DecodeError> {
        let mut value = 0u32;
        for shift in (0..35).step_by(7) {
            let byte = self.read_u8()?;
            let bits = (byte & 0x7f) as u32;
            if shift == 28 && bits > 0x0f {
                return Err(self.fail(DecodeError::VarintOverflow));
            }
            value |= bits << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(self.fail(DecodeError::VarintOverflow))
    }

    pub fn read_signed(&mut self) -> Result<i32, DecodeError> {
        let raw = self.read_varint()?;
        Ok(((raw >> 1) as i32) ^ -((raw & 1) as i32))
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(raw))
    }

    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_varint()? as usize;
        let bytes = self.take(len)?;
        match std::str::from_utf8(bytes) {
            Ok(text) => Ok(text.to_owned()),
            Err(_) => Err(self.fail(DecodeError::InvalidUtf8)),
        }
    }

    /// Reads an entry count and rejects counts that cannot possibly fit in
    /// the rest of the stream, given the smallest encoded size of one entry.
    pub fn read_count(&mut self, min_entry_size: usize) -> Result<usize, DecodeError> {
        let count = self.read_varint()?;
        let remaining = self.remaining();
        if (count as usize).saturating_mul(min_entry_size.max(1)) > remaining {
            return Err(self.fail(DecodeError::CountOutOfRange { count, remaining }));
        }
        Ok(count as usize)
    }
}

/// How row positions are written to and read from a stream.
#[derive(Debug, Clone, Copy)]
pub enum RowMode<'a> {
    /// Raw rows, stored relative to `base`. Every written row must be >= `base`.
    Rows { base: Row },
    /// Seconds relative to the time of `base`, converted through `timing`.
    /// Used to carry content across a tempo change.
    Time { timing: &'a TimingData, base: Row },
}

impl RowMode<'static> {
    pub const RAW: RowMode<'static> = RowMode::Rows { base: 0 };
}

impl RowMode<'_> {
    pub fn write_row(&self, writer: &mut Writer, row: Row) {
        match *self {
            RowMode::Rows { base } => {
                debug_assert!(row >= base, "row {row} is before the stream base {base}");
                writer.write_varint(row.saturating_sub(base).max(0) as u32);
            }
            RowMode::Time { timing, base } => {
                let seconds = timing.row_to_time(row as f64) - timing.row_to_time(base as f64);
                writer.write_f64(seconds);
            }
        }
    }

    pub fn read_row(&self, reader: &mut Reader<'_>) -> Result<Row, DecodeError> {
        match *self {
            RowMode::Rows { base } => {
                let offset = reader.read_varint()?;
                match Row::try_from(offset).ok().and_then(|o| base.checked_add(o)) {
                    Some(row) => Ok(row),
                    None => Err(reader.invalid("row offset", offset)),
                }
            }
            RowMode::Time { timing, base } => {
                let seconds = reader.read_f64()?;
                if !seconds.is_finite() {
                    return Err(reader.invalid("time offset", 0));
                }
                let time = timing.row_to_time(base as f64) + seconds;
                Ok(timing.time_to_row(time).round() as Row)
            }
        }
    }

    /// Smallest number of bytes one encoded row takes.
    pub fn min_row_size(&self) -> usize {
        match self {
            RowMode::Rows { .. } => 1,
            RowMode::Time { .. } => 8,
        }
    }
}

/// Result of a best-effort decode: everything read before the first error is
/// kept in `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub value: T,
    pub error: Option<DecodeError>,
}

impl<T> Decoded<T> {
    pub fn complete(value: T) -> Self {
        Self { value, error: None }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Decoded<U> {
        Decoded {
            value: f(self.value),
            error: self.error,
        }
    }

    pub fn into_result(self) -> Result<T, DecodeError> {
        match self.error {
            None => Ok(self.value),
            Some(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_boundaries() {
        for value in [0u32, 1, 127, 128, 300, 16_383, 16_384, u32::MAX] {
            let mut w = Writer::new();
            w.write_varint(value);
            let mut r = Reader::new(w.as_bytes());
            assert_eq!(r.read_varint().unwrap(), value);
            assert!(r.is_at_end());
        }
    }

    #[test]
    fn varint_small_values_take_one_byte() {
        let mut w = Writer::new();
        w.write_varint(127);
        assert_eq!(w.len(), 1);
        w.write_varint(128);
        assert_eq!(w.len(), 3);
    }

    #[test]
    fn signed_values_use_zigzag() {
        let mut w = Writer::new();
        for v in [0, -1, 1, -64, i32::MIN, i32::MAX] {
            w.write_signed(v);
        }
        let mut r = Reader::new(w.as_bytes());
        for v in [0, -1, 1, -64, i32::MIN, i32::MAX] {
            assert_eq!(r.read_signed().unwrap(), v);
        }
    }

    #[test]
    fn overlong_varint_fails() {
        let bytes = [0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_varint(), Err(DecodeError::VarintOverflow));
        assert!(r.is_failed());
    }

    #[test]
    fn row_offset_past_last_row_fails() {
        let mut w = Writer::new();
        w.write_varint(u32::MAX);
        w.write_varint(10);
        let mut r = Reader::new(w.as_bytes());
        assert!(matches!(
            RowMode::RAW.read_row(&mut r),
            Err(DecodeError::InvalidValue { value: u32::MAX, .. })
        ));

        let mut r = Reader::new(w.as_bytes());
        let _ = r.read_varint();
        let mode = RowMode::Rows { base: Row::MAX - 5 };
        assert!(mode.read_row(&mut r).is_err());

        let mut w = Writer::new();
        w.write_varint(i32::MAX as u32);
        let mut r = Reader::new(w.as_bytes());
        assert_eq!(RowMode::RAW.read_row(&mut r), Ok(Row::MAX));
    }

    #[test]
    fn failure_is_sticky() {
        let mut r = Reader::new(&[0x01]);
        assert!(matches!(r.read_f64(), Err(DecodeError::Truncated { .. })));
        assert_eq!(r.read_u8(), Err(DecodeError::StreamFailed));
    }

    #[test]
    fn strings_round_trip() {
        let mut w = Writer::new();
        w.write_str("Drop ▲");
        let mut r = Reader::new(w.as_bytes());
        assert_eq!(r.read_string().unwrap(), "Drop ▲");
    }

    #[test]
    fn invalid_utf8_fails() {
        let bytes = [0x02, 0xc3, 0x28];
        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_string(), Err(DecodeError::InvalidUtf8));
    }

    #[test]
    fn count_larger_than_stream_is_rejected() {
        let mut w = Writer::new();
        w.write_varint(1000);
        w.write_u8(0);
        let mut r = Reader::new(w.as_bytes());
        assert!(matches!(
            r.read_count(2),
            Err(DecodeError::CountOutOfRange { count: 1000, .. })
        ));
    }

    #[test]
    fn rows_are_relative_to_base() {
        let mode = RowMode::Rows { base: 96 };
        let mut w = Writer::new();
        mode.write_row(&mut w, 144);
        assert_eq!(w.as_bytes(), &[48]);

        let paste = RowMode::Rows { base: 480 };
        let mut r = Reader::new(w.as_bytes());
        assert_eq!(paste.read_row(&mut r).unwrap(), 528);
    }
}
