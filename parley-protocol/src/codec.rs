//! Line codec for the chat wire format
//!
//! Every record is a line of text encoded as UTF-32 little-endian and
//! terminated by U+000A. Each code point takes exactly four bytes, so the
//! terminator can be found by scanning aligned four-byte units without any
//! length prefix.
//!
//! On decode, a trailing `\r` and any leading byte order marks are
//! stripped, which keeps peers that write `\r\n` or a BOM per line readable.
//! On encode only `\n` is written and no BOM is emitted.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Bytes per encoded code point
pub const CODE_UNIT_LEN: usize = 4;

/// Default read buffer size in characters
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Longest line accepted from a socket, in characters
///
/// Independent of the configured buffer size. It only stops a peer that
/// never sends a terminator from growing the read buffer without bound.
pub const MAX_LINE_CHARS: usize = 64 * 1024;

const NEWLINE: u32 = 0x0A;
const CARRIAGE_RETURN: char = '\r';
const BYTE_ORDER_MARK: char = '\u{FEFF}';

/// Line codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid UTF-32 code unit: {0:#010x}")]
    InvalidCodePoint(u32),

    #[error("Line too long (max {max} characters)")]
    LineTooLong { max: usize },

    #[error("Stream ended inside a code unit ({len} trailing bytes)")]
    TruncatedCodeUnit { len: usize },

    #[error("Line contains an embedded newline")]
    EmbeddedNewline,
}

/// UTF-32LE newline-delimited codec
///
/// Used for both directions of a connection. Lines longer than
/// [`MAX_LINE_CHARS`] are rejected so a peer that never sends a terminator
/// cannot grow the read buffer without bound.
#[derive(Debug, Clone)]
pub struct Utf32LineCodec {
    max_line_chars: usize,
    /// Offset already scanned for a terminator, always a multiple of four
    next_index: usize,
}

impl Utf32LineCodec {
    pub fn new() -> Self {
        Self::with_max_line_chars(MAX_LINE_CHARS)
    }

    pub fn with_max_line_chars(max_line_chars: usize) -> Self {
        Self {
            max_line_chars,
            next_index: 0,
        }
    }

    pub fn max_line_chars(&self) -> usize {
        self.max_line_chars
    }

    fn decode_line(&self, units: &[u8]) -> Result<String, CodecError> {
        let mut line = String::with_capacity(units.len() / CODE_UNIT_LEN);

        for chunk in units.chunks_exact(CODE_UNIT_LEN) {
            let unit = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let ch = char::from_u32(unit).ok_or(CodecError::InvalidCodePoint(unit))?;
            if ch == BYTE_ORDER_MARK && line.is_empty() {
                continue;
            }
            line.push(ch);
        }

        if line.ends_with(CARRIAGE_RETURN) {
            line.pop();
        }

        if line.chars().count() > self.max_line_chars {
            return Err(CodecError::LineTooLong {
                max: self.max_line_chars,
            });
        }

        Ok(line)
    }
}

impl Default for Utf32LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for Utf32LineCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut index = self.next_index;

        while index + CODE_UNIT_LEN <= src.len() {
            let unit = u32::from_le_bytes([src[index], src[index + 1], src[index + 2], src[index + 3]]);
            if unit == NEWLINE {
                let record = src.split_to(index + CODE_UNIT_LEN);
                self.next_index = 0;
                return self.decode_line(&record[..index]).map(Some);
            }
            index += CODE_UNIT_LEN;
        }

        // One extra unit of slack for a trailing carriage return
        if index / CODE_UNIT_LEN > self.max_line_chars + 1 {
            return Err(CodecError::LineTooLong {
                max: self.max_line_chars,
            });
        }

        self.next_index = index;
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        if src.is_empty() {
            return Ok(None);
        }

        if src.len() % CODE_UNIT_LEN != 0 {
            let len = src.len() % CODE_UNIT_LEN;
            src.clear();
            self.next_index = 0;
            return Err(CodecError::TruncatedCodeUnit { len });
        }

        // Unterminated final line, still delivered
        let record = src.split_to(src.len());
        self.next_index = 0;
        self.decode_line(&record).map(Some)
    }
}

impl<T> Encoder<T> for Utf32LineCodec
where
    T: AsRef<str>,
{
    type Error = CodecError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.as_ref();
        if line.contains('\n') {
            return Err(CodecError::EmbeddedNewline);
        }

        dst.reserve((line.len() + 1) * CODE_UNIT_LEN);
        for ch in line.chars() {
            dst.put_u32_le(ch as u32);
        }
        dst.put_u32_le(NEWLINE);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf32(text: &str) -> Vec<u8> {
        text.chars().flat_map(|c| (c as u32).to_le_bytes()).collect()
    }

    #[test]
    fn test_encode_is_utf32_le_with_newline() {
        let mut codec = Utf32LineCodec::new();
        let mut buf = BytesMut::new();

        codec.encode("hi", &mut buf).unwrap();

        assert_eq!(
            &buf[..],
            &[b'h', 0, 0, 0, b'i', 0, 0, 0, 0x0A, 0, 0, 0][..]
        );
    }

    #[test]
    fn test_encode_non_ascii() {
        let mut codec = Utf32LineCodec::new();
        let mut buf = BytesMut::new();

        codec.encode("é🙂", &mut buf).unwrap();

        assert_eq!(buf.len(), 3 * CODE_UNIT_LEN);
        assert_eq!(&buf[..4], &0xE9u32.to_le_bytes());
        assert_eq!(&buf[4..8], &0x1F642u32.to_le_bytes());
    }

    #[test]
    fn test_encode_rejects_embedded_newline() {
        let mut codec = Utf32LineCodec::new();
        let mut buf = BytesMut::new();

        let result = codec.encode("two\nlines", &mut buf);
        assert!(matches!(result, Err(CodecError::EmbeddedNewline)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_partial_line() {
        let mut codec = Utf32LineCodec::new();
        let mut buf = BytesMut::from(&utf32("Alice: h")[..]);

        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&utf32("i\n"));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("Alice: hi".to_string()));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_split_inside_code_unit() {
        let mut codec = Utf32LineCodec::new();
        let bytes = utf32("ok\n");
        let mut buf = BytesMut::from(&bytes[..5]);

        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&bytes[5..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("ok".to_string()));
    }

    #[test]
    fn test_decode_multiple_lines_in_one_read() {
        let mut codec = Utf32LineCodec::new();
        let mut buf = BytesMut::from(&utf32("one\n\ntwo\n")[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some("one".to_string()));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(String::new()));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("two".to_string()));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_ignores_newline_byte_inside_other_code_point() {
        // U+010A has 0x0A as its low byte but is not a terminator
        let mut codec = Utf32LineCodec::new();
        let mut buf = BytesMut::from(&utf32("\u{010A}x\n")[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some("\u{010A}x".to_string()));
    }

    #[test]
    fn test_decode_strips_crlf_and_bom() {
        let mut codec = Utf32LineCodec::new();
        let mut buf = BytesMut::from(&utf32("\u{FEFF}Bob\r\n")[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some("Bob".to_string()));
    }

    #[test]
    fn test_decode_invalid_code_point() {
        let mut codec = Utf32LineCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&0xD800u32.to_le_bytes());
        buf.extend_from_slice(&utf32("\n"));

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(CodecError::InvalidCodePoint(0xD800))));
    }

    #[test]
    fn test_decode_line_too_long_without_terminator() {
        let mut codec = Utf32LineCodec::with_max_line_chars(4);
        let mut buf = BytesMut::from(&utf32("abcdefgh")[..]);

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(CodecError::LineTooLong { max: 4 })));
    }

    #[test]
    fn test_decode_line_too_long_with_terminator() {
        let mut codec = Utf32LineCodec::with_max_line_chars(4);
        let mut buf = BytesMut::from(&utf32("abcde\n")[..]);

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(CodecError::LineTooLong { max: 4 })));
    }

    #[test]
    fn test_decode_line_at_limit() {
        let mut codec = Utf32LineCodec::with_max_line_chars(4);
        let mut buf = BytesMut::from(&utf32("abcd\r\n")[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some("abcd".to_string()));
    }

    #[test]
    fn test_default_limit_is_far_above_buffer_size() {
        let mut codec = Utf32LineCodec::new();
        assert_eq!(codec.max_line_chars(), MAX_LINE_CHARS);

        let relayed = format!("Alice: {}", "x".repeat(DEFAULT_BUFFER_SIZE));
        let mut buf = BytesMut::from(&utf32(&format!("{}\n", relayed))[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(relayed));
    }

    #[test]
    fn test_decode_eof_unterminated_line() {
        let mut codec = Utf32LineCodec::new();
        let mut buf = BytesMut::from(&utf32("bye")[..]);

        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some("bye".to_string()));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_decode_eof_truncated_unit() {
        let mut codec = Utf32LineCodec::new();
        let mut buf = BytesMut::from(&[b'a', 0][..]);

        let result = codec.decode_eof(&mut buf);
        assert!(matches!(result, Err(CodecError::TruncatedCodeUnit { len: 2 })));
    }

    #[test]
    fn test_encoded_line_decodes_back() {
        let mut codec = Utf32LineCodec::new();
        let mut buf = BytesMut::new();

        codec.encode("Server: exit", &mut buf).unwrap();
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("Server: exit".to_string()));
    }
}
