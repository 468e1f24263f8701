//! # RESP2 Frame Codec
//!
//! Purpose: Encode commands into the RESP2 multi-bulk request form and decode
//! exactly one server reply at a time, with no I/O of its own beyond the
//! caller-supplied stream.
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: Replies are parsed top-down with minimal state.
//! 2. **Buffer Reuse**: The caller provides the line buffer to avoid per-call
//!    allocations on the hot path.
//! 3. **Binary-Safe**: Bulk strings are raw bytes; argument bytes are framed
//!    by length, never escaped.
//! 4. **Fail Fast**: A premature end of stream inside a declared length is an
//!    IO error, never a silent truncation; unknown type bytes are protocol
//!    errors.

use std::io::{self, BufRead};

use crate::error::{Error, Result};

/// One Redis command: the upper-cased name followed by its arguments.
///
/// Immutable once constructed; arguments are raw bytes so binary payloads
/// survive unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    parts: Vec<Vec<u8>>,
}

impl Command {
    /// Builds a command from its name and argument bytes.
    ///
    /// The name is normalized to upper-case; Redis command names are
    /// case-insensitive but the canonical wire form is upper-case.
    pub fn new(name: &str, args: Vec<Vec<u8>>) -> Self {
        let mut parts = Vec::with_capacity(args.len() + 1);
        parts.push(name.to_ascii_uppercase().into_bytes());
        parts.extend(args);
        Command { parts }
    }

    /// The upper-cased command name.
    pub fn name(&self) -> &[u8] {
        &self.parts[0]
    }

    /// Name plus arguments, in wire order.
    pub fn parts(&self) -> &[Vec<u8>] {
        &self.parts
    }
}

/// One decoded server reply.
///
/// Arrays nest to arbitrary depth. `Null` covers both the null bulk string
/// (`$-1`) and the null array (`*-1`); it is a distinct variant so a null can
/// never compare equal to an empty `Bulk` or an empty `Array`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+OK` style line replies.
    Simple(String),
    /// `-ERR ...` replies, carried as a value so they can nest inside arrays.
    Error(String),
    /// `:123` replies.
    Integer(i64),
    /// `$<len>` replies with a non-negative length.
    Bulk(Vec<u8>),
    /// `$-1` and `*-1` replies.
    Null,
    /// `*<count>` replies with a non-negative count.
    Array(Vec<Reply>),
}

impl Reply {
    /// True for a simple-string reply equal to `OK`, case-insensitively.
    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Simple(s) if s.eq_ignore_ascii_case("OK"))
    }

    /// Bulk payload as a byte slice, if this is a bulk reply.
    pub fn as_bulk(&self) -> Option<&[u8]> {
        match self {
            Reply::Bulk(data) => Some(data),
            _ => None,
        }
    }
}

/// Encodes a command into the RESP2 multi-bulk request form.
///
/// Always produces `*<argc>\r\n` followed by `$<len>\r\n<arg>\r\n` per
/// argument; the inline-command form is never used. Appends to `out` so the
/// caller can reuse its write buffer.
pub fn encode_command(command: &Command, out: &mut Vec<u8>) {
    out.push(b'*');
    push_usize(out, command.parts().len());
    out.extend_from_slice(b"\r\n");
    for part in command.parts() {
        out.push(b'$');
        push_usize(out, part.len());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(part);
        out.extend_from_slice(b"\r\n");
    }
}

/// Reads exactly one reply from the stream.
///
/// Blocks until the reply is complete or the stream fails; never looks ahead
/// past the reply it returns.
pub fn read_reply<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> Result<Reply> {
    read_line(reader, line_buf)?;
    if line_buf.is_empty() {
        return Err(Error::Protocol("empty reply line"));
    }

    match line_buf[0] {
        b'+' => Ok(Reply::Simple(
            String::from_utf8_lossy(&line_buf[1..]).into_owned(),
        )),
        b'-' => Ok(Reply::Error(
            String::from_utf8_lossy(&line_buf[1..]).into_owned(),
        )),
        b':' => Ok(Reply::Integer(parse_i64(&line_buf[1..])?)),
        b'$' => {
            let len = parse_i64(&line_buf[1..])?;
            read_bulk(reader, len)
        }
        b'*' => {
            let count = parse_i64(&line_buf[1..])?;
            read_array(reader, count, line_buf)
        }
        _ => Err(Error::Protocol("unknown reply type byte")),
    }
}

fn read_bulk<R: BufRead>(reader: &mut R, len: i64) -> Result<Reply> {
    if len < 0 {
        return Ok(Reply::Null);
    }

    let mut data = vec![0u8; len as usize];
    reader.read_exact(&mut data)?;

    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf)?;
    if crlf != [b'\r', b'\n'] {
        return Err(Error::Protocol("bulk payload missing trailing CRLF"));
    }

    Ok(Reply::Bulk(data))
}

fn read_array<R: BufRead>(reader: &mut R, count: i64, line_buf: &mut Vec<u8>) -> Result<Reply> {
    if count < 0 {
        return Ok(Reply::Null);
    }

    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        items.push(read_reply(reader, line_buf)?);
    }
    Ok(Reply::Array(items))
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> Result<()> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        // The peer closed mid-reply; this is an IO condition, not framing.
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stream closed before reply line",
        )));
    }
    if buf.last() != Some(&b'\n') {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stream closed inside reply line",
        )));
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(Error::Protocol("reply line not CRLF-terminated"));
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_i64(data: &[u8]) -> Result<i64> {
    let (digits, negative) = match data.split_first() {
        Some((b'-', rest)) => (rest, true),
        _ => (data, false),
    };
    if digits.is_empty() {
        return Err(Error::Protocol("empty integer token"));
    }

    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(Error::Protocol("non-digit in integer token"));
        }
        value = value
            .saturating_mul(10)
            .saturating_add(i64::from(b - b'0'));
    }

    Ok(if negative { -value } else { value })
}

fn push_usize(out: &mut Vec<u8>, mut value: usize) {
    // Digits go into a small stack buffer to keep encoding allocation-free.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    }
    while value > 0 {
        buf[len] = b'0' + (value % 10) as u8;
        value /= 10;
        len += 1;
    }
    buf[..len].reverse();
    out.extend_from_slice(&buf[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn decode(bytes: &[u8]) -> Result<Reply> {
        let mut reader = Cursor::new(bytes.to_vec());
        let mut line = Vec::new();
        read_reply(&mut reader, &mut line)
    }

    #[test]
    fn encodes_set_command() {
        let command = Command::new("set", vec![b"foo".to_vec(), b"bar".to_vec()]);
        let mut buf = Vec::new();
        encode_command(&command, &mut buf);
        assert_eq!(&buf, b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
    }

    #[test]
    fn encodes_binary_argument_by_length() {
        let command = Command::new("SET", vec![b"k".to_vec(), vec![0, b'\r', b'\n', 0xff]]);
        let mut buf = Vec::new();
        encode_command(&command, &mut buf);
        assert_eq!(&buf, b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$4\r\n\x00\r\n\xff\r\n");
    }

    #[test]
    fn decodes_simple_string() {
        assert_eq!(decode(b"+OK\r\n").unwrap(), Reply::Simple("OK".into()));
    }

    #[test]
    fn decodes_error_as_value() {
        assert_eq!(
            decode(b"-ERR bad\r\n").unwrap(),
            Reply::Error("ERR bad".into())
        );
    }

    #[test]
    fn decodes_negative_integer() {
        assert_eq!(decode(b":-42\r\n").unwrap(), Reply::Integer(-42));
    }

    #[test]
    fn null_bulk_is_not_empty_bulk() {
        let null = decode(b"$-1\r\n").unwrap();
        let empty = decode(b"$0\r\n\r\n").unwrap();
        assert_eq!(null, Reply::Null);
        assert_eq!(empty, Reply::Bulk(Vec::new()));
        assert_ne!(null, empty);
    }

    #[test]
    fn decodes_nested_array() {
        let reply = decode(b"*2\r\n*2\r\n:1\r\n$2\r\nhi\r\n$-1\r\n").unwrap();
        assert_eq!(
            reply,
            Reply::Array(vec![
                Reply::Array(vec![Reply::Integer(1), Reply::Bulk(b"hi".to_vec())]),
                Reply::Null,
            ])
        );
    }

    #[test]
    fn null_array_is_not_empty_array() {
        assert_eq!(decode(b"*-1\r\n").unwrap(), Reply::Null);
        assert_eq!(decode(b"*0\r\n").unwrap(), Reply::Array(Vec::new()));
    }

    #[test]
    fn unknown_type_byte_is_protocol_error() {
        assert!(matches!(decode(b"?what\r\n"), Err(Error::Protocol(_))));
    }

    #[test]
    fn truncated_bulk_is_io_error() {
        assert!(matches!(decode(b"$10\r\nshort"), Err(Error::Io(_))));
    }

    #[test]
    fn closed_stream_is_io_error() {
        assert!(matches!(decode(b""), Err(Error::Io(_))));
    }

    #[test]
    fn missing_crlf_is_protocol_error() {
        assert!(matches!(decode(b"+OK\n"), Err(Error::Protocol(_))));
    }

    #[test]
    fn ok_matching_is_case_insensitive() {
        assert!(Reply::Simple("ok".into()).is_ok());
        assert!(!Reply::Simple("QUEUED".into()).is_ok());
    }
}
