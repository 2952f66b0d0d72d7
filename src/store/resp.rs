//! RESP2 framing.
//!
//! Commands are always sent as arrays of bulk strings. Replies are parsed
//! incrementally out of a read buffer: [`parse_frame`] returns `Ok(None)`
//! until a complete frame is buffered.

use bytes::{BufMut, BytesMut};

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Vec<u8>),
    Null,
    Array(Vec<Frame>),
}

impl Frame {
    /// Short human-readable rendering for error messages.
    pub fn describe(&self) -> String {
        match self {
            Frame::Simple(s) => format!("+{s}"),
            Frame::Error(e) => format!("-{e}"),
            Frame::Integer(i) => format!(":{i}"),
            Frame::Bulk(b) => format!("bulk({} bytes)", b.len()),
            Frame::Null => "nil".to_string(),
            Frame::Array(items) => format!("array({} items)", items.len()),
        }
    }
}

/// Append `args` to `buf` as a RESP command array.
pub fn encode_command(buf: &mut BytesMut, args: &[&[u8]]) {
    buf.put_u8(b'*');
    buf.extend_from_slice(args.len().to_string().as_bytes());
    buf.extend_from_slice(b"\r\n");
    for arg in args {
        buf.put_u8(b'$');
        buf.extend_from_slice(arg.len().to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(arg);
        buf.extend_from_slice(b"\r\n");
    }
}

/// Try to parse one frame from the front of `buf`.
///
/// On success returns the frame and the number of bytes it occupied.
pub fn parse_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>, StoreError> {
    let mut pos = 0;
    match parse_at(buf, &mut pos)? {
        Some(frame) => Ok(Some((frame, pos))),
        None => Ok(None),
    }
}

fn parse_at(buf: &[u8], pos: &mut usize) -> Result<Option<Frame>, StoreError> {
    let Some(&tag) = buf.get(*pos) else {
        return Ok(None);
    };
    *pos += 1;
    let Some(line) = read_line(buf, pos) else {
        return Ok(None);
    };
    match tag {
        b'+' => Ok(Some(Frame::Simple(utf8(line)?))),
        b'-' => Ok(Some(Frame::Error(utf8(line)?))),
        b':' => Ok(Some(Frame::Integer(parse_int(line)?))),
        b'$' => {
            let len = parse_int(line)?;
            if len < 0 {
                return Ok(Some(Frame::Null));
            }
            let len = len as usize;
            if buf.len() < *pos + len + 2 {
                return Ok(None);
            }
            let data = buf[*pos..*pos + len].to_vec();
            if &buf[*pos + len..*pos + len + 2] != b"\r\n" {
                return Err(StoreError::Protocol("bulk string not terminated by CRLF".into()));
            }
            *pos += len + 2;
            Ok(Some(Frame::Bulk(data)))
        }
        b'*' => {
            let len = parse_int(line)?;
            if len < 0 {
                return Ok(Some(Frame::Null));
            }
            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                match parse_at(buf, pos)? {
                    Some(item) => items.push(item),
                    None => return Ok(None),
                }
            }
            Ok(Some(Frame::Array(items)))
        }
        other => Err(StoreError::Protocol(format!("unknown frame type byte {other:#04x}"))),
    }
}

fn read_line<'a>(buf: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    let rest = &buf[*pos..];
    let end = rest.windows(2).position(|w| w == b"\r\n")?;
    *pos += end + 2;
    Some(&rest[..end])
}

fn utf8(line: &[u8]) -> Result<String, StoreError> {
    String::from_utf8(line.to_vec()).map_err(|e| StoreError::Protocol(e.to_string()))
}

fn parse_int(line: &[u8]) -> Result<i64, StoreError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| StoreError::Protocol(format!("invalid integer {:?}", String::from_utf8_lossy(line))))
}

/// Escape glob metacharacters so `prefix` matches literally in `SCAN MATCH`.
pub fn glob_escape(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 2);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
