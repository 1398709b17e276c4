//! Just enough bencode to locate the `info` dictionary of a metainfo file.

use sha1::{Digest, Sha1};
use thiserror::Error;

const MAX_DEPTH: usize = 64;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BencodeError {
    #[error("unexpected end of input at byte {0}")]
    Eof(usize),

    #[error("unexpected byte {byte:#04x} at {pos}")]
    Unexpected { byte: u8, pos: usize },

    #[error("invalid length prefix at {0}")]
    BadLength(usize),

    #[error("nesting deeper than {MAX_DEPTH}")]
    TooDeep,

    #[error("no info dictionary")]
    MissingInfo,
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Result<u8, BencodeError> {
        self.buf.get(self.pos).copied().ok_or(BencodeError::Eof(self.pos))
    }

    fn expect(&mut self, byte: u8) -> Result<(), BencodeError> {
        let found = self.peek()?;
        if found != byte {
            return Err(BencodeError::Unexpected {
                byte: found,
                pos: self.pos,
            });
        }
        self.pos += 1;
        Ok(())
    }

    fn read_bytes(&mut self) -> Result<&'a [u8], BencodeError> {
        let start = self.pos;
        let colon = self.buf[start..]
            .iter()
            .position(|b| *b == b':')
            .ok_or(BencodeError::Eof(start))?;
        let digits = &self.buf[start..start + colon];
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(BencodeError::BadLength(start));
        }
        let len: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(BencodeError::BadLength(start))?;

        let data_start = start + colon + 1;
        let data_end = data_start
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(BencodeError::Eof(self.buf.len()))?;
        self.pos = data_end;
        Ok(&self.buf[data_start..data_end])
    }

    fn skip_int(&mut self) -> Result<(), BencodeError> {
        self.expect(b'i')?;
        let start = self.pos;
        let end = self.buf[start..]
            .iter()
            .position(|b| *b == b'e')
            .ok_or(BencodeError::Eof(start))?;
        let digits = &self.buf[start..start + end];
        let digits = digits.strip_prefix(b"-").unwrap_or(digits);
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(BencodeError::Unexpected {
                byte: self.buf[start],
                pos: start,
            });
        }
        self.pos = start + end + 1;
        Ok(())
    }

    fn skip_value(&mut self, depth: usize) -> Result<(), BencodeError> {
        if depth > MAX_DEPTH {
            return Err(BencodeError::TooDeep);
        }
        match self.peek()? {
            b'i' => self.skip_int(),
            b'l' => {
                self.pos += 1;
                while self.peek()? != b'e' {
                    self.skip_value(depth + 1)?;
                }
                self.pos += 1;
                Ok(())
            }
            b'd' => {
                self.pos += 1;
                while self.peek()? != b'e' {
                    self.read_bytes()?;
                    self.skip_value(depth + 1)?;
                }
                self.pos += 1;
                Ok(())
            }
            b'0'..=b'9' => self.read_bytes().map(|_| ()),
            byte => Err(BencodeError::Unexpected {
                byte,
                pos: self.pos,
            }),
        }
    }
}

/// Raw bytes of the top-level `info` value.
pub fn info_slice(torrent: &[u8]) -> Result<&[u8], BencodeError> {
    let mut cursor = Cursor {
        buf: torrent,
        pos: 0,
    };
    cursor.expect(b'd')?;
    while cursor.peek()? != b'e' {
        let key = cursor.read_bytes()?;
        let start = cursor.pos;
        cursor.skip_value(1)?;
        if key == b"info" {
            return Ok(&torrent[start..cursor.pos]);
        }
    }
    Err(BencodeError::MissingInfo)
}

/// Lowercase hex SHA-1 of the info dictionary.
pub fn info_hash(torrent: &[u8]) -> Result<String, BencodeError> {
    let info = info_slice(torrent)?;
    Ok(hex::encode(Sha1::digest(info)))
}
