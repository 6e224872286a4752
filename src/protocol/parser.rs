//! Reply parsing
//!
//! Turns control channel lines into `Reply` values. A reply whose first line
//! is `NNN-` continues until a line starting with `NNN ` (same code) arrives.

use crate::error::ProtocolError;
use crate::protocol::Reply;

/// Incremental parser fed one raw line (with or without CRLF) at a time.
pub struct ReplyParser {
    max_lines: usize,
    pending: Option<MultiLine>,
}

struct MultiLine {
    code: u16,
    end_prefix: [u8; 4],
    lines: Vec<String>,
}

impl ReplyParser {
    pub fn new(max_lines: usize) -> Self {
        ReplyParser {
            max_lines,
            pending: None,
        }
    }

    /// Whether a multi-line reply has started but not yet finished.
    pub fn in_progress(&self) -> bool {
        self.pending.is_some()
    }

    /// Feeds one line. Returns the reply once its final line has been seen.
    pub fn feed_line(&mut self, line: &[u8]) -> Result<Option<Reply>, ProtocolError> {
        let line = trim_line_end(line);
        match self.pending.take() {
            None => self.feed_first_line(line),
            Some(ml) => self.feed_extra_line(ml, line),
        }
    }

    fn feed_first_line(&mut self, line: &[u8]) -> Result<Option<Reply>, ProtocolError> {
        let code = parse_code(line)?;
        match line.get(3) {
            None => Ok(Some(Reply::new(code, vec![String::new()]))),
            Some(b' ') => Ok(Some(Reply::new(code, vec![to_text(&line[4..])?]))),
            Some(b'-') => {
                let mut lines = Vec::with_capacity(4);
                lines.push(to_text(&line[4..])?);
                self.pending = Some(MultiLine {
                    code,
                    end_prefix: [line[0], line[1], line[2], b' '],
                    lines,
                });
                Ok(None)
            }
            Some(_) => Err(ProtocolError::InvalidLineFormat),
        }
    }

    fn feed_extra_line(
        &mut self,
        mut ml: MultiLine,
        line: &[u8],
    ) -> Result<Option<Reply>, ProtocolError> {
        let is_end = line.starts_with(&ml.end_prefix) || line == &ml.end_prefix[..3];
        if is_end {
            let msg = if line.len() > 4 { &line[4..] } else { &[][..] };
            ml.lines.push(to_text(msg)?);
            return Ok(Some(Reply::new(ml.code, ml.lines)));
        }

        if ml.lines.len() + 1 >= self.max_lines {
            return Err(ProtocolError::TooManyLines);
        }
        // do not trim whitespace at beginning
        ml.lines.push(to_text(line)?);
        self.pending = Some(ml);
        Ok(None)
    }
}

/// Parses a complete reply from a buffer holding all of its lines.
pub fn parse_reply(raw: &[u8], max_lines: usize) -> Result<Reply, ProtocolError> {
    let mut parser = ReplyParser::new(max_lines);
    for line in raw.split_inclusive(|b| *b == b'\n') {
        if let Some(reply) = parser.feed_line(line)? {
            return Ok(reply);
        }
    }
    Err(ProtocolError::ConnectionClosed)
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

fn parse_code(line: &[u8]) -> Result<u16, ProtocolError> {
    if line.len() < 3 || !line[..3].iter().all(u8::is_ascii_digit) {
        return Err(ProtocolError::InvalidLineFormat);
    }
    let code = line[..3]
        .iter()
        .fold(0u16, |acc, c| acc * 10 + (c - b'0') as u16);
    if !(100..600).contains(&code) {
        return Err(ProtocolError::InvalidReplyCode(code));
    }
    Ok(code)
}

fn to_text(msg: &[u8]) -> Result<String, ProtocolError> {
    let s = std::str::from_utf8(msg).map_err(|_| ProtocolError::LineIsNotUtf8)?;
    Ok(s.trim_end().to_string())
}
